//! Authoritative DNS server for the delegated challenge zone.
//!
//! # The CNAME redirection trick
//!
//! Solving a [RFC-8555][RFC-8555] [DNS-01] challenge for `<fqdn>` normally
//! means editing the real authoritative zone of `<fqdn>` to publish a TXT
//! record at `_acme-challenge.<fqdn>`. Instead, the operator publishes a
//! single static record there, once:
//!
//! ```text
//! _acme-challenge.example.com.  CNAME  example.com.acme.local.
//! ```
//!
//! From then on, whenever the CA resolves `_acme-challenge.example.com` it
//! follows the CNAME into the configured zone (`acme.local` above), reaches
//! this server, and receives whatever TXT token is currently published for
//! `example.com.acme.local.` - so certificates for any prepared hostname can
//! be issued dynamically without further changes to the real zone.
//!
//! # Query handling
//!
//! The server is authoritative for exactly one zone. Queries for names
//! outside it are answered `REFUSED`; inside it:
//!
//! * `A`/`AAAA` - a CNAME pointing at the configured NS host. The ACME
//!   server probes the delegated nameserver's address while validating;
//!   the redirect leads it to a real address record the operator controls.
//! * `NS` - the configured NS host.
//! * `SOA` - `MNAME` = NS host, `RNAME` = `hostmaster.<zone>.`, the current
//!   unix time as serial.
//! * `TXT` - the currently published challenge token for the name, if any,
//!   with a 1 second TTL; an empty authoritative answer otherwise.
//! * anything else - `NXDOMAIN`.
//!
//! E.g. while a challenge for `example.com` is in flight:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +short example.com.acme.local. TXT
//! "LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo"
//! ❯ dig @127.0.0.1 -p 5353 +short acme.local. NS
//! ns.local.
//! ```
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4

mod challenge;
mod handlers;
pub mod server;

pub use challenge::{ChallengeTable, DnsCnameProvider};
pub use server::new;
