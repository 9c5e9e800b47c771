//! HTTP API for requesting certificates.
//!
//! Every endpoint takes the same inputs and differs only in which part of
//! the certificate record it renders. A request either returns a cached
//! certificate that still satisfies it or triggers a fresh ACME issuance,
//! so the first call for a new hostname can take as long as one DNS-01
//! validation round-trip.
//!
//! # Endpoints
//!
//! All endpoints are `GET` and accept the query parameters:
//!
//! * `onlycn` - any non-empty value restricts the lookup to the certificate
//!   stored under this exact common name.
//! * `valid` - days of validity the certificate must retain before a
//!   renewal is forced (default 30).
//! * `san` - comma-separated additional names the certificate must cover.
//!
//! ## `/cert/{domain}`
//!
//! The full certificate record as JSON:
//!
//! ```bash
//! ❯ curl 'http://localhost:8080/cert/example.com?san=www.example.com'
//! {"domain":"example.com","key":"LS0t...","certificate":"LS0t...","issuer":"LS0t..."}
//! ```
//!
//! The byte fields are base64-encoded PEM blobs.
//!
//! ## `/cert/{domain}/cert`
//!
//! The leaf certificate alone, PEM.
//!
//! ## `/cert/{domain}/ca`
//!
//! The issuer chain, PEM.
//!
//! ## `/cert/{domain}/key`
//!
//! The private key, PEM.
//!
//! ## `/cert/{domain}/bundle`
//!
//! The leaf followed by the issuer chain, PEM.
//!
//! # Status codes
//!
//! `400` for invalid input (empty domain, malformed `valid`), `500` when
//! lookup or issuance fails, `200` otherwise.

mod api_error;
mod model;
mod routes;
pub mod server;

pub use server::new;
