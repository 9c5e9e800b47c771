//! Error types.

use trust_dns_server::proto::error::ProtoError;

/// Error enumerates the possible certforge error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned by [`KvStore`][crate::store::KvStore] operations when the
    /// requested key does not exist. The certificate cache treats this as a
    /// miss rather than a failure.
    #[error("key not found: \"{0}\"")]
    KeyNotFound(String),

    /// Returned when a certificate is requested without a domain name.
    #[error("domain name must not be empty")]
    EmptyDomain,

    /// Returned when the `valid` query parameter is not a non-negative
    /// integer number of days.
    #[error("invalid value for parameter valid: \"{0}\"")]
    InvalidValidDays(String),

    /// Returned when the configuration does not carry a registration email
    /// address for the ACME directory.
    #[error("a registration email address is required")]
    EmailRequired,

    /// Returned at startup for a `provider` name other than the built-in
    /// CNAME-redirect responder.
    #[error("unsupported DNS challenge provider \"{0}\"")]
    UnknownProvider(String),

    /// Returned at startup for an unrecognized `storage.driver` name.
    #[error("unsupported storage driver \"{0}\"")]
    UnknownStorage(String),

    /// Returned when an order is attempted before the account has been
    /// registered with the ACME directory.
    #[error("account is not registered with the ACME directory")]
    Unregistered,

    /// Returned when stored or issued certificate bytes cannot be parsed as
    /// PEM-encoded X.509.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Returned when generating or encoding the account's RSA key fails.
    #[error("account key error: {0}")]
    AccountKey(String),

    /// Returned when an ACME order ends in an unexpected state.
    #[error("ACME order failed: {0}")]
    AcmeOrder(String),

    /// Returned for errors raised by the ACME protocol client.
    #[error("ACME client error")]
    Acme(#[from] instant_acme::Error),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when JSON state (config, account, certificate records)
    /// cannot be encoded or decoded.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when the DNS server encounters a generic DNS protocol error.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),
}
