use crate::certstore::certificate::CertificateRecord;
use crate::error::Error;
use time::{Duration, OffsetDateTime};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;

/// Default number of days a cached certificate must remain valid for.
pub const DEFAULT_VALID_DAYS: i64 = 30;

/// A client's certificate need: the common name, any additional subject
/// alternative names, whether only the record stored under the common name
/// may answer, and how much validity must remain.
#[derive(Debug, Clone)]
pub struct CertRequest {
    pub domain: String,
    pub san: Vec<String>,
    pub domain_is_cn: bool,
    pub valid_days: i64,
}

impl CertRequest {
    /// Storage key of the record issued for this common name.
    pub fn storage_key(&self) -> String {
        format!("certs/{}.json", self.domain.to_lowercase())
    }

    /// The requested names with the common name first and later duplicates
    /// dropped.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(1 + self.san.len());
        for name in std::iter::once(&self.domain).chain(self.san.iter()) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Whether `record` satisfies this request: every requested name must
    /// verify against the record's leaf, and the leaf must stay valid past
    /// `now + valid_days`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCertificate`] when the record's leaf cannot
    /// be parsed.
    pub fn matches(&self, record: &CertificateRecord) -> Result<bool, Error> {
        let pem = record.leaf_pem()?;
        let leaf = pem
            .parse_x509()
            .map_err(|err| Error::InvalidCertificate(err.to_string()))?;

        let patterns = dns_names(&leaf)?;
        let all_verify = self
            .names()
            .iter()
            .all(|name| patterns.iter().any(|pattern| hostname_matches(pattern, name)));
        if !all_verify {
            return Ok(false);
        }

        let valid_end_day = OffsetDateTime::now_utc() + Duration::days(self.valid_days);
        Ok(leaf.validity().not_after.timestamp() > valid_end_day.unix_timestamp())
    }
}

/// The DNS names in the leaf's subject alternative name extension.
fn dns_names(leaf: &X509Certificate) -> Result<Vec<String>, Error> {
    let extension = leaf
        .subject_alternative_name()
        .map_err(|err| Error::InvalidCertificate(err.to_string()))?;
    let mut names = Vec::new();
    if let Some(extension) = extension {
        for general_name in &extension.value.general_names {
            if let GeneralName::DNSName(name) = general_name {
                names.push((*name).to_string());
            }
        }
    }
    Ok(names)
}

/// X.509 hostname verification: case-insensitive label match, a single
/// leftmost `*` matching exactly one non-empty label. `*.example.com`
/// covers `foo.example.com` but neither `example.com` nor
/// `a.b.example.com`.
fn hostname_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        match host.split_once('.') {
            Some((first, rest)) => !first.is_empty() && rest == suffix,
            None => false,
        }
    } else {
        pattern == host
    }
}
