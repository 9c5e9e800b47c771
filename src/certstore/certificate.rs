use crate::error::Error;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use x509_parser::pem::{parse_x509_pem, Pem};

/// Everything one issuance produced: the domain the certificate was obtained
/// for, the PEM-encoded leaf (optionally followed by its chain), the
/// PEM-encoded issuer chain and the PEM-encoded private key.
///
/// Persisted as JSON with base64-encoded byte fields under
/// `certs/<domain>.json`, and returned verbatim by the HTTP API.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateRecord {
    pub domain: String,
    #[serde_as(as = "Base64")]
    #[serde(rename = "key")]
    pub private_key: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub certificate: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub issuer: Vec<u8>,
}

impl CertificateRecord {
    /// The first PEM block of `certificate`, re-encoded on its own. Clients
    /// use this when they want the leaf without any chain appended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCertificate`] when `certificate` does not
    /// start with a PEM block.
    pub fn leaf_only(&self) -> Result<Vec<u8>, Error> {
        let pem = self.leaf_pem()?;
        Ok(encode_pem_certificate(&pem.contents))
    }

    /// Decode the first PEM block of `certificate`. The caller parses the
    /// contained DER with `parse_x509`.
    pub(crate) fn leaf_pem(&self) -> Result<Pem, Error> {
        let (_, pem) = parse_x509_pem(&self.certificate)
            .map_err(|err| Error::InvalidCertificate(err.to_string()))?;
        Ok(pem)
    }
}

/// Wrap DER bytes in CERTIFICATE PEM framing with 64-column base64 lines.
fn encode_pem_certificate(der: &[u8]) -> Vec<u8> {
    let encoded = STANDARD.encode(der);
    let mut out = String::with_capacity(encoded.len() + 64);
    out.push_str("-----BEGIN CERTIFICATE-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str("-----END CERTIFICATE-----\n");
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint_leaf(names: &[&str]) -> (Vec<u8>, Vec<u8>) {
        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(
            names.iter().map(ToString::to_string).collect::<Vec<_>>(),
        )
        .unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem().into_bytes(), key.serialize_pem().into_bytes())
    }

    fn record(names: &[&str]) -> CertificateRecord {
        let (certificate, private_key) = mint_leaf(names);
        CertificateRecord {
            domain: names[0].to_string(),
            private_key,
            certificate,
            issuer: b"-----BEGIN CERTIFICATE-----\nMA==\n-----END CERTIFICATE-----\n".to_vec(),
        }
    }

    #[test]
    fn serialization_round_trips() {
        let record = record(&["example.com"]);
        let raw = serde_json::to_vec(&record).unwrap();
        let decoded: CertificateRecord = serde_json::from_slice(&raw).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn json_schema_uses_base64_blobs() {
        let record = record(&["example.com"]);
        let value: serde_json::Value =
            serde_json::to_value(&record).unwrap();
        assert_eq!(value["domain"], "example.com");
        for field in ["key", "certificate", "issuer"] {
            let blob = value[field].as_str().unwrap();
            assert!(STANDARD.decode(blob).is_ok(), "{field} is not base64");
        }
    }

    #[test]
    fn leaf_only_extracts_the_first_block() {
        let mut record = record(&["example.com"]);
        let leaf = record.certificate.clone();
        // append a second block, as a bundled chain would
        record.certificate.extend_from_slice(&record.issuer.clone());

        let only = record.leaf_only().unwrap();
        let only_text = String::from_utf8(only).unwrap();
        assert_eq!(only_text.matches("BEGIN CERTIFICATE").count(), 1);

        // same DER as the original leaf
        let (_, expected) = parse_x509_pem(&leaf).unwrap();
        let (_, actual) = parse_x509_pem(only_text.as_bytes()).unwrap();
        assert_eq!(expected.contents, actual.contents);
    }

    #[test]
    fn leaf_only_rejects_garbage() {
        let record = CertificateRecord {
            domain: "example.com".to_string(),
            certificate: b"not pem".to_vec(),
            ..CertificateRecord::default()
        };
        assert!(matches!(
            record.leaf_only(),
            Err(Error::InvalidCertificate(_))
        ));
    }
}
