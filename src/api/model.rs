use crate::certstore::{CertRequest, DEFAULT_VALID_DAYS};
use crate::error::Error;
use serde::Deserialize;

/// Query parameters accepted by every certificate endpoint.
#[derive(Deserialize, Debug, Clone, Default)]
pub(super) struct CertQuery {
    /// Any non-empty value restricts the lookup to the record stored under
    /// the common name.
    pub onlycn: Option<String>,
    /// Days of validity the certificate must retain; default 30.
    pub valid: Option<String>,
    /// Comma-separated additional subject alternative names.
    pub san: Option<String>,
}

impl CertQuery {
    /// Build the certificate request for `domain`, validating the inputs.
    pub fn into_request(self, domain: String) -> Result<CertRequest, Error> {
        if domain.is_empty() {
            return Err(Error::EmptyDomain);
        }

        let valid_days = match self.valid.as_deref() {
            None | Some("") => DEFAULT_VALID_DAYS,
            Some(raw) => match raw.parse::<i64>() {
                Ok(days) if days >= 0 => days,
                _ => return Err(Error::InvalidValidDays(raw.to_string())),
            },
        };

        let san = match self.san.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => raw.split(',').map(ToString::to_string).collect(),
        };

        Ok(CertRequest {
            domain,
            san,
            domain_is_cn: self.onlycn.map_or(false, |value| !value.is_empty()),
            valid_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_no_parameters_are_given() {
        let request = CertQuery::default()
            .into_request("example.com".to_string())
            .unwrap();
        assert_eq!(request.domain, "example.com");
        assert!(request.san.is_empty());
        assert!(!request.domain_is_cn);
        assert_eq!(request.valid_days, DEFAULT_VALID_DAYS);
    }

    #[test]
    fn any_non_empty_onlycn_value_enables_cn_mode() {
        let query = CertQuery {
            onlycn: Some("1".to_string()),
            ..CertQuery::default()
        };
        assert!(query.into_request("example.com".to_string()).unwrap().domain_is_cn);

        let query = CertQuery {
            onlycn: Some(String::new()),
            ..CertQuery::default()
        };
        assert!(!query.into_request("example.com".to_string()).unwrap().domain_is_cn);
    }

    #[test]
    fn san_is_split_on_commas() {
        let query = CertQuery {
            san: Some("a.test,b.test".to_string()),
            ..CertQuery::default()
        };
        let request = query.into_request("example.com".to_string()).unwrap();
        assert_eq!(request.san, vec!["a.test", "b.test"]);
    }

    #[test]
    fn malformed_or_negative_valid_days_are_rejected() {
        for raw in ["soon", "3.5", "-1"] {
            let query = CertQuery {
                valid: Some(raw.to_string()),
                ..CertQuery::default()
            };
            assert!(matches!(
                query.into_request("example.com".to_string()),
                Err(Error::InvalidValidDays(_))
            ));
        }
    }

    #[test]
    fn zero_valid_days_is_allowed() {
        let query = CertQuery {
            valid: Some("0".to_string()),
            ..CertQuery::default()
        };
        assert_eq!(query.into_request("example.com".to_string()).unwrap().valid_days, 0);
    }

    #[test]
    fn empty_domains_are_rejected() {
        assert!(matches!(
            CertQuery::default().into_request(String::new()),
            Err(Error::EmptyDomain)
        ));
    }
}
