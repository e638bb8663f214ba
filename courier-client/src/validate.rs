//! Response validation, evaluated once status and headers are known and
//! before parsing begins.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// Validates a response before it is parsed. A failing validator converts the
/// terminal outcome into a validation failure regardless of whether the body
/// would have parsed.
pub trait ResponseValidator: Send + Sync {
    /// Check the observed status, headers, and body.
    fn validate(&self, status: Option<StatusCode>, headers: &HeaderMap, body: Option<&Bytes>)
    -> bool;
}

impl<F> ResponseValidator for F
where
    F: Fn(Option<StatusCode>, &HeaderMap, Option<&Bytes>) -> bool + Send + Sync,
{
    fn validate(
        &self,
        status: Option<StatusCode>,
        headers: &HeaderMap,
        body: Option<&Bytes>,
    ) -> bool {
        self(status, headers, body)
    }
}

/// The most common validation: accept statuses in a range, `200..300` by
/// default. Passes when no status was observed, such as on a cache hit.
#[derive(Debug, Clone)]
pub struct StatusValidator {
    acceptable: std::ops::Range<u16>,
}

impl Default for StatusValidator {
    fn default() -> Self {
        Self { acceptable: 200..300 }
    }
}

impl StatusValidator {
    /// Create a validator accepting the given status range.
    pub fn new(acceptable: std::ops::Range<u16>) -> Self {
        Self { acceptable }
    }
}

impl ResponseValidator for StatusValidator {
    fn validate(
        &self,
        status: Option<StatusCode>,
        _headers: &HeaderMap,
        _body: Option<&Bytes>,
    ) -> bool {
        match status {
            Some(status) => self.acceptable.contains(&status.as_u16()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_accepts_2xx_only() {
        let validator = StatusValidator::default();
        let headers = HeaderMap::new();

        assert!(validator.validate(Some(StatusCode::OK), &headers, None));
        assert!(validator.validate(Some(StatusCode::NO_CONTENT), &headers, None));
        assert!(!validator.validate(Some(StatusCode::INTERNAL_SERVER_ERROR), &headers, None));
        assert!(!validator.validate(Some(StatusCode::NOT_FOUND), &headers, None));
    }

    #[test]
    fn missing_status_passes() {
        let validator = StatusValidator::default();
        assert!(validator.validate(None, &HeaderMap::new(), None));
    }

    #[test]
    fn closure_validator() {
        let validator = |_: Option<StatusCode>, headers: &HeaderMap, _: Option<&Bytes>| {
            headers.contains_key("etag")
        };

        let mut headers = HeaderMap::new();
        assert!(!validator.validate(None, &headers, None));
        headers.insert("etag", "abc".parse().unwrap());
        assert!(validator.validate(None, &headers, None));
    }
}
