use serde::{Deserialize, Serialize};

/// Error body returned by the backend on non-2xx responses. Handlers are
/// inconsistent about which field carries the text, so both are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl ApiErrorBody {
    pub fn from_slice(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }

    /// `error` wins over `message`; blank strings count as missing.
    pub fn message_or(&self, fallback: &str) -> String {
        [self.error.as_deref(), self.message.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|text| !text.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_error_field_over_message() {
        let body = ApiErrorBody::from_slice(br#"{"error":"nope","message":"ignored"}"#);
        assert_eq!(body.message_or("fallback"), "nope");
    }

    #[test]
    fn falls_back_when_body_is_not_json() {
        let body = ApiErrorBody::from_slice(b"<html>bad gateway</html>");
        assert_eq!(body.message_or("Failed to load teams"), "Failed to load teams");
    }

    #[test]
    fn blank_error_defers_to_message() {
        let body = ApiErrorBody::from_slice(br#"{"error":"  ","message":"team missing"}"#);
        assert_eq!(body.message_or("fallback"), "team missing");
    }
}
