//! Error types for cloud provider operations.

use thiserror::Error;

/// Result type alias for adapter operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors surfaced by the cloud resource adapter.
///
/// `request_id` carries the provider-assigned identifier for tracing when
/// the provider returned one.
#[derive(Debug, Clone, Error)]
pub enum CloudError {
    #[error("rate limited by provider{}", fmt_req(.request_id))]
    RateLimited { request_id: Option<String> },

    #[error("provider temporarily unavailable: {reason}{}", fmt_req(.request_id))]
    Unavailable {
        reason: String,
        request_id: Option<String>,
    },

    #[error("provider call timed out during {operation}")]
    Timeout { operation: String },

    #[error("resource not found: {resource}{}", fmt_req(.request_id))]
    NotFound {
        resource: String,
        request_id: Option<String>,
    },

    #[error("invalid request: {reason}{}", fmt_req(.request_id))]
    InvalidRequest {
        reason: String,
        request_id: Option<String>,
    },

    #[error("operation denied: {reason}{}", fmt_req(.request_id))]
    Denied {
        reason: String,
        request_id: Option<String>,
    },

    #[error("provider error: {reason}{}", fmt_req(.request_id))]
    Provider {
        reason: String,
        request_id: Option<String>,
    },
}

impl CloudError {
    /// Whether a bounded retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CloudError::RateLimited { .. }
                | CloudError::Unavailable { .. }
                | CloudError::Timeout { .. }
        )
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        CloudError::NotFound {
            resource: resource.into(),
            request_id: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        CloudError::InvalidRequest {
            reason: reason.into(),
            request_id: None,
        }
    }
}

fn fmt_req(request_id: &Option<String>) -> String {
    match request_id {
        Some(id) => format!(" (request id {id})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CloudError::RateLimited { request_id: None }.is_transient());
        assert!(
            CloudError::Unavailable {
                reason: "maintenance".into(),
                request_id: None
            }
            .is_transient()
        );
        assert!(
            CloudError::Timeout {
                operation: "get_instance".into()
            }
            .is_transient()
        );

        assert!(!CloudError::not_found("inst-1").is_transient());
        assert!(!CloudError::invalid("bad subnet").is_transient());
    }

    #[test]
    fn request_id_appears_in_message() {
        let err = CloudError::RateLimited {
            request_id: Some("req-42".into()),
        };
        assert!(err.to_string().contains("req-42"));
    }
}
