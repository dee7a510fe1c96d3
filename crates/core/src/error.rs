use thiserror::Error;

/// Errors that can occur across mapping, query, and consistency operations.
///
/// Variants are stable and enumerable so callers can branch on kind instead
/// of matching message strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{entity_type} not found: {id}")]
    ItemNotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("Condition check failed for {entity_type}: {id}")]
    ConditionFailed {
        entity_type: &'static str,
        id: String,
    },
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    #[error("Missing primary key attribute: {attribute}")]
    MissingPrimaryKey { attribute: String },
    #[error("Invalid operator: {0}")]
    InvalidOperator(String),
    #[error("Encryption not configured for encrypted attribute: {attribute}")]
    EncryptionNotConfigured { attribute: String },
    #[error("Verification failed after {attempts} attempts")]
    VerificationFailed { attempts: u32 },
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Malformed cursor: {0}")]
    Cursor(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Transaction canceled: {0}")]
    TransactionCanceled(String),
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the error may resolve on a re-read (transport faults and
    /// index-staleness misses). Construction and validation errors never do.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Store(_) | Error::ItemNotFound { .. })
    }

    /// Rewrites the entity context on `ItemNotFound` and `ConditionFailed`.
    /// Lower layers raise these without knowing which model was involved;
    /// the mapper fills the context in on the way out.
    pub fn with_entity(self, entity_type: &'static str, id: impl Into<String>) -> Self {
        match self {
            Error::ItemNotFound { .. } => Error::ItemNotFound {
                entity_type,
                id: id.into(),
            },
            Error::ConditionFailed { .. } => Error::ConditionFailed {
                entity_type,
                id: id.into(),
            },
            other => other,
        }
    }
}

/// Result type for all tablemap operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_not_found_display() {
        let error = Error::ItemNotFound {
            entity_type: "Order",
            id: "abc-123".to_string(),
        };
        assert_eq!(error.to_string(), "Order not found: abc-123");
    }

    #[test]
    fn test_missing_primary_key_display() {
        let error = Error::MissingPrimaryKey {
            attribute: "pk".to_string(),
        };
        assert_eq!(error.to_string(), "Missing primary key attribute: pk");
    }

    #[test]
    fn test_invalid_operator_display() {
        let error = Error::InvalidOperator("BETWEEN on partition key".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid operator: BETWEEN on partition key"
        );
    }

    #[test]
    fn test_verification_failed_display() {
        let error = Error::VerificationFailed { attempts: 3 };
        assert_eq!(error.to_string(), "Verification failed after 3 attempts");
    }

    #[test]
    fn test_encryption_not_configured_display() {
        let error = Error::EncryptionNotConfigured {
            attribute: "ssn".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Encryption not configured for encrypted attribute: ssn"
        );
    }

    #[test]
    fn test_with_entity_rewrites_context() {
        let error = Error::ConditionFailed {
            entity_type: "item",
            id: String::new(),
        };
        assert_eq!(
            error.with_entity("Order", "o-1"),
            Error::ConditionFailed {
                entity_type: "Order",
                id: "o-1".to_string(),
            }
        );
        assert_eq!(
            Error::Cancelled.with_entity("Order", "o-1"),
            Error::Cancelled
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Store("timeout".to_string()).is_retryable());
        assert!(Error::ItemNotFound {
            entity_type: "Order",
            id: "1".to_string()
        }
        .is_retryable());
        assert!(!Error::InvalidOperator("x".to_string()).is_retryable());
        assert!(!Error::InvalidModel("x".to_string()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }
}
