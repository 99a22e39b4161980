//! Subscription lifecycle error taxonomy.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Validation | 400 |
//! | Unauthorized | 403 |
//! | NotFound | 404 |
//! | AlreadySubscribed | 409 |
//! | AlreadyCanceled | 409 |
//! | PaymentDeclined | 402 |
//! | ProviderUnavailable | 503 |
//! | InvalidSignature | 401 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{CommunityId, DomainError, ErrorCode, SubscriptionId, UserId};

/// Errors surfaced by user-initiated lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Malformed or unacceptable input.
    Validation { field: String, message: String },

    /// Caller is neither the subscription holder nor the community owner.
    Unauthorized(String),

    /// Plan, community, member or subscription missing.
    NotFound { resource: String, id: String },

    /// A live subscription already exists for the pair.
    AlreadySubscribed(String),

    /// Cancellation already happened or is already scheduled.
    AlreadyCanceled(SubscriptionId),

    /// The provider refused the payment instrument. Not retried.
    PaymentDeclined(String),

    /// Transient provider fault; nothing was applied locally.
    ProviderUnavailable(String),

    /// Webhook authenticity check failed.
    InvalidSignature,

    /// Storage or internal failure.
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        SubscriptionError::Unauthorized(message.into())
    }

    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        SubscriptionError::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    pub fn already_subscribed(user_id: UserId, community_id: CommunityId) -> Self {
        SubscriptionError::AlreadySubscribed(format!(
            "User {} already supports community {}",
            user_id, community_id
        ))
    }

    pub fn already_canceled(id: SubscriptionId) -> Self {
        SubscriptionError::AlreadyCanceled(id)
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::Validation { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::Unauthorized(_) => ErrorCode::Forbidden,
            SubscriptionError::NotFound { resource, .. } => match resource.as_str() {
                "plan" => ErrorCode::PlanNotFound,
                "community" => ErrorCode::CommunityNotFound,
                "member" => ErrorCode::MemberNotFound,
                _ => ErrorCode::SubscriptionNotFound,
            },
            SubscriptionError::AlreadySubscribed(_) => ErrorCode::SubscriptionExists,
            SubscriptionError::AlreadyCanceled(_) => ErrorCode::SubscriptionCanceled,
            SubscriptionError::PaymentDeclined(_) => ErrorCode::PaymentDeclined,
            SubscriptionError::ProviderUnavailable(_) => ErrorCode::ProviderUnavailable,
            SubscriptionError::InvalidSignature => ErrorCode::InvalidWebhookSignature,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-facing message.
    pub fn message(&self) -> String {
        match self {
            SubscriptionError::Validation { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            SubscriptionError::Unauthorized(msg) => msg.clone(),
            SubscriptionError::NotFound { resource, id } => {
                format!("{} not found: {}", resource, id)
            }
            SubscriptionError::AlreadySubscribed(msg) => msg.clone(),
            SubscriptionError::AlreadyCanceled(id) => {
                format!("Subscription {} is already canceled or scheduled to cancel", id)
            }
            SubscriptionError::PaymentDeclined(reason) => format!("Payment declined: {}", reason),
            SubscriptionError::ProviderUnavailable(reason) => {
                format!("Payment provider unavailable: {}", reason)
            }
            SubscriptionError::InvalidSignature => "Invalid webhook signature".to_string(),
            SubscriptionError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// True when the caller may safely retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriptionError::ProviderUnavailable(_) | SubscriptionError::Infrastructure(_)
        )
    }
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SubscriptionError {}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        let detail = |key: &str| err.details.get(key).cloned().unwrap_or_default();
        match err.code {
            ErrorCode::ValidationFailed | ErrorCode::InvalidStateTransition => {
                SubscriptionError::Validation {
                    field: detail("field"),
                    message: err.message.clone(),
                }
            }
            ErrorCode::SubscriptionNotFound => SubscriptionError::not_found("subscription", detail("id")),
            ErrorCode::PlanNotFound => SubscriptionError::not_found("plan", detail("id")),
            ErrorCode::CommunityNotFound => SubscriptionError::not_found("community", detail("id")),
            ErrorCode::MemberNotFound => SubscriptionError::not_found("member", detail("id")),
            ErrorCode::SubscriptionExists => SubscriptionError::AlreadySubscribed(err.message),
            ErrorCode::Forbidden => SubscriptionError::Unauthorized(err.message),
            ErrorCode::InvalidWebhookSignature => SubscriptionError::InvalidSignature,
            ErrorCode::PaymentDeclined => SubscriptionError::PaymentDeclined(err.message),
            ErrorCode::ProviderUnavailable => SubscriptionError::ProviderUnavailable(err.message),
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_subscribed_names_the_pair() {
        let err = SubscriptionError::already_subscribed(
            UserId::new(3).unwrap(),
            CommunityId::new(1).unwrap(),
        );
        assert_eq!(err.code(), ErrorCode::SubscriptionExists);
        assert_eq!(err.to_string(), "User 3 already supports community 1");
    }

    #[test]
    fn not_found_code_follows_resource() {
        assert_eq!(
            SubscriptionError::not_found("plan", 4).code(),
            ErrorCode::PlanNotFound
        );
        assert_eq!(
            SubscriptionError::not_found("subscription", "x").code(),
            ErrorCode::SubscriptionNotFound
        );
    }

    #[test]
    fn only_transient_faults_are_retryable() {
        assert!(SubscriptionError::ProviderUnavailable("timeout".into()).is_retryable());
        assert!(!SubscriptionError::PaymentDeclined("card_declined".into()).is_retryable());
        assert!(!SubscriptionError::already_canceled(SubscriptionId::new()).is_retryable());
    }

    #[test]
    fn domain_validation_keeps_field() {
        let err: SubscriptionError = DomainError::validation("provider", "bad").into();
        assert_eq!(
            err,
            SubscriptionError::Validation {
                field: "provider".to_string(),
                message: "bad".to_string()
            }
        );
    }

    #[test]
    fn domain_database_error_becomes_infrastructure() {
        let err: SubscriptionError = DomainError::database("connection reset").into();
        assert!(matches!(err, SubscriptionError::Infrastructure(_)));
    }

    #[test]
    fn domain_not_found_uses_id_detail() {
        let err: SubscriptionError = DomainError::new(ErrorCode::PlanNotFound, "no plan")
            .with_detail("id", "7")
            .into();
        assert_eq!(err, SubscriptionError::not_found("plan", "7"));
    }
}
