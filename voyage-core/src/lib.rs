pub mod directory;
pub mod notifier;
pub mod payment;

pub use directory::{StaticUserDirectory, UserDirectory};
pub use notifier::{LoggingNotifier, Notifier, RecordingNotifier};
pub use payment::{
    AuthorizationDecision, AuthorizationRequest, MockPaymentAuthorizer, PaymentAuthorizer,
    PaymentInstrument,
};

/// Failure raised by an external collaborator (authorizer, notifier, directory).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
