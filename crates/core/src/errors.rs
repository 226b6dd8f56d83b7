use thiserror::Error;

use crate::domain::order::OrderStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
    #[error("unsupported fulfillment type `{0}` (expected delivery|pickup|table_booking)")]
    InvalidFulfillmentType(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, call_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, call_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, call_id: String },
}

impl InterfaceError {
    /// Spoken fallback for the caller. Raw error text never reaches the phone line.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "Sorry, I could not process that. Could you say it again?",
            Self::ServiceUnavailable { .. } => {
                "Sorry, something went wrong on our side. Please call back in a moment."
            }
            Self::Internal { .. } => "Sorry, something went wrong. Goodbye.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, call_id: impl Into<String>) -> InterfaceError {
        let call_id = call_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { call_id: id, .. }
            | InterfaceError::ServiceUnavailable { call_id: id, .. }
            | InterfaceError::Internal { call_id: id, .. } => *id = call_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::InvalidStatusTransition { .. })
            | ApplicationError::Domain(DomainError::InvalidFulfillmentType(_))
            | ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                call_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, call_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, call_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "quantity must be positive".to_owned(),
        ))
        .into_interface("CA-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref call_id,
                ..
            } if call_id == "CA-1"
        ));
    }

    #[test]
    fn bad_request_has_caller_safe_message() {
        let interface =
            ApplicationError::from(DomainError::InvalidFulfillmentType("drone drop".to_owned()))
                .into_interface("CA-2");

        assert_eq!(
            interface.user_message(),
            "Sorry, I could not process that. Could you say it again?"
        );
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("CA-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "Sorry, something went wrong on our side. Please call back in a moment."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("greeting prompt missing".to_owned())
            .into_interface("CA-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "Sorry, something went wrong. Goodbye.");
    }
}
