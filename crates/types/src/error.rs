//! Error taxonomy shared by every UTCP crate.

use thiserror::Error;

/// Raised when a discriminated-union payload cannot be decoded.
///
/// Carries the offending discriminator when one was present so callers can
/// tell an unknown variant apart from a malformed known one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SerializerValidationError {
    pub message: String,
    pub discriminator: Option<String>,
}

impl SerializerValidationError {
    /// Create an error for a payload that has no discriminator field.
    pub fn missing_discriminator(field: &str) -> Self {
        Self {
            message: format!("Missing {field} discriminator"),
            discriminator: None,
        }
    }

    /// Create an error for a discriminator with no registered constructor.
    pub fn unknown_discriminator(kind: &str, discriminator: impl Into<String>) -> Self {
        let discriminator = discriminator.into();
        Self {
            message: format!("Unknown {kind} type: {discriminator}"),
            discriminator: Some(discriminator),
        }
    }

    /// Create an error for a known discriminator whose fields failed to decode.
    pub fn invalid_payload(discriminator: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let discriminator = discriminator.into();
        Self {
            message: format!("Invalid '{discriminator}' payload: {reason}"),
            discriminator: Some(discriminator),
        }
    }
}

/// Main error type for UTCP operations.
#[derive(Debug, Error)]
pub enum UtcpError {
    #[error("Serializer validation error: {0}")]
    SerializerValidation(#[from] SerializerValidationError),

    #[error("Variable not found: {name}")]
    VariableNotFound { name: String },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Manual not found: {name}")]
    ManualNotFound { name: String },

    #[error("No protocol registered for type '{call_template_type}'")]
    ProtocolNotRegistered { call_template_type: String },

    #[error("Transport failure: {message}")]
    TransportFailure { message: String },

    #[error("Unsupported operation: {message}")]
    UnsupportedOperation { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },
}

impl UtcpError {
    /// Create a variable not found error.
    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::VariableNotFound { name: name.into() }
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    /// Create a manual not found error.
    pub fn manual_not_found(name: impl Into<String>) -> Self {
        Self::ManualNotFound { name: name.into() }
    }

    /// Create a protocol not registered error.
    pub fn protocol_not_registered(call_template_type: impl Into<String>) -> Self {
        Self::ProtocolNotRegistered {
            call_template_type: call_template_type.into(),
        }
    }

    /// Create a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure { message: message.into() }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation { message: message.into() }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration { message: message.into() }
    }

    /// Create a cancellation error for the named operation.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether this error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_discriminator_names_the_type() {
        let error = SerializerValidationError::unknown_discriminator("CallTemplate", "smoke_signal");
        assert_eq!(error.to_string(), "Unknown CallTemplate type: smoke_signal");
        assert_eq!(error.discriminator.as_deref(), Some("smoke_signal"));
    }

    #[test]
    fn test_error_constructors() {
        let error = UtcpError::protocol_not_registered("grpc");
        assert_eq!(error.to_string(), "No protocol registered for type 'grpc'");

        let error = UtcpError::transport("connection refused");
        assert!(error.is_transport());
        assert!(error.to_string().contains("connection refused"));

        let error: UtcpError = SerializerValidationError::missing_discriminator("auth_type").into();
        assert!(matches!(error, UtcpError::SerializerValidation(_)));
    }
}
