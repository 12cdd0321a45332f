//! Error types for the Pagopar client.
//!
//! Every fallible operation in this crate returns [`Result`], whose error
//! type is [`PagoparError`]. Variants are grouped by who is at fault:
//!
//! - **Setup errors** ([`PagoparError::Configuration`],
//!   [`PagoparError::AlreadyInitialized`], [`PagoparError::NotFound`],
//!   [`PagoparError::ForeignInstance`]): registry or credential misuse
//! - **Request errors** ([`PagoparError::UnsupportedMethod`],
//!   [`PagoparError::InvalidQuery`], [`PagoparError::InvalidInput`]): detected
//!   before anything is sent
//! - **Remote errors** ([`PagoparError::Transport`], [`PagoparError::Protocol`],
//!   [`PagoparError::Rejected`]): the round trip itself went wrong
//! - **Domain errors** ([`PagoparError::MissingShippingMethod`],
//!   [`PagoparError::InvalidShippingOption`], [`PagoparError::UnknownLogType`],
//!   [`PagoparError::InvalidNotification`])
//!
//! # Examples
//!
//! ```
//! use pagopar_client::error::{PagoparError, RejectionKind};
//!
//! let err = PagoparError::rejected("Token no corresponde.");
//! assert_eq!(err.rejection_kind(), Some(RejectionKind::InvalidToken));
//! assert!(!err.is_transport());
//! ```

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

use crate::courier::ShippingMethod;

/// Result type alias for Pagopar operations.
pub type Result<T> = std::result::Result<T, PagoparError>;

/// Errors produced by the Pagopar client.
///
/// No variant is ever retried or suppressed internally. Each one carries
/// enough context (path, option id, raw remote message) for the caller to
/// decide what to do next.
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum PagoparError {
    /// Missing or invalid credentials or settings.
    ///
    /// Raised by [`Registry::initialize`](crate::registry::Registry::initialize)
    /// when a token is empty after the environment fallback, and by the
    /// config validators.
    ///
    /// # Recovery
    ///
    /// Fix the configuration. Retrying will not help.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An application with this name is already registered.
    #[error("application '{0}' is already initialized")]
    AlreadyInitialized(String),

    /// No application with this name is registered.
    #[error("application '{0}' not found")]
    NotFound(String),

    /// The application handle is not the instance currently registered
    /// under its name.
    ///
    /// # Recovery
    ///
    /// The handle was closed or replaced. Fetch a fresh one with
    /// [`Registry::get`](crate::registry::Registry::get).
    #[error("application '{0}' is not the registered instance")]
    ForeignInstance(String),

    /// The endpoint declares an HTTP method the transport cannot encode.
    ///
    /// This is a bug in the endpoint definition and fails before any network
    /// activity.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// A query-string payload field is neither a scalar nor a list of scalars.
    #[error("field '{field}' cannot be encoded as a query parameter")]
    InvalidQuery {
        /// Offending payload field.
        field: String,
    },

    /// Caller input rejected before sending.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Network failure or HTTP error status with no usable envelope.
    ///
    /// # Recovery
    ///
    /// Check connectivity and proxy settings. The session remains open and
    /// can be reused for the next call.
    #[error("transport error on '{path}': {source}")]
    Transport {
        /// API path of the failed call.
        path: String,
        /// Underlying client error, carrying the status when there is one.
        #[source]
        source: reqwest::Error,
    },

    /// The service answered but the envelope or payload did not match the
    /// expected shape.
    ///
    /// # Recovery
    ///
    /// Usually a contract change on the remote side. Not retryable.
    #[error("protocol error on '{path}': {reason}")]
    Protocol {
        /// API path of the call.
        path: String,
        /// Decoder message.
        reason: String,
    },

    /// The service rejected the request (`respuesta: false`).
    ///
    /// `message` is the raw text returned by the service, kept even when
    /// [`RejectionKind`] recognizes it.
    #[error("request rejected ({kind}): {message}")]
    Rejected {
        /// Classification of the message.
        kind: RejectionKind,
        /// Raw remote message.
        message: String,
    },

    /// The item has no sub-configuration for the requested courier.
    #[error("shipping method '{0}' is not offered for this item")]
    MissingShippingMethod(ShippingMethod),

    /// The option id was never quoted for this courier.
    #[error("option '{option_id}' is not offered by shipping method '{method}'")]
    InvalidShippingOption {
        /// Courier that was searched.
        method: ShippingMethod,
        /// Requested option id (empty when none was given).
        option_id: String,
    },

    /// Inbound log entry carries an unrecognized `tipo_aviso`.
    #[error("unknown log type: {0}")]
    UnknownLogType(String),

    /// Inbound notification payload could not be decoded.
    #[error("invalid notification: {0}")]
    InvalidNotification(String),
}

impl PagoparError {
    /// Builds a [`PagoparError::Rejected`] from a raw remote message.
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Rejected { kind: RejectionKind::classify(&message), message }
    }

    /// Returns `true` for network and HTTP status failures.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// HTTP status attached to a transport failure, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Rejection classification, for [`PagoparError::Rejected`] only.
    #[must_use]
    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            Self::Rejected { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Known classes of remote rejection messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RejectionKind {
    /// The signature token did not match.
    InvalidToken,
    /// The public key is unknown or disabled.
    InvalidPublicKey,
    /// The referenced order, card or product does not exist.
    NotFound,
    /// The order was already paid or reversed.
    AlreadyProcessed,
    /// Anything not recognized.
    Other,
}

/// Lowercased substrings matched against the message, first hit wins.
const REJECTION_PATTERNS: &[(&str, RejectionKind)] = &[
    ("token no corresponde", RejectionKind::InvalidToken),
    ("token incorrecto", RejectionKind::InvalidToken),
    ("token invalido", RejectionKind::InvalidToken),
    ("token inválido", RejectionKind::InvalidToken),
    ("clave publica", RejectionKind::InvalidPublicKey),
    ("clave pública", RejectionKind::InvalidPublicKey),
    ("comercio no existe", RejectionKind::InvalidPublicKey),
    ("no existe", RejectionKind::NotFound),
    ("no encontrado", RejectionKind::NotFound),
    ("ya fue pagado", RejectionKind::AlreadyProcessed),
    ("ya pagado", RejectionKind::AlreadyProcessed),
    ("ya fue reversado", RejectionKind::AlreadyProcessed),
];

impl RejectionKind {
    /// Classifies a remote message by pattern.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();
        REJECTION_PATTERNS
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern))
            .map_or(Self::Other, |(_, kind)| *kind)
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidToken => "invalid token",
            Self::InvalidPublicKey => "invalid public key",
            Self::NotFound => "not found",
            Self::AlreadyProcessed => "already processed",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = PagoparError::Configuration("private token is empty".to_owned());
        assert_eq!(err.to_string(), "configuration error: private token is empty");
    }

    #[test]
    fn test_registry_error_display() {
        assert_eq!(
            PagoparError::AlreadyInitialized("shop".to_owned()).to_string(),
            "application 'shop' is already initialized"
        );
        assert_eq!(PagoparError::NotFound("shop".to_owned()).to_string(), "application 'shop' not found");
    }

    #[test]
    fn test_shipping_error_display() {
        let err = PagoparError::InvalidShippingOption {
            method: ShippingMethod::Aex,
            option_id: "99-9".to_owned(),
        };
        assert_eq!(err.to_string(), "option '99-9' is not offered by shipping method 'aex'");

        let err = PagoparError::MissingShippingMethod(ShippingMethod::Mobi);
        assert_eq!(err.to_string(), "shipping method 'mobi' is not offered for this item");
    }

    #[test]
    fn test_rejection_keeps_raw_message() {
        let err = PagoparError::rejected("Token no corresponde.");
        assert_eq!(err.rejection_kind(), Some(RejectionKind::InvalidToken));
        assert_eq!(err.to_string(), "request rejected (invalid token): Token no corresponde.");
    }

    #[test]
    fn test_classify_patterns() {
        assert_eq!(RejectionKind::classify("El pedido no existe"), RejectionKind::NotFound);
        assert_eq!(RejectionKind::classify("Pedido ya fue pagado"), RejectionKind::AlreadyProcessed);
        assert_eq!(RejectionKind::classify("Comercio no existe"), RejectionKind::InvalidPublicKey);
        assert_eq!(RejectionKind::classify("X"), RejectionKind::Other);
        assert_eq!(RejectionKind::classify(""), RejectionKind::Other);
    }

    #[test]
    fn test_non_transport_has_no_status() {
        let err = PagoparError::Protocol { path: "x".to_owned(), reason: "y".to_owned() };
        assert!(!err.is_transport());
        assert!(err.status().is_none());
        assert!(err.rejection_kind().is_none());
    }
}
