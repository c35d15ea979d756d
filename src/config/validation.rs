//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the backend URL is a dialable ws/wss endpoint
//! - Validate value ranges (timeouts > 0, buffer sizes sane)
//! - Reject contradictory origin policies
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The listener bind address does not parse as a socket address.
    InvalidBindAddress(String),
    /// The backend URL does not parse.
    InvalidBackendUrl(String),
    /// The backend URL scheme is not "ws" or "wss".
    UnsupportedBackendScheme(String),
    /// A timeout field is zero.
    ZeroTimeout(&'static str),
    /// A buffer size field is zero.
    ZeroBufferSize(&'static str),
    /// The frame size limit exceeds the message size limit.
    FrameLargerThanMessage,
    /// An origin allowlist entry is empty.
    EmptyOriginPattern,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidBindAddress(addr) => {
                write!(f, "listener.bind_address {addr:?} is not a socket address")
            }
            ValidationError::InvalidBackendUrl(url) => {
                write!(f, "backend.url {url:?} is not a valid URL")
            }
            ValidationError::UnsupportedBackendScheme(scheme) => {
                write!(f, "backend.url scheme {scheme:?} is not ws or wss")
            }
            ValidationError::ZeroTimeout(field) => {
                write!(f, "timeouts.{field} must be greater than zero")
            }
            ValidationError::ZeroBufferSize(field) => {
                write!(f, "upgrade.{field} must be greater than zero")
            }
            ValidationError::FrameLargerThanMessage => {
                write!(f, "upgrade.max_frame_size exceeds upgrade.max_message_size")
            }
            ValidationError::EmptyOriginPattern => {
                write!(f, "upgrade.origin.allowlist entries must not be empty")
            }
        }
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    match Url::parse(&config.backend.url) {
        Ok(url) => {
            if !matches!(url.scheme(), "ws" | "wss") {
                errors.push(ValidationError::UnsupportedBackendScheme(
                    url.scheme().to_string(),
                ));
            }
        }
        Err(_) => errors.push(ValidationError::InvalidBackendUrl(config.backend.url.clone())),
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.control_write_millis == 0 {
        errors.push(ValidationError::ZeroTimeout("control_write_millis"));
    }
    if config.timeouts.close_grace_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("close_grace_secs"));
    }

    if config.upgrade.read_buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize("read_buffer_size"));
    }
    if config.upgrade.write_buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize("write_buffer_size"));
    }
    if config.upgrade.max_frame_size > config.upgrade.max_message_size {
        errors.push(ValidationError::FrameLargerThanMessage);
    }

    if config.upgrade.origin.allowlist.iter().any(String::is_empty) {
        errors.push(ValidationError::EmptyOriginPattern);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
