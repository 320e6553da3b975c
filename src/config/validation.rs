//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check relationships between settings (delivery vs idle timeout, TTLs)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{RelayConfig, DEFAULT_ADMIN_KEY};

/// Minimum accepted length of a configured signing secret, in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("relay.delivery_timeout_secs ({delivery}) must be shorter than relay.idle_timeout_secs ({idle})")]
    DeliveryExceedsIdle { delivery: u64, idle: u64 },

    #[error("auth.renewal_ttl_secs ({renewal}) must exceed auth.access_ttl_secs ({access})")]
    RenewalNotLonger { renewal: u64, access: u64 },

    #[error("auth.jwt_secret must be at least 32 bytes")]
    WeakSecret,

    #[error("admin.api_key must be changed when the admin API is enabled")]
    DefaultAdminKey,
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let nonzero = [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("relay.idle_timeout_secs", config.relay.idle_timeout_secs),
        ("relay.delivery_timeout_secs", config.relay.delivery_timeout_secs),
        ("relay.max_message_bytes", config.relay.max_message_bytes as u64),
        ("auth.access_ttl_secs", config.auth.access_ttl_secs),
        ("auth.renewal_ttl_secs", config.auth.renewal_ttl_secs),
        ("auth.revocation_sweep_secs", config.auth.revocation_sweep_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    errors.extend(
        nonzero
            .into_iter()
            .filter(|(_, value)| *value == 0)
            .map(|(field, _)| ValidationError::Zero(field)),
    );

    if config.relay.delivery_timeout_secs >= config.relay.idle_timeout_secs {
        errors.push(ValidationError::DeliveryExceedsIdle {
            delivery: config.relay.delivery_timeout_secs,
            idle: config.relay.idle_timeout_secs,
        });
    }

    if config.auth.renewal_ttl_secs <= config.auth.access_ttl_secs {
        errors.push(ValidationError::RenewalNotLonger {
            renewal: config.auth.renewal_ttl_secs,
            access: config.auth.access_ttl_secs,
        });
    }

    if !config.auth.jwt_secret.is_empty() && config.auth.jwt_secret.len() < MIN_SECRET_BYTES {
        errors.push(ValidationError::WeakSecret);
    }

    if config.admin.enabled && config.admin.api_key == DEFAULT_ADMIN_KEY {
        errors.push(ValidationError::DefaultAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
