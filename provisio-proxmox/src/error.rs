//! Error types for the provisioning orchestrator.

use thiserror::Error;

/// Errors that can occur while talking to the hypervisor or provisioning guests.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// A discovery query returned no usable payload.
    #[error("Topology unavailable: {0}")]
    TopologyUnavailable(String),

    /// The hypervisor rejected a request. `body` carries the raw error payload.
    #[error("Proxmox API error ({status}) on {path}: {body}")]
    Api {
        status: u16,
        path: String,
        body: String,
    },

    /// The request never reached the hypervisor.
    #[error("Failed to connect to hypervisor: {0}")]
    ConnectionFailed(String),

    /// An operation needing a tracked guest id was invoked without one.
    #[error("Guest does not exist for service {0}")]
    GuestNotFound(u64),

    /// Every candidate address is already assigned.
    #[error("No IP addresses available for product {0}")]
    AddressesExhausted(u64),

    /// Settings or checkout input failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The owning service store failed to read or persist a property.
    #[error("Service store error: {0}")]
    Store(String),

    /// A response was readable but not in the expected shape.
    #[error("Unexpected response from {path}: {message}")]
    UnexpectedResponse {
        path: String,
        message: String,
    },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
