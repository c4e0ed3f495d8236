//! # Provisio Common
//!
//! Shared utilities for the Provisio components.
//!
//! ## Logging
//!
//! ```rust
//! use provisio_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Pretty).unwrap();
//! tracing::info!(vmid = 137, "Guest created");
//! ```

pub mod logging;

pub use logging::{init_logging, LogFormat};
