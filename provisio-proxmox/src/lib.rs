//! # Provisio Proxmox
//!
//! Provisioning orchestrator for Proxmox VE, driven by a billing/automation
//! system.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                ProxmoxExtension                  │
//! │  (settings bags → typed settings, dispatch)      │
//! └───────┬──────────────────┬──────────────────┬────┘
//!         ▼                  ▼                  ▼
//! ┌───────────────┐  ┌───────────────┐  ┌───────────────────┐
//! │TopologyReader │  │ GuestBuilder  │  │LifecycleController│
//! └───────┬───────┘  └───┬───────┬───┘  └────┬─────────┬────┘
//!         │              │       │           │         │
//!         ▼              ▼       ▼           ▼         ▼
//! ┌──────────────────────────┐ ┌──────────────────────────┐
//! │  ProxmoxApi (HttpClient) │ │ ServiceStore (properties)│
//! └──────────────────────────┘ └──────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use provisio_proxmox::{ConnectionSettings, HttpClient, MemoryStore, ProxmoxExtension, ServiceRef};
//!
//! let connection = ConnectionSettings::from_bag(&settings)?;
//! let extension = ProxmoxExtension::new(HttpClient::new(&connection)?, MemoryStore::new());
//!
//! let vmid = extension.create(ServiceRef::new(42, 7), &settings, &checkout).await?;
//! extension.reboot(ServiceRef::new(42, 7), &settings).await?;
//! ```

pub mod api;
pub mod builder;
pub mod error;
pub mod extension;
pub mod http;
pub mod ipam;
pub mod lifecycle;
pub mod mock;
pub mod payload;
pub mod settings;
pub mod store;
pub mod topology;
pub mod types;

pub use api::{Method, ProxmoxApi};
pub use builder::GuestBuilder;
pub use error::{ProvisionError, Result};
pub use extension::{
    check_settings_update,
    checkout_fields,
    connection_fields,
    console_url,
    metadata,
    product_fields,
    ProxmoxExtension,
};
pub use http::HttpClient;
pub use lifecycle::LifecycleController;
pub use mock::{MockApi, RecordedRequest};
pub use settings::{CheckoutInput, ConnectionSettings, GuestSettings, SettingsBag};
pub use store::{
    addresses_in_use,
    MemoryStore,
    ServiceRecord,
    ServiceRef,
    ServiceStatus,
    ServiceStore,
    PROP_IP,
    PROP_VMID,
};
pub use topology::TopologyReader;
pub use types::*;
