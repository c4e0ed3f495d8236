//! Service-record store seam.
//!
//! The owning order/service system keeps a properties bag per service. The
//! orchestrator tracks two properties there: the guest id and, for containers
//! with static addressing, the allocated IP address.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::error::{ProvisionError, Result};

/// Property holding the hypervisor guest id.
pub const PROP_VMID: &str = "vmid";
/// Property holding the allocated static address.
pub const PROP_IP: &str = "ip";

/// Order/service status as seen by the owning system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Pending,
    Active,
    Suspended,
    Cancelled,
}

/// A service record: identity, owning product, status and properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: u64,
    pub product_id: u64,
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ServiceRecord {
    /// Create an empty record.
    pub fn new(id: u64, product_id: u64) -> Self {
        Self {
            id,
            product_id,
            ..Default::default()
        }
    }
}

/// Identifies the service an operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceRef {
    pub id: u64,
    pub product_id: u64,
}

impl ServiceRef {
    pub fn new(id: u64, product_id: u64) -> Self {
        Self { id, product_id }
    }
}

/// Properties access on the owning order/service system.
///
/// No transactional guarantees are assumed: reads are snapshots.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// Read a property of a service.
    async fn property(&self, service: ServiceRef, key: &str) -> Result<Option<String>>;

    /// Create or overwrite a property of a service.
    async fn set_property(&self, service: ServiceRef, key: &str, value: &str) -> Result<()>;

    /// Remove a property of a service.
    async fn clear_property(&self, service: ServiceRef, key: &str) -> Result<()>;

    /// `ip` properties of every other service of the same product that is not cancelled.
    async fn assigned_addresses(&self, service: ServiceRef) -> Result<Vec<String>>;
}

/// In-memory store, for tests and embedding.
pub struct MemoryStore {
    services: RwLock<HashMap<u64, ServiceRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: ServiceRecord) {
        if let Ok(mut services) = self.services.write() {
            services.insert(record.id, record);
        }
    }

    /// Snapshot of a record.
    pub fn get(&self, id: u64) -> Option<ServiceRecord> {
        self.services.read().ok().and_then(|s| s.get(&id).cloned())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared helpers so every store implementation filters the same way.
pub fn addresses_in_use<'a>(
    records: impl IntoIterator<Item = &'a ServiceRecord>,
    service: ServiceRef,
) -> Vec<String> {
    records
        .into_iter()
        .filter(|r| r.product_id == service.product_id)
        .filter(|r| r.id != service.id)
        .filter(|r| r.status != ServiceStatus::Cancelled)
        .filter_map(|r| r.properties.get(PROP_IP).cloned())
        .collect()
}

#[async_trait]
impl ServiceStore for MemoryStore {
    async fn property(&self, service: ServiceRef, key: &str) -> Result<Option<String>> {
        let services = self
            .services
            .read()
            .map_err(|_| ProvisionError::Store("Lock poisoned".to_string()))?;
        Ok(services.get(&service.id).and_then(|r| r.properties.get(key).cloned()))
    }

    async fn set_property(&self, service: ServiceRef, key: &str, value: &str) -> Result<()> {
        let mut services = self
            .services
            .write()
            .map_err(|_| ProvisionError::Store("Lock poisoned".to_string()))?;
        services
            .entry(service.id)
            .or_insert_with(|| ServiceRecord::new(service.id, service.product_id))
            .properties
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear_property(&self, service: ServiceRef, key: &str) -> Result<()> {
        let mut services = self
            .services
            .write()
            .map_err(|_| ProvisionError::Store("Lock poisoned".to_string()))?;
        if let Some(record) = services.get_mut(&service.id) {
            record.properties.remove(key);
        }
        Ok(())
    }

    async fn assigned_addresses(&self, service: ServiceRef) -> Result<Vec<String>> {
        let services = self
            .services
            .read()
            .map_err(|_| ProvisionError::Store("Lock poisoned".to_string()))?;
        Ok(addresses_in_use(services.values(), service))
    }
}
