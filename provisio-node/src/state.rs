//! JSON-file service store.
//!
//! Stands in for the owning order/service system when Provisio runs on its
//! own: every service record (product, status, properties) lives in one JSON
//! file that is rewritten after each change.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

use provisio_proxmox::{
    addresses_in_use, ProvisionError, Result, ServiceRecord, ServiceRef, ServiceStatus, ServiceStore,
};

/// File-backed service store.
pub struct FileStore {
    services: RwLock<BTreeMap<u64, ServiceRecord>>,
    path: PathBuf,
}

impl FileStore {
    /// Open the state file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let services = load_from_disk(&path)?;
        info!(path = %path.display(), services = services.len(), "Service state loaded");

        Ok(Self {
            services: RwLock::new(services),
            path,
        })
    }

    /// Snapshot of a record.
    pub fn record(&self, id: u64) -> Option<ServiceRecord> {
        self.services.read().ok().and_then(|s| s.get(&id).cloned())
    }

    /// Register a service under a product if it isn't known yet.
    pub fn ensure(&self, service: ServiceRef) -> Result<()> {
        self.mutate(|services| {
            services
                .entry(service.id)
                .or_insert_with(|| ServiceRecord::new(service.id, service.product_id));
        })
    }

    /// Update the order/service status of a known service.
    pub fn set_status(&self, service: ServiceRef, status: ServiceStatus) -> Result<()> {
        self.mutate(|services| {
            services
                .entry(service.id)
                .or_insert_with(|| ServiceRecord::new(service.id, service.product_id))
                .status = status;
        })
    }

    fn mutate(&self, change: impl FnOnce(&mut BTreeMap<u64, ServiceRecord>)) -> Result<()> {
        let mut services = self
            .services
            .write()
            .map_err(|_| ProvisionError::Store("Lock poisoned".to_string()))?;
        let mut next = services.clone();
        change(&mut next);
        save_to_disk(&self.path, &next)?;
        *services = next;
        Ok(())
    }
}

fn load_from_disk(path: &Path) -> Result<BTreeMap<u64, ServiceRecord>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let json = std::fs::read_to_string(path)
        .map_err(|e| ProvisionError::Store(format!("Failed to read {}: {}", path.display(), e)))?;
    let records: Vec<ServiceRecord> = serde_json::from_str(&json)
        .map_err(|e| ProvisionError::Store(format!("Failed to parse {}: {}", path.display(), e)))?;

    Ok(records.into_iter().map(|r| (r.id, r)).collect())
}

fn save_to_disk(path: &Path, services: &BTreeMap<u64, ServiceRecord>) -> Result<()> {
    let records: Vec<&ServiceRecord> = services.values().collect();
    let json = serde_json::to_string_pretty(&records)
        .map_err(|e| ProvisionError::Store(format!("Failed to encode state: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ProvisionError::Store(format!("Failed to create {}: {}", parent.display(), e)))?;
    }

    std::fs::write(path, json)
        .map_err(|e| ProvisionError::Store(format!("Failed to write {}: {}", path.display(), e)))?;
    debug!(path = %path.display(), count = records.len(), "Service state saved");
    Ok(())
}

#[async_trait]
impl ServiceStore for FileStore {
    async fn property(&self, service: ServiceRef, key: &str) -> Result<Option<String>> {
        let services = self
            .services
            .read()
            .map_err(|_| ProvisionError::Store("Lock poisoned".to_string()))?;
        Ok(services.get(&service.id).and_then(|r| r.properties.get(key).cloned()))
    }

    async fn set_property(&self, service: ServiceRef, key: &str, value: &str) -> Result<()> {
        self.mutate(|services| {
            services
                .entry(service.id)
                .or_insert_with(|| ServiceRecord::new(service.id, service.product_id))
                .properties
                .insert(key.to_string(), value.to_string());
        })
    }

    async fn clear_property(&self, service: ServiceRef, key: &str) -> Result<()> {
        self.mutate(|services| {
            if let Some(record) = services.get_mut(&service.id) {
                record.properties.remove(key);
            }
        })
    }

    async fn assigned_addresses(&self, service: ServiceRef) -> Result<Vec<String>> {
        let services = self
            .services
            .read()
            .map_err(|_| ProvisionError::Store("Lock poisoned".to_string()))?;
        Ok(addresses_in_use(services.values(), service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisio_proxmox::{PROP_IP, PROP_VMID};

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/services.json");
        let service = ServiceRef::new(4, 2);

        {
            let store = FileStore::open(&path).unwrap();
            store.ensure(service).unwrap();
            store.set_property(service, PROP_VMID, "137").await.unwrap();
            store.set_status(service, ServiceStatus::Active).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let record = store.record(4).unwrap();
        assert_eq!(record.product_id, 2);
        assert_eq!(record.status, ServiceStatus::Active);
        assert_eq!(store.property(service, PROP_VMID).await.unwrap().as_deref(), Some("137"));
    }

    #[tokio::test]
    async fn test_cancelled_addresses_are_free() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("services.json")).unwrap();
        let old = ServiceRef::new(1, 7);
        let new = ServiceRef::new(2, 7);

        store.set_property(old, PROP_IP, "10.0.0.5").await.unwrap();
        assert_eq!(store.assigned_addresses(new).await.unwrap(), vec!["10.0.0.5"]);

        store.set_status(old, ServiceStatus::Cancelled).unwrap();
        assert!(store.assigned_addresses(new).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = FileStore::open(blocker.join("services.json")).unwrap();
        let service = ServiceRef::new(3, 1);

        let err = store.set_property(service, PROP_VMID, "140").await.unwrap_err();
        assert!(matches!(err, ProvisionError::Store(_)));
        assert_eq!(store.property(service, PROP_VMID).await.unwrap(), None);
        assert!(store.record(3).is_none());
    }

    #[test]
    fn test_corrupt_state_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(FileStore::open(&path), Err(ProvisionError::Store(_))));
    }
}
