//! Topology discovery.
//!
//! Reads nodes, storage, pools, boot media, bridges and CPU models and shapes
//! them into option lists for operator configuration. Read-only.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::api::{Method, ProxmoxApi};
use crate::error::{ProvisionError, Result};
use crate::types::*;

/// Topology reader over a hypervisor API.
pub struct TopologyReader<'a, A: ProxmoxApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: ProxmoxApi + ?Sized> TopologyReader<'a, A> {
    /// Create a reader borrowing the API client.
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// GET a list endpoint. Absent or malformed `data` is fatal for discovery.
    async fn list<T: DeserializeOwned>(&self, path: &str, params: Option<Value>) -> Result<Vec<T>> {
        let data = self.api.request(Method::Get, path, params).await?;
        if data.is_null() {
            return Err(ProvisionError::TopologyUnavailable(format!("{} returned no data", path)));
        }
        serde_json::from_value(data)
            .map_err(|e| ProvisionError::TopologyUnavailable(format!("{} returned malformed data: {}", path, e)))
    }

    /// All nodes, in the order the hypervisor returns them.
    pub async fn nodes(&self) -> Result<Vec<HypervisorNode>> {
        self.list("/nodes", None).await
    }

    /// Storage targets on a node.
    pub async fn storages(&self, node: &str) -> Result<Vec<StorageTarget>> {
        self.list(&format!("/nodes/{}/storage", node), None).await
    }

    /// Cluster-wide resource pools.
    pub async fn pools(&self) -> Result<Vec<ResourcePool>> {
        self.list("/pools", None).await
    }

    /// Content of one storage target.
    pub async fn storage_content(&self, node: &str, storage: &str) -> Result<Vec<StorageContent>> {
        self.list(&format!("/nodes/{}/storage/{}/content", node, storage), None)
            .await
    }

    /// Container templates and ISOs across every given node.
    ///
    /// Walks every storage target of every node, so the cost is
    /// nodes x storages requests.
    pub async fn images(&self, nodes: &[HypervisorNode]) -> Result<Vec<BootableImage>> {
        let mut images = Vec::new();
        for node in nodes {
            for storage in self.storages(&node.node).await? {
                for entry in self.storage_content(&node.node, &storage.storage).await? {
                    if let Some(kind) = entry.image_kind() {
                        images.push(BootableImage { volid: entry.volid, kind });
                    }
                }
            }
        }
        Ok(images)
    }

    /// Active bridges on a node.
    pub async fn bridges(&self, node: &str) -> Result<Vec<NetworkBridge>> {
        let bridges: Vec<NetworkBridge> = self
            .list(&format!("/nodes/{}/network", node), Some(json!({ "type": "any_bridge" })))
            .await?;
        Ok(bridges.into_iter().filter(|b| b.active).collect())
    }

    /// CPU models a node can offer to VMs.
    pub async fn cpu_models(&self, node: &str) -> Result<Vec<CpuModel>> {
        self.list(&format!("/nodes/{}/capabilities/qemu/cpu", node), None)
            .await
    }

    /// Read the full topology.
    ///
    /// Without an explicit node the first node in discovery order is used.
    /// No sorting is applied anywhere, so defaults follow the hypervisor's order.
    #[instrument(skip(self))]
    pub async fn read(&self, selected_node: Option<&str>) -> Result<Topology> {
        let nodes = self.nodes().await?;
        let selected_node = match selected_node {
            Some(node) => node.to_string(),
            None => nodes
                .first()
                .map(|n| n.node.clone())
                .ok_or_else(|| ProvisionError::TopologyUnavailable("no nodes reported".to_string()))?,
        };
        debug!(node = %selected_node, nodes = nodes.len(), "Reading topology");

        let storages = self.storages(&selected_node).await?;
        let pools = self.pools().await?;
        let images = self.images(&nodes).await?;
        let bridges = self.bridges(&selected_node).await?;
        let cpu_models = self.cpu_models(&selected_node).await?;

        let (templates, isos): (Vec<_>, Vec<_>) =
            images.into_iter().partition(|i| i.kind == ImageKind::Template);

        let topology = Topology {
            nodes: nodes.into_iter().map(|n| n.node).collect(),
            selected_node,
            storages: storages.into_iter().map(|s| s.storage).collect(),
            pools: pools.into_iter().map(|p| p.poolid).collect(),
            templates: templates.into_iter().map(|i| i.volid).collect(),
            isos: isos.into_iter().map(|i| i.volid).collect(),
            bridges: bridges.into_iter().map(|b| b.iface).collect(),
            cpu_models: cpu_models.into_iter().map(|c| c.name).collect(),
        };

        info!(
            node = %topology.selected_node,
            storages = topology.storages.len(),
            templates = topology.templates.len(),
            isos = topology.isos.len(),
            "Topology discovered"
        );
        Ok(topology)
    }

    /// Lightweight connectivity check: a single node listing.
    pub async fn probe(&self) -> Result<usize> {
        Ok(self.nodes().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockApi;

    fn two_node_cluster() -> MockApi {
        let api = MockApi::new();
        api.reply(Method::Get, "/nodes", json!([{"node": "pve2", "status": "online"}, {"node": "pve1"}]))
            .reply(Method::Get, "/nodes/pve2/storage", json!([{"storage": "local"}, {"storage": "nfs"}]))
            .reply(Method::Get, "/nodes/pve1/storage", json!([{"storage": "local"}]))
            .reply(Method::Get, "/pools", json!([{"poolid": "customers"}]))
            .reply(
                Method::Get,
                "/nodes/pve2/storage/local/content",
                json!([
                    {"volid": "local:vztmpl/debian.tar.gz", "content": "vztmpl"},
                    {"volid": "local:backup/vzdump.tar", "content": "backup"}
                ]),
            )
            .reply(
                Method::Get,
                "/nodes/pve2/storage/nfs/content",
                json!([{"volid": "nfs:iso/debian.iso", "content": "iso"}]),
            )
            .reply(
                Method::Get,
                "/nodes/pve1/storage/local/content",
                json!([{"volid": "local:iso/alma.iso", "content": "iso"}]),
            )
            .reply(
                Method::Get,
                "/nodes/pve2/network",
                json!([{"iface": "vmbr0", "active": 1}, {"iface": "vmbr9"}]),
            )
            .reply(
                Method::Get,
                "/nodes/pve2/capabilities/qemu/cpu",
                json!([{"name": "host"}, {"name": "kvm64", "vendor": "default"}]),
            );
        api
    }

    #[tokio::test]
    async fn test_default_node_is_first_discovered() {
        let api = two_node_cluster();
        let topology = TopologyReader::new(&api).read(None).await.unwrap();

        assert_eq!(topology.nodes, vec!["pve2", "pve1"]);
        assert_eq!(topology.selected_node, "pve2");
        assert_eq!(topology.storages, vec!["local", "nfs"]);
        assert_eq!(topology.pools, vec!["customers"]);
        assert_eq!(topology.templates, vec!["local:vztmpl/debian.tar.gz"]);
        assert_eq!(topology.isos, vec!["nfs:iso/debian.iso", "local:iso/alma.iso"]);
        assert_eq!(topology.bridges, vec!["vmbr0"]);
        assert_eq!(topology.cpu_models, vec!["host", "kvm64"]);
    }

    #[tokio::test]
    async fn test_images_fan_out_over_every_node() {
        let api = two_node_cluster();
        TopologyReader::new(&api).read(None).await.unwrap();

        let content_reads = api
            .call_log()
            .into_iter()
            .filter(|c| c.ends_with("/content"))
            .count();
        assert_eq!(content_reads, 3);
    }

    #[tokio::test]
    async fn test_network_query_is_bridge_filtered() {
        let api = two_node_cluster();
        TopologyReader::new(&api).bridges("pve2").await.unwrap();

        let request = api.requests().pop().unwrap();
        assert_eq!(request.param("type"), Some(&json!("any_bridge")));
    }

    #[tokio::test]
    async fn test_missing_payload_aborts_read() {
        let api = two_node_cluster();
        api.reply(Method::Get, "/pools", Value::Null);

        let err = TopologyReader::new(&api).read(None).await.unwrap_err();
        assert!(matches!(err, ProvisionError::TopologyUnavailable(_)));
    }

    #[tokio::test]
    async fn test_malformed_payload_aborts_read() {
        let api = two_node_cluster();
        api.reply(Method::Get, "/nodes/pve2/network", json!({"unexpected": true}));

        let err = TopologyReader::new(&api).read(None).await.unwrap_err();
        assert!(matches!(err, ProvisionError::TopologyUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_cluster_is_unavailable() {
        let api = MockApi::new();
        api.reply(Method::Get, "/nodes", json!([]));

        let err = TopologyReader::new(&api).read(None).await.unwrap_err();
        assert!(matches!(err, ProvisionError::TopologyUnavailable(_)));
    }
}
