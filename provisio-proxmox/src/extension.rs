//! Server extension surface consumed by the owning billing system.
//!
//! Takes raw settings/properties bags, validates them once into typed
//! settings, and dispatches to the topology reader, guest builder and
//! lifecycle controller.

use tracing::{info, instrument};

use crate::api::ProxmoxApi;
use crate::builder::GuestBuilder;
use crate::error::{ProvisionError, Result};
use crate::lifecycle::LifecycleController;
use crate::settings::{CheckoutInput, ConnectionSettings, GuestSettings, SettingsBag, DEFAULT_BRIDGE, DEFAULT_PORT};
use crate::store::{ServiceRef, ServiceStore};
use crate::topology::TopologyReader;
use crate::types::*;

/// NIC models offered for virtual machines.
pub const NIC_MODELS: [&str; 4] = ["virtio", "e1000", "rtl8139", "vmxnet3"];
/// Disk cache modes offered for virtual machines.
pub const CACHE_MODES: [&str; 5] = ["none", "directsync", "writethrough", "writeback", "unsafe"];

/// Proxmox VE server extension.
pub struct ProxmoxExtension<A, S> {
    api: A,
    store: S,
}

impl<A: ProxmoxApi, S: ServiceStore> ProxmoxExtension<A, S> {
    /// Create the extension over an API client and the owning system's store.
    pub fn new(api: A, store: S) -> Self {
        Self { api, store }
    }

    /// The underlying API client.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// The owning system's store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Product configuration schema, populated from live topology.
    ///
    /// Fails as a whole when any discovery query yields no usable data.
    #[instrument(skip(self))]
    pub async fn config_schema(&self, selected_node: Option<&str>) -> Result<Vec<ConfigField>> {
        let topology = TopologyReader::new(&self.api).read(selected_node).await?;
        Ok(product_fields(&topology))
    }

    /// Connectivity self-test: one node listing.
    pub async fn test_connection(&self) -> Result<()> {
        let nodes = TopologyReader::new(&self.api).probe().await?;
        info!(nodes, "Connection test succeeded");
        Ok(())
    }

    /// Create the guest for a service; returns the new guest id.
    pub async fn create(&self, service: ServiceRef, settings: &SettingsBag, properties: &SettingsBag) -> Result<u32> {
        let settings = GuestSettings::from_bag(settings)?;
        let checkout = CheckoutInput::from_bag(properties)?;
        GuestBuilder::new(&self.api, &self.store)
            .create(service, &settings, &checkout)
            .await
    }

    pub async fn suspend(&self, service: ServiceRef, settings: &SettingsBag) -> Result<()> {
        self.lifecycle().suspend(service, &GuestSettings::from_bag(settings)?).await
    }

    pub async fn unsuspend(&self, service: ServiceRef, settings: &SettingsBag) -> Result<()> {
        self.lifecycle().unsuspend(service, &GuestSettings::from_bag(settings)?).await
    }

    pub async fn terminate(&self, service: ServiceRef, settings: &SettingsBag) -> Result<()> {
        self.lifecycle().terminate(service, &GuestSettings::from_bag(settings)?).await
    }

    pub async fn start(&self, service: ServiceRef, settings: &SettingsBag) -> Result<()> {
        self.lifecycle().start(service, &GuestSettings::from_bag(settings)?).await
    }

    pub async fn stop(&self, service: ServiceRef, settings: &SettingsBag) -> Result<()> {
        self.lifecycle().stop(service, &GuestSettings::from_bag(settings)?).await
    }

    pub async fn reboot(&self, service: ServiceRef, settings: &SettingsBag) -> Result<()> {
        self.lifecycle().reboot(service, &GuestSettings::from_bag(settings)?).await
    }

    /// Hypervisor-side status of the service's guest.
    pub async fn status(&self, service: ServiceRef, settings: &SettingsBag) -> Result<GuestStatus> {
        self.lifecycle().status(service, &GuestSettings::from_bag(settings)?).await
    }

    /// Customer controls: start/stop/reboot only while a guest id is tracked.
    pub async fn available_actions(&self, service: ServiceRef) -> Result<Vec<Action>> {
        Ok(match self.lifecycle().tracked_vmid(service).await? {
            Some(_) => vec![Action::Start, Action::Stop, Action::Reboot],
            None => Vec::new(),
        })
    }

    fn lifecycle(&self) -> LifecycleController<'_, A, S> {
        LifecycleController::new(&self.api, &self.store)
    }
}

/// Extension metadata.
pub fn metadata() -> ExtensionMetadata {
    ExtensionMetadata {
        name: "Proxmox VE",
        description: "Proxmox Virtual Environment server integration",
        version: env!("CARGO_PKG_VERSION"),
        author: "Provisio",
        kind: "server",
    }
}

/// Static connection fields, independent of topology.
pub fn connection_fields() -> Vec<ConfigField> {
    vec![
        ConfigField::new("host", "Proxmox Host", FieldKind::Text)
            .required()
            .with_description("Proxmox server hostname or IP address"),
        ConfigField::new("port", "Port", FieldKind::Number)
            .required()
            .with_description("Proxmox API port")
            .with_default(DEFAULT_PORT.to_string()),
        ConfigField::new("username", "API Token ID", FieldKind::Text)
            .required()
            .with_description("Proxmox API token id, e.g. user@pam!tokenid"),
        ConfigField::new("password", "API Token Secret", FieldKind::Password).required(),
        ConfigField::new("verify_tls", "Verify TLS Certificate", FieldKind::Checkbox)
            .with_default("0"),
    ]
}

/// Checkout fields, identical for every guest type.
pub fn checkout_fields() -> Vec<ConfigField> {
    vec![
        ConfigField::new("hostname", "Hostname", FieldKind::Text)
            .required()
            .with_description("Hostname of the new server"),
        ConfigField::new("password", "Password", FieldKind::Password)
            .required()
            .with_description("Root password of the new server"),
    ]
}

/// Reject a guest-type change on a product that already has guests.
pub fn check_settings_update(current: &SettingsBag, proposed: &SettingsBag, has_guests: bool) -> Result<()> {
    let kind = |bag: &SettingsBag| -> Result<GuestType> {
        match bag.get("type").map(|t| t.trim()).filter(|t| !t.is_empty()) {
            Some(raw) => raw.parse(),
            None => Ok(GuestType::Qemu),
        }
    };

    let (before, after) = (kind(current)?, kind(proposed)?);
    if has_guests && before != after {
        return Err(ProvisionError::InvalidConfig(format!(
            "guest type cannot change from {} to {} once guests exist",
            before, after
        )));
    }
    Ok(())
}

/// Operator console URL for a guest.
pub fn console_url(connection: &ConnectionSettings, settings: &GuestSettings, vmid: u32) -> String {
    format!(
        "https://{}:{}/#v1:0:={}/{}:4:5:::",
        connection.host,
        connection.port,
        settings.api_kind(),
        vmid
    )
}

fn select(options: &[String]) -> FieldKind {
    FieldKind::Select { options: options.to_vec() }
}

fn fixed(options: &[&str]) -> FieldKind {
    FieldKind::Select {
        options: options.iter().map(|o| o.to_string()).collect(),
    }
}

/// Product fields for a discovered topology.
pub fn product_fields(topology: &Topology) -> Vec<ConfigField> {
    let buses: Vec<&str> = DiskBus::all().iter().map(|b| b.as_str()).collect();
    let default_bridge = topology
        .bridges
        .iter()
        .find(|b| b.as_str() == DEFAULT_BRIDGE)
        .or_else(|| topology.bridges.first())
        .cloned()
        .unwrap_or_else(|| DEFAULT_BRIDGE.to_string());

    vec![
        ConfigField::new("node", "Node", select(&topology.nodes))
            .required()
            .with_default(topology.selected_node.clone()),
        ConfigField::new("storage", "Storage", select(&topology.storages)).required(),
        ConfigField::new("pool", "Resource Pool", select(&topology.pools)),
        ConfigField::new("type", "Guest Type", fixed(&["lxc", "qemu"]))
            .required()
            .with_description("Cannot be changed once guests exist")
            .with_default("qemu"),
        ConfigField::new("cores", "Cores", FieldKind::Number).required().with_default("1"),
        ConfigField::new("memory", "Memory (MiB)", FieldKind::Number).required().with_default("1024"),
        ConfigField::new("disk", "Disk (GiB)", FieldKind::Number).required().with_default("10"),
        ConfigField::new("swap", "Swap (MiB)", FieldKind::Number)
            .with_description("Containers only")
            .with_default("512"),
        ConfigField::new("network_limit", "Network Rate Limit (MB/s)", FieldKind::Number),
        ConfigField::new("bridge", "Network Bridge", select(&topology.bridges))
            .required()
            .with_default(default_bridge),
        ConfigField::new("firewall", "Firewall", FieldKind::Checkbox),
        ConfigField::new("onboot", "Start On Boot", FieldKind::Checkbox).with_default("1"),
        ConfigField::new("ostype", "OS Type", FieldKind::Text).with_description("e.g. l26, win11, debian"),
        ConfigField::new("template", "Container Template", select(&topology.templates))
            .with_description("Containers only"),
        ConfigField::new("unprivileged", "Unprivileged Container", FieldKind::Checkbox),
        ConfigField::new("ips", "IP Addresses", FieldKind::Text)
            .with_description("Comma-separated static addresses for containers"),
        ConfigField::new("gateway", "Gateway", FieldKind::Text),
        ConfigField::new("os", "ISO Image", select(&topology.isos)).with_description("Virtual machines only"),
        ConfigField::new("cloudinit", "Cloud-Init", FieldKind::Checkbox)
            .with_description("Replaces the primary disk slot with a cloud-init drive"),
        ConfigField::new("storage_type", "Disk Bus", fixed(&buses)).with_default("scsi"),
        ConfigField::new("storage_format", "Disk Format", fixed(&["raw", "qcow2", "vmdk"])).with_default("qcow2"),
        ConfigField::new("cache", "Disk Cache", fixed(&CACHE_MODES)),
        ConfigField::new("model", "Network Model", fixed(&NIC_MODELS)).with_default("virtio"),
        ConfigField::new("sockets", "Sockets", FieldKind::Number).with_default("1"),
        ConfigField::new("vcpus", "vCPUs", FieldKind::Number),
        ConfigField::new("cpu", "CPU Model", select(&topology.cpu_models)),
        ConfigField::new("clone", "Clone From Template", FieldKind::Checkbox),
        ConfigField::new("template_vmid", "Template VM ID", FieldKind::Number)
            .with_description("Source guest for cloning"),
    ]
}
