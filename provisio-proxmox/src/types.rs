//! Type definitions for topology, guests and the extension surface.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProvisionError;

// =============================================================================
// GUEST KINDS
// =============================================================================

/// Guest type: container or full virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestType {
    /// LXC container
    Lxc,
    /// QEMU/KVM virtual machine
    Qemu,
}

impl GuestType {
    /// Path segment under `/nodes/{node}/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuestType::Lxc => "lxc",
            GuestType::Qemu => "qemu",
        }
    }
}

impl fmt::Display for GuestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuestType {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lxc" | "container" => Ok(GuestType::Lxc),
            "qemu" | "vm" | "kvm" => Ok(GuestType::Qemu),
            other => Err(ProvisionError::InvalidConfig(format!(
                "'type' must be 'lxc' or 'qemu', got '{}'",
                other
            ))),
        }
    }
}

/// Disk bus type for VM disks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskBus {
    Ide,
    Sata,
    Scsi,
    Virtio,
}

impl DiskBus {
    /// Get the bus name as used in device slot keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskBus::Ide => "ide",
            DiskBus::Sata => "sata",
            DiskBus::Scsi => "scsi",
            DiskBus::Virtio => "virtio",
        }
    }

    /// All buses, in the order offered to operators.
    pub fn all() -> [DiskBus; 4] {
        [DiskBus::Scsi, DiskBus::Virtio, DiskBus::Sata, DiskBus::Ide]
    }
}

impl FromStr for DiskBus {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ide" => Ok(DiskBus::Ide),
            "sata" => Ok(DiskBus::Sata),
            "scsi" => Ok(DiskBus::Scsi),
            "virtio" => Ok(DiskBus::Virtio),
            other => Err(ProvisionError::InvalidConfig(format!(
                "'storage_type' must be one of ide, sata, scsi, virtio; got '{}'",
                other
            ))),
        }
    }
}

/// Disk image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    Raw,
    Qcow2,
    Vmdk,
}

impl DiskFormat {
    /// Get format as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskFormat::Raw => "raw",
            DiskFormat::Qcow2 => "qcow2",
            DiskFormat::Vmdk => "vmdk",
        }
    }
}

impl FromStr for DiskFormat {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(DiskFormat::Raw),
            "qcow2" => Ok(DiskFormat::Qcow2),
            "vmdk" => Ok(DiskFormat::Vmdk),
            other => Err(ProvisionError::InvalidConfig(format!(
                "'storage_format' must be one of raw, qcow2, vmdk; got '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// TOPOLOGY
// =============================================================================

/// Accept `1`/`0`, `true`/`false` or `"1"`/`"0"` for API flags.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        serde_json::Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// A node as returned by `/nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypervisorNode {
    /// Node name, e.g. `pve1`
    pub node: String,
    /// `online`, `offline` or `unknown`
    #[serde(default)]
    pub status: Option<String>,
}

/// A storage target as returned by `/nodes/{node}/storage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageTarget {
    /// Storage id, e.g. `local-lvm`
    pub storage: String,
    /// Comma-separated content classes the storage accepts
    #[serde(default)]
    pub content: Option<String>,
    /// Storage plugin type (dir, lvmthin, zfspool, ...)
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// A resource pool as returned by `/pools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    /// Pool id
    pub poolid: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Content class of a bootable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// Container template (`vztmpl`), valid for containers only
    Template,
    /// ISO image, valid for virtual machines only
    Iso,
}

/// A storage content entry as returned by `/nodes/{node}/storage/{storage}/content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageContent {
    /// Composite volume id, e.g. `local:iso/debian-12.iso`
    pub volid: String,
    /// Content class (`vztmpl`, `iso`, `images`, `backup`, ...)
    pub content: String,
}

impl StorageContent {
    /// Classify the entry; `None` for anything that isn't boot media.
    pub fn image_kind(&self) -> Option<ImageKind> {
        match self.content.as_str() {
            "vztmpl" => Some(ImageKind::Template),
            "iso" => Some(ImageKind::Iso),
            _ => None,
        }
    }
}

/// A bootable image discovered on some node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootableImage {
    /// Composite volume id
    pub volid: String,
    /// Template or ISO
    pub kind: ImageKind,
}

/// A network interface as returned by `/nodes/{node}/network`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkBridge {
    /// Interface name, e.g. `vmbr0`
    pub iface: String,
    /// Currently active
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub active: bool,
}

/// A CPU model as returned by `/nodes/{node}/capabilities/qemu/cpu`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuModel {
    /// Model identifier, e.g. `host`, `x86-64-v2-AES`
    pub name: String,
    #[serde(default)]
    pub vendor: Option<String>,
}

/// Fully discovered topology for one configuration read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Topology {
    /// All nodes, in discovery order
    pub nodes: Vec<String>,
    /// The node the scoped lists below belong to
    pub selected_node: String,
    /// Storage targets on the selected node
    pub storages: Vec<String>,
    /// Cluster-wide resource pools
    pub pools: Vec<String>,
    /// Container templates across every node
    pub templates: Vec<String>,
    /// ISO images across every node
    pub isos: Vec<String>,
    /// Active bridges on the selected node
    pub bridges: Vec<String>,
    /// CPU models available on the selected node
    pub cpu_models: Vec<String>,
}

// =============================================================================
// GUEST STATUS
// =============================================================================

/// Current guest status from `/status/current`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestStatus {
    /// `running` or `stopped`
    pub status: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Uptime in seconds
    #[serde(default)]
    pub uptime: Option<u64>,
}

// =============================================================================
// EXTENSION SURFACE
// =============================================================================

/// User-facing controls exposed for a provisioned service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Stop,
    Reboot,
}

impl Action {
    /// Label shown to the customer.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Start => "Start",
            Action::Stop => "Stop",
            Action::Reboot => "Reboot",
        }
    }
}

/// Kind of a configuration or checkout field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Password,
    Checkbox,
    Select { options: Vec<String> },
}

/// One field of a configuration or checkout schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigField {
    /// Settings bag key
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ConfigField {
    /// Create a field.
    pub fn new(name: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            description: None,
            required: false,
            default: None,
        }
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set a help text.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Extension metadata reported to the owning system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionMetadata {
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub author: &'static str,
    /// Extension category (`server`)
    pub kind: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bridge_active_flag_forms() {
        let bridges: Vec<NetworkBridge> = serde_json::from_value(json!([
            {"iface": "vmbr0", "active": 1},
            {"iface": "vmbr1", "active": true},
            {"iface": "vmbr2"},
            {"iface": "vmbr3", "active": 0},
        ]))
        .unwrap();
        let active: Vec<_> = bridges.iter().filter(|b| b.active).map(|b| b.iface.as_str()).collect();
        assert_eq!(active, vec!["vmbr0", "vmbr1"]);
    }

    #[test]
    fn test_content_classification() {
        let entry = |content: &str| StorageContent {
            volid: "local:x".to_string(),
            content: content.to_string(),
        };
        assert_eq!(entry("vztmpl").image_kind(), Some(ImageKind::Template));
        assert_eq!(entry("iso").image_kind(), Some(ImageKind::Iso));
        assert_eq!(entry("backup").image_kind(), None);
    }

    #[test]
    fn test_guest_type_parsing() {
        assert_eq!("LXC".parse::<GuestType>().unwrap(), GuestType::Lxc);
        assert_eq!("qemu".parse::<GuestType>().unwrap(), GuestType::Qemu);
        assert!("docker".parse::<GuestType>().is_err());
    }

    #[test]
    fn test_select_field_serialization() {
        let field = ConfigField::new("node", "Node", FieldKind::Select { options: vec!["pve1".into()] }).required();
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "select");
        assert_eq!(json["options"], json!(["pve1"]));
        assert_eq!(json["required"], true);
        assert!(json.get("default").is_none());
    }
}
