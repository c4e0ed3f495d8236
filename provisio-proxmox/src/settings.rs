//! Typed settings boundary.
//!
//! The owning billing system hands over open string key-value bags. They are
//! parsed exactly once into [`ConnectionSettings`], [`GuestSettings`] and
//! [`CheckoutInput`]; nothing downstream looks at raw keys again.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ProvisionError, Result};
use crate::types::{DiskBus, DiskFormat, GuestType};

/// Raw key-value bag as supplied by the owning system.
pub type SettingsBag = HashMap<String, String>;

/// Default Proxmox VE API port.
pub const DEFAULT_PORT: u16 = 8006;
/// Default bridge for the primary interface.
pub const DEFAULT_BRIDGE: &str = "vmbr0";
/// Swap size applied to containers when none is configured (MiB).
pub const DEFAULT_SWAP_MIB: u64 = 512;
/// OS type applied to virtual machines when none is configured.
pub const DEFAULT_VM_OSTYPE: &str = "l26";

// =============================================================================
// BAG ACCESSORS
// =============================================================================

/// Trimmed, non-empty value for `key`.
fn value<'a>(bag: &'a SettingsBag, key: &str) -> Option<&'a str> {
    bag.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn required<'a>(bag: &'a SettingsBag, key: &str) -> Result<&'a str> {
    value(bag, key).ok_or_else(|| ProvisionError::InvalidConfig(format!("'{}' is required", key)))
}

/// Secret value for `key`, passed through untrimmed.
fn required_secret<'a>(bag: &'a SettingsBag, key: &str) -> Result<&'a str> {
    bag.get(key)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ProvisionError::InvalidConfig(format!("'{}' is required", key)))
}

fn optional_string(bag: &SettingsBag, key: &str) -> Option<String> {
    value(bag, key).map(str::to_string)
}

fn number<T: FromStr>(bag: &SettingsBag, key: &str) -> Result<Option<T>> {
    match value(bag, key) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            ProvisionError::InvalidConfig(format!("'{}' must be a number, got '{}'", key, raw))
        }),
    }
}

fn flag(bag: &SettingsBag, key: &str, default: bool) -> Result<bool> {
    match value(bag, key) {
        None => Ok(default),
        Some(raw) => parse_flag(raw).ok_or_else(|| {
            ProvisionError::InvalidConfig(format!("'{}' must be a boolean, got '{}'", key, raw))
        }),
    }
}

/// Parse the boolean spellings accepted in settings bags.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Where and how to reach the hypervisor API.
#[derive(Clone)]
pub struct ConnectionSettings {
    /// Hostname or IP address
    pub host: String,
    /// API port
    pub port: u16,
    /// API token id, e.g. `root@pam!provisio`
    pub token_id: String,
    /// API token secret
    pub token_secret: String,
    /// Verify the hypervisor's TLS certificate
    pub verify_tls: bool,
}

impl ConnectionSettings {
    /// Parse connection settings from a settings bag.
    pub fn from_bag(bag: &SettingsBag) -> Result<Self> {
        Ok(Self {
            host: required(bag, "host")?.to_string(),
            port: number(bag, "port")?.unwrap_or(DEFAULT_PORT),
            token_id: required(bag, "username")?.to_string(),
            token_secret: required_secret(bag, "password")?.to_string(),
            verify_tls: flag(bag, "verify_tls", false)?,
        })
    }

    /// Root of the versioned JSON API.
    pub fn base_url(&self) -> String {
        format!("https://{}:{}/api2/json", self.host, self.port)
    }

    /// Value of the `Authorization` header.
    pub fn auth_header(&self) -> String {
        format!("PVEAPIToken={}={}", self.token_id, self.token_secret)
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token_id", &self.token_id)
            .field("token_secret", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

// =============================================================================
// GUEST
// =============================================================================

/// Guest sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sizing {
    /// CPU cores (default 1)
    pub cores: u32,
    /// Memory in MiB (default 1024)
    pub memory_mib: u64,
    /// Disk size in GiB (default 10)
    pub disk_gib: u64,
    /// Container swap in MiB (unset means [`DEFAULT_SWAP_MIB`])
    pub swap_mib: Option<u64>,
    /// Network rate limit, passed through verbatim
    pub rate_limit: Option<String>,
}

/// Primary network interface settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Bridge to attach to (default `vmbr0`)
    pub bridge: String,
    /// Enable the hypervisor firewall on the interface
    pub firewall: bool,
    /// VM NIC model (default `virtio`)
    pub model: String,
    /// Static address candidates for containers, in configured order
    pub ip_candidates: Vec<String>,
    /// Gateway for static container addressing
    pub gateway: Option<String>,
}

/// Container-only settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSettings {
    /// Template volume id, e.g. `local:vztmpl/debian-12.tar.zst`
    pub template: Option<String>,
    /// Run as an unprivileged container
    pub unprivileged: bool,
}

/// Virtual-machine-only settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSettings {
    /// Disk bus (default scsi)
    pub bus: DiskBus,
    /// Disk image format (default qcow2)
    pub format: DiskFormat,
    /// Disk cache mode
    pub cache: Option<String>,
    /// CPU sockets (default 1)
    pub sockets: u32,
    /// Hotplugged vCPU count
    pub vcpus: Option<u32>,
    /// CPU model
    pub cpu_model: Option<String>,
    /// ISO volume id attached as install media
    pub iso: Option<String>,
    /// Replace the disk slot with a cloud-init drive
    pub cloudinit: bool,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            bus: DiskBus::Scsi,
            format: DiskFormat::Qcow2,
            cache: None,
            sockets: 1,
            vcpus: None,
            cpu_model: None,
            iso: None,
            cloudinit: false,
        }
    }
}

/// Product-level guest configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestSettings {
    /// Node guests are created on
    pub node: String,
    /// Storage target for disks
    pub storage: String,
    /// Resource pool new guests are tagged into
    pub pool: Option<String>,
    /// Container or virtual machine
    pub guest_type: GuestType,
    /// OS type hint
    pub ostype: Option<String>,
    /// Start the guest when the host boots
    pub start_on_boot: bool,
    /// Sizing
    pub sizing: Sizing,
    /// Primary interface
    pub network: NetworkSettings,
    /// Container fields
    pub container: ContainerSettings,
    /// Virtual machine fields
    pub vm: VmSettings,
    /// Template guest to full-clone from
    pub clone_from: Option<u32>,
}

impl GuestSettings {
    /// Parse and validate guest settings.
    pub fn from_bag(bag: &SettingsBag) -> Result<Self> {
        let guest_type = match value(bag, "type") {
            None => GuestType::Qemu,
            Some(raw) => raw.parse()?,
        };

        let clone_from = if flag(bag, "clone", false)? {
            if guest_type == GuestType::Lxc {
                return Err(ProvisionError::InvalidConfig(
                    "cloning is only supported for virtual machines".to_string(),
                ));
            }
            let vmid = number::<u32>(bag, "template_vmid")?.ok_or_else(|| {
                ProvisionError::InvalidConfig("'template_vmid' is required when 'clone' is set".to_string())
            })?;
            Some(vmid)
        } else {
            None
        };

        let container = ContainerSettings {
            template: optional_string(bag, "template"),
            unprivileged: flag(bag, "unprivileged", false)?,
        };

        if guest_type == GuestType::Lxc && container.template.is_none() {
            return Err(ProvisionError::InvalidConfig(
                "'template' is required for containers".to_string(),
            ));
        }

        let vm = VmSettings {
            bus: match value(bag, "storage_type") {
                None => DiskBus::Scsi,
                Some(raw) => raw.parse()?,
            },
            format: match value(bag, "storage_format") {
                None => DiskFormat::Qcow2,
                Some(raw) => raw.parse()?,
            },
            cache: optional_string(bag, "cache"),
            sockets: number(bag, "sockets")?.unwrap_or(1),
            vcpus: number(bag, "vcpus")?,
            cpu_model: optional_string(bag, "cpu"),
            iso: optional_string(bag, "os"),
            cloudinit: flag(bag, "cloudinit", false)?,
        };

        let ip_candidates = value(bag, "ips")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let ostype = optional_string(bag, "ostype").or_else(|| match guest_type {
            GuestType::Qemu => Some(DEFAULT_VM_OSTYPE.to_string()),
            GuestType::Lxc => None,
        });

        Ok(Self {
            node: required(bag, "node")?.to_string(),
            storage: required(bag, "storage")?.to_string(),
            pool: optional_string(bag, "pool"),
            guest_type,
            ostype,
            start_on_boot: flag(bag, "onboot", true)?,
            sizing: Sizing {
                cores: number(bag, "cores")?.unwrap_or(1),
                memory_mib: number(bag, "memory")?.unwrap_or(1024),
                disk_gib: number(bag, "disk")?.unwrap_or(10),
                swap_mib: number(bag, "swap")?,
                rate_limit: optional_string(bag, "network_limit"),
            },
            network: NetworkSettings {
                bridge: optional_string(bag, "bridge").unwrap_or_else(|| DEFAULT_BRIDGE.to_string()),
                firewall: flag(bag, "firewall", false)?,
                model: optional_string(bag, "model").unwrap_or_else(|| "virtio".to_string()),
                ip_candidates,
                gateway: optional_string(bag, "gateway"),
            },
            container,
            vm,
            clone_from,
        })
    }

    /// Is the clone path selected?
    pub fn is_clone(&self) -> bool {
        self.clone_from.is_some()
    }

    /// API path segment for guests created from these settings.
    ///
    /// Clones are always virtual machines.
    pub fn api_kind(&self) -> GuestType {
        if self.is_clone() {
            GuestType::Qemu
        } else {
            self.guest_type
        }
    }
}

// =============================================================================
// CHECKOUT
// =============================================================================

/// Per-order fields supplied by the end customer.
#[derive(Clone, PartialEq, Eq)]
pub struct CheckoutInput {
    /// Guest hostname
    pub hostname: String,
    /// Root / default-user password
    pub password: String,
}

impl CheckoutInput {
    /// Create checkout input.
    pub fn new(hostname: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            password: password.into(),
        }
    }

    /// Parse checkout input from a properties bag.
    pub fn from_bag(bag: &SettingsBag) -> Result<Self> {
        Ok(Self {
            hostname: required(bag, "hostname")?.to_string(),
            password: required_secret(bag, "password")?.to_string(),
        })
    }
}

impl fmt::Debug for CheckoutInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutInput")
            .field("hostname", &self.hostname)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn bag(pairs: &[(&str, &str)]) -> SettingsBag {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_container_defaults() {
        let settings = GuestSettings::from_bag(&bag(&[
            ("type", "lxc"),
            ("node", "pve1"),
            ("storage", "local"),
            ("template", "local:vztmpl/debian.tar.gz"),
        ]))
        .unwrap();

        assert_eq!(settings.guest_type, GuestType::Lxc);
        assert_eq!(settings.sizing.cores, 1);
        assert_eq!(settings.sizing.memory_mib, 1024);
        assert_eq!(settings.sizing.swap_mib, None);
        assert_eq!(settings.network.bridge, "vmbr0");
        assert!(settings.start_on_boot);
        assert_eq!(settings.ostype, None);
        assert!(!settings.is_clone());
    }

    #[test]
    fn test_vm_defaults() {
        let settings = GuestSettings::from_bag(&bag(&[("node", "pve1"), ("storage", "local-lvm")])).unwrap();
        assert_eq!(settings.guest_type, GuestType::Qemu);
        assert_eq!(settings.ostype.as_deref(), Some("l26"));
        assert_eq!(settings.vm.bus, DiskBus::Scsi);
        assert_eq!(settings.vm.format, DiskFormat::Qcow2);
        assert_eq!(settings.vm.sockets, 1);
        assert_eq!(settings.network.model, "virtio");
    }

    #[test]
    fn test_ip_candidates_keep_order() {
        let settings = GuestSettings::from_bag(&bag(&[
            ("type", "lxc"),
            ("node", "pve1"),
            ("storage", "local"),
            ("template", "local:vztmpl/debian.tar.gz"),
            ("ips", "10.0.0.7, 10.0.0.5,,10.0.0.6"),
        ]))
        .unwrap();
        assert_eq!(settings.network.ip_candidates, vec!["10.0.0.7", "10.0.0.5", "10.0.0.6"]);
    }

    #[test]
    fn test_clone_requires_template_vmid() {
        let err = GuestSettings::from_bag(&bag(&[("node", "pve1"), ("storage", "local"), ("clone", "1")]))
            .unwrap_err();
        assert!(err.to_string().contains("template_vmid"));

        let settings = GuestSettings::from_bag(&bag(&[
            ("node", "pve1"),
            ("storage", "local"),
            ("clone", "yes"),
            ("template_vmid", "9000"),
        ]))
        .unwrap();
        assert_eq!(settings.clone_from, Some(9000));
        assert_eq!(settings.api_kind(), GuestType::Qemu);
    }

    #[test]
    fn test_clone_rejected_for_containers() {
        let err = GuestSettings::from_bag(&bag(&[
            ("type", "lxc"),
            ("node", "pve1"),
            ("storage", "local"),
            ("template", "local:vztmpl/debian.tar.gz"),
            ("clone", "true"),
            ("template_vmid", "9000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_values_name_the_key() {
        let err = GuestSettings::from_bag(&bag(&[("node", "pve1"), ("storage", "local"), ("cores", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("cores"));

        let err = GuestSettings::from_bag(&bag(&[("node", "pve1"), ("storage", "local"), ("firewall", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("firewall"));
    }

    #[test]
    fn test_connection_settings() {
        let conn = ConnectionSettings::from_bag(&bag(&[
            ("host", "pve.example.com"),
            ("username", "root@pam!provisio"),
            ("password", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(conn.port, 8006);
        assert_eq!(conn.base_url(), "https://pve.example.com:8006/api2/json");
        assert_eq!(conn.auth_header(), "PVEAPIToken=root@pam!provisio=s3cret");
        assert!(!format!("{:?}", conn).contains("s3cret"));
    }

    #[test]
    fn test_checkout_requires_both_fields() {
        assert!(CheckoutInput::from_bag(&bag(&[("hostname", "host1")])).is_err());
        let checkout = CheckoutInput::from_bag(&bag(&[("hostname", "host1"), ("password", "p@ss")])).unwrap();
        assert_eq!(checkout.hostname, "host1");
        assert!(!format!("{:?}", checkout).contains("p@ss"));
    }

    #[test]
    fn test_secrets_are_not_trimmed() {
        let checkout = CheckoutInput::from_bag(&bag(&[("hostname", " host1 "), ("password", "  pa ss  ")])).unwrap();
        assert_eq!(checkout.hostname, "host1");
        assert_eq!(checkout.password, "  pa ss  ");

        let conn = ConnectionSettings::from_bag(&bag(&[
            ("host", "pve.example.com"),
            ("username", "root@pam!provisio"),
            ("password", " s3cret "),
        ]))
        .unwrap();
        assert_eq!(conn.token_secret, " s3cret ");

        assert!(CheckoutInput::from_bag(&bag(&[("hostname", "host1"), ("password", "   ")])).is_err());
    }
}
