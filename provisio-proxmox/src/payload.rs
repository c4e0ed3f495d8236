//! Request payloads and string-encoded device descriptors.
//!
//! The hypervisor API encodes devices as comma-separated `key=value` strings
//! (`net0`, `scsi0`, `ide2`, ...). Each grammar has one builder here so the
//! exact wire text is unit-testable.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::settings::{CheckoutInput, GuestSettings, DEFAULT_SWAP_MIB};
use crate::types::{DiskBus, DiskFormat};

/// Device slot the ISO install medium is attached to.
pub const CDROM_SLOT: &str = "ide2";
/// Prefix length applied to statically assigned container addresses.
pub const STATIC_PREFIX_LEN: u8 = 24;

/// API boolean, rendered as `1`/`0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flag(pub bool);

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(self.0))
    }
}

fn bit(enabled: bool) -> u8 {
    u8::from(enabled)
}

// =============================================================================
// DESCRIPTORS
// =============================================================================

/// Primary container interface (`net0`).
///
/// Renders `name=eth0,bridge=<bridge>,firewall=<0|1>[,rate=<limit>][,ip=<addr>/24[,gw=<gw>]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNic<'a> {
    pub bridge: &'a str,
    pub firewall: bool,
    pub rate: Option<&'a str>,
    pub address: Option<&'a str>,
    pub gateway: Option<&'a str>,
}

impl fmt::Display for ContainerNic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name=eth0,bridge={},firewall={}", self.bridge, bit(self.firewall))?;
        if let Some(rate) = self.rate {
            write!(f, ",rate={}", rate)?;
        }
        // The gateway only means something alongside a static address.
        if let Some(address) = self.address {
            write!(f, ",ip={}/{}", address, STATIC_PREFIX_LEN)?;
            if let Some(gateway) = self.gateway {
                write!(f, ",gw={}", gateway)?;
            }
        }
        Ok(())
    }
}

/// Primary VM interface: `<model>,bridge=<bridge>,firewall=<0|1>`.
pub fn vm_nic(model: &str, bridge: &str, firewall: bool) -> String {
    format!("{},bridge={},firewall={}", model, bridge, bit(firewall))
}

/// Device-slot key for the primary disk, e.g. `scsi0`.
pub fn disk_slot(bus: DiskBus) -> String {
    format!("{}0", bus.as_str())
}

/// Newly allocated VM disk: `<storage>:<size>,format=<fmt>[,cache=<mode>]`.
pub fn vm_disk(storage: &str, size_gib: u64, format: DiskFormat, cache: Option<&str>) -> String {
    let mut disk = format!("{}:{},format={}", storage, size_gib, format.as_str());
    if let Some(cache) = cache {
        disk.push_str(",cache=");
        disk.push_str(cache);
    }
    disk
}

/// Cloud-init drive: `<storage>:cloudinit,format=<fmt>`.
pub fn cloudinit_drive(storage: &str, format: DiskFormat) -> String {
    format!("{}:cloudinit,format={}", storage, format.as_str())
}

/// ISO install medium: `<volid>,media=cdrom`.
pub fn cdrom(iso: &str) -> String {
    format!("{},media=cdrom", iso)
}

/// Container root filesystem: `<storage>:<size>`.
pub fn rootfs(storage: &str, size_gib: u64) -> String {
    format!("{}:{}", storage, size_gib)
}

/// Extract the boot disk from a VM `boot` option.
///
/// Takes what follows `order=`, then everything before the first `,`.
/// The device list inside `order=` is itself `;`-separated, so a `;` also
/// ends the disk name: both `"c,order=scsi0,ide2"` and
/// `"order=scsi0;ide2,net0"` yield `scsi0`.
pub fn parse_boot_disk(boot: &str) -> Option<String> {
    let (_, order) = boot.split_once("order=")?;
    let disk = order
        .split(|c| c == ',' || c == ';')
        .next()
        .map(str::trim)
        .filter(|d| !d.is_empty())?;
    Some(disk.to_string())
}

// =============================================================================
// REQUEST BODIES
// =============================================================================

/// `POST /nodes/{node}/lxc`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerCreateRequest {
    pub vmid: u32,
    pub node: String,
    pub storage: String,
    pub cores: u32,
    pub memory: u64,
    pub onboot: Flag,
    pub ostemplate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ostype: Option<String>,
    pub description: String,
    pub hostname: String,
    pub password: String,
    pub swap: u64,
    pub rootfs: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unprivileged: Option<Flag>,
    pub net0: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

impl ContainerCreateRequest {
    /// Build the creation payload. `address` is the allocated static IP, if any.
    pub fn build(
        vmid: u32,
        settings: &GuestSettings,
        checkout: &CheckoutInput,
        address: Option<&str>,
    ) -> Self {
        let net0 = ContainerNic {
            bridge: &settings.network.bridge,
            firewall: settings.network.firewall,
            rate: settings.sizing.rate_limit.as_deref(),
            address,
            gateway: settings.network.gateway.as_deref(),
        };

        Self {
            vmid,
            node: settings.node.clone(),
            storage: settings.storage.clone(),
            cores: settings.sizing.cores,
            memory: settings.sizing.memory_mib,
            onboot: Flag(settings.start_on_boot),
            ostemplate: settings.container.template.clone().unwrap_or_default(),
            ostype: settings.ostype.clone(),
            description: checkout.hostname.clone(),
            hostname: checkout.hostname.clone(),
            password: checkout.password.clone(),
            swap: settings.sizing.swap_mib.unwrap_or(DEFAULT_SWAP_MIB),
            rootfs: rootfs(&settings.storage, settings.sizing.disk_gib),
            unprivileged: settings.container.unprivileged.then_some(Flag(true)),
            net0: net0.to_string(),
            pool: settings.pool.clone(),
        }
    }
}

/// `POST /nodes/{node}/qemu`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmCreateRequest {
    pub vmid: u32,
    pub node: String,
    pub storage: String,
    pub cores: u32,
    pub memory: u64,
    pub onboot: Flag,
    pub sockets: u32,
    pub agent: Flag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ostype: Option<String>,
    pub name: String,
    pub description: String,
    pub net0: String,
    /// Disk slot and CD-ROM descriptors, keyed by slot.
    #[serde(flatten)]
    pub devices: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

impl VmCreateRequest {
    /// Build the creation payload.
    ///
    /// With cloud-init enabled the disk slot carries the cloud-init drive
    /// instead of the boot disk; both cannot be expressed in one call.
    pub fn build(vmid: u32, settings: &GuestSettings, checkout: &CheckoutInput) -> Self {
        let vm = &settings.vm;
        let slot = disk_slot(vm.bus);

        let mut devices = BTreeMap::new();
        devices.insert(
            slot.clone(),
            vm_disk(&settings.storage, settings.sizing.disk_gib, vm.format, vm.cache.as_deref()),
        );
        if vm.cloudinit {
            devices.insert(slot, cloudinit_drive(&settings.storage, vm.format));
        }
        if let Some(iso) = &vm.iso {
            devices.insert(CDROM_SLOT.to_string(), cdrom(iso));
        }

        Self {
            vmid,
            node: settings.node.clone(),
            storage: settings.storage.clone(),
            cores: settings.sizing.cores,
            memory: settings.sizing.memory_mib,
            onboot: Flag(settings.start_on_boot),
            sockets: vm.sockets,
            agent: Flag(true),
            ostype: settings.ostype.clone(),
            name: checkout.hostname.clone(),
            description: checkout.hostname.clone(),
            net0: vm_nic(&settings.network.model, &settings.network.bridge, settings.network.firewall),
            devices,
            cpu: vm.cpu_model.clone(),
            vcpus: vm.vcpus,
            pool: settings.pool.clone(),
        }
    }
}

/// `POST /nodes/{node}/qemu/{template}/clone`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloneRequest {
    pub newid: u32,
    pub name: String,
    pub target: String,
    pub full: Flag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

/// `PUT /nodes/{node}/qemu/{vmid}/config` after cloning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloneReconfigureRequest {
    pub cores: u32,
    pub memory: u64,
    pub cipassword: String,
}

/// `PUT /nodes/{node}/qemu/{vmid}/resize`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResizeRequest {
    pub disk: String,
    /// Absolute target size, e.g. `20G`
    pub size: String,
}

/// `DELETE /nodes/{node}/{kind}/{vmid}` query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestroyRequest {
    pub purge: Flag,
    #[serde(rename = "destroy-unreferenced-disks")]
    pub destroy_unreferenced_disks: Flag,
}

impl Default for DestroyRequest {
    fn default() -> Self {
        Self {
            purge: Flag(true),
            destroy_unreferenced_disks: Flag(true),
        }
    }
}
