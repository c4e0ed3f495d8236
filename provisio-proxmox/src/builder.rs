//! Guest creation.
//!
//! Three request shapes: full clone of a template VM, container creation and
//! VM creation. The guest id is allocated and recorded before anything is
//! created, so a failure at any later step still leaves a traceable id. No
//! step is rolled back on failure.

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::api::{decode, encode, Method, ProxmoxApi};
use crate::error::{ProvisionError, Result};
use crate::ipam;
use crate::payload::*;
use crate::settings::{CheckoutInput, GuestSettings};
use crate::store::{ServiceRef, ServiceStore, PROP_VMID};
use crate::types::GuestType;

/// Builds guests on the hypervisor and records their ids.
pub struct GuestBuilder<'a, A: ?Sized, S: ?Sized> {
    api: &'a A,
    store: &'a S,
}

impl<'a, A, S> GuestBuilder<'a, A, S>
where
    A: ProxmoxApi + ?Sized,
    S: ServiceStore + ?Sized,
{
    /// Create a builder.
    pub fn new(api: &'a A, store: &'a S) -> Self {
        Self { api, store }
    }

    /// Create a guest for `service` and return its id.
    #[instrument(skip(self, settings, checkout), fields(service_id = service.id, node = %settings.node, guest_type = %settings.api_kind()))]
    pub async fn create(
        &self,
        service: ServiceRef,
        settings: &GuestSettings,
        checkout: &CheckoutInput,
    ) -> Result<u32> {
        let vmid = self.next_vmid().await?;
        self.store.set_property(service, PROP_VMID, &vmid.to_string()).await?;
        info!(vmid, "Guest id allocated and recorded");

        match (settings.clone_from, settings.guest_type) {
            (Some(template), _) => self.clone_vm(vmid, template, settings, checkout).await?,
            (None, GuestType::Lxc) => self.create_container(service, vmid, settings, checkout).await?,
            (None, GuestType::Qemu) => self.create_vm(vmid, settings, checkout).await?,
        }

        info!(vmid, hostname = %checkout.hostname, "Guest created");
        Ok(vmid)
    }

    /// Ask the cluster-wide allocator for the next free guest id.
    async fn next_vmid(&self) -> Result<u32> {
        let path = "/cluster/nextid";
        let data = self.api.request(Method::Get, path, None).await?;

        let parsed = match &data {
            Value::String(s) => s.trim().parse::<u32>().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        };

        parsed.ok_or_else(|| ProvisionError::UnexpectedResponse {
            path: path.to_string(),
            message: format!("expected a guest id, got {}", data),
        })
    }

    async fn create_container(
        &self,
        service: ServiceRef,
        vmid: u32,
        settings: &GuestSettings,
        checkout: &CheckoutInput,
    ) -> Result<()> {
        let address = if settings.network.ip_candidates.is_empty() {
            None
        } else {
            Some(ipam::allocate(self.store, service, &settings.network.ip_candidates).await?)
        };

        let request = ContainerCreateRequest::build(vmid, settings, checkout, address.as_deref());
        debug!(vmid, net0 = %request.net0, "Creating container");

        self.api
            .request(
                Method::Post,
                &format!("/nodes/{}/lxc", settings.node),
                Some(encode(&request)?),
            )
            .await?;
        Ok(())
    }

    async fn create_vm(&self, vmid: u32, settings: &GuestSettings, checkout: &CheckoutInput) -> Result<()> {
        let request = VmCreateRequest::build(vmid, settings, checkout);
        debug!(vmid, net0 = %request.net0, devices = ?request.devices, "Creating virtual machine");

        self.api
            .request(
                Method::Post,
                &format!("/nodes/{}/qemu", settings.node),
                Some(encode(&request)?),
            )
            .await?;
        Ok(())
    }

    /// Clone, reconfigure, read back the boot disk, resize. Each step needs the previous one.
    async fn clone_vm(
        &self,
        vmid: u32,
        template: u32,
        settings: &GuestSettings,
        checkout: &CheckoutInput,
    ) -> Result<()> {
        let node = &settings.node;
        info!(vmid, template, "Cloning template");

        let clone = CloneRequest {
            newid: vmid,
            name: checkout.hostname.clone(),
            target: node.clone(),
            full: Flag(true),
            pool: settings.pool.clone(),
        };
        self.api
            .request(
                Method::Post,
                &format!("/nodes/{}/qemu/{}/clone", node, template),
                Some(encode(&clone)?),
            )
            .await?;

        let config_path = format!("/nodes/{}/qemu/{}/config", node, vmid);
        let reconfigure = CloneReconfigureRequest {
            cores: settings.sizing.cores,
            memory: settings.sizing.memory_mib,
            cipassword: checkout.password.clone(),
        };
        self.api
            .request(Method::Put, &config_path, Some(encode(&reconfigure)?))
            .await?;

        let config: VmConfigBoot = decode(&config_path, self.api.request(Method::Get, &config_path, None).await?)?;
        let disk = config
            .boot
            .as_deref()
            .and_then(parse_boot_disk)
            .ok_or_else(|| ProvisionError::UnexpectedResponse {
                path: config_path.clone(),
                message: format!("no boot disk in boot order {:?}", config.boot),
            })?;
        debug!(vmid, disk = %disk, "Boot disk resolved");

        let resize = ResizeRequest {
            disk,
            size: format!("{}G", settings.sizing.disk_gib),
        };
        self.api
            .request(
                Method::Put,
                &format!("/nodes/{}/qemu/{}/resize", node, vmid),
                Some(encode(&resize)?),
            )
            .await?;
        Ok(())
    }
}

/// The part of a VM config read back after cloning.
#[derive(Debug, serde::Deserialize)]
struct VmConfigBoot {
    #[serde(default)]
    boot: Option<String>,
}
