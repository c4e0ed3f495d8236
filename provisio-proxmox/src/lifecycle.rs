//! Guest lifecycle control.
//!
//! Every operation resolves the tracked guest id first and fails with
//! [`ProvisionError::GuestNotFound`] when none is recorded. States are the
//! hypervisor's own; nothing is modelled locally beyond the tracked id.

use tracing::{info, instrument, warn};

use crate::api::{decode, encode, Method, ProxmoxApi};
use crate::error::{ProvisionError, Result};
use crate::payload::DestroyRequest;
use crate::settings::GuestSettings;
use crate::store::{ServiceRef, ServiceStore, PROP_IP, PROP_VMID};
use crate::types::GuestStatus;

/// Power actions issued through `/status/<action>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerAction {
    Start,
    Stop,
    Reboot,
}

impl PowerAction {
    fn as_str(&self) -> &'static str {
        match self {
            PowerAction::Start => "start",
            PowerAction::Stop => "stop",
            PowerAction::Reboot => "reboot",
        }
    }
}

/// Lifecycle controller for tracked guests.
pub struct LifecycleController<'a, A: ?Sized, S: ?Sized> {
    api: &'a A,
    store: &'a S,
}

impl<'a, A, S> LifecycleController<'a, A, S>
where
    A: ProxmoxApi + ?Sized,
    S: ServiceStore + ?Sized,
{
    /// Create a controller.
    pub fn new(api: &'a A, store: &'a S) -> Self {
        Self { api, store }
    }

    /// Tracked guest id of a service.
    pub async fn tracked_vmid(&self, service: ServiceRef) -> Result<Option<u32>> {
        let Some(raw) = self.store.property(service, PROP_VMID).await? else {
            return Ok(None);
        };
        raw.trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ProvisionError::Store(format!("service {} has a non-numeric vmid '{}'", service.id, raw)))
    }

    async fn require_vmid(&self, service: ServiceRef) -> Result<u32> {
        self.tracked_vmid(service)
            .await?
            .ok_or(ProvisionError::GuestNotFound(service.id))
    }

    fn guest_path(settings: &GuestSettings, vmid: u32) -> String {
        format!("/nodes/{}/{}/{}", settings.node, settings.api_kind(), vmid)
    }

    async fn power(&self, settings: &GuestSettings, vmid: u32, action: PowerAction) -> Result<()> {
        let path = format!("{}/status/{}", Self::guest_path(settings, vmid), action.as_str());
        self.api.request(Method::Post, &path, None).await?;
        info!(vmid, action = action.as_str(), "Power action accepted");
        Ok(())
    }

    /// Start the guest.
    #[instrument(skip(self, settings), fields(service_id = service.id))]
    pub async fn start(&self, service: ServiceRef, settings: &GuestSettings) -> Result<()> {
        let vmid = self.require_vmid(service).await?;
        self.power(settings, vmid, PowerAction::Start).await
    }

    /// Stop the guest.
    #[instrument(skip(self, settings), fields(service_id = service.id))]
    pub async fn stop(&self, service: ServiceRef, settings: &GuestSettings) -> Result<()> {
        let vmid = self.require_vmid(service).await?;
        self.power(settings, vmid, PowerAction::Stop).await
    }

    /// Reboot the guest.
    #[instrument(skip(self, settings), fields(service_id = service.id))]
    pub async fn reboot(&self, service: ServiceRef, settings: &GuestSettings) -> Result<()> {
        let vmid = self.require_vmid(service).await?;
        self.power(settings, vmid, PowerAction::Reboot).await
    }

    /// Billing suspension: stops the guest.
    pub async fn suspend(&self, service: ServiceRef, settings: &GuestSettings) -> Result<()> {
        self.stop(service, settings).await
    }

    /// Lift a billing suspension: starts the guest.
    pub async fn unsuspend(&self, service: ServiceRef, settings: &GuestSettings) -> Result<()> {
        self.start(service, settings).await
    }

    /// Destroy the guest and clear its tracking properties.
    ///
    /// The preceding stop is best-effort (the guest may already be stopped);
    /// the delete is not. Tracking is only cleared after a successful delete.
    #[instrument(skip(self, settings), fields(service_id = service.id))]
    pub async fn terminate(&self, service: ServiceRef, settings: &GuestSettings) -> Result<()> {
        let vmid = self.require_vmid(service).await?;

        if let Err(e) = self.power(settings, vmid, PowerAction::Stop).await {
            warn!(vmid, error = %e, "Stop before delete failed, continuing");
        }

        self.api
            .request(
                Method::Delete,
                &Self::guest_path(settings, vmid),
                Some(encode(&DestroyRequest::default())?),
            )
            .await?;

        self.store.clear_property(service, PROP_VMID).await?;
        self.store.clear_property(service, PROP_IP).await?;

        info!(vmid, "Guest destroyed");
        Ok(())
    }

    /// Current hypervisor-side status of the guest.
    pub async fn status(&self, service: ServiceRef, settings: &GuestSettings) -> Result<GuestStatus> {
        let vmid = self.require_vmid(service).await?;
        let path = format!("{}/status/current", Self::guest_path(settings, vmid));
        let data = self.api.request(Method::Get, &path, None).await?;
        decode(&path, data)
    }
}
