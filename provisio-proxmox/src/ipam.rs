//! Static address allocation for container guests.
//!
//! Allocation reads a snapshot of the addresses held by the product's other
//! live services and picks the first free candidate. There is no lock and no
//! re-validation: two concurrent provisioning runs against the same product
//! can pick the same address. Callers that need exclusivity must serialize
//! provisioning per product themselves.

use std::collections::HashSet;
use tracing::{debug, info, instrument};

use crate::error::{ProvisionError, Result};
use crate::store::{ServiceRef, ServiceStore, PROP_IP};

/// First candidate (in configured order) not present in `in_use`.
pub fn select_address<'a>(candidates: &'a [String], in_use: &[String]) -> Option<&'a str> {
    let taken: HashSet<&str> = in_use.iter().map(|ip| ip.trim()).collect();
    candidates
        .iter()
        .map(|ip| ip.as_str())
        .find(|ip| !taken.contains(ip))
}

/// Allocate an address for `service` and record it as its `ip` property.
///
/// The property is written before the address is handed back, so it is
/// tracked even if the creation request later fails.
#[instrument(skip(store, candidates), fields(service_id = service.id, product_id = service.product_id))]
pub async fn allocate<S>(store: &S, service: ServiceRef, candidates: &[String]) -> Result<String>
where
    S: ServiceStore + ?Sized,
{
    let in_use = store.assigned_addresses(service).await?;
    debug!(candidates = candidates.len(), in_use = in_use.len(), "Selecting static address");

    let address = select_address(candidates, &in_use)
        .ok_or(ProvisionError::AddressesExhausted(service.product_id))?
        .to_string();

    store.set_property(service, PROP_IP, &address).await?;

    info!(ip = %address, "Static address allocated");
    Ok(address)
}
