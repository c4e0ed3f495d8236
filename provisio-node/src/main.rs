//! # Provisio
//!
//! Drives Proxmox VE provisioning from a YAML config and a JSON service
//! state file, standing in for the billing/automation system that normally
//! owns products and services.
//!
//! ## Usage
//!
//! ```bash
//! provisio --config /etc/provisio/provisio.yaml test-connection
//! provisio topology --node pve1
//! provisio create --service 42 --product 1 --hostname web1 --password s3cret
//! provisio terminate --service 42
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing::info;

mod cli;
mod config;
mod state;

use cli::{Args, Command};
use config::Config;
use provisio_proxmox::{
    checkout_fields, connection_fields, console_url, metadata, product_fields, ConnectionSettings,
    GuestSettings, HttpClient, ProxmoxExtension, ServiceRef, ServiceStatus, TopologyReader,
};
use state::FileStore;

type Extension = ProxmoxExtension<HttpClient, FileStore>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?.with_cli_overrides(&args);

    provisio_common::init_logging(&config.logging.level, config.logging.format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %args.config,
        "Provisio starting"
    );

    let connection = ConnectionSettings::from_bag(&config.connection_bag())
        .context("Invalid hypervisor connection settings")?;
    let client = HttpClient::new(&connection)?;
    let store = FileStore::open(&config.state.path)?;
    let extension = ProxmoxExtension::new(client, store);

    run(args.command, &config, &connection, &extension).await
}

async fn run(command: Command, config: &Config, connection: &ConnectionSettings, extension: &Extension) -> Result<()> {
    match command {
        Command::TestConnection => {
            extension.test_connection().await?;
            emit(&json!({ "ok": true, "base_url": extension.api().base_url() }))
        }

        Command::Topology { node } => {
            let topology = TopologyReader::new(extension.api()).read(node.as_deref()).await?;
            emit(&json!({
                "extension": metadata(),
                "topology": &topology,
                "connection_fields": connection_fields(),
                "product_fields": product_fields(&topology),
                "checkout_fields": checkout_fields(),
            }))
        }

        Command::Create { service, product, hostname, password } => {
            let service = ServiceRef::new(service, product);
            let settings = config.product_bag(product)?;
            let mut properties = provisio_proxmox::SettingsBag::new();
            properties.insert("hostname".into(), hostname);
            properties.insert("password".into(), password);

            extension.store().ensure(service)?;
            let vmid = extension.create(service, &settings, &properties).await?;
            extension.store().set_status(service, ServiceStatus::Active)?;

            let guest = GuestSettings::from_bag(&settings)?;
            emit(&json!({
                "service": service.id,
                "vmid": vmid,
                "console_url": console_url(connection, &guest, vmid),
            }))
        }

        Command::Start(arg) => {
            let (service, settings) = resolve(config, extension, arg.service)?;
            extension.start(service, &settings).await?;
            emit(&json!({ "service": service.id, "action": "start" }))
        }

        Command::Stop(arg) => {
            let (service, settings) = resolve(config, extension, arg.service)?;
            extension.stop(service, &settings).await?;
            emit(&json!({ "service": service.id, "action": "stop" }))
        }

        Command::Reboot(arg) => {
            let (service, settings) = resolve(config, extension, arg.service)?;
            extension.reboot(service, &settings).await?;
            emit(&json!({ "service": service.id, "action": "reboot" }))
        }

        Command::Suspend(arg) => {
            let (service, settings) = resolve(config, extension, arg.service)?;
            extension.suspend(service, &settings).await?;
            extension.store().set_status(service, ServiceStatus::Suspended)?;
            emit(&json!({ "service": service.id, "status": ServiceStatus::Suspended }))
        }

        Command::Unsuspend(arg) => {
            let (service, settings) = resolve(config, extension, arg.service)?;
            extension.unsuspend(service, &settings).await?;
            extension.store().set_status(service, ServiceStatus::Active)?;
            emit(&json!({ "service": service.id, "status": ServiceStatus::Active }))
        }

        Command::Terminate(arg) => {
            let (service, settings) = resolve(config, extension, arg.service)?;
            extension.terminate(service, &settings).await?;
            extension.store().set_status(service, ServiceStatus::Cancelled)?;
            emit(&json!({ "service": service.id, "status": ServiceStatus::Cancelled }))
        }

        Command::Actions(arg) => {
            let (service, _) = resolve(config, extension, arg.service)?;
            let actions: Vec<_> = extension
                .available_actions(service)
                .await?
                .into_iter()
                .map(|a| json!({ "action": a, "label": a.label() }))
                .collect();
            emit(&json!({ "service": service.id, "actions": actions }))
        }

        Command::Status(arg) => {
            let (service, settings) = resolve(config, extension, arg.service)?;
            let status = extension.status(service, &settings).await?;
            let record = extension.store().record(service.id);
            emit(&json!({
                "service": service.id,
                "service_status": record.map(|r| r.status),
                "guest": status,
            }))
        }
    }
}

/// Look up a known service and its product settings.
fn resolve(config: &Config, extension: &Extension, id: u64) -> Result<(ServiceRef, provisio_proxmox::SettingsBag)> {
    let record = extension
        .store()
        .record(id)
        .with_context(|| format!("Service {} is not known; create it first", id))?;
    let service = ServiceRef::new(record.id, record.product_id);
    Ok((service, config.product_bag(record.product_id)?))
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
