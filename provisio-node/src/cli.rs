//! Command-line argument parsing.

use clap::{Parser, Subcommand};

/// Provisio - Proxmox VE provisioning for a billing/automation system
#[derive(Parser, Debug)]
#[command(name = "provisio")]
#[command(about = "Provisio - Proxmox VE guest provisioning and lifecycle control")]
#[command(version)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "PROVISIO_CONFIG", default_value = "/etc/provisio/provisio.yaml")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Path to the service state file; overrides the config file
    #[arg(long, env = "PROVISIO_STATE")]
    pub state: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the hypervisor API is reachable with the configured token
    TestConnection,

    /// Print discovered topology and the product configuration schema
    Topology {
        /// Node to read storages, bridges and CPU models from
        #[arg(long)]
        node: Option<String>,
    },

    /// Create the guest for a service
    Create {
        #[arg(long)]
        service: u64,
        /// Product whose settings describe the guest
        #[arg(long)]
        product: u64,
        #[arg(long)]
        hostname: String,
        #[arg(long, env = "PROVISIO_GUEST_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Start the service's guest
    Start(ServiceArg),
    /// Stop the service's guest
    Stop(ServiceArg),
    /// Reboot the service's guest
    Reboot(ServiceArg),
    /// Suspend the service (stops the guest)
    Suspend(ServiceArg),
    /// Lift a suspension (starts the guest)
    Unsuspend(ServiceArg),
    /// Destroy the service's guest
    Terminate(ServiceArg),
    /// List the customer actions available for a service
    Actions(ServiceArg),
    /// Show hypervisor-side status of the service's guest
    Status(ServiceArg),
}

#[derive(clap::Args, Debug, Clone, Copy)]
pub struct ServiceArg {
    /// Service id
    #[arg(long)]
    pub service: u64,
}
