use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::infrastructure::inventory::client::InventoryOptions;
use crate::infrastructure::inventory::client::STDIN_SOURCE;

#[derive(Parser, Clone, Debug)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "HOST_SYNC_INVENTORY_SOURCE",
        value_hint = clap::ValueHint::FilePath,
        default_value = STDIN_SOURCE,
        help = "Newline-delimited JSON host watch events to consume, '-' for stdin"
    )]
    pub inventory_source: PathBuf,

    #[arg(
        long,
        default_value = "32",
        help = "Number of upstream watch events buffered ahead of the translator"
    )]
    pub watch_buffer: usize,

    #[arg(
        long,
        env = utils::logging::LOG_PATH_ENV_VAR,
        value_hint = clap::ValueHint::FilePath,
        help = "Write logs to this file with daily rotation instead of stderr"
    )]
    pub log_path: Option<PathBuf>,

    #[arg(
        long,
        default_value = "30",
        help = "Seconds to wait for background tasks after a shutdown signal"
    )]
    pub shutdown_timeout_secs: u64,
}

impl DaemonArgs {
    pub fn inventory_options(&self) -> InventoryOptions {
        InventoryOptions {
            source: self.inventory_source.clone(),
            buffer: self.watch_buffer,
        }
    }

    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
