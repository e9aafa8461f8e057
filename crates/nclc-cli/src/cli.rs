use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "nclc", about = "Node-lifecycle controller for AKS-managed clusters", version)]
pub struct Cli {
    /// Address of a running server to talk to instead of the default localhost.
    #[arg(long, env = "NCLC_URL", global = true)]
    pub remote: Option<String>,

    /// Bearer token for the above. Falls back to `~/.nclc/token`.
    #[arg(long, env = "NCLC_TOKEN", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the controller's HTTP surface.
    Serve {
        /// Path to the controller-wide options YAML document (§6). Falls
        /// back to `NCLC_*` environment variables alone when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,
    },

    /// Print server readiness, cache occupancy, and active backend name.
    Status,

    InstanceTypes {
        #[command(subcommand)]
        command: InstanceTypesCommand,
    },

    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum InstanceTypesCommand {
    /// List instance types eligible for a NodeClass (YAML or JSON file).
    List {
        /// Path to a NodeClass document.
        node_class: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Clear every unavailable-offering entry (§4.1 `Flush()`).
    Flush,
}
