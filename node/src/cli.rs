//! # CLI Interface
//!
//! Defines the command-line argument structure for `keybind-node` using
//! `clap` derive. Four subcommands: `run`, `init`, `node-id` and `version`.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Keybind peer node.
///
/// Holds a staking identity, accepts and dials peers over mutually
/// authenticated TLS, exchanges signed address claims, and exposes
/// Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "keybind-node",
    about = "Keybind peer node",
    version,
    propagate_version = true
)]
pub struct KeybindCli {
    /// Log output format.
    #[arg(long, global = true, env = "KEYBIND_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Create the data directory and a fresh staking identity.
    Init(DataDirArgs),
    /// Print the NodeID of the identity in a data directory.
    NodeId(DataDirArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding `staker.key` and `staker.crt`.
    ///
    /// A new identity is generated there if none exists.
    #[arg(long, short = 'd', env = "KEYBIND_DATA_DIR", default_value = ".keybind")]
    pub data_dir: PathBuf,

    /// Network name (mainnet, fuji, camino, columbus, kopernikus, local)
    /// or numeric id. Selects the upgrade epoch.
    #[arg(long, env = "KEYBIND_NETWORK", default_value = "local")]
    pub network: String,

    /// Address to accept peer connections on.
    #[arg(long, env = "KEYBIND_LISTEN", default_value = "0.0.0.0:9651")]
    pub listen: SocketAddr,

    /// Address to advertise in signed claims. Defaults to `--listen`.
    #[arg(long, env = "KEYBIND_PUBLIC_ADDR")]
    pub public_addr: Option<SocketAddr>,

    /// Peers to dial at start-up.
    #[arg(long, env = "KEYBIND_BOOTSTRAP", value_delimiter = ',')]
    pub bootstrap: Vec<SocketAddr>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "KEYBIND_METRICS_PORT", default_value_t = keybind_protocol::config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// JSON upgrade schedule replacing the built-in one.
    #[arg(long, env = "KEYBIND_UPGRADE_SCHEDULE")]
    pub upgrade_schedule: Option<PathBuf>,
}

/// Arguments for subcommands that only need a data directory.
#[derive(Parser, Debug)]
pub struct DataDirArgs {
    /// Directory holding `staker.key` and `staker.crt`.
    #[arg(long, short = 'd', env = "KEYBIND_DATA_DIR", default_value = ".keybind")]
    pub data_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        KeybindCli::command().debug_assert();
    }

    #[test]
    fn bootstrap_peers_split_on_commas() {
        let cli = KeybindCli::try_parse_from([
            "keybind-node",
            "run",
            "--bootstrap",
            "127.0.0.1:9651,127.0.0.1:9661",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.bootstrap.len(), 2);
                assert_eq!(args.listen.port(), 9651);
                assert!(args.public_addr.is_none());
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn log_format_is_global() {
        let cli =
            KeybindCli::try_parse_from(["keybind-node", "node-id", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Commands::NodeId(_)));
    }
}
