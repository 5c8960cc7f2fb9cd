//! OpScan - zkEVM Opcode Compatibility Scanner
//!
//! Determines which historical transactions would behave differently under a
//! protocol upgrade that removes or redefines EVM instructions.

use clap::{Parser, Subcommand};
use eyre::{eyre, Result};
use opscan_common::{config, logging, DataDir, FetchConfig, Network, RetryConfig};

mod cmd;
mod units;

/// Command-line interface for OpScan
#[derive(Debug, Parser)]
#[command(name = "opscan")]
#[command(about = "zkEVM opcode compatibility scanner for protocol upgrades")]
#[command(version)]
pub struct Cli {
    /// Network preset to analyze
    #[arg(long, env = config::OPSCAN_NETWORK, default_value = "mainnet")]
    pub network: Network,

    /// RPC endpoint (overrides the network preset)
    #[arg(long, env = config::OPSCAN_RPC_URL)]
    pub rpc_url: Option<String>,

    /// RPC endpoint with the debug namespace enabled, used for traces
    #[arg(long, env = config::OPSCAN_DEBUG_RPC_URL)]
    pub debug_rpc_url: Option<String>,

    /// Data directory root (default: ~/.opscan/<network>)
    #[arg(long, env = config::OPSCAN_DATA_DIR)]
    pub data_dir: Option<String>,

    /// Worker task count per fetch (default: available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Work items per batched RPC call for batch and code fetches
    #[arg(long)]
    pub queries_per_request: Option<usize>,

    /// Disable file logging
    #[arg(long)]
    pub no_file_log: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download all verified batches into resumable unit files
    Download,
    /// Classify downloaded transactions into the contract index
    Index,
    /// Scan bytecode into histograms and detect candidate conflicts
    Analyze,
    /// Confirm candidates against real execution traces
    Confirm,
    /// Print the summary report over all persisted artifacts
    Report,
}

impl Cli {
    /// The regular RPC endpoint to use.
    pub fn rpc_url(&self) -> String {
        self.rpc_url.clone().unwrap_or_else(|| self.network.rpc_url().to_string())
    }

    /// The debug (trace) endpoint; confirmation cannot run without one.
    pub fn debug_rpc_url(&self) -> Result<String> {
        self.debug_rpc_url.clone().ok_or_else(|| {
            eyre!(
                "no debug RPC endpoint configured; pass --debug-rpc-url or set {}",
                config::OPSCAN_DEBUG_RPC_URL
            )
        })
    }

    /// The data directory for this run.
    pub fn data_dir(&self) -> DataDir {
        match &self.data_dir {
            Some(root) => DataDir::new(root),
            None => DataDir::default_for(self.network.data_dir_name()),
        }
    }

    /// Fetch tuning with CLI overrides applied.
    pub fn fetch_config(&self) -> FetchConfig {
        let mut fetch = FetchConfig::default();
        if let Some(workers) = self.workers {
            fetch.workers = workers;
        }
        if let Some(queries) = self.queries_per_request {
            fetch.queries_per_request = queries;
        }
        fetch
    }

    /// Retry budgets for this run.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    logging::init_logging("opscan", !cli.no_file_log)?;

    tracing::info!(
        network = %cli.network,
        rpc_url = %cli.rpc_url(),
        data_dir = %cli.data_dir().root().display(),
        "Starting OpScan"
    );

    match &cli.command {
        Commands::Download => cmd::download::run(&cli).await,
        Commands::Index => cmd::index::run(&cli).await,
        Commands::Analyze => cmd::analyze::run(&cli).await,
        Commands::Confirm => cmd::confirm::run(&cli).await,
        Commands::Report => cmd::report::run(&cli).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["opscan", "download"]).unwrap();
        assert_eq!(cli.network, Network::Mainnet);
        assert_eq!(cli.rpc_url(), "https://zkevm-rpc.com");
        assert!(cli.debug_rpc_url().is_err());
        assert!(matches!(cli.command, Commands::Download));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "opscan",
            "--network",
            "cardona",
            "--rpc-url",
            "http://localhost:8545",
            "--debug-rpc-url",
            "http://localhost:8546",
            "--workers",
            "3",
            "report",
        ])
        .unwrap();

        assert_eq!(cli.network, Network::Cardona);
        assert_eq!(cli.rpc_url(), "http://localhost:8545");
        assert_eq!(cli.debug_rpc_url().unwrap(), "http://localhost:8546");
        assert_eq!(cli.fetch_config().workers, 3);
    }
}
