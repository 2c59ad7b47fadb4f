use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use opchain_deploy::{
    ApplyOptions, DeploymentStrategy, Locator, OutputSink, ScriptCommand, intent::GameKind,
};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use url::Url;

/// Settings file read from the current directory unless `--config` says otherwise.
pub const DEFAULT_SETTINGS_FILE: &str = "Opchain.toml";
const ENV_PREFIX: &str = "OPCHAIN_";

/// Sepolia.
const DEFAULT_L1_CHAIN_ID: u64 = 11155111;

/// Values shared by every run, layered from the settings file and `OPCHAIN_*` variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub l1_rpc_url: Option<Url>,
    pub script_command: Option<String>,
    pub cache_dir: Option<PathBuf>,
}

impl Settings {
    /// A missing settings file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).only(&["l1_rpc_url", "script_command", "cache_dir"]))
            .extract()
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }
}

#[derive(Parser)]
#[command(name = "opchain")]
#[command(
    author,
    version,
    about = "Reconcile OP Stack superchain deployments with a declarative intent"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "OPCHAIN_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Directory holding intent.toml and state.json.
    #[arg(short, long, global = true, env = "OPCHAIN_WORKDIR", default_value = ".")]
    pub workdir: PathBuf,

    /// Settings file providing defaults for the connection flags.
    #[arg(long, global = true, env = "OPCHAIN_CONFIG", default_value = DEFAULT_SETTINGS_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a starting intent to the work directory.
    Init(InitArgs),

    /// Deploy whatever the intent declares and the state does not hold yet.
    Apply {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Also write the resulting state to this file, or `-` for stdout.
        #[arg(short, long)]
        output: Option<OutputSink>,
    },

    /// Print the addresses recorded in the state.
    Inspect,

    /// Deploy one set of contracts outside of any intent.
    Bootstrap(BootstrapArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Chain ID of the L1 to deploy on.
    #[arg(long, alias = "l1", env = "OPCHAIN_L1_CHAIN_ID", default_value_t = DEFAULT_L1_CHAIN_ID)]
    pub l1_chain_id: u64,

    /// Chain IDs of the L2 chains, comma separated.
    #[arg(long, alias = "l2", required = true, value_delimiter = ',')]
    pub l2_chain_ids: Vec<u64>,

    /// Address owning every role of the new intent.
    #[arg(long)]
    pub owner: Address,

    #[arg(long, default_value_t = DeploymentStrategy::Live)]
    pub strategy: DeploymentStrategy,

    /// Replace an existing intent.
    #[arg(long)]
    pub force: bool,
}

/// How to reach L1 and run procedures.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// The URL of an L1 RPC endpoint.
    #[arg(long, alias = "l1-rpc", env = "OPCHAIN_L1_RPC_URL")]
    pub l1_rpc_url: Option<Url>,

    /// Hex encoded private key of the deployer.
    #[arg(long, env = "OPCHAIN_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Command line of the script runner that simulates procedures.
    #[arg(long, env = "OPCHAIN_SCRIPT_COMMAND")]
    pub script_command: Option<String>,

    /// Where downloaded artifacts are cached.
    #[arg(long, env = "OPCHAIN_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl ConnectionArgs {
    /// Flags win over the settings file.
    pub fn options(&self, settings: &Settings) -> Result<ApplyOptions> {
        let line = self
            .script_command
            .as_deref()
            .or(settings.script_command.as_deref())
            .context("a script runner is required: pass --script-command or set script_command")?;

        let mut options = ApplyOptions::new(ScriptCommand::parse(line)?);
        options.l1_rpc_url = self
            .l1_rpc_url
            .clone()
            .or_else(|| settings.l1_rpc_url.clone());
        options.private_key = self.private_key.clone();
        Ok(options)
    }

    pub fn cache_dir(&self, settings: &Settings) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| settings.cache_dir.clone())
    }
}

#[derive(Debug, Args)]
pub struct BootstrapArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Contracts artifacts to deploy from.
    #[arg(long, default_value_t = Locator::default_l1())]
    pub artifacts_locator: Locator,

    /// Where the deployment record is written, `-` for stdout.
    #[arg(short, long, default_value_t = OutputSink::Stdout)]
    pub output: OutputSink,

    #[command(subcommand)]
    pub target: BootstrapTarget,
}

#[derive(Debug, Clone, Subcommand)]
pub enum BootstrapTarget {
    /// Superchain config, protocol versions and their proxy admin.
    Superchain {
        #[arg(long)]
        proxy_admin_owner: Address,
        #[arg(long)]
        protocol_versions_owner: Address,
        #[arg(long)]
        guardian: Address,
        /// Deploy the superchain config paused.
        #[arg(long)]
        paused: bool,
    },

    /// Shared implementation contracts, wired to the standard superchain of the L1.
    Implementations {
        /// CREATE2 salt; random when omitted.
        #[arg(long)]
        salt: Option<B256>,
        #[arg(long)]
        use_interop: bool,
    },

    /// A delayed WETH proxy and implementation.
    DelayedWeth {
        /// Defaults to the superchain proxy admin owner of the L1.
        #[arg(long)]
        proxy_admin: Option<Address>,
        /// Defaults to the standard system owner of the L1.
        #[arg(long)]
        owner: Option<Address>,
    },

    /// A dispute game implementation, not registered with any factory.
    DisputeGame {
        #[arg(long)]
        delayed_weth_proxy: Address,
        #[arg(long)]
        anchor_state_registry_proxy: Address,
        #[arg(long)]
        l2_chain_id: u64,
        #[arg(long)]
        proposer: Address,
        #[arg(long)]
        challenger: Address,
        #[arg(long, default_value_t = GameKind::FaultDisputeGame)]
        game_kind: GameKind,
        #[arg(long, default_value_t = 0)]
        game_type: u32,
        #[arg(long)]
        absolute_prestate: Option<B256>,
    },
}
