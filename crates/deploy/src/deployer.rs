use alloy_core::primitives::{Address, address};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use url::Url;

use crate::{
    artifacts::{ArtifactBundle, ArtifactSource, Locator, LogProgress},
    broadcaster::{BroadcasterConfig, DiscardBroadcaster, KeyedBroadcaster},
    intent::{DeploymentStrategy, Intent},
    ledger::RpcLedgerClient,
    pipeline::{ApplyReport, Pipeline},
    script::{CommandScriptHost, ScriptCommand, ScriptHost},
    standard::StandardConfig,
    state::State,
    store::{NoopStateStore, StateStore},
};

/// Sender of the simulated transactions when nothing is broadcast.
pub const GENESIS_SENDER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

/// Everything a run needs besides the intent and the state.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub l1_rpc_url: Option<Url>,
    /// Hex encoded deployer key.
    pub private_key: Option<String>,
    pub script_command: ScriptCommand,
    pub broadcaster: BroadcasterConfig,
}

impl ApplyOptions {
    pub fn new(script_command: ScriptCommand) -> Self {
        Self {
            l1_rpc_url: None,
            private_key: None,
            script_command,
            broadcaster: BroadcasterConfig::default(),
        }
    }

    /// The L1 endpoint and signing key, both required to broadcast.
    fn live_target(&self) -> Result<(Url, PrivateKeySigner)> {
        let url = self
            .l1_rpc_url
            .clone()
            .context("an L1 RPC URL is required to broadcast")?;
        let key = self
            .private_key
            .as_deref()
            .context("a private key is required to broadcast")?;
        Ok((url, parse_private_key(key)?))
    }
}

/// Parse a hex private key, with or without `0x`.
pub fn parse_private_key(key: &str) -> Result<PrivateKeySigner> {
    key.trim()
        .parse::<PrivateKeySigner>()
        .map_err(|_| anyhow::anyhow!("private key is not a valid secp256k1 key"))
}

/// Pipeline of a one-off deployment: no state is kept between procedures.
pub type SessionPipeline<'a> =
    Pipeline<'a, CommandScriptHost, KeyedBroadcaster<RpcLedgerClient>, NoopStateStore>;

/// A connection to L1 with artifacts in place, used by one-off deployments.
pub struct LiveSession<'a> {
    pub pipeline: SessionPipeline<'a>,
    artifacts: ArtifactBundle,
}

impl<'a> LiveSession<'a> {
    /// Fetch the artifacts, connect to L1 and align the simulated nonce of the deployer.
    pub async fn connect<S: ArtifactSource>(
        options: &ApplyOptions,
        standard: &'a StandardConfig,
        source: &S,
        locator: &Locator,
    ) -> Result<Self> {
        let (url, signer) = options.live_target()?;
        let artifacts = source
            .fetch(locator, &LogProgress::default())
            .await
            .with_context(|| format!("Failed to fetch artifacts from {}", locator))?;

        match Self::open(options, standard, url, signer, &artifacts).await {
            Ok(pipeline) => Ok(Self {
                pipeline,
                artifacts,
            }),
            Err(err) => {
                release(artifacts);
                Err(err)
            }
        }
    }

    async fn open(
        options: &ApplyOptions,
        standard: &'a StandardConfig,
        url: Url,
        signer: PrivateKeySigner,
        artifacts: &ArtifactBundle,
    ) -> Result<SessionPipeline<'a>> {
        let ledger = RpcLedgerClient::new(url)?;
        let broadcaster =
            KeyedBroadcaster::new(ledger, signer, options.broadcaster.clone()).await?;

        // one-off procedures only run on the L1 host
        let host = || {
            CommandScriptHost::new(
                options.script_command.clone(),
                artifacts.path(),
                broadcaster.chain_id(),
                broadcaster.from(),
            )
        };
        let (mut l1_host, l2_host) = (host(), host());
        l1_host
            .set_nonce(broadcaster.from(), broadcaster.next_nonce())
            .await?;
        Ok(Pipeline::new(
            standard,
            l1_host,
            l2_host,
            broadcaster,
            NoopStateStore,
        ))
    }

    pub fn l1_chain_id(&self) -> u64 {
        self.pipeline.broadcaster.chain_id()
    }

    /// Remove the fetched artifacts.
    pub fn close(self) {
        release(self.artifacts);
    }
}

fn release(bundle: ArtifactBundle) {
    let path = bundle.path().to_path_buf();
    if let Err(err) = bundle.cleanup() {
        tracing::warn!(path = %path.display(), error = %err, "Failed to clean up artifacts");
    }
}

/// Reconcile `state` with `intent`: fetch the artifacts, set up the hosts and the broadcaster
/// for the intent's strategy and run the pipeline.
pub async fn apply_pipeline<S, W>(
    options: &ApplyOptions,
    standard: &StandardConfig,
    source: &S,
    intent: &Intent,
    state: &mut State,
    store: W,
) -> Result<ApplyReport>
where
    S: ArtifactSource,
    W: StateStore,
{
    intent.check(standard).context("invalid intent")?;
    state
        .check_against(intent)
        .context("state does not match the intent")?;
    let live_target = match intent.deployment_strategy {
        DeploymentStrategy::Live => Some(options.live_target()?),
        DeploymentStrategy::Genesis => None,
    };

    tracing::info!(locator = %intent.l1_contracts_locator, "Fetching L1 artifacts");
    let l1_artifacts = source
        .fetch(&intent.l1_contracts_locator, &LogProgress::default())
        .await
        .context("Failed to fetch L1 artifacts")?;
    tracing::info!(locator = %intent.l2_contracts_locator, "Fetching L2 artifacts");
    let l2_artifacts = match source
        .fetch(&intent.l2_contracts_locator, &LogProgress::default())
        .await
    {
        Ok(bundle) => bundle,
        Err(err) => {
            release(l1_artifacts);
            return Err(err.context("Failed to fetch L2 artifacts"));
        }
    };

    let result = run(
        options,
        standard,
        intent,
        state,
        store,
        live_target,
        &l1_artifacts,
        &l2_artifacts,
    )
    .await;

    release(l1_artifacts);
    release(l2_artifacts);
    result
}

#[allow(clippy::too_many_arguments)]
async fn run<W: StateStore>(
    options: &ApplyOptions,
    standard: &StandardConfig,
    intent: &Intent,
    state: &mut State,
    store: W,
    live_target: Option<(Url, PrivateKeySigner)>,
    l1_artifacts: &ArtifactBundle,
    l2_artifacts: &ArtifactBundle,
) -> Result<ApplyReport> {
    let hosts = |sender: Address| {
        (
            CommandScriptHost::new(
                options.script_command.clone(),
                l1_artifacts.path(),
                intent.l1_chain_id,
                sender,
            ),
            CommandScriptHost::new(
                options.script_command.clone(),
                l2_artifacts.path(),
                intent.l1_chain_id,
                sender,
            ),
        )
    };

    match live_target {
        Some((url, signer)) => {
            let ledger = RpcLedgerClient::new(url)?;
            let broadcaster =
                KeyedBroadcaster::new(ledger, signer, options.broadcaster.clone()).await?;
            if broadcaster.chain_id() != intent.l1_chain_id {
                anyhow::bail!(
                    "connected to L1 chain {} but the intent targets {}",
                    broadcaster.chain_id(),
                    intent.l1_chain_id
                );
            }

            let (mut l1_host, l2_host) = hosts(broadcaster.from());
            l1_host
                .set_nonce(broadcaster.from(), broadcaster.next_nonce())
                .await?;

            Pipeline::new(standard, l1_host, l2_host, broadcaster, store)
                .apply(intent, state)
                .await
        }
        None => {
            tracing::info!("Genesis strategy: transactions are simulated, not broadcast");
            let (l1_host, l2_host) = hosts(GENESIS_SENDER);
            Pipeline::new(standard, l1_host, l2_host, DiscardBroadcaster::new(), store)
                .apply(intent, state)
                .await
        }
    }
}
