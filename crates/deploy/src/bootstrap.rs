//! One-off deployment of a single procedure.
//!
//! Bootstrapping runs one procedure through a [`Pipeline`] and broadcasts its transactions,
//! outside of any intent or state. Inputs default to the standard configuration of the L1
//! network.

use alloy_core::primitives::{Address, B256, U256};
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    broadcaster::Broadcaster,
    intent::{DisputeGameIntent, SuperchainRoles},
    pipeline::Pipeline,
    procedures::{
        DeployDelayedWETHInput, DeployDisputeGameInput, DeployImplementationsInput,
        DeploySuperchainInput,
    },
    script::{Procedure, ScriptHost},
    standard::{self, StandardConfig},
    store::StateStore,
};

/// Delay before withdrawn WETH can be claimed.
pub const DELAYED_WETH_DELAY_SECONDS: u64 = 604800;

/// Run `P` on the pipeline's L1 host and broadcast what it produced.
pub async fn run<P, H, B, W>(pipeline: &mut Pipeline<'_, H, B, W>, input: &P::Input) -> Result<P::Output>
where
    P: Procedure,
    H: ScriptHost,
    B: Broadcaster,
    W: StateStore,
{
    pipeline.run_procedure::<P>(input).await
}

/// The output of a one-off deployment, as written to the output sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord<T> {
    pub procedure: String,
    #[serde(rename = "l1ChainID")]
    pub l1_chain_id: u64,
    /// Unix timestamp, in seconds.
    pub generated_at: i64,
    pub output: T,
}

impl<T> DeploymentRecord<T> {
    pub fn new<P: Procedure<Output = T>>(l1_chain_id: u64, output: T) -> Self {
        Self {
            procedure: P::NAME.to_string(),
            l1_chain_id,
            generated_at: chrono::Utc::now().timestamp(),
            output,
        }
    }
}

pub fn superchain_input(roles: &SuperchainRoles, paused: bool) -> DeploySuperchainInput {
    DeploySuperchainInput {
        proxy_admin_owner: roles.proxy_admin_owner,
        protocol_versions_owner: roles.protocol_versions_owner,
        guardian: roles.guardian,
        paused,
    }
}

pub fn implementations_input(
    standard: &StandardConfig,
    l1_chain_id: u64,
    release: &str,
    salt: B256,
    use_interop: bool,
) -> Result<DeployImplementationsInput> {
    let chain = standard.chain(l1_chain_id)?;
    Ok(DeployImplementationsInput {
        salt,
        withdrawal_delay_seconds: standard::WITHDRAWAL_DELAY_SECONDS,
        min_proposal_size_bytes: standard::MIN_PROPOSAL_SIZE_BYTES,
        challenge_period_seconds: standard::CHALLENGE_PERIOD_SECONDS,
        proof_maturity_delay_seconds: standard::PROOF_MATURITY_DELAY_SECONDS,
        dispute_game_finality_delay_seconds: standard::DISPUTE_GAME_FINALITY_DELAY_SECONDS,
        mips_version: standard::MIPS_VERSION,
        release: release.to_string(),
        superchain_config_proxy: chain.superchain.superchain_config_proxy,
        protocol_versions_proxy: chain.superchain.protocol_versions_proxy,
        superchain_proxy_admin: chain.manager_owner,
        standard_versions_toml: chain.versions_toml()?,
        use_interop,
    })
}

/// The proxy admin defaults to the superchain proxy admin owner of the L1 network and the owner
/// to its system owner.
pub fn delayed_weth_input(
    standard: &StandardConfig,
    l1_chain_id: u64,
    release: &str,
    proxy_admin: Option<Address>,
    owner: Option<Address>,
) -> Result<DeployDelayedWETHInput> {
    let chain = standard.chain(l1_chain_id)?;
    Ok(DeployDelayedWETHInput {
        release: release.to_string(),
        standard_versions_toml: chain.versions_toml()?,
        proxy_admin: proxy_admin.unwrap_or(chain.manager_owner),
        superchain_config_proxy: chain.superchain.superchain_config_proxy,
        delayed_weth_owner: owner.unwrap_or(chain.system_owner),
        delayed_weth_delay: DELAYED_WETH_DELAY_SECONDS,
    })
}

/// Contracts and roles a standalone dispute game is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisputeGameTarget {
    pub delayed_weth_proxy: Address,
    pub anchor_state_registry_proxy: Address,
    pub l2_chain_id: u64,
    pub proposer: Address,
    pub challenger: Address,
}

/// A dispute game deployed on its own is not registered with any factory.
pub fn dispute_game_input(
    standard: &StandardConfig,
    l1_chain_id: u64,
    release: &str,
    game: &DisputeGameIntent,
    target: DisputeGameTarget,
) -> Result<DeployDisputeGameInput> {
    let chain = standard.chain(l1_chain_id)?;
    Ok(DeployDisputeGameInput {
        release: release.to_string(),
        standard_versions_toml: chain.versions_toml()?,
        game_kind: game.game_kind,
        game_type: game.game_type,
        absolute_prestate: game.absolute_prestate,
        max_game_depth: game.max_game_depth,
        split_depth: game.split_depth,
        clock_extension: game.clock_extension,
        max_clock_duration: game.max_clock_duration,
        mips_version: game.mips_version,
        min_proposal_size_bytes: standard::MIN_PROPOSAL_SIZE_BYTES,
        challenge_period_seconds: standard::CHALLENGE_PERIOD_SECONDS,
        delayed_weth_proxy: target.delayed_weth_proxy,
        anchor_state_registry_proxy: target.anchor_state_registry_proxy,
        dispute_game_factory_proxy: Address::ZERO,
        make_respected: false,
        l2_chain_id: U256::from(target.l2_chain_id),
        proposer: target.proposer,
        challenger: target.challenger,
    })
}
