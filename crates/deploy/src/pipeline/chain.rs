//! Stages run for every chain of the intent.

use alloy_core::primitives::{Address, U256};
use anyhow::{Context, Result};

use super::{
    stages::StageOutcome,
    superchain::{l1_release, standard_versions_toml},
};
use crate::{
    broadcaster::Broadcaster,
    deploy_config::combine_deploy_config,
    intent::{ChainIntent, DeploymentStrategy, GameKind, Intent},
    procedures::{
        DeployAltDA, DeployAltDAInput, DeployDisputeGame, DeployDisputeGameInput, DeployOPChain,
        DeployOPChainInput, L2Genesis, L2GenesisInput,
    },
    script::{ScriptHost, invoke},
    standard::{self, StandardConfig},
    state::{BlockRef, ChainState, DisputeGameState, State, StateDelta},
};

fn deployed<'s>(state: &'s State, chain: &ChainIntent) -> Result<&'s ChainState> {
    state
        .chain(chain.id)
        .with_context(|| format!("chain {} has not been deployed yet", chain.id))
}

fn require(address: Address, name: &str) -> Result<Address> {
    if address.is_zero() {
        anyhow::bail!("{} is not deployed", name);
    }
    Ok(address)
}

pub(super) async fn deploy_opchain<H: ScriptHost>(
    host: &mut H,
    intent: &Intent,
    state: &State,
    index: usize,
    chain: &ChainIntent,
) -> Result<StageOutcome> {
    if state.superchain_deployment.is_none() {
        anyhow::bail!("superchain must be deployed before chain {}", chain.id);
    }
    let opcm = state
        .implementations_deployment
        .as_ref()
        .map(|implementations| implementations.opcm_address)
        .context("implementations must be deployed before any chain")?;

    // chains are recorded in intent order
    if state.op_chain_deployments.len() != index {
        anyhow::bail!(
            "chain {} is at position {} but the state holds {} chains",
            chain.id,
            index,
            state.op_chain_deployments.len()
        );
    }

    let config = combine_deploy_config(intent, chain, state, &ChainState::new(chain.id))?;
    config.check_dispute_parameters()?;

    let input = DeployOPChainInput::from_config(&config, require(opcm, "opcm")?, state.create2_salt);
    let (output, transactions) = invoke::<DeployOPChain, _>(host, &input).await?;

    let chain_state = output.into_chain_state(chain.id);
    tracing::info!(
        chain_id = %chain.id,
        proxy_admin = %chain_state.proxy_admin_address,
        system_config = %chain_state.system_config_proxy_address,
        "Chain deployed"
    );
    Ok(StageOutcome::new(StateDelta::Chain(chain_state), transactions))
}

pub(super) async fn deploy_alt_da<H: ScriptHost>(
    host: &mut H,
    state: &State,
    chain: &ChainIntent,
) -> Result<StageOutcome> {
    let chain_state = deployed(state, chain)?;
    let alt_da = &chain.alt_da;

    let input = DeployAltDAInput {
        salt: state.create2_salt,
        proxy_admin: require(chain_state.proxy_admin_address, "chain proxy admin")?,
        challenge_contract_owner: chain.roles.l1_proxy_admin_owner,
        challenge_window: alt_da.challenge_window,
        resolve_window: alt_da.resolve_window,
        bond_size: U256::from(alt_da.bond_size),
        resolver_refund_percentage: alt_da.resolver_refund_percentage,
    };
    let (output, transactions) = invoke::<DeployAltDA, _>(host, &input).await?;

    Ok(StageOutcome::new(
        StateDelta::Chain(ChainState {
            data_availability_challenge_proxy_address: output.data_availability_challenge_proxy,
            data_availability_challenge_impl_address: output.data_availability_challenge_impl,
            ..ChainState::new(chain.id)
        }),
        transactions,
    ))
}

pub(super) async fn deploy_additional_dispute_games<H: ScriptHost>(
    host: &mut H,
    intent: &Intent,
    state: &State,
    standard: &StandardConfig,
    chain: &ChainIntent,
) -> Result<StageOutcome> {
    let chain_state = deployed(state, chain)?;
    let anchor_state_registry_proxy = require(
        chain_state.anchor_state_registry_proxy_address,
        "anchor state registry proxy",
    )?;
    let dispute_game_factory_proxy = require(
        chain_state.dispute_game_factory_proxy_address,
        "dispute game factory proxy",
    )?;
    let release = l1_release(intent);
    let versions_toml = standard_versions_toml(intent, standard)?;

    let mut outcome = StageOutcome::default();
    let mut games = Vec::new();
    for game in &chain.additional_dispute_games {
        if chain_state.dispute_game(game.game_type).is_some() {
            continue;
        }

        let delayed_weth_proxy = match game.game_kind {
            GameKind::FaultDisputeGame => require(
                chain_state.delayed_weth_permissionless_game_proxy_address,
                "permissionless delayed WETH proxy",
            )?,
            GameKind::PermissionedDisputeGame => require(
                chain_state.delayed_weth_permissioned_game_proxy_address,
                "permissioned delayed WETH proxy",
            )?,
        };

        let input = DeployDisputeGameInput {
            release: release.clone(),
            standard_versions_toml: versions_toml.clone(),
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
            delayed_weth_proxy,
            anchor_state_registry_proxy,
            dispute_game_factory_proxy,
            make_respected: game.make_respected,
            l2_chain_id: chain.l2_chain_id(),
            proposer: chain.roles.proposer,
            challenger: chain.roles.challenger,
        };
        let (output, transactions) = invoke::<DeployDisputeGame, _>(host, &input)
            .await
            .with_context(|| format!("dispute game of type {}", game.game_type))?;

        tracing::info!(
            chain_id = %chain.id,
            game_type = game.game_type,
            game = %output.dispute_game_impl,
            "Dispute game deployed"
        );
        outcome.transactions.extend(transactions);
        games.push(DisputeGameState {
            game_type: game.game_type,
            game_kind: game.game_kind,
            vm_address: output.mips_singleton,
            oracle_address: output.preimage_oracle_singleton,
            game_address: output.dispute_game_impl,
        });
    }

    outcome.deltas.push(StateDelta::Chain(ChainState {
        additional_dispute_games: games,
        ..ChainState::new(chain.id)
    }));
    Ok(outcome)
}

pub(super) async fn generate_l2_genesis<H: ScriptHost>(
    host: &mut H,
    intent: &Intent,
    state: &State,
    chain: &ChainIntent,
) -> Result<StageOutcome> {
    let chain_state = deployed(state, chain)?;
    let config = combine_deploy_config(intent, chain, state, chain_state)?;

    let (output, transactions) =
        invoke::<L2Genesis, _>(host, &L2GenesisInput { config }).await?;
    if !transactions.is_empty() {
        anyhow::bail!(
            "L2 genesis produced {} L1 transactions, expected none",
            transactions.len()
        );
    }

    Ok(StageOutcome::new(
        StateDelta::Chain(ChainState {
            allocs: Some(output.allocs),
            ..ChainState::new(chain.id)
        }),
        Vec::new(),
    ))
}

pub(super) async fn set_start_block<B: Broadcaster>(
    broadcaster: &B,
    intent: &Intent,
    chain: &ChainIntent,
) -> Result<StageOutcome> {
    let start_block = match intent.deployment_strategy {
        DeploymentStrategy::Live => broadcaster
            .l1_head()
            .await?
            .context("broadcaster has no view of the L1 head")?,
        DeploymentStrategy::Genesis => BlockRef::default(),
    };
    tracing::info!(
        chain_id = %chain.id,
        number = start_block.number,
        hash = %start_block.hash,
        "Start block recorded"
    );

    Ok(StageOutcome::new(
        StateDelta::Chain(ChainState {
            start_block: Some(start_block),
            ..ChainState::new(chain.id)
        }),
        Vec::new(),
    ))
}
