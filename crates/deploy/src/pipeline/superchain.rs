//! Stages shared by every chain of a deployment.

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};

use super::stages::{StageOutcome, adopts_standard_superchain};
use crate::{
    deploy_config::override_implementations_input,
    intent::Intent,
    procedures::{
        DEV_RELEASE, DeployImplementations, DeployImplementationsInput, DeploySuperchain,
        DeploySuperchainInput,
    },
    script::{ScriptHost, invoke},
    standard::{self, L1Versions, StandardConfig},
    state::{ImplementationsDeployment, State, StateDelta, SuperchainDeployment},
};

/// Pick the CREATE2 salt and, on standard networks, adopt the existing superchain.
pub(super) fn init(intent: &Intent, state: &State, standard: &StandardConfig) -> Result<StageOutcome> {
    let mut outcome = StageOutcome::default();

    if state.create2_salt.is_zero() {
        let salt = B256::from(rand::random::<[u8; 32]>());
        tracing::debug!(%salt, "Generated CREATE2 salt");
        outcome.deltas.push(StateDelta::Create2Salt(salt));
    }

    if adopts_standard_superchain(intent, standard) {
        let tag = intent
            .l1_contracts_locator
            .tag()
            .context("standard superchain requires a tagged L1 locator")?;
        let chain = standard.chain(intent.l1_chain_id)?;
        let (superchain, versions) = standard.config_for(intent.l1_chain_id, tag)?;

        tracing::info!(
            network = %chain.name,
            tag,
            "Adopting the standard superchain deployment"
        );

        outcome.deltas.push(StateDelta::Superchain(SuperchainDeployment {
            proxy_admin_address: chain.manager_owner,
            superchain_config_proxy_address: superchain.superchain_config_proxy,
            protocol_versions_proxy_address: superchain.protocol_versions_proxy,
            ..Default::default()
        }));
        outcome
            .deltas
            .push(StateDelta::Implementations(adopted_implementations(
                chain.manager_impl,
                versions,
            )));
    }

    Ok(outcome)
}

fn deployed_at(versions: &L1Versions, contract: &str) -> Address {
    versions
        .get(contract)
        .and_then(|version| version.implementation_address.or(version.address))
        .unwrap_or_default()
}

fn adopted_implementations(opcm: Address, versions: &L1Versions) -> ImplementationsDeployment {
    ImplementationsDeployment {
        opcm_address: opcm,
        delayed_weth_impl_address: deployed_at(versions, "delayed_weth"),
        optimism_portal_impl_address: deployed_at(versions, "optimism_portal"),
        preimage_oracle_singleton_address: deployed_at(versions, "preimage_oracle"),
        mips_singleton_address: deployed_at(versions, "mips"),
        system_config_impl_address: deployed_at(versions, "system_config"),
        l1_cross_domain_messenger_impl_address: deployed_at(versions, "l1_cross_domain_messenger"),
        l1_erc721_bridge_impl_address: deployed_at(versions, "l1_erc721_bridge"),
        l1_standard_bridge_impl_address: deployed_at(versions, "l1_standard_bridge"),
        optimism_mintable_erc20_factory_impl_address: deployed_at(
            versions,
            "optimism_mintable_erc20_factory",
        ),
        dispute_game_factory_impl_address: deployed_at(versions, "dispute_game_factory"),
    }
}

pub(super) async fn deploy_superchain<H: ScriptHost>(
    host: &mut H,
    intent: &Intent,
) -> Result<StageOutcome> {
    let roles = &intent.superchain_roles;
    let input = DeploySuperchainInput {
        proxy_admin_owner: roles.proxy_admin_owner,
        protocol_versions_owner: roles.protocol_versions_owner,
        guardian: roles.guardian,
        paused: false,
    };

    let (deployment, transactions) = invoke::<DeploySuperchain, _>(host, &input).await?;
    tracing::info!(
        proxy_admin = %deployment.proxy_admin_address,
        superchain_config = %deployment.superchain_config_proxy_address,
        protocol_versions = %deployment.protocol_versions_proxy_address,
        "Superchain deployed"
    );
    Ok(StageOutcome::new(StateDelta::Superchain(deployment), transactions))
}

/// Release name handed to procedures for the L1 artifacts in use.
pub(super) fn l1_release(intent: &Intent) -> String {
    intent
        .l1_contracts_locator
        .tag()
        .unwrap_or(DEV_RELEASE)
        .to_string()
}

/// The version manifest scripts check deployments against; empty off the standard networks.
pub(super) fn standard_versions_toml(intent: &Intent, standard: &StandardConfig) -> Result<String> {
    if !standard.is_supported(intent.l1_chain_id) {
        return Ok(String::new());
    }
    standard.chain(intent.l1_chain_id)?.versions_toml()
}

pub(super) async fn deploy_implementations<H: ScriptHost>(
    host: &mut H,
    intent: &Intent,
    state: &State,
    standard: &StandardConfig,
) -> Result<StageOutcome> {
    let superchain = state
        .superchain_deployment
        .as_ref()
        .context("superchain must be deployed before implementations")?;

    let input = DeployImplementationsInput {
        salt: state.create2_salt,
        withdrawal_delay_seconds: standard::WITHDRAWAL_DELAY_SECONDS,
        min_proposal_size_bytes: standard::MIN_PROPOSAL_SIZE_BYTES,
        challenge_period_seconds: standard::CHALLENGE_PERIOD_SECONDS,
        proof_maturity_delay_seconds: standard::PROOF_MATURITY_DELAY_SECONDS,
        dispute_game_finality_delay_seconds: standard::DISPUTE_GAME_FINALITY_DELAY_SECONDS,
        mips_version: standard::MIPS_VERSION,
        release: l1_release(intent),
        superchain_config_proxy: superchain.superchain_config_proxy_address,
        protocol_versions_proxy: superchain.protocol_versions_proxy_address,
        superchain_proxy_admin: superchain.proxy_admin_address,
        standard_versions_toml: standard_versions_toml(intent, standard)?,
        use_interop: intent.use_interop,
    };
    let input = override_implementations_input(input, &intent.global_deploy_overrides)?;

    let (deployment, transactions) = invoke::<DeployImplementations, _>(host, &input).await?;
    tracing::info!(opcm = %deployment.opcm_address, "Implementations deployed");
    Ok(StageOutcome::new(
        StateDelta::Implementations(deployment),
        transactions,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::Locator;

    #[test]
    fn test_init_generates_salt_once() {
        let standard = StandardConfig::load().unwrap();
        let intent = Intent::template(900, &[10], Address::repeat_byte(0x11));

        let outcome = init(&intent, &State::default(), &standard).unwrap();
        assert!(outcome.transactions.is_empty());
        assert!(matches!(
            outcome.deltas.as_slice(),
            [StateDelta::Create2Salt(salt)] if !salt.is_zero()
        ));

        let mut state = State::default();
        state.create2_salt = B256::repeat_byte(7);
        let outcome = init(&intent, &state, &standard).unwrap();
        assert!(outcome.deltas.is_empty());
    }

    #[test]
    fn test_init_adopts_standard_superchain() {
        let standard = StandardConfig::load().unwrap();
        let intent = Intent::template(1, &[10], Address::repeat_byte(0x11));
        let chain = standard.chain(1).unwrap();

        let mut state = State::default();
        for delta in init(&intent, &State::default(), &standard).unwrap().deltas {
            state.merge(delta).unwrap();
        }

        let superchain = state.superchain_deployment.unwrap();
        assert_eq!(superchain.proxy_admin_address, chain.manager_owner);
        assert_eq!(
            superchain.superchain_config_proxy_address,
            chain.superchain.superchain_config_proxy
        );
        let implementations = state.implementations_deployment.unwrap();
        assert_eq!(implementations.opcm_address, chain.manager_impl);
        assert!(!implementations.optimism_portal_impl_address.is_zero());
        assert!(!implementations.mips_singleton_address.is_zero());
    }

    #[test]
    fn test_release_name() {
        let mut intent = Intent::template(900, &[10], Address::repeat_byte(0x11));
        assert_eq!(l1_release(&intent), standard::DEFAULT_L1_CONTRACTS_TAG);
        intent.l1_contracts_locator = Locator::File("/tmp/artifacts".into());
        assert_eq!(l1_release(&intent), DEV_RELEASE);
    }
}
