//! Combined per-chain deploy configuration.
//!
//! The deploy config is built from the standard constants, the intent and the current state,
//! then patched with the intent's global overrides followed by the chain's own overrides. Every
//! override key must name a field of [`DeployConfig`].

use alloy_core::primitives::{Address, B256, keccak256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    intent::{ChainIntent, DeployOverrides, Intent},
    procedures::DeployImplementationsInput,
    standard,
    state::{ChainState, State},
};

/// Override that permits non-standard dispute game parameters.
pub const ALLOW_CUSTOM_DISPUTE_PARAMETERS: &str = "dangerouslyAllowCustomDisputeParameters";

/// Global override keys that also tune the shared implementations.
pub const IMPLEMENTATION_OVERRIDE_KEYS: [&str; 6] = [
    "withdrawalDelaySeconds",
    "minProposalSizeBytes",
    "challengePeriodSeconds",
    "proofMaturityDelaySeconds",
    "disputeGameFinalityDelaySeconds",
    "mipsVersion",
];

/// Every tunable of a chain deployment and its L2 genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(rename = "l1ChainID")]
    pub l1_chain_id: u64,
    #[serde(rename = "l2ChainID")]
    pub l2_chain_id: u64,
    pub l1_block_time: u64,
    pub l2_block_time: u64,
    pub max_sequencer_drift: u64,
    pub sequencer_window_size: u64,
    pub channel_timeout: u64,
    pub finalization_period_seconds: u64,

    pub batch_inbox_address: Address,
    pub batch_sender_address: Address,
    pub p2p_sequencer_address: Address,
    pub l2_output_oracle_proposer: Address,
    pub l2_output_oracle_challenger: Address,
    pub final_system_owner: Address,
    pub system_config_owner: Address,
    pub proxy_admin_owner: Address,
    pub superchain_config_guardian: Address,
    pub base_fee_vault_recipient: Address,
    pub l1_fee_vault_recipient: Address,
    pub sequencer_fee_vault_recipient: Address,

    pub eip1559_denominator: u64,
    pub eip1559_denominator_canyon: u64,
    pub eip1559_elasticity: u64,
    pub l2_genesis_block_gas_limit: u64,
    pub gas_price_oracle_base_fee_scalar: u32,
    pub gas_price_oracle_blob_base_fee_scalar: u32,

    pub l2_genesis_regolith_time_offset: Option<u64>,
    pub l2_genesis_canyon_time_offset: Option<u64>,
    pub l2_genesis_delta_time_offset: Option<u64>,
    pub l2_genesis_ecotone_time_offset: Option<u64>,
    pub l2_genesis_fjord_time_offset: Option<u64>,
    pub l2_genesis_granite_time_offset: Option<u64>,

    pub fund_dev_accounts: bool,
    pub use_interop: bool,
    pub use_fault_proofs: bool,

    pub dispute_game_type: u32,
    pub dispute_absolute_prestate: B256,
    pub dispute_max_game_depth: u64,
    pub dispute_split_depth: u64,
    pub dispute_clock_extension: u64,
    pub dispute_max_clock_duration: u64,
    pub proof_maturity_delay_seconds: u64,
    pub dispute_game_finality_delay_seconds: u64,
    pub withdrawal_delay_seconds: u64,
    pub min_proposal_size_bytes: u64,
    pub challenge_period_seconds: u64,
    pub mips_version: u64,
    pub dangerously_allow_custom_dispute_parameters: bool,

    #[serde(rename = "useAltDA")]
    pub use_alt_da: bool,
    pub da_commitment_type: String,
    pub da_challenge_window: u64,
    pub da_resolve_window: u64,
    pub da_bond_size: u64,
    pub da_resolver_refund_percentage: u64,
    pub da_challenge_proxy: Address,

    pub superchain_config_proxy: Address,
    pub protocol_versions_proxy: Address,
    pub l1_standard_bridge_proxy: Address,
    pub l1_cross_domain_messenger_proxy: Address,
    #[serde(rename = "l1ERC721BridgeProxy")]
    pub l1_erc721_bridge_proxy: Address,
    pub system_config_proxy: Address,
    pub optimism_portal_proxy: Address,
}

/// Address receiving batches for a chain: `0xff` followed by the head of `keccak(chain id)`.
pub fn batch_inbox_address(chain_id: B256) -> Address {
    let hash = keccak256(chain_id);
    let mut out = [0u8; 20];
    out[0] = 0xff;
    out[1..].copy_from_slice(&hash[..19]);
    Address::from(out)
}

impl DeployConfig {
    fn base(
        intent: &Intent,
        chain_intent: &ChainIntent,
        state: &State,
        chain_state: &ChainState,
    ) -> Result<Self> {
        let l2_chain_id = u64::try_from(chain_intent.l2_chain_id())
            .map_err(|_| anyhow::anyhow!("chain id {} does not fit in 64 bits", chain_intent.id))?;
        let superchain = state.superchain_deployment.clone().unwrap_or_default();
        let roles = &chain_intent.roles;
        let alt_da = &chain_intent.alt_da;

        Ok(Self {
            l1_chain_id: intent.l1_chain_id,
            l2_chain_id,
            l1_block_time: 12,
            l2_block_time: 2,
            max_sequencer_drift: 600,
            sequencer_window_size: 3600,
            channel_timeout: 300,
            finalization_period_seconds: 12,

            batch_inbox_address: batch_inbox_address(chain_intent.id),
            batch_sender_address: roles.batcher,
            p2p_sequencer_address: roles.unsafe_block_signer,
            l2_output_oracle_proposer: roles.proposer,
            l2_output_oracle_challenger: roles.challenger,
            final_system_owner: roles.l1_proxy_admin_owner,
            system_config_owner: roles.system_config_owner,
            proxy_admin_owner: roles.l2_proxy_admin_owner,
            superchain_config_guardian: intent.superchain_roles.guardian,
            base_fee_vault_recipient: chain_intent.base_fee_vault_recipient,
            l1_fee_vault_recipient: chain_intent.l1_fee_vault_recipient,
            sequencer_fee_vault_recipient: chain_intent.sequencer_fee_vault_recipient,

            eip1559_denominator: chain_intent.eip1559_denominator,
            eip1559_denominator_canyon: chain_intent.eip1559_denominator_canyon,
            eip1559_elasticity: chain_intent.eip1559_elasticity,
            l2_genesis_block_gas_limit: standard::GAS_LIMIT,
            gas_price_oracle_base_fee_scalar: standard::BASEFEE_SCALAR,
            gas_price_oracle_blob_base_fee_scalar: standard::BLOB_BASE_FEE_SCALAR,

            l2_genesis_regolith_time_offset: Some(0),
            l2_genesis_canyon_time_offset: Some(0),
            l2_genesis_delta_time_offset: Some(0),
            l2_genesis_ecotone_time_offset: Some(0),
            l2_genesis_fjord_time_offset: Some(0),
            l2_genesis_granite_time_offset: Some(0),

            fund_dev_accounts: intent.fund_dev_accounts,
            use_interop: intent.use_interop,
            use_fault_proofs: true,

            dispute_game_type: standard::DISPUTE_GAME_TYPE,
            dispute_absolute_prestate: standard::DISPUTE_ABSOLUTE_PRESTATE,
            dispute_max_game_depth: standard::DISPUTE_MAX_GAME_DEPTH,
            dispute_split_depth: standard::DISPUTE_SPLIT_DEPTH,
            dispute_clock_extension: standard::DISPUTE_CLOCK_EXTENSION,
            dispute_max_clock_duration: standard::DISPUTE_MAX_CLOCK_DURATION,
            proof_maturity_delay_seconds: standard::PROOF_MATURITY_DELAY_SECONDS,
            dispute_game_finality_delay_seconds: standard::DISPUTE_GAME_FINALITY_DELAY_SECONDS,
            withdrawal_delay_seconds: standard::WITHDRAWAL_DELAY_SECONDS,
            min_proposal_size_bytes: standard::MIN_PROPOSAL_SIZE_BYTES,
            challenge_period_seconds: standard::CHALLENGE_PERIOD_SECONDS,
            mips_version: standard::MIPS_VERSION,
            dangerously_allow_custom_dispute_parameters: false,

            use_alt_da: alt_da.use_alt_da,
            da_commitment_type: alt_da.commitment_type.clone(),
            da_challenge_window: alt_da.challenge_window,
            da_resolve_window: alt_da.resolve_window,
            da_bond_size: alt_da.bond_size,
            da_resolver_refund_percentage: alt_da.resolver_refund_percentage,
            da_challenge_proxy: chain_state.data_availability_challenge_proxy_address,

            superchain_config_proxy: superchain.superchain_config_proxy_address,
            protocol_versions_proxy: superchain.protocol_versions_proxy_address,
            l1_standard_bridge_proxy: chain_state.l1_standard_bridge_proxy_address,
            l1_cross_domain_messenger_proxy: chain_state.l1_cross_domain_messenger_proxy_address,
            l1_erc721_bridge_proxy: chain_state.l1_erc721_bridge_proxy_address,
            system_config_proxy: chain_state.system_config_proxy_address,
            optimism_portal_proxy: chain_state.optimism_portal_proxy_address,
        })
    }

    /// Fields that must be non-zero for any chain.
    fn check(&self) -> Result<()> {
        let required = [
            ("batchSenderAddress", self.batch_sender_address),
            ("p2pSequencerAddress", self.p2p_sequencer_address),
            ("l2OutputOracleProposer", self.l2_output_oracle_proposer),
            ("l2OutputOracleChallenger", self.l2_output_oracle_challenger),
            ("finalSystemOwner", self.final_system_owner),
            ("systemConfigOwner", self.system_config_owner),
            ("proxyAdminOwner", self.proxy_admin_owner),
            ("baseFeeVaultRecipient", self.base_fee_vault_recipient),
            ("l1FeeVaultRecipient", self.l1_fee_vault_recipient),
            ("sequencerFeeVaultRecipient", self.sequencer_fee_vault_recipient),
        ];
        for (name, address) in required {
            if address.is_zero() {
                anyhow::bail!("{} must be set", name);
            }
        }
        if self.l2_block_time == 0 {
            anyhow::bail!("l2BlockTime must be non-zero");
        }
        if self.dispute_split_depth >= self.dispute_max_game_depth {
            anyhow::bail!("disputeSplitDepth must be below disputeMaxGameDepth");
        }
        Ok(())
    }

    /// Reject dispute game parameters that differ from the standard ones unless explicitly
    /// allowed.
    pub fn check_dispute_parameters(&self) -> Result<()> {
        if self.dangerously_allow_custom_dispute_parameters {
            return Ok(());
        }

        let custom = [
            (
                "disputeGameType",
                self.dispute_game_type != standard::DISPUTE_GAME_TYPE,
            ),
            (
                "disputeAbsolutePrestate",
                self.dispute_absolute_prestate != standard::DISPUTE_ABSOLUTE_PRESTATE,
            ),
            (
                "disputeMaxGameDepth",
                self.dispute_max_game_depth != standard::DISPUTE_MAX_GAME_DEPTH,
            ),
            (
                "disputeSplitDepth",
                self.dispute_split_depth != standard::DISPUTE_SPLIT_DEPTH,
            ),
            (
                "disputeClockExtension",
                self.dispute_clock_extension != standard::DISPUTE_CLOCK_EXTENSION,
            ),
            (
                "disputeMaxClockDuration",
                self.dispute_max_clock_duration != standard::DISPUTE_MAX_CLOCK_DURATION,
            ),
            (
                "proofMaturityDelaySeconds",
                self.proof_maturity_delay_seconds != standard::PROOF_MATURITY_DELAY_SECONDS,
            ),
            (
                "disputeGameFinalityDelaySeconds",
                self.dispute_game_finality_delay_seconds
                    != standard::DISPUTE_GAME_FINALITY_DELAY_SECONDS,
            ),
        ];

        let changed: Vec<&str> = custom
            .iter()
            .filter(|(_, differs)| *differs)
            .map(|(name, _)| *name)
            .collect();
        if !changed.is_empty() {
            anyhow::bail!(
                "custom dispute game parameters ({}) require {}",
                changed.join(", "),
                ALLOW_CUSTOM_DISPUTE_PARAMETERS
            );
        }
        Ok(())
    }
}

fn apply_overrides(
    fields: &mut serde_json::Map<String, Value>,
    overrides: &DeployOverrides,
) -> Result<()> {
    for (key, value) in overrides {
        match fields.get_mut(key) {
            Some(field) => *field = value.clone(),
            None => anyhow::bail!("unknown deploy config override: {}", key),
        }
    }
    Ok(())
}

/// Build the deploy config for one chain.
pub fn combine_deploy_config(
    intent: &Intent,
    chain_intent: &ChainIntent,
    state: &State,
    chain_state: &ChainState,
) -> Result<DeployConfig> {
    combine(intent, chain_intent, state, chain_state).context("failed to combine L2 init config")
}

fn combine(
    intent: &Intent,
    chain_intent: &ChainIntent,
    state: &State,
    chain_state: &ChainState,
) -> Result<DeployConfig> {
    let base = DeployConfig::base(intent, chain_intent, state, chain_state)?;

    let Value::Object(mut fields) = serde_json::to_value(&base)? else {
        anyhow::bail!("deploy config did not serialize to an object");
    };
    apply_overrides(&mut fields, &intent.global_deploy_overrides)
        .context("invalid global deploy override")?;
    apply_overrides(&mut fields, &chain_intent.deploy_overrides)
        .context("invalid chain deploy override")?;

    let config: DeployConfig =
        serde_json::from_value(Value::Object(fields)).context("invalid deploy override value")?;
    config.check()?;
    Ok(config)
}

/// Patch the implementations input with the global overrides among
/// [`IMPLEMENTATION_OVERRIDE_KEYS`]. Other keys are left to the per-chain deploy config.
pub fn override_implementations_input(
    input: DeployImplementationsInput,
    overrides: &DeployOverrides,
) -> Result<DeployImplementationsInput> {
    let Value::Object(mut fields) = serde_json::to_value(&input)? else {
        anyhow::bail!("implementations input did not serialize to an object");
    };
    for key in IMPLEMENTATION_OVERRIDE_KEYS {
        if let Some(value) = overrides.get(key) {
            fields.insert(key.to_string(), value.clone());
        }
    }
    serde_json::from_value(Value::Object(fields))
        .context("invalid global deploy override")
}
