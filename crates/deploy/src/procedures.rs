//! The deployment procedures understood by script hosts, with their inputs and outputs.

use alloy_core::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    deploy_config::DeployConfig,
    intent::GameKind,
    script::Procedure,
    state::{ChainState, ImplementationsDeployment, SuperchainDeployment},
};

/// Release name passed to procedures for untagged artifacts.
pub const DEV_RELEASE: &str = "dev";

pub struct DeploySuperchain;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySuperchainInput {
    pub proxy_admin_owner: Address,
    pub protocol_versions_owner: Address,
    pub guardian: Address,
    pub paused: bool,
}

impl Procedure for DeploySuperchain {
    const NAME: &'static str = "DeploySuperchain";
    type Input = DeploySuperchainInput;
    type Output = SuperchainDeployment;
}

pub struct DeployImplementations;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployImplementationsInput {
    pub salt: B256,
    pub withdrawal_delay_seconds: u64,
    pub min_proposal_size_bytes: u64,
    pub challenge_period_seconds: u64,
    pub proof_maturity_delay_seconds: u64,
    pub dispute_game_finality_delay_seconds: u64,
    pub mips_version: u64,
    pub release: String,
    pub superchain_config_proxy: Address,
    pub protocol_versions_proxy: Address,
    pub superchain_proxy_admin: Address,
    pub standard_versions_toml: String,
    pub use_interop: bool,
}

impl Procedure for DeployImplementations {
    const NAME: &'static str = "DeployImplementations";
    type Input = DeployImplementationsInput;
    type Output = ImplementationsDeployment;
}

pub struct DeployOPChain;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOPChainInput {
    pub op_chain_proxy_admin_owner: Address,
    pub system_config_owner: Address,
    pub batcher: Address,
    pub unsafe_block_signer: Address,
    pub proposer: Address,
    pub challenger: Address,
    pub basefee_scalar: u32,
    pub blob_base_fee_scalar: u32,
    pub l2_chain_id: U256,
    pub opcm: Address,
    pub salt_mixer: String,
    pub gas_limit: u64,
    pub eip1559_denominator: u64,
    pub eip1559_elasticity: u64,
    pub dispute_game_type: u32,
    pub dispute_absolute_prestate: B256,
    pub dispute_max_game_depth: u64,
    pub dispute_split_depth: u64,
    pub dispute_clock_extension: u64,
    pub dispute_max_clock_duration: u64,
    pub allow_custom_dispute_parameters: bool,
}

impl DeployOPChainInput {
    pub fn from_config(config: &DeployConfig, opcm: Address, salt: B256) -> Self {
        Self {
            op_chain_proxy_admin_owner: config.final_system_owner,
            system_config_owner: config.system_config_owner,
            batcher: config.batch_sender_address,
            unsafe_block_signer: config.p2p_sequencer_address,
            proposer: config.l2_output_oracle_proposer,
            challenger: config.l2_output_oracle_challenger,
            basefee_scalar: config.gas_price_oracle_base_fee_scalar,
            blob_base_fee_scalar: config.gas_price_oracle_blob_base_fee_scalar,
            l2_chain_id: U256::from(config.l2_chain_id),
            opcm,
            salt_mixer: salt.to_string(),
            gas_limit: config.l2_genesis_block_gas_limit,
            eip1559_denominator: config.eip1559_denominator,
            eip1559_elasticity: config.eip1559_elasticity,
            dispute_game_type: config.dispute_game_type,
            dispute_absolute_prestate: config.dispute_absolute_prestate,
            dispute_max_game_depth: config.dispute_max_game_depth,
            dispute_split_depth: config.dispute_split_depth,
            dispute_clock_extension: config.dispute_clock_extension,
            dispute_max_clock_duration: config.dispute_max_clock_duration,
            allow_custom_dispute_parameters: config.dangerously_allow_custom_dispute_parameters,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOPChainOutput {
    pub op_chain_proxy_admin: Address,
    pub address_manager: Address,
    #[serde(rename = "l1ERC721BridgeProxy")]
    pub l1_erc721_bridge_proxy: Address,
    pub system_config_proxy: Address,
    #[serde(rename = "optimismMintableERC20FactoryProxy")]
    pub optimism_mintable_erc20_factory_proxy: Address,
    pub l1_standard_bridge_proxy: Address,
    pub l1_cross_domain_messenger_proxy: Address,
    pub optimism_portal_proxy: Address,
    pub dispute_game_factory_proxy: Address,
    pub anchor_state_registry_proxy: Address,
    pub anchor_state_registry_impl: Address,
    pub fault_dispute_game: Address,
    pub permissioned_dispute_game: Address,
    #[serde(rename = "delayedWETHPermissionedGameProxy")]
    pub delayed_weth_permissioned_game_proxy: Address,
    #[serde(rename = "delayedWETHPermissionlessGameProxy")]
    pub delayed_weth_permissionless_game_proxy: Address,
}

impl DeployOPChainOutput {
    pub fn into_chain_state(self, id: B256) -> ChainState {
        ChainState {
            id,
            proxy_admin_address: self.op_chain_proxy_admin,
            address_manager_address: self.address_manager,
            l1_erc721_bridge_proxy_address: self.l1_erc721_bridge_proxy,
            system_config_proxy_address: self.system_config_proxy,
            optimism_mintable_erc20_factory_proxy_address: self
                .optimism_mintable_erc20_factory_proxy,
            l1_standard_bridge_proxy_address: self.l1_standard_bridge_proxy,
            l1_cross_domain_messenger_proxy_address: self.l1_cross_domain_messenger_proxy,
            optimism_portal_proxy_address: self.optimism_portal_proxy,
            dispute_game_factory_proxy_address: self.dispute_game_factory_proxy,
            anchor_state_registry_proxy_address: self.anchor_state_registry_proxy,
            anchor_state_registry_impl_address: self.anchor_state_registry_impl,
            fault_dispute_game_address: self.fault_dispute_game,
            permissioned_dispute_game_address: self.permissioned_dispute_game,
            delayed_weth_permissioned_game_proxy_address: self.delayed_weth_permissioned_game_proxy,
            delayed_weth_permissionless_game_proxy_address: self
                .delayed_weth_permissionless_game_proxy,
            ..ChainState::new(id)
        }
    }
}

impl Procedure for DeployOPChain {
    const NAME: &'static str = "DeployOPChain";
    type Input = DeployOPChainInput;
    type Output = DeployOPChainOutput;
}

pub struct DeployAltDA;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAltDAInput {
    pub salt: B256,
    pub proxy_admin: Address,
    pub challenge_contract_owner: Address,
    pub challenge_window: u64,
    pub resolve_window: u64,
    pub bond_size: U256,
    pub resolver_refund_percentage: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAltDAOutput {
    pub data_availability_challenge_proxy: Address,
    pub data_availability_challenge_impl: Address,
}

impl Procedure for DeployAltDA {
    const NAME: &'static str = "DeployAltDA";
    type Input = DeployAltDAInput;
    type Output = DeployAltDAOutput;
}

pub struct DeployDelayedWETH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployDelayedWETHInput {
    pub release: String,
    pub standard_versions_toml: String,
    pub proxy_admin: Address,
    pub superchain_config_proxy: Address,
    #[serde(rename = "delayedWethOwner")]
    pub delayed_weth_owner: Address,
    #[serde(rename = "delayedWethDelay")]
    pub delayed_weth_delay: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployDelayedWETHOutput {
    #[serde(rename = "delayedWethImpl")]
    pub delayed_weth_impl: Address,
    #[serde(rename = "delayedWethProxy")]
    pub delayed_weth_proxy: Address,
}

impl Procedure for DeployDelayedWETH {
    const NAME: &'static str = "DeployDelayedWETH";
    type Input = DeployDelayedWETHInput;
    type Output = DeployDelayedWETHOutput;
}

pub struct DeployDisputeGame;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployDisputeGameInput {
    pub release: String,
    pub standard_versions_toml: String,
    pub game_kind: GameKind,
    pub game_type: u32,
    pub absolute_prestate: B256,
    pub max_game_depth: u64,
    pub split_depth: u64,
    pub clock_extension: u64,
    pub max_clock_duration: u64,
    pub mips_version: u64,
    pub min_proposal_size_bytes: u64,
    pub challenge_period_seconds: u64,
    pub delayed_weth_proxy: Address,
    pub anchor_state_registry_proxy: Address,
    /// Factory to register the game with; zero deploys the game without registering it.
    pub dispute_game_factory_proxy: Address,
    pub make_respected: bool,
    pub l2_chain_id: U256,
    pub proposer: Address,
    pub challenger: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployDisputeGameOutput {
    pub dispute_game_impl: Address,
    pub mips_singleton: Address,
    pub preimage_oracle_singleton: Address,
}

impl Procedure for DeployDisputeGame {
    const NAME: &'static str = "DeployDisputeGame";
    type Input = DeployDisputeGameInput;
    type Output = DeployDisputeGameOutput;
}

pub struct L2Genesis;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L2GenesisInput {
    pub config: DeployConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L2GenesisOutput {
    pub allocs: Value,
}

impl Procedure for L2Genesis {
    const NAME: &'static str = "L2Genesis";
    type Input = L2GenesisInput;
    type Output = L2GenesisOutput;
}
