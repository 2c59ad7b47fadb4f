//! Desired deployment configuration.
//!
//! An [`Intent`] is the declarative description of what should exist on L1 once a run of the
//! pipeline completes. It is read from `intent.toml`, validated once and treated as read-only
//! for the rest of the invocation.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use alloy_core::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{artifacts::Locator, standard, standard::StandardConfig};

/// Free-form deploy config overrides, keyed by deploy config field name.
pub type DeployOverrides = BTreeMap<String, Value>;

/// How the pipeline commits its results.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeploymentStrategy {
    /// Transactions are signed and submitted to the L1 ledger.
    #[default]
    Live,
    /// Everything runs against the simulated ledger only; the resulting L1 allocations are
    /// recorded in the state instead of being broadcast.
    Genesis,
}

/// Superchain-wide role addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperchainRoles {
    pub proxy_admin_owner: Address,
    pub protocol_versions_owner: Address,
    pub guardian: Address,
}

/// Per-chain role addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRoles {
    pub l1_proxy_admin_owner: Address,
    pub l2_proxy_admin_owner: Address,
    pub system_config_owner: Address,
    pub unsafe_block_signer: Address,
    pub batcher: Address,
    pub proposer: Address,
    pub challenger: Address,
}

impl ChainRoles {
    fn named(&self) -> [(&'static str, Address); 7] {
        [
            ("l1ProxyAdminOwner", self.l1_proxy_admin_owner),
            ("l2ProxyAdminOwner", self.l2_proxy_admin_owner),
            ("systemConfigOwner", self.system_config_owner),
            ("unsafeBlockSigner", self.unsafe_block_signer),
            ("batcher", self.batcher),
            ("proposer", self.proposer),
            ("challenger", self.challenger),
        ]
    }
}

/// Alternative data-availability configuration for a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AltDaConfig {
    #[serde(rename = "useAltDA")]
    pub use_alt_da: bool,
    #[serde(rename = "daCommitmentType")]
    pub commitment_type: String,
    #[serde(rename = "daChallengeWindow")]
    pub challenge_window: u64,
    #[serde(rename = "daResolveWindow")]
    pub resolve_window: u64,
    #[serde(rename = "daBondSize")]
    pub bond_size: u64,
    #[serde(rename = "daResolverRefundPercentage")]
    pub resolver_refund_percentage: u64,
}

/// Commitment type requiring an on-chain challenge contract.
pub const KECCAK_COMMITMENT: &str = "KeccakCommitment";
/// Commitment type verified off-chain.
pub const GENERIC_COMMITMENT: &str = "GenericCommitment";

impl AltDaConfig {
    /// Whether this configuration needs the data-availability challenge contract on L1.
    pub fn needs_challenge_contract(&self) -> bool {
        self.use_alt_da && self.commitment_type == KECCAK_COMMITMENT
    }

    fn check(&self) -> Result<()> {
        if !self.use_alt_da {
            return Ok(());
        }
        match self.commitment_type.as_str() {
            KECCAK_COMMITMENT => {
                if self.challenge_window == 0 || self.resolve_window == 0 {
                    anyhow::bail!("daChallengeWindow and daResolveWindow must be non-zero");
                }
                if self.resolver_refund_percentage > 100 {
                    anyhow::bail!("daResolverRefundPercentage must be at most 100");
                }
                Ok(())
            }
            GENERIC_COMMITMENT => Ok(()),
            other => anyhow::bail!("unsupported daCommitmentType: {}", other),
        }
    }
}

/// Which dispute game implementation an additional game deploys.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum GameKind {
    #[default]
    FaultDisputeGame,
    PermissionedDisputeGame,
}

/// A dispute game deployed in addition to the chain's default permissioned game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeGameIntent {
    pub game_kind: GameKind,
    pub game_type: u32,
    #[serde(default = "default_prestate")]
    pub absolute_prestate: B256,
    #[serde(default = "default_max_game_depth")]
    pub max_game_depth: u64,
    #[serde(default = "default_split_depth")]
    pub split_depth: u64,
    #[serde(default = "default_clock_extension")]
    pub clock_extension: u64,
    #[serde(default = "default_max_clock_duration")]
    pub max_clock_duration: u64,
    #[serde(default = "default_mips_version")]
    pub mips_version: u64,
    #[serde(default)]
    pub make_respected: bool,
}

impl Default for DisputeGameIntent {
    fn default() -> Self {
        Self {
            game_kind: GameKind::default(),
            game_type: 0,
            absolute_prestate: default_prestate(),
            max_game_depth: default_max_game_depth(),
            split_depth: default_split_depth(),
            clock_extension: default_clock_extension(),
            max_clock_duration: default_max_clock_duration(),
            mips_version: default_mips_version(),
            make_respected: false,
        }
    }
}

fn default_prestate() -> B256 {
    standard::DISPUTE_ABSOLUTE_PRESTATE
}
fn default_max_game_depth() -> u64 {
    standard::DISPUTE_MAX_GAME_DEPTH
}
fn default_split_depth() -> u64 {
    standard::DISPUTE_SPLIT_DEPTH
}
fn default_clock_extension() -> u64 {
    standard::DISPUTE_CLOCK_EXTENSION
}
fn default_max_clock_duration() -> u64 {
    standard::DISPUTE_MAX_CLOCK_DURATION
}
fn default_mips_version() -> u64 {
    standard::MIPS_VERSION
}

/// Desired configuration of one dependent chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainIntent {
    /// The L2 chain identifier, as a 32-byte word.
    pub id: B256,
    pub base_fee_vault_recipient: Address,
    pub l1_fee_vault_recipient: Address,
    pub sequencer_fee_vault_recipient: Address,
    pub eip1559_denominator_canyon: u64,
    pub eip1559_denominator: u64,
    pub eip1559_elasticity: u64,
    pub roles: ChainRoles,
    #[serde(default, rename = "dangerousAltDAConfig")]
    pub alt_da: AltDaConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_dispute_games: Vec<DisputeGameIntent>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deploy_overrides: DeployOverrides,
}

impl ChainIntent {
    /// Build a chain intent with standard EIP-1559 tuning and every role set to `owner`.
    pub fn with_owner(l2_chain_id: u64, owner: Address) -> Self {
        Self {
            id: chain_id_to_b256(l2_chain_id),
            base_fee_vault_recipient: owner,
            l1_fee_vault_recipient: owner,
            sequencer_fee_vault_recipient: owner,
            eip1559_denominator_canyon: standard::EIP1559_DENOMINATOR_CANYON,
            eip1559_denominator: standard::EIP1559_DENOMINATOR,
            eip1559_elasticity: standard::EIP1559_ELASTICITY,
            roles: ChainRoles {
                l1_proxy_admin_owner: owner,
                l2_proxy_admin_owner: owner,
                system_config_owner: owner,
                unsafe_block_signer: owner,
                batcher: owner,
                proposer: owner,
                challenger: owner,
            },
            alt_da: AltDaConfig::default(),
            additional_dispute_games: Vec::new(),
            deploy_overrides: DeployOverrides::new(),
        }
    }

    /// The chain identifier as an integer.
    pub fn l2_chain_id(&self) -> U256 {
        U256::from_be_slice(self.id.as_slice())
    }

    fn check(&self) -> Result<()> {
        if self.id.is_zero() {
            anyhow::bail!("chain id must be set");
        }

        let recipients = [
            ("baseFeeVaultRecipient", self.base_fee_vault_recipient),
            ("l1FeeVaultRecipient", self.l1_fee_vault_recipient),
            ("sequencerFeeVaultRecipient", self.sequencer_fee_vault_recipient),
        ];
        for (name, address) in recipients.into_iter().chain(self.roles.named()) {
            if address.is_zero() {
                anyhow::bail!("{} must be set", name);
            }
        }

        if self.eip1559_denominator == 0 || self.eip1559_elasticity == 0 {
            anyhow::bail!("eip1559Denominator and eip1559Elasticity must be non-zero");
        }
        if self.eip1559_denominator_canyon == 0 {
            anyhow::bail!("eip1559DenominatorCanyon must be non-zero");
        }

        self.alt_da.check().context("invalid dangerousAltDAConfig")?;

        let mut game_types = HashSet::new();
        for game in &self.additional_dispute_games {
            if game.game_type == standard::DISPUTE_GAME_TYPE {
                anyhow::bail!(
                    "additional dispute game type {} collides with the default permissioned game",
                    game.game_type
                );
            }
            if !game_types.insert(game.game_type) {
                anyhow::bail!("duplicate additional dispute game type {}", game.game_type);
            }
            if game.split_depth >= game.max_game_depth {
                anyhow::bail!(
                    "dispute game {}: splitDepth must be below maxGameDepth",
                    game.game_type
                );
            }
        }

        Ok(())
    }
}

/// The declarative description of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    #[serde(default)]
    pub deployment_strategy: DeploymentStrategy,
    #[serde(rename = "l1ChainID")]
    pub l1_chain_id: u64,
    pub superchain_roles: SuperchainRoles,
    #[serde(default)]
    pub fund_dev_accounts: bool,
    #[serde(default)]
    pub use_interop: bool,
    pub l1_contracts_locator: Locator,
    pub l2_contracts_locator: Locator,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub global_deploy_overrides: DeployOverrides,
    pub chains: Vec<ChainIntent>,
}

impl Intent {
    /// Starting point for a new deployment: one chain per id, all roles owned by `owner`,
    /// default artifact locators.
    pub fn template(l1_chain_id: u64, l2_chain_ids: &[u64], owner: Address) -> Self {
        Self {
            deployment_strategy: DeploymentStrategy::Live,
            l1_chain_id,
            superchain_roles: SuperchainRoles {
                proxy_admin_owner: owner,
                protocol_versions_owner: owner,
                guardian: owner,
            },
            fund_dev_accounts: false,
            use_interop: false,
            l1_contracts_locator: Locator::default_l1(),
            l2_contracts_locator: Locator::default_l2(),
            global_deploy_overrides: DeployOverrides::new(),
            chains: l2_chain_ids
                .iter()
                .map(|id| ChainIntent::with_owner(*id, owner))
                .collect(),
        }
    }

    /// Structural validation, run before anything touches the network or the state.
    pub fn check(&self, standard: &StandardConfig) -> Result<()> {
        if self.l1_chain_id == 0 {
            anyhow::bail!("l1ChainID must be set");
        }

        let roles = [
            ("proxyAdminOwner", self.superchain_roles.proxy_admin_owner),
            (
                "protocolVersionsOwner",
                self.superchain_roles.protocol_versions_owner,
            ),
            ("guardian", self.superchain_roles.guardian),
        ];
        for (name, address) in roles {
            if address.is_zero() {
                anyhow::bail!("superchainRoles.{} must be set", name);
            }
        }

        if self.chains.is_empty() {
            anyhow::bail!("intent must declare at least one chain");
        }

        let mut ids = HashSet::new();
        for chain in &self.chains {
            if !ids.insert(chain.id) {
                anyhow::bail!("duplicate chain id {}", chain.id);
            }
            chain
                .check()
                .with_context(|| format!("invalid chain intent {}", chain.id))?;
        }

        for (name, locator) in [
            ("l1ContractsLocator", &self.l1_contracts_locator),
            ("l2ContractsLocator", &self.l2_contracts_locator),
        ] {
            locator
                .resolve(standard)
                .with_context(|| format!("unresolvable {}", name))?;
        }

        Ok(())
    }

    /// Find a chain intent by id.
    pub fn chain(&self, id: B256) -> Option<&ChainIntent> {
        self.chains.iter().find(|chain| chain.id == id)
    }

    /// Read an intent from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read intent from {}", path.display()))?;
        let intent: Self = toml::from_str(&content).context("Failed to parse intent as TOML")?;
        tracing::debug!(path = %path.display(), chains = intent.chains.len(), "Intent loaded");
        Ok(intent)
    }

    /// Write the intent as TOML.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize intent to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write intent to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Intent saved");
        Ok(())
    }
}

/// Encode a numeric chain id as the 32-byte word used in intents and state.
pub fn chain_id_to_b256(chain_id: u64) -> B256 {
    B256::from(U256::from(chain_id).to_be_bytes::<32>())
}
