//! The durable record of what has been deployed.
//!
//! Address fields are write-once: [`State::merge`] only fills fields that are still zero, and
//! refuses a delta that would change a field already set.

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::intent::{GameKind, Intent};

/// Schema version written by this crate.
pub const STATE_VERSION: u64 = 1;

/// An L1 block reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRef {
    pub hash: B256,
    pub number: u64,
    pub parent_hash: B256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperchainDeployment {
    pub proxy_admin_address: Address,
    pub superchain_config_proxy_address: Address,
    pub superchain_config_impl_address: Address,
    pub protocol_versions_proxy_address: Address,
    pub protocol_versions_impl_address: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationsDeployment {
    pub opcm_address: Address,
    #[serde(rename = "delayedWETHImplAddress")]
    pub delayed_weth_impl_address: Address,
    pub optimism_portal_impl_address: Address,
    pub preimage_oracle_singleton_address: Address,
    pub mips_singleton_address: Address,
    pub system_config_impl_address: Address,
    pub l1_cross_domain_messenger_impl_address: Address,
    #[serde(rename = "l1ERC721BridgeImplAddress")]
    pub l1_erc721_bridge_impl_address: Address,
    pub l1_standard_bridge_impl_address: Address,
    #[serde(rename = "optimismMintableERC20FactoryImplAddress")]
    pub optimism_mintable_erc20_factory_impl_address: Address,
    pub dispute_game_factory_impl_address: Address,
}

/// A dispute game registered on top of the chain's default permissioned game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeGameState {
    pub game_type: u32,
    pub game_kind: GameKind,
    pub vm_address: Address,
    pub oracle_address: Address,
    pub game_address: Address,
}

/// Everything deployed for one chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainState {
    pub id: B256,
    pub proxy_admin_address: Address,
    pub address_manager_address: Address,
    #[serde(rename = "l1ERC721BridgeProxyAddress")]
    pub l1_erc721_bridge_proxy_address: Address,
    pub system_config_proxy_address: Address,
    #[serde(rename = "optimismMintableERC20FactoryProxyAddress")]
    pub optimism_mintable_erc20_factory_proxy_address: Address,
    pub l1_standard_bridge_proxy_address: Address,
    pub l1_cross_domain_messenger_proxy_address: Address,
    pub optimism_portal_proxy_address: Address,
    pub dispute_game_factory_proxy_address: Address,
    pub anchor_state_registry_proxy_address: Address,
    pub anchor_state_registry_impl_address: Address,
    pub fault_dispute_game_address: Address,
    pub permissioned_dispute_game_address: Address,
    #[serde(rename = "delayedWETHPermissionedGameProxyAddress")]
    pub delayed_weth_permissioned_game_proxy_address: Address,
    #[serde(rename = "delayedWETHPermissionlessGameProxyAddress")]
    pub delayed_weth_permissionless_game_proxy_address: Address,
    pub data_availability_challenge_proxy_address: Address,
    pub data_availability_challenge_impl_address: Address,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_dispute_games: Vec<DisputeGameState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_block: Option<BlockRef>,
}

impl ChainState {
    pub fn new(id: B256) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn dispute_game(&self, game_type: u32) -> Option<&DisputeGameState> {
        self.additional_dispute_games
            .iter()
            .find(|game| game.game_type == game_type)
    }

    /// Named address fields, in declaration order.
    pub fn addresses(&self) -> Vec<(&'static str, Address)> {
        vec![
            ("ProxyAdmin", self.proxy_admin_address),
            ("AddressManager", self.address_manager_address),
            ("L1ERC721BridgeProxy", self.l1_erc721_bridge_proxy_address),
            ("SystemConfigProxy", self.system_config_proxy_address),
            (
                "OptimismMintableERC20FactoryProxy",
                self.optimism_mintable_erc20_factory_proxy_address,
            ),
            ("L1StandardBridgeProxy", self.l1_standard_bridge_proxy_address),
            (
                "L1CrossDomainMessengerProxy",
                self.l1_cross_domain_messenger_proxy_address,
            ),
            ("OptimismPortalProxy", self.optimism_portal_proxy_address),
            ("DisputeGameFactoryProxy", self.dispute_game_factory_proxy_address),
            ("AnchorStateRegistryProxy", self.anchor_state_registry_proxy_address),
            ("AnchorStateRegistryImpl", self.anchor_state_registry_impl_address),
            ("FaultDisputeGame", self.fault_dispute_game_address),
            ("PermissionedDisputeGame", self.permissioned_dispute_game_address),
            (
                "DelayedWETHPermissionedGameProxy",
                self.delayed_weth_permissioned_game_proxy_address,
            ),
            (
                "DelayedWETHPermissionlessGameProxy",
                self.delayed_weth_permissionless_game_proxy_address,
            ),
            (
                "DataAvailabilityChallengeProxy",
                self.data_availability_challenge_proxy_address,
            ),
            (
                "DataAvailabilityChallengeImpl",
                self.data_availability_challenge_impl_address,
            ),
        ]
    }
}

/// Output of one stage, applied with [`State::merge`].
#[derive(Debug, Clone, PartialEq)]
pub enum StateDelta {
    Create2Salt(B256),
    Superchain(SuperchainDeployment),
    Implementations(ImplementationsDeployment),
    /// Fields for the chain with the given id. Appends the chain if it is not present yet.
    Chain(ChainState),
    L1StateDump(Value),
}

/// Write-once assignment.
trait Fill: Sized {
    fn fill(&mut self, other: Self, field: &str) -> Result<()>;
}

impl Fill for Address {
    fn fill(&mut self, other: Self, field: &str) -> Result<()> {
        if other.is_zero() || *self == other {
            return Ok(());
        }
        if !self.is_zero() {
            anyhow::bail!("refusing to overwrite {} ({} -> {})", field, self, other);
        }
        *self = other;
        Ok(())
    }
}

impl Fill for B256 {
    fn fill(&mut self, other: Self, field: &str) -> Result<()> {
        if other.is_zero() || *self == other {
            return Ok(());
        }
        if !self.is_zero() {
            anyhow::bail!("refusing to overwrite {}", field);
        }
        *self = other;
        Ok(())
    }
}

impl<T: PartialEq> Fill for Option<T> {
    fn fill(&mut self, other: Self, field: &str) -> Result<()> {
        let Some(value) = other else {
            return Ok(());
        };
        if let Some(current) = self.as_ref() {
            if *current != value {
                anyhow::bail!("refusing to overwrite {}", field);
            }
            return Ok(());
        }
        *self = Some(value);
        Ok(())
    }
}

macro_rules! fill_fields {
    ($target:expr, $source:expr, [$($field:ident),+ $(,)?]) => {
        $( $target.$field.fill($source.$field, stringify!($field))?; )+
    };
}

impl SuperchainDeployment {
    fn fill(&mut self, other: Self) -> Result<()> {
        fill_fields!(
            self,
            other,
            [
                proxy_admin_address,
                superchain_config_proxy_address,
                superchain_config_impl_address,
                protocol_versions_proxy_address,
                protocol_versions_impl_address,
            ]
        );
        Ok(())
    }
}

impl ImplementationsDeployment {
    fn fill(&mut self, other: Self) -> Result<()> {
        fill_fields!(
            self,
            other,
            [
                opcm_address,
                delayed_weth_impl_address,
                optimism_portal_impl_address,
                preimage_oracle_singleton_address,
                mips_singleton_address,
                system_config_impl_address,
                l1_cross_domain_messenger_impl_address,
                l1_erc721_bridge_impl_address,
                l1_standard_bridge_impl_address,
                optimism_mintable_erc20_factory_impl_address,
                dispute_game_factory_impl_address,
            ]
        );
        Ok(())
    }
}

impl ChainState {
    fn fill(&mut self, other: Self) -> Result<()> {
        fill_fields!(
            self,
            other,
            [
                proxy_admin_address,
                address_manager_address,
                l1_erc721_bridge_proxy_address,
                system_config_proxy_address,
                optimism_mintable_erc20_factory_proxy_address,
                l1_standard_bridge_proxy_address,
                l1_cross_domain_messenger_proxy_address,
                optimism_portal_proxy_address,
                dispute_game_factory_proxy_address,
                anchor_state_registry_proxy_address,
                anchor_state_registry_impl_address,
                fault_dispute_game_address,
                permissioned_dispute_game_address,
                delayed_weth_permissioned_game_proxy_address,
                delayed_weth_permissionless_game_proxy_address,
                data_availability_challenge_proxy_address,
                data_availability_challenge_impl_address,
                allocs,
                start_block,
            ]
        );

        for game in other.additional_dispute_games {
            match self
                .additional_dispute_games
                .iter()
                .find(|existing| existing.game_type == game.game_type)
            {
                Some(existing) if *existing == game => {}
                Some(_) => anyhow::bail!(
                    "refusing to overwrite dispute game of type {}",
                    game.game_type
                ),
                None => self.additional_dispute_games.push(game),
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u64,
}

/// The deployment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub version: u64,
    pub create2_salt: B256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superchain_deployment: Option<SuperchainDeployment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementations_deployment: Option<ImplementationsDeployment>,
    #[serde(default)]
    pub op_chain_deployments: Vec<ChainState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_state_dump: Option<Value>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            create2_salt: B256::ZERO,
            superchain_deployment: None,
            implementations_deployment: None,
            op_chain_deployments: Vec::new(),
            l1_state_dump: None,
        }
    }
}

impl State {
    /// Decode a persisted state. The schema version is checked before anything else is read.
    pub fn from_json(content: &str) -> Result<Self> {
        let probe: VersionProbe =
            serde_json::from_str(content).context("State document has no readable version")?;
        if probe.version != STATE_VERSION {
            anyhow::bail!(
                "unsupported state version {} (expected {})",
                probe.version,
                STATE_VERSION
            );
        }
        serde_json::from_str(content).context("Failed to parse state")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize state")
    }

    pub fn chain(&self, id: B256) -> Option<&ChainState> {
        self.op_chain_deployments.iter().find(|chain| chain.id == id)
    }

    /// Apply a stage's output. Fields already set are never changed, and a rejected delta leaves
    /// the state untouched.
    pub fn merge(&mut self, delta: StateDelta) -> Result<()> {
        let mut next = self.clone();
        next.apply(delta)?;
        *self = next;
        Ok(())
    }

    fn apply(&mut self, delta: StateDelta) -> Result<()> {
        match delta {
            StateDelta::Create2Salt(salt) => self.create2_salt.fill(salt, "create2Salt"),
            StateDelta::Superchain(superchain) => self
                .superchain_deployment
                .get_or_insert_with(Default::default)
                .fill(superchain)
                .context("superchain deployment"),
            StateDelta::Implementations(implementations) => self
                .implementations_deployment
                .get_or_insert_with(Default::default)
                .fill(implementations)
                .context("implementations deployment"),
            StateDelta::Chain(chain) => {
                let id = chain.id;
                match self.op_chain_deployments.iter_mut().find(|c| c.id == id) {
                    Some(existing) => existing
                        .fill(chain)
                        .with_context(|| format!("chain {}", id)),
                    None => {
                        self.op_chain_deployments.push(chain);
                        Ok(())
                    }
                }
            }
            StateDelta::L1StateDump(dump) => {
                self.l1_state_dump = Some(dump);
                Ok(())
            }
        }
    }

    /// Check that this state can be reconciled against `intent`.
    ///
    /// Chain states must line up with the intent's chains by position. An intent may declare more
    /// chains than the state holds; those are deployed on the next run.
    pub fn check_against(&self, intent: &Intent) -> Result<()> {
        if self.version != STATE_VERSION {
            anyhow::bail!(
                "unsupported state version {} (expected {})",
                self.version,
                STATE_VERSION
            );
        }

        if self.op_chain_deployments.len() > intent.chains.len() {
            anyhow::bail!(
                "state holds {} chains but the intent declares only {}",
                self.op_chain_deployments.len(),
                intent.chains.len()
            );
        }

        for (index, (deployed, wanted)) in self
            .op_chain_deployments
            .iter()
            .zip(&intent.chains)
            .enumerate()
        {
            if deployed.id != wanted.id {
                anyhow::bail!(
                    "chain {} in state is {} but the intent declares {} at that position",
                    index,
                    deployed.id,
                    wanted.id
                );
            }
        }

        Ok(())
    }
}
