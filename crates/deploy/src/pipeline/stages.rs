use alloy_core::primitives::B256;

use crate::{
    broadcaster::UnsignedTx,
    intent::{ChainIntent, DeploymentStrategy, Intent},
    standard::StandardConfig,
    state::{State, StateDelta},
};

/// One unit of reconciliation work.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum StageKind {
    Init,
    DeploySuperchain,
    DeployImplementations,
    #[strum(serialize = "deploy-opchain")]
    DeployOpChain,
    #[strum(serialize = "deploy-alt-da")]
    DeployAltDa,
    DeployAdditionalDisputeGames,
    GenerateL2Genesis,
    SetStartBlock,
}

/// Stages run once per pipeline, in order.
pub const SUPERCHAIN_STAGES: [StageKind; 3] = [
    StageKind::Init,
    StageKind::DeploySuperchain,
    StageKind::DeployImplementations,
];

/// Stages run once per chain, in order.
pub const CHAIN_STAGES: [StageKind; 5] = [
    StageKind::DeployOpChain,
    StageKind::DeployAltDa,
    StageKind::DeployAdditionalDisputeGames,
    StageKind::GenerateL2Genesis,
    StageKind::SetStartBlock,
];

impl StageKind {
    pub fn is_chain_level(self) -> bool {
        CHAIN_STAGES.contains(&self)
    }

    /// Whether the output of this stage is already recorded in `state`.
    pub fn is_satisfied(
        self,
        intent: &Intent,
        standard: &StandardConfig,
        state: &State,
        chain: Option<&ChainIntent>,
    ) -> bool {
        let chain_state = chain.and_then(|chain| state.chain(chain.id));
        match self {
            Self::Init => {
                !state.create2_salt.is_zero()
                    && (!adopts_standard_superchain(intent, standard)
                        || state.superchain_deployment.is_some())
            }
            Self::DeploySuperchain => state.superchain_deployment.is_some(),
            Self::DeployImplementations => state.implementations_deployment.is_some(),
            Self::DeployOpChain => chain_state.is_some(),
            Self::DeployAltDa => match (chain, chain_state) {
                (Some(chain), _) if !chain.alt_da.needs_challenge_contract() => true,
                (_, Some(deployed)) => !deployed.data_availability_challenge_proxy_address.is_zero(),
                _ => false,
            },
            Self::DeployAdditionalDisputeGames => match (chain, chain_state) {
                (Some(chain), Some(deployed)) => chain
                    .additional_dispute_games
                    .iter()
                    .all(|game| deployed.dispute_game(game.game_type).is_some()),
                (Some(chain), None) => chain.additional_dispute_games.is_empty(),
                (None, _) => false,
            },
            Self::GenerateL2Genesis => chain_state.is_some_and(|deployed| deployed.allocs.is_some()),
            Self::SetStartBlock => {
                chain_state.is_some_and(|deployed| deployed.start_block.is_some())
            }
        }
    }
}

/// Whether `init` takes the superchain and implementations from the standard deployment
/// instead of deploying them.
pub fn adopts_standard_superchain(intent: &Intent, standard: &StandardConfig) -> bool {
    intent.deployment_strategy == DeploymentStrategy::Live
        && intent.l1_contracts_locator.tag().is_some()
        && standard.is_supported(intent.l1_chain_id)
}

/// Attached to every error raised while a stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: StageKind,
    pub chain: Option<B256>,
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.chain {
            Some(chain) => write!(f, "stage {} failed for chain {}", self.stage, chain),
            None => write!(f, "stage {} failed", self.stage),
        }
    }
}

impl std::error::Error for StageFailure {}

/// What a stage wants committed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StageOutcome {
    pub deltas: Vec<StateDelta>,
    pub transactions: Vec<UnsignedTx>,
}

impl StageOutcome {
    pub fn new(delta: StateDelta, transactions: Vec<UnsignedTx>) -> Self {
        Self {
            deltas: vec![delta],
            transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifacts::Locator,
        intent::{AltDaConfig, KECCAK_COMMITMENT},
        state::{ChainState, SuperchainDeployment},
    };
    use alloy_core::primitives::Address;
    use std::str::FromStr;

    fn standard() -> StandardConfig {
        StandardConfig::load().unwrap()
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(StageKind::DeployOpChain.to_string(), "deploy-opchain");
        assert_eq!(StageKind::DeployAltDa.to_string(), "deploy-alt-da");
        assert_eq!(
            StageKind::from_str("generate-l2-genesis").unwrap(),
            StageKind::GenerateL2Genesis
        );
        assert!(StageKind::SetStartBlock.is_chain_level());
        assert!(!StageKind::Init.is_chain_level());
    }

    #[test]
    fn test_init_needs_adoption_on_standard_network() {
        let standard = standard();
        let mut intent = Intent::template(11155111, &[10], Address::repeat_byte(0x11));
        let mut state = State::default();
        state.create2_salt = B256::repeat_byte(1);

        assert!(adopts_standard_superchain(&intent, &standard));
        assert!(!StageKind::Init.is_satisfied(&intent, &standard, &state, None));

        state.superchain_deployment = Some(SuperchainDeployment::default());
        assert!(StageKind::Init.is_satisfied(&intent, &standard, &state, None));

        state.superchain_deployment = None;
        intent.l1_contracts_locator = Locator::File("/tmp/artifacts".into());
        assert!(!adopts_standard_superchain(&intent, &standard));
        assert!(StageKind::Init.is_satisfied(&intent, &standard, &state, None));
    }

    #[test]
    fn test_alt_da_satisfied_when_not_requested() {
        let standard = standard();
        let mut intent = Intent::template(900, &[10], Address::repeat_byte(0x11));
        let state = State::default();
        assert!(StageKind::DeployAltDa.is_satisfied(
            &intent,
            &standard,
            &state,
            Some(&intent.chains[0])
        ));

        intent.chains[0].alt_da = AltDaConfig {
            use_alt_da: true,
            commitment_type: KECCAK_COMMITMENT.to_string(),
            challenge_window: 100,
            resolve_window: 100,
            bond_size: 1,
            resolver_refund_percentage: 0,
        };
        assert!(!StageKind::DeployAltDa.is_satisfied(
            &intent,
            &standard,
            &state,
            Some(&intent.chains[0])
        ));
    }

    #[test]
    fn test_chain_stages_track_chain_state() {
        let standard = standard();
        let intent = Intent::template(900, &[10], Address::repeat_byte(0x11));
        let chain = &intent.chains[0];
        let mut state = State::default();
        assert!(!StageKind::DeployOpChain.is_satisfied(&intent, &standard, &state, Some(chain)));
        assert!(StageKind::DeployAdditionalDisputeGames.is_satisfied(
            &intent,
            &standard,
            &state,
            Some(chain)
        ));

        let mut deployed = ChainState::new(chain.id);
        deployed.allocs = Some(serde_json::json!({}));
        state.op_chain_deployments.push(deployed);
        assert!(StageKind::DeployOpChain.is_satisfied(&intent, &standard, &state, Some(chain)));
        assert!(StageKind::GenerateL2Genesis.is_satisfied(&intent, &standard, &state, Some(chain)));
        assert!(!StageKind::SetStartBlock.is_satisfied(&intent, &standard, &state, Some(chain)));
    }

    #[test]
    fn test_failure_display() {
        let failure = StageFailure {
            stage: StageKind::DeploySuperchain,
            chain: None,
        };
        assert_eq!(failure.to_string(), "stage deploy-superchain failed");
    }
}
