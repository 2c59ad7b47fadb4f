//! Reconciliation of an [`Intent`] against a [`State`].
//!
//! [`Pipeline::apply`] walks the superchain stages once and the chain stages once per chain, in
//! intent order. A stage whose output is already recorded is skipped. Any other stage is run on
//! the script host, its transactions are broadcast as one batch, and only after the batch is
//! confirmed is its delta merged and the state written to the store. The first failure stops
//! the run; the state then holds every stage committed before it.

use alloy_core::primitives::B256;
use anyhow::{Context, Result};

use crate::{
    broadcaster::{Broadcaster, UnsignedTx},
    intent::{ChainIntent, DeploymentStrategy, Intent},
    script::{Procedure, ScriptHost, invoke},
    standard::StandardConfig,
    state::{State, StateDelta},
    store::StateStore,
};

mod chain;
mod stages;
mod superchain;

pub use stages::{
    CHAIN_STAGES, SUPERCHAIN_STAGES, StageFailure, StageKind, StageOutcome,
    adopts_standard_superchain,
};

/// What one run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Stages that ran, with the chain they ran for.
    pub executed: Vec<(StageKind, Option<B256>)>,
    pub skipped: usize,
    /// Transactions broadcast across all stages.
    pub transactions: usize,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        self.executed.is_empty() && self.transactions == 0
    }
}

/// The collaborators of one run.
///
/// `l1_host` simulates the L1 procedures and `l2_host` the L2 genesis. Both hosts, the
/// broadcaster and the store are owned by the pipeline for the duration of the run.
pub struct Pipeline<'a, H, B, W> {
    pub standard: &'a StandardConfig,
    pub l1_host: H,
    pub l2_host: H,
    pub broadcaster: B,
    pub store: W,
}

impl<'a, H, B, W> Pipeline<'a, H, B, W>
where
    H: ScriptHost,
    B: Broadcaster,
    W: StateStore,
{
    pub fn new(standard: &'a StandardConfig, l1_host: H, l2_host: H, broadcaster: B, store: W) -> Self {
        Self {
            standard,
            l1_host,
            l2_host,
            broadcaster,
            store,
        }
    }

    /// Bring `state` in line with `intent`.
    pub async fn apply(&mut self, intent: &Intent, state: &mut State) -> Result<ApplyReport> {
        intent.check(self.standard).context("invalid intent")?;
        state
            .check_against(intent)
            .context("state does not match the intent")?;

        tracing::info!(
            l1_chain_id = intent.l1_chain_id,
            chains = intent.chains.len(),
            strategy = %intent.deployment_strategy,
            "Applying intent"
        );

        let mut report = ApplyReport::default();
        for stage in SUPERCHAIN_STAGES {
            self.reconcile(stage, intent, state, None, &mut report)
                .await?;
        }
        for (index, chain) in intent.chains.iter().enumerate() {
            for stage in CHAIN_STAGES {
                self.reconcile(stage, intent, state, Some((index, chain)), &mut report)
                    .await?;
            }
        }

        if intent.deployment_strategy == DeploymentStrategy::Genesis
            && (!report.executed.is_empty() || state.l1_state_dump.is_none())
        {
            let dump = self
                .l1_host
                .dump_state()
                .await
                .context("Failed to dump the simulated L1 state")?;
            let mut next = state.clone();
            next.merge(StateDelta::L1StateDump(dump))?;
            self.store.write(&next)?;
            *state = next;
        }

        tracing::info!(
            executed = report.executed.len(),
            skipped = report.skipped,
            transactions = report.transactions,
            "Intent applied"
        );
        Ok(report)
    }

    async fn reconcile(
        &mut self,
        stage: StageKind,
        intent: &Intent,
        state: &mut State,
        chain: Option<(usize, &ChainIntent)>,
        report: &mut ApplyReport,
    ) -> Result<()> {
        let chain_intent = chain.map(|(_, chain)| chain);
        let failure = StageFailure {
            stage,
            chain: chain_intent.map(|chain| chain.id),
        };

        if stage.is_satisfied(intent, self.standard, state, chain_intent) {
            tracing::debug!(stage = %stage, chain_id = ?failure.chain, "Stage already satisfied, skipping");
            report.skipped += 1;
            return Ok(());
        }

        tracing::info!(stage = %stage, chain_id = ?failure.chain, "Running stage");
        let StageOutcome {
            deltas,
            transactions,
        } = self
            .run(stage, intent, state, chain)
            .await
            .with_context(|| failure)?;

        let sent = self
            .broadcast(transactions)
            .await
            .with_context(|| failure)?;

        let mut next = state.clone();
        for delta in deltas {
            next.merge(delta).with_context(|| failure)?;
        }
        self.store.write(&next).with_context(|| failure)?;
        *state = next;

        report.executed.push((stage, failure.chain));
        report.transactions += sent;
        tracing::info!(stage = %stage, chain_id = ?failure.chain, transactions = sent, "Stage committed");
        Ok(())
    }

    /// Run a single procedure on the L1 host, outside of any stage, and broadcast its
    /// transactions. Nothing is merged into a state or written to the store.
    pub async fn run_procedure<P: Procedure>(&mut self, input: &P::Input) -> Result<P::Output> {
        let (output, transactions) = invoke::<P, H>(&mut self.l1_host, input).await?;
        let sent = self
            .broadcast(transactions)
            .await
            .with_context(|| format!("Failed to broadcast {} transactions", P::NAME))?;
        tracing::info!(procedure = P::NAME, transactions = sent, "Procedure committed");
        Ok(output)
    }

    async fn broadcast(&mut self, transactions: Vec<UnsignedTx>) -> Result<usize> {
        let sent = transactions.len();
        if sent > 0 {
            self.broadcaster.submit(transactions).await?;
        }
        Ok(sent)
    }

    async fn run(
        &mut self,
        stage: StageKind,
        intent: &Intent,
        state: &State,
        chain: Option<(usize, &ChainIntent)>,
    ) -> Result<StageOutcome> {
        let for_chain = || chain.context("chain stage scheduled without a chain");
        match stage {
            StageKind::Init => superchain::init(intent, state, self.standard),
            StageKind::DeploySuperchain => {
                superchain::deploy_superchain(&mut self.l1_host, intent).await
            }
            StageKind::DeployImplementations => {
                superchain::deploy_implementations(&mut self.l1_host, intent, state, self.standard)
                    .await
            }
            StageKind::DeployOpChain => {
                let (index, chain_intent) = for_chain()?;
                chain::deploy_opchain(&mut self.l1_host, intent, state, index, chain_intent).await
            }
            StageKind::DeployAltDa => {
                let (_, chain_intent) = for_chain()?;
                chain::deploy_alt_da(&mut self.l1_host, state, chain_intent).await
            }
            StageKind::DeployAdditionalDisputeGames => {
                let (_, chain_intent) = for_chain()?;
                chain::deploy_additional_dispute_games(
                    &mut self.l1_host,
                    intent,
                    state,
                    self.standard,
                    chain_intent,
                )
                .await
            }
            StageKind::GenerateL2Genesis => {
                let (_, chain_intent) = for_chain()?;
                chain::generate_l2_genesis(&mut self.l2_host, intent, state, chain_intent).await
            }
            StageKind::SetStartBlock => {
                let (_, chain_intent) = for_chain()?;
                chain::set_start_block(&self.broadcaster, intent, chain_intent).await
            }
        }
    }
}
