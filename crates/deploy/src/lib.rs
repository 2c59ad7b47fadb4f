//! opchain-deploy - Reconciling deployment pipeline for OP Stack superchains.
//!
//! This crate compares a declarative [`Intent`] with the recorded [`State`] of a deployment,
//! runs the outstanding deployment procedures on a [`ScriptHost`], broadcasts the resulting
//! transactions and persists the updated state after every stage.

pub mod artifacts;
pub mod bootstrap;
pub mod broadcaster;
pub mod deploy_config;
mod deployer;
pub mod intent;
pub mod ledger;
mod output;
pub mod pipeline;
pub mod procedures;
mod rpc;
pub mod script;
pub mod standard;
pub mod state;
pub mod store;

pub use artifacts::{ArtifactSource, HttpArtifactSource, Locator};
pub use broadcaster::{
    BroadcastFailure, BroadcastResult, Broadcaster, BroadcasterConfig, DiscardBroadcaster,
    KeyedBroadcaster, UnsignedTx,
};
pub use deployer::{
    ApplyOptions, GENESIS_SENDER, LiveSession, SessionPipeline, apply_pipeline, parse_private_key,
};
pub use intent::{ChainIntent, DeploymentStrategy, Intent};
pub use ledger::{LedgerClient, RpcLedgerClient};
pub use output::OutputSink;
pub use pipeline::{ApplyReport, Pipeline, StageFailure, StageKind};
pub use script::{CommandScriptHost, ScriptCommand, ScriptHost};
pub use standard::StandardConfig;
pub use state::{ChainState, State, StateDelta};
pub use store::{FileStateStore, NoopStateStore, StateStore, Workdir};
