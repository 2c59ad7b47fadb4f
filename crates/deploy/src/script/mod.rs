//! Simulated execution of deployment procedures.
//!
//! A [`ScriptHost`] runs a named procedure against its own simulated ledger and reports the
//! procedure's output together with the transactions that would reproduce its effects on L1.

use std::future::Future;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::broadcaster::UnsignedTx;

mod command;
pub use command::{CommandScriptHost, ScriptCommand};

/// What a procedure produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResult {
    pub output: Value,
    pub transactions: Vec<UnsignedTx>,
}

/// Runs deployment procedures against a simulated ledger.
pub trait ScriptHost: Send {
    /// Align the simulated nonce of `address` with the real ledger.
    fn set_nonce(
        &mut self,
        address: Address,
        nonce: u64,
    ) -> impl Future<Output = Result<()>> + Send + '_;

    fn execute<'a>(
        &'a mut self,
        procedure: &'a str,
        input: Value,
    ) -> impl Future<Output = Result<ScriptResult>> + Send + 'a;

    /// Allocations of the simulated ledger.
    fn dump_state(&mut self) -> impl Future<Output = Result<Value>> + Send + '_;
}

/// A typed deployment procedure.
pub trait Procedure {
    const NAME: &'static str;
    type Input: Serialize + Send + Sync;
    type Output: Serialize + DeserializeOwned + Send;
}

/// Run `P` on `host`, decoding its output.
pub async fn invoke<P: Procedure, H: ScriptHost>(
    host: &mut H,
    input: &P::Input,
) -> Result<(P::Output, Vec<UnsignedTx>)> {
    let input = serde_json::to_value(input)
        .with_context(|| format!("Failed to encode {} input", P::NAME))?;
    tracing::debug!(procedure = P::NAME, %input, "Executing procedure");

    let ScriptResult {
        output,
        transactions,
    } = host
        .execute(P::NAME, input)
        .await
        .with_context(|| format!("{} failed", P::NAME))?;

    let output = serde_json::from_value(output)
        .with_context(|| format!("Invalid {} output", P::NAME))?;
    tracing::debug!(
        procedure = P::NAME,
        transactions = transactions.len(),
        "Procedure complete"
    );
    Ok((output, transactions))
}
