//! Script host backed by an external runner process.
//!
//! Each call spawns the runner, writes one JSON request on its stdin and reads one JSON response
//! from its stdout. The simulated ledger (nonces and state) is carried from one call to the next.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{ScriptHost, ScriptResult};
use crate::broadcaster::UnsignedTx;

/// Program and arguments of the script runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ScriptCommand {
    /// Split a whitespace separated command line.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().context("script command is empty")?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Request<'a> {
    procedure: &'a str,
    input: Value,
    artifacts_dir: &'a PathBuf,
    chain_id: u64,
    sender: Address,
    nonces: &'a BTreeMap<Address, u64>,
    state: &'a Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Response {
    output: Value,
    #[serde(default)]
    transactions: Vec<UnsignedTx>,
    #[serde(default)]
    nonces: Option<BTreeMap<Address, u64>>,
    #[serde(default)]
    state: Option<Value>,
}

/// [`ScriptHost`] that delegates to an external runner.
#[derive(Debug, Clone)]
pub struct CommandScriptHost {
    command: ScriptCommand,
    artifacts_dir: PathBuf,
    chain_id: u64,
    sender: Address,
    nonces: BTreeMap<Address, u64>,
    state: Option<Value>,
}

impl CommandScriptHost {
    pub fn new(
        command: ScriptCommand,
        artifacts_dir: impl Into<PathBuf>,
        chain_id: u64,
        sender: Address,
    ) -> Self {
        Self {
            command,
            artifacts_dir: artifacts_dir.into(),
            chain_id,
            sender,
            nonces: BTreeMap::new(),
            state: None,
        }
    }

    pub fn nonce(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    async fn run(&self, request: &Request<'_>) -> Result<Response> {
        let payload = serde_json::to_vec(request).context("Failed to encode script request")?;

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn script runner `{}`", self.command.program))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Script runner has no stdin")?;
        stdin
            .write_all(&payload)
            .await
            .context("Failed to write script request")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("Failed waiting for script runner")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            anyhow::bail!(
                "script runner exited with status {}{}",
                output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |code| code.to_string()),
                if stderr.is_empty() {
                    String::new()
                } else {
                    format!(": {}", stderr)
                }
            );
        }

        serde_json::from_slice(&output.stdout).context("Failed to decode script response")
    }
}

impl ScriptHost for CommandScriptHost {
    async fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<()> {
        tracing::debug!(%address, nonce, "Aligning simulated nonce");
        self.nonces.insert(address, nonce);
        Ok(())
    }

    async fn execute<'a>(&'a mut self, procedure: &'a str, input: Value) -> Result<ScriptResult> {
        let response = self
            .run(&Request {
                procedure,
                input,
                artifacts_dir: &self.artifacts_dir,
                chain_id: self.chain_id,
                sender: self.sender,
                nonces: &self.nonces,
                state: &self.state,
            })
            .await?;

        match response.nonces {
            Some(nonces) => self.nonces = nonces,
            None => {
                // runners that do not report nonces spend one per transaction from the sender
                *self.nonces.entry(self.sender).or_default() += response.transactions.len() as u64;
            }
        }
        if response.state.is_some() {
            self.state = response.state;
        }

        Ok(ScriptResult {
            output: response.output,
            transactions: response.transactions,
        })
    }

    async fn dump_state(&mut self) -> Result<Value> {
        Ok(self
            .state
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default())))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell(script: &str) -> ScriptCommand {
        ScriptCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[test]
    fn test_parse_command_line() {
        let command = ScriptCommand::parse("forge-runner --json  --quiet").unwrap();
        assert_eq!(command.program, "forge-runner");
        assert_eq!(command.args, vec!["--json", "--quiet"]);
        assert!(ScriptCommand::parse("   ").is_err());
    }

    #[tokio::test]
    async fn test_execute_carries_state_and_nonces() {
        let sender = Address::repeat_byte(0x0a);
        let response = json!({
            "output": {"proxyAdminAddress": format!("{}", Address::repeat_byte(0x01))},
            "transactions": [{"to": null, "data": "0x00"}, {"to": null, "data": "0x01"}],
            "state": {"accounts": 2}
        });
        let script = format!("cat >/dev/null; printf '%s' '{}'", response);
        let mut host = CommandScriptHost::new(shell(&script), "/tmp", 900, sender);
        host.set_nonce(sender, 5).await.unwrap();

        let result = host.execute("DeploySuperchain", json!({})).await.unwrap();
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(host.nonce(sender), 7);
        assert_eq!(host.dump_state().await.unwrap(), json!({"accounts": 2}));
    }

    #[tokio::test]
    async fn test_failed_runner_reports_stderr() {
        let mut host = CommandScriptHost::new(
            shell("cat >/dev/null; echo 'revert: bad input' >&2; exit 3"),
            "/tmp",
            900,
            Address::ZERO,
        );
        let err = host.execute("DeployOPChain", json!({})).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("status 3"), "{}", message);
        assert!(message.contains("revert: bad input"), "{}", message);
    }

    #[tokio::test]
    async fn test_request_is_sent_on_stdin() {
        // echo the procedure name back as the output
        let script = r#"read -r line; name=$(printf '%s' "$line" | sed 's/.*"procedure":"\([^"]*\)".*/\1/'); printf '{"output":"%s"}' "$name""#;
        let mut host = CommandScriptHost::new(shell(script), "/tmp", 900, Address::ZERO);
        let result = host.execute("L2Genesis", json!({"x": 1})).await.unwrap();
        assert_eq!(result.output, json!("L2Genesis"));
        assert!(result.transactions.is_empty());
    }
}
