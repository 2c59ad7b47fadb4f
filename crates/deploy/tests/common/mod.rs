//! In-memory stand-ins for the script host, the L1 ledger and the state store.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use alloy_core::{
    primitives::{Address, B256, Bytes, keccak256},
    rlp::{Decodable, Header},
};
use alloy_signer_local::PrivateKeySigner;
use anyhow::Result;
use opchain_deploy::{
    BroadcasterConfig, KeyedBroadcaster, LedgerClient, ScriptHost, State, StateStore, UnsignedTx,
    ledger::{FeeSuggestion, Receipt},
    procedures::{
        DeployAltDAOutput, DeployDelayedWETHOutput, DeployDisputeGameOutput, DeployOPChainOutput,
        L2GenesisOutput,
    },
    script::ScriptResult,
    state::{BlockRef, ImplementationsDeployment, SuperchainDeployment},
};
use serde_json::{Value, json};

pub const L1_CHAIN_ID: u64 = 900;
pub const START_NONCE: u64 = 5;

pub fn owner() -> Address {
    Address::repeat_byte(0x11)
}

/// Address a fake procedure reports for `field`, derived from the call so that identical calls
/// yield identical addresses.
pub fn fake_address(procedure: &str, field: &str, input: &Value) -> Address {
    let hash = keccak256(format!("{}/{}/{}", procedure, field, input));
    Address::from_slice(&hash[12..])
}

/// Script host answering every procedure with deterministic addresses.
#[derive(Debug, Default)]
pub struct FakeScriptHost {
    pub calls: Vec<(String, Value)>,
    pub nonces: BTreeMap<Address, u64>,
    /// Procedure that fails instead of producing output.
    pub fail_on: Option<String>,
}

impl FakeScriptHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls_to(&self, procedure: &str) -> Vec<&Value> {
        self.calls
            .iter()
            .filter(|(name, _)| name == procedure)
            .map(|(_, input)| input)
            .collect()
    }

    fn output(procedure: &str, input: &Value) -> Result<Value> {
        let a = |field: &str| fake_address(procedure, field, input);
        let output = match procedure {
            "DeploySuperchain" => serde_json::to_value(SuperchainDeployment {
                proxy_admin_address: a("proxyAdmin"),
                superchain_config_proxy_address: a("superchainConfigProxy"),
                superchain_config_impl_address: a("superchainConfigImpl"),
                protocol_versions_proxy_address: a("protocolVersionsProxy"),
                protocol_versions_impl_address: a("protocolVersionsImpl"),
            })?,
            "DeployImplementations" => serde_json::to_value(ImplementationsDeployment {
                opcm_address: a("opcm"),
                delayed_weth_impl_address: a("delayedWETHImpl"),
                optimism_portal_impl_address: a("optimismPortalImpl"),
                preimage_oracle_singleton_address: a("preimageOracle"),
                mips_singleton_address: a("mips"),
                system_config_impl_address: a("systemConfigImpl"),
                l1_cross_domain_messenger_impl_address: a("l1CrossDomainMessengerImpl"),
                l1_erc721_bridge_impl_address: a("l1ERC721BridgeImpl"),
                l1_standard_bridge_impl_address: a("l1StandardBridgeImpl"),
                optimism_mintable_erc20_factory_impl_address: a("optimismMintableERC20FactoryImpl"),
                dispute_game_factory_impl_address: a("disputeGameFactoryImpl"),
            })?,
            "DeployOPChain" => serde_json::to_value(DeployOPChainOutput {
                op_chain_proxy_admin: a("proxyAdmin"),
                address_manager: a("addressManager"),
                l1_erc721_bridge_proxy: a("l1ERC721BridgeProxy"),
                system_config_proxy: a("systemConfigProxy"),
                optimism_mintable_erc20_factory_proxy: a("optimismMintableERC20FactoryProxy"),
                l1_standard_bridge_proxy: a("l1StandardBridgeProxy"),
                l1_cross_domain_messenger_proxy: a("l1CrossDomainMessengerProxy"),
                optimism_portal_proxy: a("optimismPortalProxy"),
                dispute_game_factory_proxy: a("disputeGameFactoryProxy"),
                anchor_state_registry_proxy: a("anchorStateRegistryProxy"),
                anchor_state_registry_impl: a("anchorStateRegistryImpl"),
                fault_dispute_game: a("faultDisputeGame"),
                permissioned_dispute_game: a("permissionedDisputeGame"),
                delayed_weth_permissioned_game_proxy: a("delayedWETHPermissioned"),
                delayed_weth_permissionless_game_proxy: a("delayedWETHPermissionless"),
            })?,
            "DeployAltDA" => serde_json::to_value(DeployAltDAOutput {
                data_availability_challenge_proxy: a("challengeProxy"),
                data_availability_challenge_impl: a("challengeImpl"),
            })?,
            "DeployDelayedWETH" => serde_json::to_value(DeployDelayedWETHOutput {
                delayed_weth_impl: a("impl"),
                delayed_weth_proxy: a("proxy"),
            })?,
            "DeployDisputeGame" => serde_json::to_value(DeployDisputeGameOutput {
                dispute_game_impl: a("game"),
                mips_singleton: a("mips"),
                preimage_oracle_singleton: a("oracle"),
            })?,
            "L2Genesis" => serde_json::to_value(L2GenesisOutput {
                allocs: json!({ "l2ChainID": input["config"]["l2ChainID"].clone() }),
            })?,
            other => anyhow::bail!("unknown procedure {}", other),
        };
        Ok(output)
    }
}

impl ScriptHost for FakeScriptHost {
    async fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<()> {
        self.nonces.insert(address, nonce);
        Ok(())
    }

    async fn execute<'a>(&'a mut self, procedure: &'a str, input: Value) -> Result<ScriptResult> {
        self.calls.push((procedure.to_string(), input.clone()));
        if self.fail_on.as_deref() == Some(procedure) {
            anyhow::bail!("execution reverted: {} failed", procedure);
        }

        let output = Self::output(procedure, &input)?;
        let transactions = if procedure == "L2Genesis" {
            Vec::new()
        } else {
            vec![UnsignedTx {
                to: None,
                data: Bytes::from(procedure.as_bytes().to_vec()),
                ..Default::default()
            }]
        };
        Ok(ScriptResult {
            output,
            transactions,
        })
    }

    async fn dump_state(&mut self) -> Result<Value> {
        Ok(json!({ "executed": self.calls.len() }))
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    next_nonce: u64,
    sent: Vec<Bytes>,
    receipts: HashMap<B256, Receipt>,
    reject_sends: usize,
    withheld_receipts: usize,
    revert_nonces: Vec<u64>,
}

/// L1 ledger holding a single account's nonce.
#[derive(Debug)]
pub struct MockLedger {
    chain_id: u64,
    state: Mutex<LedgerState>,
}

/// Chain id and nonce of a raw type-2 transaction.
pub fn decode_nonce(raw: &Bytes) -> (u64, u64) {
    let buf = &mut &raw[1..];
    Header::decode(buf).expect("transaction list header");
    let chain_id = u64::decode(buf).expect("chain id");
    let nonce = u64::decode(buf).expect("nonce");
    (chain_id, nonce)
}

impl MockLedger {
    pub fn new(chain_id: u64, nonce: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(LedgerState {
                next_nonce: nonce,
                ..Default::default()
            }),
        }
    }

    /// Reject the next `count` submissions.
    pub fn reject_sends(&self, count: usize) {
        self.state.lock().unwrap().reject_sends = count;
    }

    /// Answer the next `count` receipt lookups with "not found".
    pub fn withhold_receipts(&self, count: usize) {
        self.state.lock().unwrap().withheld_receipts = count;
    }

    pub fn revert_nonce(&self, nonce: u64) {
        self.state.lock().unwrap().revert_nonces.push(nonce);
    }

    /// Every accepted submission, rebroadcasts included.
    pub fn sent(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Nonces of the distinct transactions accepted, in order.
    pub fn nonces(&self) -> Vec<u64> {
        let mut seen = Vec::new();
        let mut nonces = Vec::new();
        for raw in self.sent() {
            if !seen.contains(&raw) {
                nonces.push(decode_nonce(&raw).1);
                seen.push(raw);
            }
        }
        nonces
    }
}

impl LedgerClient for MockLedger {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn nonce_at(&self, _address: Address) -> Result<u64> {
        Ok(self.state.lock().unwrap().next_nonce)
    }

    async fn suggest_fees(&self) -> Result<FeeSuggestion> {
        Ok(FeeSuggestion {
            base_fee: 1_000_000_000,
            priority_fee: 100_000_000,
        })
    }

    async fn estimate_gas<'a>(&'a self, _from: Address, _tx: &'a UnsignedTx) -> Result<u64> {
        Ok(1_000_000)
    }

    async fn send_raw_transaction<'a>(&'a self, raw: &'a Bytes) -> Result<B256> {
        let mut state = self.state.lock().unwrap();
        let hash = keccak256(raw);

        if state.reject_sends > 0 {
            state.reject_sends -= 1;
            anyhow::bail!("insufficient funds for gas * price + value");
        }
        if state.receipts.contains_key(&hash) {
            state.sent.push(raw.clone());
            return Ok(hash);
        }

        let (chain_id, nonce) = decode_nonce(raw);
        if chain_id != self.chain_id {
            anyhow::bail!("invalid chain id {}", chain_id);
        }
        if nonce != state.next_nonce {
            anyhow::bail!("nonce {} does not match expected {}", nonce, state.next_nonce);
        }

        state.next_nonce += 1;
        state.sent.push(raw.clone());
        let success = !state.revert_nonces.contains(&nonce);
        let block_number = 100 + state.receipts.len() as u64;
        state.receipts.insert(
            hash,
            Receipt {
                tx_hash: hash,
                success,
                block_number,
                gas_used: 500_000,
                contract_address: None,
            },
        );
        Ok(hash)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        let mut state = self.state.lock().unwrap();
        if state.withheld_receipts > 0 {
            state.withheld_receipts -= 1;
            return Ok(None);
        }
        Ok(state.receipts.get(&tx_hash).cloned())
    }

    async fn latest_block(&self) -> Result<BlockRef> {
        let state = self.state.lock().unwrap();
        let number = 100 + state.receipts.len() as u64;
        Ok(BlockRef {
            hash: B256::from(alloy_core::primitives::U256::from(number).to_be_bytes::<32>()),
            number,
            parent_hash: B256::from(
                alloy_core::primitives::U256::from(number - 1).to_be_bytes::<32>(),
            ),
            timestamp: 1_700_000_000 + number * 12,
        })
    }
}

/// Short polling so confirmation failures surface quickly.
pub fn fast_config() -> BroadcasterConfig {
    BroadcasterConfig {
        gas_pad_percent: 150,
        receipt_poll_interval: Duration::from_millis(1),
        receipt_polls: 2,
        max_rebroadcasts: 1,
    }
}

pub async fn keyed_broadcaster(ledger: MockLedger) -> KeyedBroadcaster<MockLedger> {
    KeyedBroadcaster::new(ledger, PrivateKeySigner::random(), fast_config())
        .await
        .expect("broadcaster setup")
}

/// Keeps every state written to it.
#[derive(Debug, Default)]
pub struct RecordingStore {
    writes: Mutex<Vec<State>>,
}

impl RecordingStore {
    pub fn writes(&self) -> Vec<State> {
        self.writes.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<State> {
        self.writes.lock().unwrap().last().cloned()
    }
}

impl StateStore for RecordingStore {
    fn write(&self, state: &State) -> Result<()> {
        self.writes.lock().unwrap().push(state.clone());
        Ok(())
    }
}
