//! Read and write access to the L1 ledger.

use std::future::Future;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U64, U128};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::{broadcaster::UnsignedTx, rpc, state::BlockRef};

/// Fee inputs for an EIP-1559 transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSuggestion {
    pub base_fee: u128,
    pub priority_fee: u128,
}

impl FeeSuggestion {
    /// Fee cap covering two doublings of the base fee.
    pub fn max_fee_per_gas(&self) -> u128 {
        self.base_fee.saturating_mul(2).saturating_add(self.priority_fee)
    }
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}

/// The ledger operations the broadcaster and pipeline depend on.
pub trait LedgerClient: Send + Sync {
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send + '_;

    /// Pending nonce of `address`.
    fn nonce_at(&self, address: Address) -> impl Future<Output = Result<u64>> + Send + '_;

    fn suggest_fees(&self) -> impl Future<Output = Result<FeeSuggestion>> + Send + '_;

    fn estimate_gas<'a>(
        &'a self,
        from: Address,
        tx: &'a UnsignedTx,
    ) -> impl Future<Output = Result<u64>> + Send + 'a;

    /// Submit a signed transaction. An error means the ledger rejected it.
    fn send_raw_transaction<'a>(
        &'a self,
        raw: &'a Bytes,
    ) -> impl Future<Output = Result<B256>> + Send + 'a;

    fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Option<Receipt>>> + Send + '_;

    fn latest_block(&self) -> impl Future<Output = Result<BlockRef>> + Send + '_;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    status: U64,
    block_number: U64,
    gas_used: U64,
    #[serde(default)]
    contract_address: Option<Address>,
}

impl From<RpcReceipt> for Receipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            success: receipt.status == U64::from(1),
            block_number: receipt.block_number.to(),
            gas_used: receipt.gas_used.to(),
            contract_address: receipt.contract_address,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    hash: B256,
    number: U64,
    parent_hash: B256,
    timestamp: U64,
    #[serde(default)]
    base_fee_per_gas: Option<U128>,
}

impl From<&RpcBlock> for BlockRef {
    fn from(block: &RpcBlock) -> Self {
        Self {
            hash: block.hash,
            number: block.number.to(),
            parent_hash: block.parent_hash,
            timestamp: block.timestamp.to(),
        }
    }
}

/// [`LedgerClient`] over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcLedgerClient {
    client: reqwest::Client,
    url: Url,
}

impl RpcLedgerClient {
    pub fn new(url: Url) -> Result<Self> {
        Self::with_timeout(url, rpc::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client(timeout)?,
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        rpc::json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn block_by_tag(&self, tag: &str) -> Result<RpcBlock> {
        let block: Option<RpcBlock> = self
            .call("eth_getBlockByNumber", vec![json!(tag), json!(false)])
            .await?;
        block.with_context(|| format!("L1 node returned no {} block", tag))
    }
}

impl LedgerClient for RpcLedgerClient {
    async fn chain_id(&self) -> Result<u64> {
        let id: U64 = self.call("eth_chainId", vec![]).await?;
        Ok(id.to())
    }

    async fn nonce_at(&self, address: Address) -> Result<u64> {
        let nonce: U64 = self
            .call(
                "eth_getTransactionCount",
                vec![json!(address), json!("pending")],
            )
            .await?;
        Ok(nonce.to())
    }

    async fn suggest_fees(&self) -> Result<FeeSuggestion> {
        let block = self.block_by_tag("latest").await?;
        let base_fee = block
            .base_fee_per_gas
            .context("L1 does not report a base fee; EIP-1559 is required")?
            .to();
        let priority: U128 = self.call("eth_maxPriorityFeePerGas", vec![]).await?;
        Ok(FeeSuggestion {
            base_fee,
            priority_fee: priority.to(),
        })
    }

    async fn estimate_gas<'a>(&'a self, from: Address, tx: &'a UnsignedTx) -> Result<u64> {
        let mut call = json!({
            "from": from,
            "data": tx.data,
            "value": tx.value,
        });
        if let Some(to) = tx.to {
            call["to"] = json!(to);
        }
        let gas: U64 = self.call("eth_estimateGas", vec![call]).await?;
        Ok(gas.to())
    }

    async fn send_raw_transaction<'a>(&'a self, raw: &'a Bytes) -> Result<B256> {
        self.call("eth_sendRawTransaction", vec![json!(raw)]).await
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        let receipt: Option<RpcReceipt> = self
            .call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await?;
        Ok(receipt.map(Receipt::from))
    }

    async fn latest_block(&self) -> Result<BlockRef> {
        let block = self.block_by_tag("latest").await?;
        Ok(BlockRef::from(&block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_decoding() {
        let receipt: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "status": "0x1",
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "contractAddress": null,
            "logs": []
        }))
        .unwrap();

        let receipt = Receipt::from(receipt);
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.gas_used, 21000);
        assert_eq!(receipt.contract_address, None);
    }

    #[test]
    fn test_failed_receipt_status() {
        let receipt: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": format!("0x{}", "01".repeat(32)),
            "status": "0x0",
            "blockNumber": "0x1",
            "gasUsed": "0x1",
        }))
        .unwrap();
        assert!(!Receipt::from(receipt).success);
    }

    #[test]
    fn test_block_ref_decoding() {
        let block: RpcBlock = serde_json::from_value(json!({
            "hash": format!("0x{}", "11".repeat(32)),
            "number": "0x2a",
            "parentHash": format!("0x{}", "22".repeat(32)),
            "timestamp": "0x64",
            "baseFeePerGas": "0x3b9aca00",
            "transactions": []
        }))
        .unwrap();

        let block_ref = BlockRef::from(&block);
        assert_eq!(block_ref.number, 42);
        assert_eq!(block_ref.timestamp, 100);
        assert_eq!(block.base_fee_per_gas.map(|fee| fee.to::<u128>()), Some(1_000_000_000));
    }

    #[test]
    fn test_max_fee_per_gas() {
        let fees = FeeSuggestion {
            base_fee: 10,
            priority_fee: 3,
        };
        assert_eq!(fees.max_fee_per_gas(), 23);
    }
}
