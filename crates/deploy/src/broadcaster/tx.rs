//! EIP-1559 transaction encoding and signing.

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    rlp::{EMPTY_STRING_CODE, Encodable, Header},
};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};

const EIP1559_TX_TYPE: u8 = 0x02;

/// A type-2 transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Tx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

/// A signed transaction as submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Bytes,
    pub hash: B256,
}

impl Eip1559Tx {
    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        match self.to {
            Some(to) => to.encode(out),
            None => out.push(EMPTY_STRING_CODE),
        }
        self.value.encode(out);
        self.data.encode(out);
        // empty access list
        Header {
            list: true,
            payload_length: 0,
        }
        .encode(out);
    }

    fn envelope(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 10);
        out.push(EIP1559_TX_TYPE);
        Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(payload);
        out
    }

    /// Hash the signer commits to.
    pub fn signing_hash(&self) -> B256 {
        let mut payload = Vec::new();
        self.encode_fields(&mut payload);
        keccak256(Self::envelope(&payload))
    }

    pub fn sign(&self, signer: &PrivateKeySigner) -> Result<SignedTx> {
        let hash = self.signing_hash();
        let (signature, recovery_id) = signer
            .credential()
            .sign_prehash_recoverable(hash.as_slice())
            .context("Failed to sign transaction")?;

        let bytes = signature.to_bytes();
        let r = U256::from_be_slice(&bytes[..32]);
        let s = U256::from_be_slice(&bytes[32..]);

        let mut payload = Vec::new();
        self.encode_fields(&mut payload);
        u64::from(recovery_id.is_y_odd()).encode(&mut payload);
        r.encode(&mut payload);
        s.encode(&mut payload);

        let raw = Self::envelope(&payload);
        Ok(SignedTx {
            hash: keccak256(&raw),
            raw: Bytes::from(raw),
        })
    }
}
