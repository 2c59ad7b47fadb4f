//! Network-specific constants for the standard superchain deployments.
//!
//! The tables are embedded at build time and parsed once by [`StandardConfig::load`]. The
//! resulting value is passed by reference to everything that needs it.

use std::collections::{BTreeMap, HashMap};

use alloy_core::primitives::{Address, B256, b256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

const TAGS_TOML: &str = include_str!("tags.toml");
const MAINNET_TOML: &str = include_str!("mainnet.toml");
const SEPOLIA_TOML: &str = include_str!("sepolia.toml");

pub const GAS_LIMIT: u64 = 60_000_000;
pub const BASEFEE_SCALAR: u32 = 1368;
pub const BLOB_BASE_FEE_SCALAR: u32 = 801949;
pub const WITHDRAWAL_DELAY_SECONDS: u64 = 604800;
pub const MIN_PROPOSAL_SIZE_BYTES: u64 = 126000;
pub const CHALLENGE_PERIOD_SECONDS: u64 = 86400;
pub const PROOF_MATURITY_DELAY_SECONDS: u64 = 604800;
pub const DISPUTE_GAME_FINALITY_DELAY_SECONDS: u64 = 302400;
pub const MIPS_VERSION: u64 = 1;
pub const DISPUTE_GAME_TYPE: u32 = 1;
pub const DISPUTE_MAX_GAME_DEPTH: u64 = 73;
pub const DISPUTE_SPLIT_DEPTH: u64 = 30;
pub const DISPUTE_CLOCK_EXTENSION: u64 = 10800;
pub const DISPUTE_MAX_CLOCK_DURATION: u64 = 302400;
pub const DISPUTE_ABSOLUTE_PRESTATE: B256 =
    b256!("038512e02c4c3f7bdaec27d00edf55b7155e0905301e1a88083e4e0a6764d54c");

pub const EIP1559_DENOMINATOR: u64 = 50;
pub const EIP1559_DENOMINATOR_CANYON: u64 = 250;
pub const EIP1559_ELASTICITY: u64 = 6;

/// Release tag used for L1 contracts when an intent does not choose one.
pub const DEFAULT_L1_CONTRACTS_TAG: &str = "op-contracts/v1.6.0";
/// Release tag used for L2 contracts when an intent does not choose one.
pub const DEFAULT_L2_CONTRACTS_TAG: &str = "op-contracts/v1.7.0-beta.1+l2-contracts";

const ARTIFACTS_URL_BASE: &str = "https://storage.googleapis.com/oplabs-contract-artifacts";

/// Raised for L1 chain ids with no standard deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display("unsupported L1 chain ID: {_0}")]
pub struct UnsupportedChain(pub u64);

impl std::error::Error for UnsupportedChain {}

/// The L1 networks with a standard superchain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum L1Network {
    Mainnet,
    Sepolia,
}

impl L1Network {
    pub fn chain_id(self) -> u64 {
        match self {
            Self::Mainnet => 1,
            Self::Sepolia => 11155111,
        }
    }

    fn manifest(self) -> &'static str {
        match self {
            Self::Mainnet => MAINNET_TOML,
            Self::Sepolia => SEPOLIA_TOML,
        }
    }
}

/// Prebuilt artifacts for one release tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaggedRelease {
    /// Source commit the artifacts were built from.
    pub commit: String,
    /// Checksum embedded in the artifact bundle's file name.
    pub artifacts_checksum: B256,
    /// SHA-256 of the downloaded bundle.
    pub artifacts_hash: B256,
}

impl TaggedRelease {
    pub fn artifacts_url(&self) -> Result<Url> {
        let url = format!(
            "{}/artifacts-v1-{}.tar.gz",
            ARTIFACTS_URL_BASE,
            hex::encode(self.artifacts_checksum)
        );
        Url::parse(&url).context("Failed to build artifacts URL")
    }
}

#[derive(Debug, Deserialize)]
struct TagTable {
    tags: BTreeMap<String, TaggedRelease>,
}

/// Addresses of the shared superchain contracts on one L1 network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperchainAddresses {
    pub superchain_config_proxy: Address,
    pub protocol_versions_proxy: Address,
}

/// One contract entry in a release's version manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractVersion {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// Version manifest of one release, keyed by contract name.
pub type L1Versions = BTreeMap<String, ContractVersion>;

/// Everything known about the standard deployment on one L1 network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StandardChain {
    pub chain_id: u64,
    pub name: String,
    /// Deployed contracts manager implementation.
    pub manager_impl: Address,
    /// Owner of the superchain proxy admin.
    pub manager_owner: Address,
    /// Default owner of system contracts.
    pub system_owner: Address,
    pub superchain: SuperchainAddresses,
    pub releases: BTreeMap<String, L1Versions>,
}

#[derive(Serialize)]
struct ReleasesDocument<'a> {
    releases: &'a BTreeMap<String, L1Versions>,
}

impl StandardChain {
    /// The version manifest for `tag`.
    pub fn versions(&self, tag: &str) -> Result<&L1Versions> {
        self.releases
            .get(tag)
            .with_context(|| format!("no {} release manifest for tag {}", self.name, tag))
    }

    /// The release manifests in the TOML layout consumed by deployment scripts.
    pub fn versions_toml(&self) -> Result<String> {
        toml::to_string(&ReleasesDocument {
            releases: &self.releases,
        })
        .context("Failed to serialize release manifest")
    }
}

/// Read-only lookup of the standard superchain constants.
#[derive(Debug, Clone)]
pub struct StandardConfig {
    chains: HashMap<u64, StandardChain>,
    tags: BTreeMap<String, TaggedRelease>,
}

impl StandardConfig {
    /// Parse and validate the embedded tables.
    pub fn load() -> Result<Self> {
        let TagTable { tags } =
            toml::from_str(TAGS_TOML).context("Failed to parse standard release tags")?;

        let mut chains = HashMap::new();
        for network in <L1Network as strum::IntoEnumIterator>::iter() {
            let chain: StandardChain = toml::from_str(network.manifest())
                .with_context(|| format!("Failed to parse standard config for {}", network))?;
            if chain.chain_id != network.chain_id() {
                anyhow::bail!(
                    "standard config for {} declares chain ID {}, expected {}",
                    network,
                    chain.chain_id,
                    network.chain_id()
                );
            }
            for tag in chain.releases.keys() {
                if !tags.contains_key(tag) {
                    anyhow::bail!("standard config for {} references unknown tag {}", network, tag);
                }
            }
            chains.insert(chain.chain_id, chain);
        }

        tracing::debug!(
            chains = chains.len(),
            tags = tags.len(),
            "Standard config loaded"
        );

        Ok(Self { chains, tags })
    }

    /// Whether `l1_chain_id` has a standard deployment.
    pub fn is_supported(&self, l1_chain_id: u64) -> bool {
        self.chains.contains_key(&l1_chain_id)
    }

    /// Standard deployment on `l1_chain_id`, or [`UnsupportedChain`].
    pub fn chain(&self, l1_chain_id: u64) -> Result<&StandardChain> {
        self.chains
            .get(&l1_chain_id)
            .ok_or(UnsupportedChain(l1_chain_id))
            .map_err(anyhow::Error::from)
    }

    /// Superchain addresses and the version manifest for `tag` on `l1_chain_id`.
    pub fn config_for(
        &self,
        l1_chain_id: u64,
        tag: &str,
    ) -> Result<(&SuperchainAddresses, &L1Versions)> {
        let chain = self.chain(l1_chain_id)?;
        Ok((&chain.superchain, chain.versions(tag)?))
    }

    /// Artifact metadata for a release tag.
    pub fn tag(&self, tag: &str) -> Result<&TaggedRelease> {
        self.tags
            .get(tag)
            .with_context(|| format!("unknown contracts release tag: {}", tag))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }
}
