//! Supported chains and known USDT deployments.
//!
//! This module defines the networks orders can settle on, their chain IDs and
//! display metadata, and the cross-chain routing selector used when a purchase
//! is relayed to a different destination chain.
//!
//! Lookups are pure: an unknown chain id yields `None` and is treated by the
//! UI as a display fallback, never a fatal error.

use alloy::primitives::{address, Address};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Networks the marketplace escrow contract is deployed on.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Ethereum mainnet (chain ID 1).
    #[serde(rename = "ethereum")]
    Ethereum,
    /// Polygon mainnet (chain ID 137).
    #[serde(rename = "polygon")]
    Polygon,
    /// Polygon Amoy testnet (chain ID 80002).
    #[serde(rename = "polygon-amoy")]
    PolygonAmoy,
    /// BSC mainnet (chain ID 56).
    #[serde(rename = "bsc")]
    Bsc,
    /// BSC testnet (chain ID 97).
    #[serde(rename = "bsc-testnet")]
    BscTestnet,
    /// Avalanche C-Chain (chain ID 43114).
    #[serde(rename = "avalanche")]
    Avalanche,
    /// Avalanche Fuji testnet (chain ID 43113).
    #[serde(rename = "avalanche-fuji")]
    AvalancheFuji,
    /// Base mainnet (chain ID 8453).
    #[serde(rename = "base")]
    Base,
    /// Base Sepolia testnet (chain ID 84532).
    #[serde(rename = "base-sepolia")]
    BaseSepolia,
    /// Ethereum Sepolia testnet (chain ID 11155111).
    #[serde(rename = "sepolia")]
    Sepolia,
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Ethereum => write!(f, "ethereum"),
            Network::Polygon => write!(f, "polygon"),
            Network::PolygonAmoy => write!(f, "polygon-amoy"),
            Network::Bsc => write!(f, "bsc"),
            Network::BscTestnet => write!(f, "bsc-testnet"),
            Network::Avalanche => write!(f, "avalanche"),
            Network::AvalancheFuji => write!(f, "avalanche-fuji"),
            Network::Base => write!(f, "base"),
            Network::BaseSepolia => write!(f, "base-sepolia"),
            Network::Sepolia => write!(f, "sepolia"),
        }
    }
}

/// Static display and routing metadata for one chain.
///
/// `ccip_selector` is the cross-chain message-routing selector; `None` means
/// the chain cannot be a cross-chain purchase destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: &'static str,
    pub native_currency: &'static str,
    pub ccip_selector: Option<u64>,
}

static DESCRIPTORS: &[ChainDescriptor] = &[
    ChainDescriptor {
        chain_id: 1,
        name: "Ethereum",
        native_currency: "ETH",
        ccip_selector: Some(5009297550715157269),
    },
    ChainDescriptor {
        chain_id: 137,
        name: "Polygon",
        native_currency: "POL",
        ccip_selector: Some(4051577828743386545),
    },
    ChainDescriptor {
        chain_id: 80002,
        name: "Polygon Amoy",
        native_currency: "POL",
        ccip_selector: Some(16281711391670634445),
    },
    ChainDescriptor {
        chain_id: 56,
        name: "BNB Smart Chain",
        native_currency: "BNB",
        ccip_selector: Some(11344663589394136015),
    },
    ChainDescriptor {
        chain_id: 97,
        name: "BSC Testnet",
        native_currency: "tBNB",
        ccip_selector: Some(13264668187771770619),
    },
    ChainDescriptor {
        chain_id: 43114,
        name: "Avalanche",
        native_currency: "AVAX",
        ccip_selector: Some(6433500567565415381),
    },
    ChainDescriptor {
        chain_id: 43113,
        name: "Avalanche Fuji",
        native_currency: "AVAX",
        ccip_selector: Some(14767482510784806043),
    },
    ChainDescriptor {
        chain_id: 8453,
        name: "Base",
        native_currency: "ETH",
        ccip_selector: Some(15971525489660198786),
    },
    ChainDescriptor {
        chain_id: 84532,
        name: "Base Sepolia",
        native_currency: "ETH",
        ccip_selector: Some(10344971235874465080),
    },
    ChainDescriptor {
        chain_id: 11155111,
        name: "Sepolia",
        native_currency: "ETH",
        ccip_selector: Some(16015286601757825753),
    },
];

impl Network {
    /// Return all known [`Network`] variants.
    pub fn variants() -> &'static [Network] {
        &[
            Network::Ethereum,
            Network::Polygon,
            Network::PolygonAmoy,
            Network::Bsc,
            Network::BscTestnet,
            Network::Avalanche,
            Network::AvalancheFuji,
            Network::Base,
            Network::BaseSepolia,
            Network::Sepolia,
        ]
    }

    /// Numeric chain id used in transactions and wallet network checks.
    pub fn chain_id(&self) -> u64 {
        self.descriptor().chain_id
    }

    /// Attempts to resolve a Network from an EVM chain ID.
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            1 => Some(Network::Ethereum),
            137 => Some(Network::Polygon),
            80002 => Some(Network::PolygonAmoy),
            56 => Some(Network::Bsc),
            97 => Some(Network::BscTestnet),
            43114 => Some(Network::Avalanche),
            43113 => Some(Network::AvalancheFuji),
            8453 => Some(Network::Base),
            84532 => Some(Network::BaseSepolia),
            11155111 => Some(Network::Sepolia),
            _ => None,
        }
    }

    /// Static metadata for this network.
    pub fn descriptor(&self) -> &'static ChainDescriptor {
        match self {
            Network::Ethereum => &DESCRIPTORS[0],
            Network::Polygon => &DESCRIPTORS[1],
            Network::PolygonAmoy => &DESCRIPTORS[2],
            Network::Bsc => &DESCRIPTORS[3],
            Network::BscTestnet => &DESCRIPTORS[4],
            Network::Avalanche => &DESCRIPTORS[5],
            Network::AvalancheFuji => &DESCRIPTORS[6],
            Network::Base => &DESCRIPTORS[7],
            Network::BaseSepolia => &DESCRIPTORS[8],
            Network::Sepolia => &DESCRIPTORS[9],
        }
    }

    /// Cross-chain routing selector, if this chain can be a destination.
    pub fn ccip_selector(&self) -> Option<u64> {
        self.descriptor().ccip_selector
    }

    /// Resolve a network from its routing selector.
    pub fn from_ccip_selector(selector: u64) -> Option<Self> {
        Network::variants()
            .iter()
            .copied()
            .find(|n| n.ccip_selector() == Some(selector))
    }

    /// Returns true if this is a testnet.
    pub fn is_testnet(&self) -> bool {
        matches!(
            self,
            Network::PolygonAmoy
                | Network::BscTestnet
                | Network::AvalancheFuji
                | Network::BaseSepolia
                | Network::Sepolia
        )
    }
}

/// Pure registry lookup: descriptor for a chain id, `None` for unknown chains.
pub fn describe(chain_id: u64) -> Option<&'static ChainDescriptor> {
    Network::from_chain_id(chain_id).map(|n| n.descriptor())
}

/// A known USDT deployment on one network.
#[derive(Clone, Debug)]
pub struct UsdtDeployment {
    pub address: Address,
    pub decimals: u8,
    pub network: Network,
}

static USDT_ETHEREUM: Lazy<UsdtDeployment> = Lazy::new(|| UsdtDeployment {
    address: address!("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
    decimals: 6,
    network: Network::Ethereum,
});

static USDT_POLYGON: Lazy<UsdtDeployment> = Lazy::new(|| UsdtDeployment {
    address: address!("0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
    decimals: 6,
    network: Network::Polygon,
});

static USDT_POLYGON_AMOY: Lazy<UsdtDeployment> = Lazy::new(|| UsdtDeployment {
    // Marketplace test token, not a canonical bridged USDT
    address: address!("0x1616d425Cd540B256475cBfb604586C8598eC0FB"),
    decimals: 6,
    network: Network::PolygonAmoy,
});

static USDT_BSC: Lazy<UsdtDeployment> = Lazy::new(|| UsdtDeployment {
    address: address!("0x55d398326f99059fF775485246999027B3197955"),
    decimals: 18,
    network: Network::Bsc,
});

static USDT_BSC_TESTNET: Lazy<UsdtDeployment> = Lazy::new(|| UsdtDeployment {
    address: address!("0x337610d27c682E347C9cD60BD4b3b107C9d34dDd"),
    decimals: 18,
    network: Network::BscTestnet,
});

static USDT_AVALANCHE: Lazy<UsdtDeployment> = Lazy::new(|| UsdtDeployment {
    address: address!("0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7"),
    decimals: 6,
    network: Network::Avalanche,
});

static USDT_AVALANCHE_FUJI: Lazy<UsdtDeployment> = Lazy::new(|| UsdtDeployment {
    // Marketplace test token
    address: address!("0x6aD7e9E0b33D3bafACc987B4E556340d2f7b8a31"),
    decimals: 6,
    network: Network::AvalancheFuji,
});

static USDT_BASE: Lazy<UsdtDeployment> = Lazy::new(|| UsdtDeployment {
    address: address!("0xfde4C96c8593536E31F229EA8f37b2ADa2699bb2"),
    decimals: 6,
    network: Network::Base,
});

static USDT_BASE_SEPOLIA: Lazy<UsdtDeployment> = Lazy::new(|| UsdtDeployment {
    // Marketplace test token
    address: address!("0xd7e9C75C6C05FdE929cAc19bb887892de78819B7"),
    decimals: 6,
    network: Network::BaseSepolia,
});

static USDT_SEPOLIA: Lazy<UsdtDeployment> = Lazy::new(|| UsdtDeployment {
    // Marketplace test token
    address: address!("0x7169D38820dfd117C3FA1f22a697dBA58d90BA06"),
    decimals: 6,
    network: Network::Sepolia,
});

impl UsdtDeployment {
    /// Return the known USDT deployment for the given network.
    pub fn by_network(network: Network) -> &'static UsdtDeployment {
        match network {
            Network::Ethereum => &USDT_ETHEREUM,
            Network::Polygon => &USDT_POLYGON,
            Network::PolygonAmoy => &USDT_POLYGON_AMOY,
            Network::Bsc => &USDT_BSC,
            Network::BscTestnet => &USDT_BSC_TESTNET,
            Network::Avalanche => &USDT_AVALANCHE,
            Network::AvalancheFuji => &USDT_AVALANCHE_FUJI,
            Network::Base => &USDT_BASE,
            Network::BaseSepolia => &USDT_BASE_SEPOLIA,
            Network::Sepolia => &USDT_SEPOLIA,
        }
    }
}
