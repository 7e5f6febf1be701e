//! Symbol Normalization
//!
//! Maps an exchange-native base asset to the canonical asset symbol used
//! across the system.
//!
//! # Rules
//!
//! 1. Only pairs whose status is `TRADING` are accepted.
//! 2. Assets the symbol table does not recognize go through a fixed table
//!    of historical ticker renames; anything still unknown is rejected.
//! 3. Blacklisted symbols are rejected.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

/// Status value Binance reports for pairs that are open for trading.
pub const TRADING_STATUS: &str = "TRADING";

/// Historical ticker renames: venue ticker → canonical symbol.
///
/// These cannot be derived from the symbol table; they record tickers the
/// venue kept after the asset was renamed or redenominated elsewhere.
pub const HISTORICAL_RENAMES: &[(&str, &str)] = &[
    ("IOTA", "MIOTA"),
    ("YOYO", "YOYOW"),
    ("BQX", "ETHOS"),
    ("BCC", "BCH"),
];

// =============================================================================
// Symbol Table Port
// =============================================================================

/// Canonical symbol lookup and validation.
#[cfg_attr(test, mockall::automock)]
pub trait SymbolTable: Send + Sync {
    /// Full asset name for a symbol, or the symbol itself when unknown.
    fn name_for_symbol(&self, symbol: &str) -> String;

    /// Whether the identifier is itself a known asset name.
    fn symbol_is_name(&self, symbol: &str) -> bool;

    /// Whether the symbol is excluded from collection.
    fn symbol_is_blacklisted(&self, symbol: &str) -> bool;
}

// =============================================================================
// Normalizer
// =============================================================================

/// Rejections produced by [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// Pair is not currently tradable.
    #[error("symbol {asset} with foreign name {foreign_name} is {status}")]
    NotTrading {
        /// Exchange-native pair name.
        foreign_name: String,
        /// Base asset.
        asset: String,
        /// Reported trading status.
        status: String,
    },

    /// Asset is not known to the symbol table and has no rename.
    #[error("foreign name can not be normalized: {foreign_name} symbol: {asset}")]
    UnmappableSymbol {
        /// Exchange-native pair name.
        foreign_name: String,
        /// Base asset.
        asset: String,
    },

    /// Symbol is on the exclusion list.
    #[error("symbol is blacklisted: {0}")]
    Blacklisted(String),
}

impl NormalizeError {
    /// Short label for metrics and logs.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NotTrading { .. } => "not_trading",
            Self::UnmappableSymbol { .. } => "unmappable",
            Self::Blacklisted(_) => "blacklisted",
        }
    }
}

/// Normalize an exchange-native base asset to its canonical symbol.
///
/// # Errors
///
/// Returns `NotTrading` when `status` is not [`TRADING_STATUS`],
/// `UnmappableSymbol` when the asset is unknown and has no historical rename,
/// and `Blacklisted` when the resulting symbol is excluded.
pub fn normalize(
    foreign_name: &str,
    asset: &str,
    status: &str,
    table: &dyn SymbolTable,
) -> Result<String, NormalizeError> {
    if status != TRADING_STATUS {
        return Err(NormalizeError::NotTrading {
            foreign_name: foreign_name.to_string(),
            asset: asset.to_string(),
            status: status.to_string(),
        });
    }

    let recognized = table.name_for_symbol(asset) != asset || table.symbol_is_name(asset);

    let symbol = if recognized {
        asset.to_string()
    } else {
        historical_rename(asset)
            .ok_or_else(|| NormalizeError::UnmappableSymbol {
                foreign_name: foreign_name.to_string(),
                asset: asset.to_string(),
            })?
            .to_string()
    };

    if table.symbol_is_blacklisted(&symbol) {
        return Err(NormalizeError::Blacklisted(symbol));
    }

    Ok(symbol)
}

fn historical_rename(asset: &str) -> Option<&'static str> {
    HISTORICAL_RENAMES
        .iter()
        .find(|(from, _)| *from == asset)
        .map(|(_, to)| *to)
}

// =============================================================================
// Static Symbol Table
// =============================================================================

/// Assets known out of the box: symbol → name.
const DEFAULT_ASSETS: &[(&str, &str)] = &[
    ("BTC", "Bitcoin"),
    ("ETH", "Ethereum"),
    ("BNB", "Binance Coin"),
    ("XRP", "XRP Ledger"),
    ("ADA", "Cardano"),
    ("SOL", "Solana"),
    ("DOGE", "Dogecoin"),
    ("DOT", "Polkadot"),
    ("LTC", "Litecoin"),
    ("LINK", "Chainlink"),
    ("TRX", "Tron"),
    ("XLM", "Stellar"),
    ("ATOM", "Cosmos"),
    ("ETC", "Ethereum Classic"),
    ("BCH", "Bitcoin Cash"),
    ("EOS", "EOS.IO"),
    ("NEO", "Neo"),
    ("XMR", "Monero"),
    ("ZEC", "Zcash"),
    ("DASH", "Dash Coin"),
    ("USDT", "Tether"),
    ("USDC", "USD Coin"),
];

/// Errors loading a symbol table from disk.
#[derive(Debug, thiserror::Error)]
pub enum SymbolTableError {
    /// File could not be read.
    #[error("failed to read symbol table: {0}")]
    Io(#[from] std::io::Error),

    /// File is not a valid symbol table document.
    #[error("failed to parse symbol table: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct SymbolTableFile {
    #[serde(default)]
    names: HashMap<String, String>,
    #[serde(default)]
    blacklist: Vec<String>,
}

/// In-memory [`SymbolTable`].
#[derive(Debug, Clone, Default)]
pub struct StaticSymbolTable {
    names: HashMap<String, String>,
    known_names: HashSet<String>,
    blacklist: HashSet<String>,
}

impl StaticSymbolTable {
    /// Create a table from symbol → name entries and a blacklist.
    #[must_use]
    pub fn new(
        names: impl IntoIterator<Item = (String, String)>,
        blacklist: impl IntoIterator<Item = String>,
    ) -> Self {
        let names: HashMap<String, String> = names.into_iter().collect();
        let known_names = names.values().cloned().collect();
        Self {
            names,
            known_names,
            blacklist: blacklist.into_iter().collect(),
        }
    }

    /// Create a table holding the built-in asset list.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_ASSETS
                .iter()
                .map(|(symbol, name)| ((*symbol).to_string(), (*name).to_string())),
            Vec::new(),
        )
    }

    /// Load a table from a JSON document of the form
    /// `{"names": {"BTC": "Bitcoin"}, "blacklist": ["XYZ"]}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SymbolTableError> {
        let contents = std::fs::read_to_string(path)?;
        let file: SymbolTableFile = serde_json::from_str(&contents)?;
        Ok(Self::new(file.names, file.blacklist))
    }

    /// Add symbols to the blacklist.
    #[must_use]
    pub fn with_blacklist(mut self, symbols: impl IntoIterator<Item = String>) -> Self {
        self.blacklist.extend(symbols);
        self
    }

    /// Number of symbols with a known name.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the table knows no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl SymbolTable for StaticSymbolTable {
    fn name_for_symbol(&self, symbol: &str) -> String {
        self.names
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| symbol.to_string())
    }

    fn symbol_is_name(&self, symbol: &str) -> bool {
        self.known_names.contains(symbol)
    }

    fn symbol_is_blacklisted(&self, symbol: &str) -> bool {
        self.blacklist.contains(symbol)
    }
}

// =============================================================================
// Tests
// =============================================================================
