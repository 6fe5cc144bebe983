//! Symbol combinatorics for the alt/strong/stable triangle and ingester sharding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable assets known to the exchange. Never eligible as alts.
pub const STABLE_ASSETS: &[&str] = &[
    "USDT", "DAI", "BUSD", "TUSD", "USDC", "UST", "DGX", "PAX", "USDN", "TRIBE",
];

/// Default strong (intermediate hop) assets.
pub const STRONG_ASSETS: &[&str] = &["BTC", "ETH", "BNB"];

pub fn symbol(base: &str, quote: &str) -> String {
    format!("{}{}", base, quote)
}

pub fn strong_alt_combos<S: AsRef<str>>(strong: &str, alts: &[S]) -> Vec<String> {
    alts.iter().map(|alt| symbol(alt.as_ref(), strong)).collect()
}

pub fn stable_alt_combos<S: AsRef<str>>(stable: &str, alts: &[S]) -> Vec<String> {
    alts.iter().map(|alt| symbol(alt.as_ref(), stable)).collect()
}

pub fn strong_stable_combos<S: AsRef<str>>(strongs: &[S], stables: &[S]) -> Vec<String> {
    stables
        .iter()
        .flat_map(|stable| {
            strongs
                .iter()
                .map(move |strong| symbol(strong.as_ref(), stable.as_ref()))
        })
        .collect()
}

/// alt×strong for every strong, then alt×stable for every stable, then strong×stable.
pub fn all_combos<S: AsRef<str>>(alts: &[S], strongs: &[S], stables: &[S]) -> Vec<String> {
    let mut out = Vec::new();
    for strong in strongs {
        out.extend(strong_alt_combos(strong.as_ref(), alts));
    }
    for stable in stables {
        out.extend(stable_alt_combos(stable.as_ref(), alts));
    }
    out.extend(strong_stable_combos(strongs, stables));
    out
}

/// Which combination set an ingester covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    #[default]
    All,
    AltStable,
    AltStrong,
    StrongStable,
}

impl SymbolKind {
    pub fn combos<S: AsRef<str>>(&self, alts: &[S], strongs: &[S], stables: &[S]) -> Vec<String> {
        match self {
            SymbolKind::All => all_combos(alts, strongs, stables),
            SymbolKind::AltStable => stables
                .iter()
                .flat_map(|stable| stable_alt_combos(stable.as_ref(), alts))
                .collect(),
            SymbolKind::AltStrong => strongs
                .iter()
                .flat_map(|strong| strong_alt_combos(strong.as_ref(), alts))
                .collect(),
            SymbolKind::StrongStable => strong_stable_combos(strongs, stables),
        }
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(SymbolKind::All),
            "alt_stable" => Ok(SymbolKind::AltStable),
            "alt_strong" => Ok(SymbolKind::AltStrong),
            "strong_stable" => Ok(SymbolKind::StrongStable),
            other => Err(format!("Invalid symbol kind: {}", other)),
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SymbolKind::All => "all",
            SymbolKind::AltStable => "alt_stable",
            SymbolKind::AltStrong => "alt_strong",
            SymbolKind::StrongStable => "strong_stable",
        };
        write!(f, "{}", name)
    }
}

/// A contiguous slice of a symbol list, written `page/total` with 1-based pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionSpec {
    pub page: usize,
    pub total: usize,
}

impl PartitionSpec {
    pub const WHOLE: PartitionSpec = PartitionSpec { page: 1, total: 1 };

    pub fn new(page: usize, total: usize) -> Result<Self, String> {
        if total == 0 {
            return Err("Partition total must be greater than 0".to_string());
        }
        if page == 0 || page > total {
            return Err(format!("Partition page {} out of range 1..={}", page, total));
        }
        Ok(Self { page, total })
    }

    /// The slice of `items` owned by this page. The remainder of an uneven split goes to
    /// the first pages, one extra item each.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let base = items.len() / self.total;
        let extra = items.len() % self.total;
        let index = self.page - 1;
        let start = index * base + index.min(extra);
        let len = base + usize::from(index < extra);
        &items[start..start + len]
    }
}

impl Default for PartitionSpec {
    fn default() -> Self {
        Self::WHOLE
    }
}

impl FromStr for PartitionSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (page, total) = s
            .split_once('/')
            .ok_or_else(|| format!("Invalid partition '{}', expected page/total", s))?;
        let page = page
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("Invalid partition page '{}': {}", page, e))?;
        let total = total
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("Invalid partition total '{}': {}", total, e))?;
        PartitionSpec::new(page, total)
    }
}

impl TryFrom<String> for PartitionSpec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PartitionSpec> for String {
    fn from(value: PartitionSpec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.page, self.total)
    }
}
