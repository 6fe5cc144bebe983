//! Which symbols one ingester owns.

use common::models::{AssetUniverse, ValidSymbols};
use common::symbols::{PartitionSpec, SymbolKind};
use config::AssetsConfig;

/// The `kind` combinations of the current universe that the exchange trades, cut down
/// to the `partition` slice.
pub fn shard_symbols(
    universe: &AssetUniverse,
    valid: &ValidSymbols,
    assets: &AssetsConfig,
    kind: SymbolKind,
    partition: PartitionSpec,
) -> Vec<String> {
    let stables = [assets.stable.clone()];
    let symbols: Vec<String> = kind
        .combos(&universe.assets, &assets.strong, &stables)
        .into_iter()
        .filter(|symbol| valid.contains(symbol))
        .collect();
    partition.slice(&symbols).to_vec()
}
