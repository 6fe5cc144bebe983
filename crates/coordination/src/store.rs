//! In-process keyed record store.
//!
//! Records are kept as JSON values under `tria_bot:<namespace>:<pk>` keys, so every
//! reader gets its own decoded copy and writers are last-writer-wins.

use async_trait::async_trait;
use common::errors::StoreError;
use common::models::{
    AssetUniverse, Depth, Record, SymbolInfo, Ticker, TradeReport, ValidSymbols,
};
use common::quantize::SymbolRules;
use common::traits::Repository;
use dashmap::DashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Shared handle to the store. Cloning is cheap and every clone sees the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed view over one namespace of this store.
    pub fn repository<T: Record>(&self) -> StoreRepository<T> {
        StoreRepository {
            store: self.clone(),
            _record: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct StoreRepository<T> {
    store: MemoryStore,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for StoreRepository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Record> Repository<T> for StoreRepository<T> {
    async fn get(&self, pk: &str) -> Result<T, StoreError> {
        let value = self
            .store
            .entries
            .get(&T::key(pk))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                namespace: T::NAMESPACE.to_string(),
                pk: pk.to_string(),
            })?;
        serde_json::from_value(value).map_err(|e| StoreError::Codec(e.to_string()))
    }

    async fn save(&self, record: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(record).map_err(|e| StoreError::Codec(e.to_string()))?;
        self.store.entries.insert(T::key(&record.pk()), value);
        Ok(())
    }

    async fn all_pks(&self) -> Result<Vec<String>, StoreError> {
        let prefix = T::key("");
        let mut pks: Vec<String> = self
            .store
            .entries
            .iter()
            .filter_map(|entry| entry.key().strip_prefix(&prefix).map(str::to_string))
            .collect();
        pks.sort();
        Ok(pks)
    }
}

/// One repository per entity, handed to every service constructor.
#[derive(Clone)]
pub struct Repositories {
    pub universe: Arc<dyn Repository<AssetUniverse>>,
    pub valid_symbols: Arc<dyn Repository<ValidSymbols>>,
    pub symbols: Arc<dyn Repository<SymbolInfo>>,
    pub depths: Arc<dyn Repository<Depth>>,
    pub tickers: Arc<dyn Repository<Ticker>>,
    pub reports: Arc<dyn Repository<TradeReport>>,
}

impl Repositories {
    pub fn in_memory(store: &MemoryStore) -> Self {
        Self {
            universe: Arc::new(store.repository::<AssetUniverse>()),
            valid_symbols: Arc::new(store.repository::<ValidSymbols>()),
            symbols: Arc::new(store.repository::<SymbolInfo>()),
            depths: Arc::new(store.repository::<Depth>()),
            tickers: Arc::new(store.repository::<Ticker>()),
            reports: Arc::new(store.repository::<TradeReport>()),
        }
    }

    /// Quantization rules of every valid symbol that has its info stored.
    pub async fn symbol_rules(&self, valid: &ValidSymbols) -> Result<SymbolRules, StoreError> {
        let mut infos = Vec::with_capacity(valid.symbols.len());
        for symbol in &valid.symbols {
            match self.symbols.find(symbol).await? {
                Some(info) => infos.push(info),
                None => warn!(symbol = %symbol, "No symbol info stored"),
            }
        }
        Ok(SymbolRules::new(infos))
    }
}
