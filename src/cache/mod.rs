//! Four-layer memoisation beside the pipeline
//!
//! | Layer | Key | Value | Lifetime |
//! |---|---|---|---|
//! | L1 parse | source string | AST root | until evicted |
//! | L2 evaluation | AST identity (+ env identity) | result | until evicted |
//! | L3 differentiation | (AST identity, variable, order) | derivative AST | until evicted |
//! | L4 sub-expression | structural hash | f64 | one evaluate call |
//!
//! The manager has no internal synchronisation; each `Texpr` owns one and
//! the facade's `&mut self` methods keep access exclusive.

pub(crate) mod keys;
pub(crate) mod store;

use std::sync::Arc;
use std::time::Duration;

use crate::ast::Expr;
use crate::cache::keys::{DiffKey, EvalKey, Variables};
use crate::cache::store::CacheStore;
use crate::core::value::Value;

pub use crate::cache::store::LayerStatistics;

/// Which entry to discard when a layer reaches capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Evict the least-recently-used entry.
    #[default]
    Lru,
    /// Evict an entry from the lowest frequency bucket.
    Lfu,
}

/// Per-layer capacities and shared policy knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// L1 capacity; 0 disables.
    pub parsed_expression_cache_size: usize,
    /// L2 capacity (each sub-map); 0 disables.
    pub evaluation_result_cache_size: usize,
    /// L3 capacity; 0 disables.
    pub differentiation_cache_size: usize,
    /// L4 capacity; 0 disables.
    pub sub_expression_cache_size: usize,
    /// Sources longer than this bypass L1.
    pub max_cache_input_length: usize,
    /// LRU or LFU, cache-global.
    pub eviction_policy: EvictionPolicy,
    /// Optional maximum entry age.
    pub time_to_live: Option<Duration>,
    /// Enable hit/miss/eviction counters.
    pub collect_statistics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            parsed_expression_cache_size: 128,
            evaluation_result_cache_size: 256,
            differentiation_cache_size: 64,
            sub_expression_cache_size: 512,
            max_cache_input_length: 5120,
            eviction_policy: EvictionPolicy::Lru,
            time_to_live: None,
            collect_statistics: false,
        }
    }
}

impl CacheConfig {
    /// Every layer off.
    pub fn disabled() -> Self {
        CacheConfig {
            parsed_expression_cache_size: 0,
            evaluation_result_cache_size: 0,
            differentiation_cache_size: 0,
            sub_expression_cache_size: 0,
            ..CacheConfig::default()
        }
    }

    /// Larger layers for long-running embedders.
    pub fn high_performance() -> Self {
        CacheConfig {
            parsed_expression_cache_size: 1024,
            evaluation_result_cache_size: 2048,
            differentiation_cache_size: 256,
            sub_expression_cache_size: 4096,
            ..CacheConfig::default()
        }
    }

    /// Defaults plus statistics counters.
    pub fn with_statistics() -> Self {
        CacheConfig {
            collect_statistics: true,
            ..CacheConfig::default()
        }
    }

    /// Small layers for memory-constrained embedders.
    pub fn minimal() -> Self {
        CacheConfig {
            parsed_expression_cache_size: 16,
            evaluation_result_cache_size: 32,
            differentiation_cache_size: 8,
            sub_expression_cache_size: 64,
            ..CacheConfig::default()
        }
    }

    /// Set the eviction policy.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Set the entry time-to-live.
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Enable or disable statistics counters.
    pub fn collect_statistics(mut self, on: bool) -> Self {
        self.collect_statistics = on;
        self
    }
}

/// Aggregated statistics across the four layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    /// L1 parse cache.
    pub parse: LayerStatistics,
    /// L2 evaluation cache (constant and general sub-maps combined).
    pub evaluation: LayerStatistics,
    /// L3 differentiation cache.
    pub differentiation: LayerStatistics,
    /// L4 sub-expression cache (counters accumulate across calls).
    pub sub_expression: LayerStatistics,
}

impl CacheStatistics {
    /// Hits across all layers.
    pub fn total_hits(&self) -> u64 {
        self.parse.hits + self.evaluation.hits + self.differentiation.hits + self.sub_expression.hits
    }

    /// Misses across all layers.
    pub fn total_misses(&self) -> u64 {
        self.parse.misses
            + self.evaluation.misses
            + self.differentiation.misses
            + self.sub_expression.misses
    }
}

/// The four layers, owned by one `Texpr` instance.
pub(crate) struct CacheManager {
    parse: CacheStore<String, Arc<Expr>>,
    eval_constant: CacheStore<u64, Value>,
    eval_general: CacheStore<EvalKey, Value>,
    diff: CacheStore<DiffKey, Arc<Expr>>,
    sub: CacheStore<u64, f64>,
    max_input_length: usize,
}

impl CacheManager {
    pub(crate) fn new(config: &CacheConfig) -> Self {
        let layer = |capacity| {
            (
                capacity,
                config.eviction_policy,
                config.time_to_live,
                config.collect_statistics,
            )
        };
        let (c, p, t, s) = layer(config.parsed_expression_cache_size);
        let parse = CacheStore::new(c, p, t, s);
        let (c, p, t, s) = layer(config.evaluation_result_cache_size);
        let eval_constant = CacheStore::new(c, p, t, s);
        let (c, p, t, s) = layer(config.evaluation_result_cache_size);
        let eval_general = CacheStore::new(c, p, t, s);
        let (c, p, t, s) = layer(config.differentiation_cache_size);
        let diff = CacheStore::new(c, p, t, s);
        let (c, p, t, s) = layer(config.sub_expression_cache_size);
        let sub = CacheStore::new(c, p, t, s);
        CacheManager {
            parse,
            eval_constant,
            eval_general,
            diff,
            sub,
            max_input_length: config.max_cache_input_length,
        }
    }

    // --- L1 ---

    pub(crate) fn get_parsed(&mut self, source: &str) -> Option<Arc<Expr>> {
        if source.len() > self.max_input_length {
            return None;
        }
        self.parse.get(&source.to_string())
    }

    pub(crate) fn store_parsed(&mut self, source: &str, ast: Arc<Expr>) {
        if source.len() > self.max_input_length {
            return;
        }
        self.parse.insert(source.to_string(), ast);
    }

    // --- L2 ---

    /// The constant sub-map serves empty environments keyed by AST identity
    /// alone; the general sub-map keys on both identities.
    pub(crate) fn get_eval(&mut self, ast: &Expr, vars: &Variables) -> Option<Value> {
        if vars.is_empty() {
            self.eval_constant.get(&ast.identity())
        } else {
            self.eval_general.get(&EvalKey {
                ast: ast.identity(),
                env: vars.identity(),
            })
        }
    }

    pub(crate) fn store_eval(&mut self, ast: &Expr, vars: &Variables, value: Value) {
        if vars.is_empty() {
            self.eval_constant.insert(ast.identity(), value);
        } else {
            self.eval_general.insert(
                EvalKey {
                    ast: ast.identity(),
                    env: vars.identity(),
                },
                value,
            );
        }
    }

    // --- L3 ---

    pub(crate) fn get_derivative(&mut self, key: &DiffKey) -> Option<Arc<Expr>> {
        self.diff.get(key)
    }

    pub(crate) fn store_derivative(&mut self, key: DiffKey, ast: Arc<Expr>) {
        self.diff.insert(key, ast);
    }

    // --- L4 ---

    pub(crate) fn get_sub_expression(&mut self, hash: u64) -> Option<f64> {
        self.sub.get(&hash)
    }

    pub(crate) fn store_sub_expression(&mut self, hash: u64, value: f64) {
        self.sub.insert(hash, value);
    }

    /// Release the transient sub-expression entries; called after every
    /// top-level evaluation returns.
    pub(crate) fn end_evaluation(&mut self) {
        self.sub.clear();
    }

    // --- Maintenance ---

    pub(crate) fn clear_all(&mut self) {
        self.parse.clear();
        self.eval_constant.clear();
        self.eval_general.clear();
        self.diff.clear();
        self.sub.clear();
    }

    pub(crate) fn clear_parse(&mut self) {
        self.parse.clear();
    }

    pub(crate) fn remove_expired(&mut self) {
        self.parse.remove_expired();
        self.eval_constant.remove_expired();
        self.eval_general.remove_expired();
        self.diff.remove_expired();
        self.sub.remove_expired();
    }

    pub(crate) fn statistics(&self) -> CacheStatistics {
        let constant = self.eval_constant.statistics();
        let general = self.eval_general.statistics();
        CacheStatistics {
            parse: self.parse.statistics(),
            evaluation: LayerStatistics {
                hits: constant.hits + general.hits,
                misses: constant.misses + general.misses,
                evictions: constant.evictions + general.evictions,
                size: constant.size + general.size,
            },
            differentiation: self.diff.statistics(),
            sub_expression: self.sub.statistics(),
        }
    }
}
