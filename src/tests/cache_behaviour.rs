//! Cache layer behaviour through the facade.

use std::time::Duration;

use crate::{CacheConfig, EvictionPolicy, Texpr, TexprConfig, Value, Variables};

fn instrumented() -> Texpr {
    Texpr::with_config(TexprConfig::new().cache(CacheConfig::with_statistics()))
}

#[test]
fn cold_and_warm_results_are_equal() {
    let vars: Variables = [("x", 1.25)].into_iter().collect();
    let source = "\\sin{x} + x^2";

    let mut cold = Texpr::with_config(TexprConfig::new().cache(CacheConfig::disabled()));
    let cold_value = cold.evaluate(source, &vars).unwrap();

    let mut warm = instrumented();
    warm.warm_up_cache([source]);
    let first = warm.evaluate(source, &vars).unwrap();
    let second = warm.evaluate(source, &vars).unwrap();

    assert_eq!(cold_value, first);
    assert_eq!(first, second);
    let stats = warm.cache_statistics();
    assert!(stats.parse.hits >= 1, "warm-up should feed L1");
    assert!(stats.evaluation.hits >= 1, "repeat should feed L2");
}

#[test]
fn l1_hit_required_for_l2_constant_hits() {
    // Two parses of the same source share a root only through L1, so the
    // constant sub-cache hits on the second evaluate.
    let mut texpr = instrumented();
    let empty = Variables::new();
    let a = texpr.evaluate("\\sum_{k=1}^{10} k", &empty).unwrap();
    let b = texpr.evaluate("\\sum_{k=1}^{10} k", &empty).unwrap();
    assert_eq!(a, Value::Number(55.0));
    assert_eq!(a, b);
    let stats = texpr.cache_statistics();
    assert!(stats.evaluation.hits >= 1);
}

#[test]
fn differentiation_cache_counts() {
    let mut texpr = instrumented();
    let ast = texpr.parse("x^4").unwrap();
    let first = texpr.differentiate_parsed(&ast, "x", 1).unwrap();
    let second = texpr.differentiate_parsed(&ast, "x", 1).unwrap();
    assert_eq!(first.identity(), second.identity());
    assert!(texpr.cache_statistics().differentiation.hits >= 1);
}

#[test]
fn clear_all_forgets_everything() {
    let mut texpr = instrumented();
    let vars: Variables = [("x", 2.0)].into_iter().collect();
    drop(texpr.evaluate("x + 1", &vars).unwrap());
    texpr.clear_all_caches();
    assert_eq!(texpr.cache_statistics().parse.size, 0);
    assert_eq!(texpr.cache_statistics().evaluation.size, 0);
}

#[test]
fn clear_parse_only_affects_l1() {
    let mut texpr = instrumented();
    let empty = Variables::new();
    drop(texpr.evaluate("1 + 2", &empty).unwrap());
    texpr.clear_parsed_expression_cache();
    let stats = texpr.cache_statistics();
    assert_eq!(stats.parse.size, 0);
    assert_eq!(stats.evaluation.size, 1);
}

#[test]
fn ttl_expiry_is_observable() {
    let config = CacheConfig::default()
        .time_to_live(Duration::from_secs(0))
        .collect_statistics(true);
    let mut texpr = Texpr::with_config(TexprConfig::new().cache(config));
    let empty = Variables::new();
    drop(texpr.evaluate("41 + 1", &empty).unwrap());
    // Zero TTL: everything is expired immediately.
    texpr.remove_expired_cache_entries();
    let stats = texpr.cache_statistics();
    assert_eq!(stats.parse.size, 0);
    assert_eq!(stats.evaluation.size, 0);
}

#[test]
fn lfu_policy_is_accepted_end_to_end() {
    let config = CacheConfig {
        parsed_expression_cache_size: 2,
        ..CacheConfig::default()
    }
    .eviction_policy(EvictionPolicy::Lfu)
    .collect_statistics(true);
    let mut texpr = Texpr::with_config(TexprConfig::new().cache(config));

    // `a` becomes frequent; `b` is the LFU victim when `c` arrives.
    let a1 = texpr.parse("x + 1").unwrap();
    drop(texpr.parse("x + 1").unwrap());
    drop(texpr.parse("x + 2").unwrap());
    drop(texpr.parse("x + 3").unwrap());
    let a2 = texpr.parse("x + 1").unwrap();
    assert_eq!(a1.identity(), a2.identity(), "the frequent entry survived");
    assert!(texpr.cache_statistics().parse.evictions >= 1);
}

#[test]
fn eviction_on_capacity_overflow() {
    let config = CacheConfig {
        parsed_expression_cache_size: 4,
        ..CacheConfig::default()
    }
    .collect_statistics(true);
    let mut texpr = Texpr::with_config(TexprConfig::new().cache(config));
    for i in 0..10 {
        drop(texpr.parse(&format!("x + {}", i)).unwrap());
    }
    let stats = texpr.cache_statistics();
    assert!(stats.parse.size <= 4);
    assert!(stats.parse.evictions >= 6);
}

#[test]
fn statistics_are_quiet_by_default() {
    let mut texpr = Texpr::new();
    let empty = Variables::new();
    drop(texpr.evaluate("1 + 1", &empty).unwrap());
    drop(texpr.evaluate("1 + 1", &empty).unwrap());
    let stats = texpr.cache_statistics();
    // Counters stay zero when collection is off; sizes still report.
    assert_eq!(stats.total_hits(), 0);
    assert_eq!(stats.total_misses(), 0);
    assert!(stats.parse.size >= 1);
}

#[test]
fn sub_expression_cache_accelerates_within_one_call() {
    // The same integral appears twice in one expression; L4 serves the
    // second occurrence within the call, and the layer is cleared after.
    let mut texpr = instrumented();
    let empty = Variables::new();
    let v = texpr
        .evaluate("\\int_{0}^{1} x^2 dx + \\int_{0}^{1} x^2 dx", &empty)
        .unwrap()
        .as_number()
        .unwrap();
    assert!((v - 2.0 / 3.0).abs() < 1e-9);
    let stats = texpr.cache_statistics();
    assert!(stats.sub_expression.hits >= 1);
    assert_eq!(stats.sub_expression.size, 0, "L4 is transient per call");
}
