// skv-bench - Criterion micro-benchmarks for the cache engine.

/// Pre-materialized key set so benchmark loops do not measure
/// formatting or allocation of key strings.
pub fn keyset(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("bench-key-{i}")).collect()
}
