//! Multi-threaded timing harness that reports results as CSV.
//!
//! Every benchmark runs one operation a fixed number of times in total,
//! spread over a pool of threads that pull from a shared counter, and
//! records the wall-clock time until all threads are done.

use crate::shard::ConcurrentMap;
use crate::shardmap::ShardMap;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Header line matching [`BenchResult::csv_row`].
pub const CSV_HEADER: &str = "operation,map_type,key_type,val_type,shard_count,total_operations,thread_count,avg_operations_per_ms,total_elapsed_ms";

/// A map the harness knows how to label.
pub trait BenchTarget: Sync {
    /// Key type, reported by name.
    type Key;
    /// Value type, reported by name.
    type Value;

    /// `"Sharded"` or `"Unsharded"`.
    fn map_type(&self) -> &'static str;

    /// Shard count, if the map is sharded.
    fn shard_count(&self) -> Option<usize>;
}

impl<K, V, S> BenchTarget for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Send + Sync,
    V: Send + Sync,
    S: BuildHasher + Send + Sync,
{
    type Key = K;
    type Value = V;

    fn map_type(&self) -> &'static str {
        "Unsharded"
    }

    fn shard_count(&self) -> Option<usize> {
        None
    }
}

impl<K, V, S> BenchTarget for ShardMap<K, V, S>
where
    K: Hash + Eq + Send + Sync,
    V: Send + Sync,
    S: BuildHasher + Clone + Send + Sync,
{
    type Key = K;
    type Value = V;

    fn map_type(&self) -> &'static str {
        "Sharded"
    }

    fn shard_count(&self) -> Option<usize> {
        Some(ShardMap::shard_count(self))
    }
}

/// Run `op` exactly `iterations` times across `threads` threads.
///
/// Threads claim iterations from a shared counter, so the split between them
/// is uneven but the total is exact. Returns the elapsed wall-clock time.
pub fn run<F>(threads: usize, iterations: u64, op: F) -> Duration
where
    F: Fn() + Sync,
{
    let next = AtomicU64::new(0);
    let start = Instant::now();
    std::thread::scope(|scope| {
        for _ in 0..threads.max(1) {
            scope.spawn(|| {
                while next.fetch_add(1, Ordering::Relaxed) < iterations {
                    op();
                }
            });
        }
    });
    start.elapsed()
}

/// One benchmark measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchResult {
    /// Name of the benchmarked operation.
    pub operation: String,
    /// `"Sharded"` or `"Unsharded"`.
    pub map_type: String,
    /// Key type name.
    pub key_type: String,
    /// Value type name.
    pub val_type: String,
    /// Shard count, `None` for unsharded maps.
    pub shard_count: Option<usize>,
    /// Number of times the operation ran.
    pub total_operations: u64,
    /// Number of threads that shared the work.
    pub thread_count: usize,
    /// Wall-clock time for all operations.
    pub total_elapsed: Duration,
}

impl BenchResult {
    /// Time `op` against `map` and label the result.
    pub fn measure<M, F>(
        operation: &str,
        map: &M,
        threads: usize,
        iterations: u64,
        op: F,
    ) -> Self
    where
        M: BenchTarget,
        F: Fn(&M) + Sync,
    {
        let total_elapsed = run(threads, iterations, || op(map));
        Self {
            operation: operation.to_string(),
            map_type: map.map_type().to_string(),
            key_type: std::any::type_name::<M::Key>().to_string(),
            val_type: std::any::type_name::<M::Value>().to_string(),
            shard_count: map.shard_count(),
            total_operations: iterations,
            thread_count: threads.max(1),
            total_elapsed,
        }
    }

    /// Throughput in operations per millisecond; infinite for a zero duration.
    pub fn avg_operations_per_ms(&self) -> f64 {
        let ms = self.total_elapsed.as_secs_f64() * 1000.0;
        if ms > 0.0 {
            self.total_operations as f64 / ms
        } else {
            f64::INFINITY
        }
    }

    /// Format as one CSV line (without trailing newline).
    pub fn csv_row(&self) -> String {
        let shard_count = self
            .shard_count
            .map_or_else(|| "N/A".to_string(), |n| n.to_string());
        format!(
            "{},{},{},{},{},{},{},{:.3},{}",
            self.operation,
            self.map_type,
            self.key_type,
            self.val_type,
            shard_count,
            self.total_operations,
            self.thread_count,
            self.avg_operations_per_ms(),
            self.total_elapsed.as_millis()
        )
    }
}

/// Format a header plus one line per result.
pub fn results_to_csv(results: &[BenchResult]) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for result in results {
        csv.push_str(&result.csv_row());
        csv.push('\n');
    }
    csv
}
