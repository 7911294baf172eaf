//! Times basic map operations from many threads and prints CSV to stdout.

use clap::Parser;
use concurrent_shardmap::harness::{results_to_csv, BenchResult};
use concurrent_shardmap::{Config, ConcurrentMap, ShardMap};
use std::hint::black_box;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Multi-threaded map benchmark
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Total operations per benchmark, shared by all threads
    #[arg(long, default_value_t = 1_000_000)]
    iterations: u64,

    /// Worker threads (defaults to available parallelism)
    #[arg(long)]
    threads: Option<usize>,

    /// Shards in the sharded map
    #[arg(long, default_value_t = concurrent_shardmap::DEFAULT_SHARD_COUNT)]
    shard_count: usize,
}

// Runs the same operations against any map type exposing the common API.
macro_rules! bench_suite {
    ($results:expr, $map:expr, $make:expr, $threads:expr, $iterations:expr) => {{
        let map = $map;
        let threads = $threads;
        let iterations = $iterations;
        $results.push(BenchResult::measure("constructor", map, threads, iterations, |_| {
            black_box($make());
        }));
        $results.push(BenchResult::measure("clear", map, threads, iterations, |m| {
            m.clear()
        }));
        $results.push(BenchResult::measure("empty", map, threads, iterations, |m| {
            black_box(m.is_empty());
        }));
        $results.push(BenchResult::measure("size", map, threads, iterations, |m| {
            black_box(m.len());
        }));
        $results.push(BenchResult::measure("insert", map, threads, iterations, |m| {
            black_box(m.insert(i32::default(), i32::default()));
        }));
        $results.push(BenchResult::measure("find", map, threads, iterations, |m| {
            black_box(m.contains_key(&i32::default()));
        }));
    }};
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let threads = match args.threads {
        Some(threads) => threads,
        None => std::thread::available_parallelism()?.get(),
    };
    info!(
        iterations = args.iterations,
        threads,
        shard_count = args.shard_count,
        "starting benchmarks"
    );

    let unsharded: ConcurrentMap<i32, i32> = ConcurrentMap::new();
    let config = Config::new().shard_count(args.shard_count)?;
    let sharded: ShardMap<i32, i32> = ShardMap::with_config(config.clone())?;

    let mut results = Vec::new();
    bench_suite!(
        results,
        &unsharded,
        ConcurrentMap::<i32, i32>::new,
        threads,
        args.iterations
    );
    bench_suite!(
        results,
        &sharded,
        || ShardMap::<i32, i32>::with_config(config.clone()),
        threads,
        args.iterations
    );

    print!("{}", results_to_csv(&results));
    Ok(())
}
