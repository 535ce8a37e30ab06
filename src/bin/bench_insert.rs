use std::collections::BTreeMap;
use std::env;
use std::hint::black_box;
use std::time::{Duration, Instant};

use kslmap::{KslMap, OrdComparator};

// bench_insert [items] [block-cap]; defaults: 1000000 items, 16-slot blocks
fn arg_or(position: usize, default: usize) -> usize {
    match env::args().nth(position) {
        Some(s) => s.parse().unwrap_or(default),
        None => default,
    }
}

fn main() {
    let n = arg_or(1, 1_000_000);
    let cap = arg_or(2, 16);

    let dataset = generate_dataset(n);
    let lookup_keys: Vec<u64> = dataset.iter().map(|(k, _)| *k).collect();

    let ksl = bench_ksl(&dataset, &lookup_keys, cap);
    let std_map = bench_std(&dataset, &lookup_keys);

    println!("\n=== kslmap benchmark ===");
    println!("items: {}  |  block capacity: {}", n, cap);
    println!(
        "{:<14} {:>10} {:>12} {:>10} {:>12} {:>10} {:>12} {:>10} {:>12}",
        "target",
        "ins(s)",
        "ins Mops",
        "get(s)",
        "get Mops",
        "del(s)",
        "del Mops",
        "iter(s)",
        "iter Mops"
    );
    for result in [ksl, std_map] {
        println!(
            "{:<14} {:>10.3} {:>12.2} {:>10.3} {:>12.2} {:>10.3} {:>12.2} {:>10.3} {:>12.2}",
            result.label,
            result.insert.as_secs_f64(),
            throughput(n, result.insert),
            result.get.as_secs_f64(),
            throughput(n, result.get),
            result.delete.as_secs_f64(),
            throughput(n, result.delete),
            result.iterate.as_secs_f64(),
            throughput(n, result.iterate)
        );
    }
}

struct BenchResult {
    label: &'static str,
    insert: Duration,
    get: Duration,
    delete: Duration,
    iterate: Duration,
}

// Distinct pseudo-random keys without pulling in an RNG: an odd
// multiplicative constant keeps the mapping a bijection on u64.
fn generate_dataset(n: usize) -> Vec<(u64, u64)> {
    (0..n as u64)
        .map(|i| (i.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17), i))
        .collect()
}

fn throughput(n: usize, elapsed: Duration) -> f64 {
    n as f64 / elapsed.as_secs_f64() / 1_000_000.0
}

fn bench_ksl(dataset: &[(u64, u64)], lookups: &[u64], cap: usize) -> BenchResult {
    let mut map = KslMap::with_block_capacity(OrdComparator, cap).expect("ksl new");
    let start = Instant::now();
    for &(k, v) in dataset {
        map.insert(k, v).expect("insert");
    }
    let insert = start.elapsed();

    let start = Instant::now();
    for k in lookups {
        black_box(map.get(k));
    }
    let get = start.elapsed();

    let start = Instant::now();
    let mut sum = 0u64;
    for (_, v) in map.iter() {
        sum = sum.wrapping_add(*v);
    }
    black_box(sum);
    let iterate = start.elapsed();

    let start = Instant::now();
    for k in lookups {
        black_box(map.remove(k));
    }
    let delete = start.elapsed();

    BenchResult {
        label: "kslmap",
        insert,
        get,
        delete,
        iterate,
    }
}

fn bench_std(dataset: &[(u64, u64)], lookups: &[u64]) -> BenchResult {
    let mut map = BTreeMap::new();
    let start = Instant::now();
    for &(k, v) in dataset {
        map.insert(k, v);
    }
    let insert = start.elapsed();

    let start = Instant::now();
    for k in lookups {
        black_box(map.get(k));
    }
    let get = start.elapsed();

    let start = Instant::now();
    let mut sum = 0u64;
    for (_, v) in map.iter() {
        sum = sum.wrapping_add(*v);
    }
    black_box(sum);
    let iterate = start.elapsed();

    let start = Instant::now();
    for k in lookups {
        black_box(map.remove(k));
    }
    let delete = start.elapsed();

    BenchResult {
        label: "std BTreeMap",
        insert,
        get,
        delete,
        iterate,
    }
}
