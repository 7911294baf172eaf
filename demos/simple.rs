//! Build a map from a few entries and print a snapshot of it.

use concurrent_shardmap::ShardMap;

fn main() {
    let map = ShardMap::from([
        ("foo".to_string(), "bar".to_string()),
        ("baz".to_string(), "baz".to_string()),
        ("lorem".to_string(), "ipsum".to_string()),
    ]);

    let mut entries: Vec<_> = map.iter_snapshot().collect();
    entries.sort();

    print!("Contents:");
    for (key, value) in entries {
        print!(" [{}]={}", key, value);
    }
    println!();
}
