use std::sync::Arc;

use pagetree::buffer::BufferPoolManager;
use pagetree::index::BPlusTree;

fn main() {
    env_logger::init();

    println!("Pagetree - a disk-backed B+Tree index in Rust");
    println!("=============================================\n");

    let db_path = "demo.db";

    // Buffer pool with 16 frames and LRU-2 replacement
    let bpm = Arc::new(
        BufferPoolManager::new(db_path, 16, 2).expect("Failed to create buffer pool"),
    );
    println!("Opened database file: {}", db_path);

    let tree = BPlusTree::new(Arc::clone(&bpm)).expect("Failed to open index");

    // Insert some entries, including duplicate keys
    let pairs = [(30u64, 300i64), (10, 100), (20, 200), (20, 201), (40, 400)];
    for (key, value) in pairs {
        let inserted = tree.insert(key, value).expect("Failed to insert");
        println!("Inserted ({}, {}): {}", key, value, inserted);
    }

    // Point lookup collects every value for the key
    let values = tree.find(20).expect("Failed to find");
    println!("\nfind(20) -> {:?}", values);

    // Ordered scan over the whole index
    println!("\nFull scan:");
    for entry in tree.begin().expect("Failed to start scan") {
        let entry = entry.expect("Failed to advance scan");
        println!("  {} -> {}", entry.key, entry.value);
    }

    // Remove one of the duplicates
    tree.remove(20, 200).expect("Failed to remove");
    println!("\nAfter remove(20, 200): find(20) -> {:?}", tree.find(20).unwrap());

    tree.flush().expect("Failed to flush");
    println!("\nFlushed all pages to disk");

    // Clean up
    drop(tree);
    drop(bpm);
    std::fs::remove_file(db_path).ok();
    std::fs::remove_file(format!("{}.meta", db_path)).ok();
    println!("Demo completed successfully!");
}
