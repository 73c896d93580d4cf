mod btree;
mod iterator;

pub use btree::BPlusTree;
pub use iterator::IndexIterator;
