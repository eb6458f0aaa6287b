//! In-memory backend: a volatile directory tree held in an arena.

mod fs;
mod node;
mod tree;


pub use fs::MemoryFs;
