//! Core storage: the memory-mapped register window backing the bundled
//! register device.

mod memory_map;

pub use memory_map::{MemoryMap, WORD_SIZE};
