// # Document Store Implementations
//
// This module provides implementations of the DocumentStore trait.

pub mod file;
pub mod memory;

pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;
