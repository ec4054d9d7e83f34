// All core functionality is in forbearance-core
// This CLI acts as a thin wrapper around the core library

// CLI-specific modules
pub mod writer;

// Re-export core types for convenience
pub use forbearance_core::*;
