//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod bundle;
pub mod classifier;
pub mod guard;
pub mod machine;
pub mod path;
pub mod state;
pub mod types;
