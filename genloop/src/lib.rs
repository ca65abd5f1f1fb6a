//! Requirement-to-container code generation pipeline.
//!
//! A natural-language requirement goes through a fixed step graph: generate
//! code, persist it, containerize it, run it, and classify whatever goes
//! wrong. Failures route to a code or container repair step until the
//! program runs cleanly or the iteration budget is spent.
//!
//! - **[`core`]**: Pure, deterministic logic (transition table, classifier,
//!   bundle validation, run state). No I/O.
//! - **[`io`]**: Side effects (filesystem, processes, Docker, agent CLIs).
//! - **[`agents`]**: The LLM collaborators behind the generate, repair and
//!   document steps.
//!
//! [`pipeline::run_pipeline`] wires them together.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
