//! Stable exit codes for `genloop` commands.

/// Command succeeded; `run` reached `Terminal(Success)`.
pub const OK: i32 = 0;
/// Invalid input, config or bundle, or any other error.
pub const INVALID: i32 = 1;
/// `run` exhausted its repair attempts.
pub const GAVE_UP: i32 = 2;
/// `run` hit the step limit before reaching a terminal state.
pub const STEP_LIMIT: i32 = 3;
