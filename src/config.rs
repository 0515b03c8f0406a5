use std::time::Duration;

use crate::{MAX_EVAL_DEPTH, MAX_PARSE_DEPTH};

/// Tunables of an [`crate::Interpreter`] instance
#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterConfig {
    /// Deepest list nesting the parser accepts
    pub max_parse_depth: usize,
    /// Deepest form nesting (including calls) the evaluator accepts
    pub max_eval_depth: usize,
    /// Delay handed to the command dispatcher between `command` sub-steps
    pub command_pacing: Duration,
    /// Write the value of each batch to the host log
    pub echo_result: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_parse_depth: MAX_PARSE_DEPTH,
            max_eval_depth: MAX_EVAL_DEPTH,
            command_pacing: Duration::from_millis(10),
            echo_result: false,
        }
    }
}
