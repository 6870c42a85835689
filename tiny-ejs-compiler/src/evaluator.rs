//! The host evaluator seam
//!
//! The compiler core never executes script text itself. A compiled template
//! hands the whole generated program body to an [`Evaluator`], together with
//! the bindings the program expects: the data value under the configured
//! name, the ambient `this` value, and the `_esc`/`_str` hooks.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::EvaluationError;

/// Escape hook: converts stringified output to safely embeddable text.
pub type EscapeFn = dyn Fn(&str) -> String + Send + Sync;

/// Stringify hook: converts an expression result to text.
pub type StringifyFn = dyn Fn(&Value) -> String + Send + Sync;

/// One rendering request handed to the evaluator
pub struct Invocation<'a> {
    /// The generated program body.
    pub body: &'a str,
    /// The name the data value is bound under.
    pub locals_name: &'a str,
    /// The data value.
    pub locals: &'a Value,
    /// The ambient value bound to `this`, if any.
    pub context: Option<&'a Value>,
    /// Escape hook, exposed to the program as `_esc`.
    pub escape: Arc<EscapeFn>,
    /// Stringify hook, exposed to the program as `_str`.
    pub stringify: Arc<StringifyFn>,
}

/// Executes generated program bodies
///
/// Implementations must treat each invocation as independent: a template is
/// immutable and may be rendered concurrently, so all mutable state belongs
/// to the invocation, never the evaluator.
pub trait Evaluator: Send + Sync {
    /// Runs a program body to completion and returns the rendered output.
    fn run(&self, call: Invocation<'_>) -> Result<String, EvaluationError>;

    /// Runs a program body that may suspend at asynchronous points inside
    /// script regions. Output ordering is unaffected by suspension.
    ///
    /// The default implementation completes synchronously through
    /// [`Evaluator::run`]; evaluators that can actually suspend must also
    /// report it from [`Evaluator::supports_suspend`].
    fn run_suspend<'a>(
        &'a self,
        call: Invocation<'a>,
    ) -> BoxFuture<'a, Result<String, EvaluationError>> {
        Box::pin(std::future::ready(self.run(call)))
    }

    /// Whether [`Evaluator::run_suspend`] can actually suspend.
    fn supports_suspend(&self) -> bool {
        false
    }
}
