//! The default script evaluator
//!
//! Implements the compiler's [`Evaluator`] seam with a small
//! ECMAScript-flavoured language: lexically scoped variables, closures,
//! arrow and `function` expressions, the usual operators and control flow,
//! and insertion-ordered objects with the fallback chain that include
//! overlays rely on. Script syntax errors surface at render time as
//! [`EvaluationError`]s; the compiler never looks inside script text.

pub mod ast;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

use tiny_ejs_compiler::{EvaluationError, Evaluator, Invocation};

use self::interp::{Flow, Interp};
use self::value::{Scope, Value};

/// Executes generated program bodies with the built-in script language
///
/// The evaluator itself is stateless; every invocation parses and runs the
/// program against fresh scopes, so one evaluator may serve any number of
/// templates concurrently. Suspension is not supported: compiling with
/// suspend-capable mode against this evaluator fails up front.
pub struct ScriptEvaluator;

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ScriptEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for ScriptEvaluator {
    fn run(&self, call: Invocation<'_>) -> Result<String, EvaluationError> {
        let program = parser::parse_program(call.body)?;

        let scope = Scope::root();
        scope.declare(call.locals_name, Value::from_json(call.locals));

        let escape = call.escape.clone();
        scope.declare(
            "_esc",
            Value::native(move |args| {
                let text = match args.first() {
                    Some(Value::Str(s)) => s.to_string(),
                    Some(other) => other.display(),
                    None => String::new(),
                };
                Ok(Value::str(escape(&text)))
            }),
        );

        let stringify = call.stringify.clone();
        scope.declare(
            "_str",
            Value::native(move |args| {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(Value::str(stringify(&value.to_json())))
            }),
        );

        scope.declare(
            "_ext",
            Value::native(|args| {
                let parent = args.first().cloned().unwrap_or(Value::Undefined);
                let overlay = args.get(1).cloned().unwrap_or(Value::Undefined);
                Ok(Value::overlay(parent, overlay))
            }),
        );

        let this = match call.context {
            Some(context) => Value::from_json(context),
            None => Value::Undefined,
        };
        match Interp::new(this).exec_stmts(&program, &scope)? {
            Flow::Return(value) => Ok(value.into_output()),
            Flow::Normal => Ok(String::new()),
        }
    }
}
