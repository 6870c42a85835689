//! Runtime-compiled EJS templates
//!
//! `tiny-ejs` compiles EJS template text at runtime into reusable
//! [`Template`] values. The compiler core lives in the `tiny-ejs-compiler`
//! crate and is re-exported here; this crate adds [`ScriptEvaluator`], the
//! default evaluator for script regions, so templates work out of the box.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tiny_ejs::{Options, ScriptEvaluator, compile};
//!
//! let template = compile(
//!     "<ul><% locals.users.forEach(u => { %><li><%= u.name %></li><% }) %></ul>",
//!     Options::new(ScriptEvaluator::new()),
//! )
//! .unwrap();
//! let html = template
//!     .render(&json!({"users": [{"name": "King"}, {"name": "Tubby"}]}))
//!     .unwrap();
//! assert_eq!(html, "<ul><li>King</li><li>Tubby</li></ul>");
//! ```
//!
//! Includes resolve through the caller-supplied `read`/`resolve` options —
//! see [`DirLoader`] for the filesystem-backed pair — and are compiled once
//! per resolved key into the shared fragment cache.

pub mod script;

pub use script::ScriptEvaluator;
pub use tiny_ejs_compiler::{
    DirLoader, Error, EscapeFn, EvaluationError, Evaluator, FragmentCache, Invocation, Options,
    ReadFn, ResolveFn, Result, StringifyFn, Template, compile, escape_xml, stringify,
};
