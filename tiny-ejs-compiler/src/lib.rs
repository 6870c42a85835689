//! EJS template compiler core
//!
//! This crate provides the compilation pipeline behind the `tiny-ejs`
//! crate: it turns template text into a reusable [`Template`] that renders
//! a data value to a string. Script regions are executed by a pluggable
//! [`Evaluator`]; the core never interprets script text itself.
//!
//! # Features
//!
//! - The full EJS tag vocabulary:
//!   - `<% … %>` script statements
//!   - `<%= … %>` escaped expression output
//!   - `<%- … %>` raw expression output
//!   - `<%# … %>` comments
//!   - `<%_ … _%>` and `… -%>` whitespace control
//!   - `<%% … %%>` literal markers
//! - `include('path'[, data])` with recursive compilation, a shared
//!   fragment cache and cycle detection
//! - Configurable data binding name and destructured locals
//! - Overridable escape and stringify hooks
//! - Synchronous and suspend-capable rendering
//!
//! # Example
//!
//! ```ignore
//! use tiny_ejs_compiler::{compile, Options};
//!
//! let template = compile(
//!     "<p><%= locals.name %></p>",
//!     Options::new(my_evaluator).filename("hello.ejs"),
//! )?;
//! let html = template.render(&serde_json::json!({"name": "King"}))?;
//! ```
//!
//! # Module Structure
//!
//! - `tokenizer.rs`: delimiter scanning
//! - `trim.rs`: whitespace-control rules
//! - `compiler.rs`: the code-assembly state machine and include handling
//! - `template.rs`: compilation entry point and the compiled template
//! - `evaluator.rs`: the host evaluator seam
//! - `helpers.rs`: default escape/stringify hooks
//! - `loader.rs`: filesystem template loading
//! - `error.rs`: error types

pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod helpers;
pub mod loader;
pub mod template;
pub mod tokenizer;
pub mod trim;

pub use compiler::FragmentCache;
pub use error::{Error, EvaluationError, Result};
pub use evaluator::{EscapeFn, Evaluator, Invocation, StringifyFn};
pub use helpers::{escape_xml, stringify};
pub use loader::DirLoader;
pub use template::{compile, Options, ReadFn, ResolveFn, Template};
