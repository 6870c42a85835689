//! Compilation entry point and the compiled template
//!
//! [`compile`] runs the tokenizer/assembler pipeline once and wraps the
//! generated program body into a [`Template`] bound to an evaluator, the
//! escape/stringify hooks, an optional ambient value and the data binding
//! name. Rendering is then a matter of handing the body and a data value to
//! the evaluator — synchronously, or through a future in suspend-capable
//! mode.

use std::io;
use std::sync::Arc;

use serde_json::Value;

use crate::compiler::{Compiler, FragmentCache};
use crate::error::{Error, Result};
use crate::evaluator::{EscapeFn, Evaluator, Invocation, StringifyFn};
use crate::helpers;

/// Reader collaborator: resolved key to template text.
pub type ReadFn = dyn Fn(&str) -> io::Result<String> + Send + Sync;

/// Resolver collaborator: parent key and requested path to resolved key.
pub type ResolveFn = dyn Fn(Option<&str>, &str) -> String + Send + Sync;

/// Compile-time configuration, built around the evaluator that will execute
/// script regions
pub struct Options {
    evaluator: Arc<dyn Evaluator>,
    escape: Arc<EscapeFn>,
    stringify: Arc<StringifyFn>,
    locals_name: String,
    locals: Vec<String>,
    context: Option<Value>,
    filename: Option<String>,
    read: Option<Arc<ReadFn>>,
    resolve: Option<Arc<ResolveFn>>,
    cache: Option<Arc<FragmentCache>>,
    suspend: bool,
}

impl Options {
    pub fn new(evaluator: impl Evaluator + 'static) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            escape: Arc::new(helpers::escape_xml),
            stringify: Arc::new(helpers::stringify),
            locals_name: "locals".to_string(),
            locals: Vec::new(),
            context: None,
            filename: None,
            read: None,
            resolve: None,
            cache: None,
            suspend: false,
        }
    }

    /// Replaces the escape hook. Leaves the stringify hook untouched.
    pub fn escape(mut self, escape: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.escape = Arc::new(escape);
        self
    }

    /// Replaces the stringify hook. Leaves the escape hook untouched.
    pub fn stringify(mut self, stringify: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.stringify = Arc::new(stringify);
        self
    }

    /// Name the data value is bound under inside script regions.
    pub fn locals_name(mut self, name: impl Into<String>) -> Self {
        self.locals_name = name.into();
        self
    }

    /// Field names destructured into direct bindings at program entry.
    pub fn locals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locals = names.into_iter().map(Into::into).collect();
        self
    }

    /// Ambient value bound to `this` inside script regions.
    pub fn context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Identity of the top-level template, used as the parent key when
    /// resolving includes.
    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    /// Reader collaborator for includes.
    pub fn read(mut self, read: impl Fn(&str) -> io::Result<String> + Send + Sync + 'static) -> Self {
        self.read = Some(Arc::new(read));
        self
    }

    /// Resolver collaborator for includes. Defaults to using the requested
    /// path as the key.
    pub fn resolve(
        mut self,
        resolve: impl Fn(Option<&str>, &str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.resolve = Some(Arc::new(resolve));
        self
    }

    /// Shares a fragment cache across compile calls. Without one, each
    /// compile call uses a fresh cache.
    pub fn cache(mut self, cache: Arc<FragmentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Selects suspend-capable mode: script regions may await asynchronous
    /// sub-computations, and the template must be rendered with
    /// [`Template::render_suspend`].
    pub fn suspend(mut self, suspend: bool) -> Self {
        self.suspend = suspend;
        self
    }
}

/// Compiles template text into a reusable [`Template`].
pub fn compile(src: &str, options: Options) -> Result<Template> {
    if options.suspend && !options.evaluator.supports_suspend() {
        return Err(Error::Environment {
            detail: "suspend-capable mode requested but the evaluator cannot suspend".to_string(),
        });
    }
    let cache = options.cache.clone().unwrap_or_default();
    let body = {
        let compiler = Compiler::new(
            &options.locals_name,
            &options.locals,
            options.read.as_deref(),
            options.resolve.as_deref(),
            &cache,
        );
        compiler.compile(src, options.filename.as_deref())?
    };
    Ok(Template {
        body: body.into(),
        locals_name: options.locals_name,
        context: options.context,
        escape: options.escape,
        stringify: options.stringify,
        evaluator: options.evaluator,
        suspend: options.suspend,
    })
}

/// A compiled template, immutable and safe to render repeatedly and
/// concurrently
pub struct Template {
    body: Arc<str>,
    locals_name: String,
    context: Option<Value>,
    escape: Arc<EscapeFn>,
    stringify: Arc<StringifyFn>,
    evaluator: Arc<dyn Evaluator>,
    suspend: bool,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("body", &self.body)
            .field("locals_name", &self.locals_name)
            .field("context", &self.context)
            .field("suspend", &self.suspend)
            .finish_non_exhaustive()
    }
}

impl Template {
    /// The generated program body. Useful for debugging and for tests.
    pub fn body(&self) -> &str {
        &self.body
    }

    fn invocation<'a>(&'a self, data: &'a Value) -> Invocation<'a> {
        Invocation {
            body: &self.body,
            locals_name: &self.locals_name,
            locals: data,
            context: self.context.as_ref(),
            escape: self.escape.clone(),
            stringify: self.stringify.clone(),
        }
    }

    /// Renders synchronously. Evaluator failures propagate unchanged.
    pub fn render(&self, data: &Value) -> Result<String> {
        if self.suspend {
            return Err(Error::Environment {
                detail: "suspend-capable template must be rendered with render_suspend"
                    .to_string(),
            });
        }
        Ok(self.evaluator.run(self.invocation(data))?)
    }

    /// Renders, allowing script regions to suspend at asynchronous points.
    /// For a synchronous template this completes immediately.
    pub async fn render_suspend(&self, data: &Value) -> Result<String> {
        Ok(self.evaluator.run_suspend(self.invocation(data)).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::EvaluationError;
    use futures_util::future::BoxFuture;

    /// Echoes the pieces of the invocation back so wiring can be asserted.
    struct EchoEvaluator;

    impl Evaluator for EchoEvaluator {
        fn run(&self, call: Invocation<'_>) -> std::result::Result<String, EvaluationError> {
            let escaped = (call.escape)("<x>");
            let shown = (call.stringify)(call.locals);
            Ok(format!(
                "{}|{}|{}|{}",
                call.locals_name,
                shown,
                escaped,
                call.body
            ))
        }
    }

    struct SuspendingEvaluator;

    impl Evaluator for SuspendingEvaluator {
        fn run(&self, _call: Invocation<'_>) -> std::result::Result<String, EvaluationError> {
            Err(EvaluationError::new("synchronous execution not supported"))
        }

        fn run_suspend<'a>(
            &'a self,
            call: Invocation<'a>,
        ) -> BoxFuture<'a, std::result::Result<String, EvaluationError>> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                Ok(format!("suspended:{}", call.locals_name))
            })
        }

        fn supports_suspend(&self) -> bool {
            true
        }
    }

    struct FailingEvaluator;

    impl Evaluator for FailingEvaluator {
        fn run(&self, _call: Invocation<'_>) -> std::result::Result<String, EvaluationError> {
            Err(EvaluationError::new("boom"))
        }
    }

    #[test]
    fn binds_hooks_and_names() {
        let template = compile("hi", Options::new(EchoEvaluator).locals_name("data")).unwrap();
        let out = template.render(&json!("v")).unwrap();
        assert_eq!(out, "data|v|&lt;x&gt;|var _out = \"hi\";return _out;");
    }

    #[test]
    fn custom_escape_does_not_affect_stringify() {
        let template = compile(
            "",
            Options::new(EchoEvaluator)
                .escape(|s| s.to_uppercase())
                .locals_name("d"),
        )
        .unwrap();
        let out = template.render(&json!("v")).unwrap();
        assert!(out.starts_with("d|v|<X>|"));
    }

    #[test]
    fn evaluator_errors_propagate_unchanged() {
        let template = compile("x", Options::new(FailingEvaluator)).unwrap();
        match template.render(&Value::Null).unwrap_err() {
            Error::Evaluation(err) => assert_eq!(err.message(), "boom"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn suspend_mode_requires_a_suspending_evaluator() {
        match compile("x", Options::new(EchoEvaluator).suspend(true)).unwrap_err() {
            Error::Environment { .. } => {}
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn suspend_template_rejects_sync_render() {
        let template = compile("x", Options::new(SuspendingEvaluator).suspend(true)).unwrap();
        match template.render(&Value::Null).unwrap_err() {
            Error::Environment { .. } => {}
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn suspend_render_resolves_in_order() {
        let template = compile("x", Options::new(SuspendingEvaluator).suspend(true)).unwrap();
        let out = template.render_suspend(&Value::Null).await.unwrap();
        assert_eq!(out, "suspended:locals");
    }

    #[tokio::test]
    async fn render_suspend_on_sync_template_completes_immediately() {
        let template = compile("hi", Options::new(EchoEvaluator)).unwrap();
        let out = template.render_suspend(&json!("v")).await.unwrap();
        assert!(out.starts_with("locals|v|"));
    }

    #[test]
    fn shared_cache_survives_across_compile_calls() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache: Arc<FragmentCache> = Arc::default();
        let reads = Arc::new(AtomicUsize::new(0));
        let options = || {
            let reads = reads.clone();
            Options::new(EchoEvaluator)
                .cache(cache.clone())
                .filename("top")
                .read(move |_key| {
                    reads.fetch_add(1, Ordering::SeqCst);
                    Ok("x".to_string())
                })
        };
        compile("<% include('a') %>", options()).unwrap();
        compile("<% include('a') %>", options()).unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.lock().unwrap().len(), 1);
    }
}
