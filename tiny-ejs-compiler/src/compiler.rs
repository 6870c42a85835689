//! Template compilation
//!
//! This module turns tokenized template text into a program body in the
//! embedded scripting language. The assembler is a small state machine over
//! the token stream: literal runs become program-string emissions, script
//! runs are spliced verbatim, expression runs are wrapped in the
//! escape/stringify hooks, and comment runs are dropped. Include directives
//! found inside script regions are resolved, recursively compiled and
//! memoized in the fragment cache.
//!
//! The generated program accumulates output in `_out` and relies on three
//! host bindings supplied by the evaluator: `_esc` (escape hook), `_str`
//! (stringify hook) and `_ext` (shallow locals overlay used by includes).

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use regex::Regex;

use crate::error::{Error, Result};
use crate::tokenizer::{Tag, TAG_PATTERN, Tokenizer};
use crate::trim;

/// Shared cache of compiled fragments, keyed by resolved include key.
///
/// The cache lives as long as the caller keeps it; entries are never
/// invalidated here. Population of the same key from two threads is the
/// cache owner's concern — the core double-checks but never holds the lock
/// across recursive compilation.
pub type FragmentCache = Mutex<HashMap<String, Arc<str>>>;

/// Matches `include('path')` and `include('path', {…})` inside script
/// regions. Single and double quoted paths are separate captures because
/// the scan runs without backreferences.
const INCLUDE_PATTERN: &str =
    r#"include\(\s*(?:'([^']+)'|"([^"]+)")\s*(?:,\s*(\{.+?\})\s*)?\)"#;

/// Assembler states, one per region kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    Script,
    EscapedExpr,
    RawExpr,
    Comment,
}

/// Assembles template text into program bodies
///
/// One `Compiler` serves one top-level compile call; the scan cursors and
/// the in-progress include stack are local to it.
pub struct Compiler<'a> {
    tags: Regex,
    include: Regex,
    locals_name: &'a str,
    locals: &'a [String],
    read: Option<&'a (dyn Fn(&str) -> io::Result<String> + Send + Sync)>,
    resolve: Option<&'a (dyn Fn(Option<&str>, &str) -> String + Send + Sync)>,
    cache: &'a FragmentCache,
    stack: RefCell<Vec<String>>,
}

impl<'a> Compiler<'a> {
    pub fn new(
        locals_name: &'a str,
        locals: &'a [String],
        read: Option<&'a (dyn Fn(&str) -> io::Result<String> + Send + Sync)>,
        resolve: Option<&'a (dyn Fn(Option<&str>, &str) -> String + Send + Sync)>,
        cache: &'a FragmentCache,
    ) -> Self {
        Self {
            tags: Regex::new(TAG_PATTERN).unwrap(),
            include: Regex::new(INCLUDE_PATTERN).unwrap(),
            locals_name,
            locals,
            read,
            resolve,
            cache,
            stack: RefCell::new(Vec::new()),
        }
    }

    /// Compiles one top-level template body into a program body.
    pub fn compile(&self, src: &str, filename: Option<&str>) -> Result<String> {
        log::debug!("compiling template {}", filename.unwrap_or("<anonymous>"));
        if let Some(key) = filename {
            self.stack.borrow_mut().push(key.to_string());
        }
        let body = self.fragment(src, filename);
        if filename.is_some() {
            self.stack.borrow_mut().pop();
        }
        body
    }

    /// The code-assembly state machine.
    fn fragment(&self, src: &str, key: Option<&str>) -> Result<String> {
        let mut code = String::with_capacity(src.len() + 64);
        for name in self.locals {
            code.push_str("var ");
            code.push_str(name);
            code.push_str(" = ");
            code.push_str(self.locals_name);
            code.push('.');
            code.push_str(name);
            code.push(';');
        }
        code.push_str("var _out = \"");

        let mut state = State::Text;
        // the open tag awaiting its close, for unmatched-tag errors
        let mut open: Option<Tag> = None;
        // the previous token, for left-side whitespace trimming
        let mut prev: Option<Tag> = None;

        for piece in Tokenizer::new(src, &self.tags) {
            match state {
                State::Text => {
                    let mut run = piece.text;
                    if piece.token.map(|t| t.tag) == Some(Tag::OpenSlurp) {
                        run = trim::strip_trailing_space(run);
                    }
                    match prev {
                        Some(Tag::CloseTrim) => run = trim::strip_leading_break(run),
                        Some(Tag::CloseSlurp) => run = trim::strip_leading_space_and_break(run),
                        _ => {}
                    }
                    escape_literal(run, &mut code);
                }
                State::Script | State::EscapedExpr | State::RawExpr => {
                    self.substitute_includes(piece.text, key, &mut code)?;
                }
                State::Comment => {}
            }

            let Some(token) = piece.token else {
                if let Some(tag) = open {
                    return Err(Error::Parse { tag: tag.marker() });
                }
                break;
            };

            match token.tag {
                Tag::Open | Tag::OpenSlurp | Tag::OpenEscaped | Tag::OpenRaw | Tag::OpenComment => {
                    if let Some(unmatched) = open {
                        return Err(Error::Parse {
                            tag: unmatched.marker(),
                        });
                    }
                    open = Some(token.tag);
                    state = match token.tag {
                        Tag::Open | Tag::OpenSlurp => {
                            code.push_str("\";");
                            State::Script
                        }
                        Tag::OpenEscaped => {
                            code.push_str("\";_out += _esc(_str(");
                            State::EscapedExpr
                        }
                        Tag::OpenRaw => {
                            code.push_str("\";_out += _str((");
                            State::RawExpr
                        }
                        // the pair is inert: the program string stays open
                        // across it and the content is discarded
                        Tag::OpenComment => State::Comment,
                        _ => unreachable!(),
                    };
                }
                Tag::Close | Tag::CloseTrim | Tag::CloseSlurp => {
                    match state {
                        // a close tag with no matching open renders itself
                        State::Text => code.push_str(token.tag.marker()),
                        // the newline guards the emission statement against
                        // a trailing line comment in the script
                        State::Script => code.push_str("\n_out += \""),
                        State::EscapedExpr | State::RawExpr => code.push_str("\n));_out += \""),
                        State::Comment => {}
                    }
                    open = None;
                    state = State::Text;
                }
                Tag::LiteralOpen => {
                    if state != State::Comment {
                        code.push_str("<%");
                    }
                }
                Tag::LiteralClose => {
                    if state != State::Comment {
                        code.push_str("%>");
                    }
                }
            }
            prev = Some(token.tag);
        }

        code.push_str("\";return _out;");
        Ok(code)
    }

    /// Replaces every include directive in a script run with an invocation
    /// of the compiled fragment it refers to.
    fn substitute_includes(
        &self,
        script: &str,
        parent: Option<&str>,
        code: &mut String,
    ) -> Result<()> {
        let mut last = 0;
        for caps in self.include.captures_iter(script) {
            let found = caps.get(0).unwrap();
            let path = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap();
            let Some(read) = self.read else {
                return Err(Error::Configuration {
                    path: path.to_string(),
                });
            };

            code.push_str(&script[last..found.start()]);
            let key = match self.resolve {
                Some(resolve) => resolve(parent, path),
                None => path.to_string(),
            };
            let fragment = self.compiled_fragment(&key, read)?;
            match caps.get(3) {
                Some(data) => {
                    // the overlay argument shadows the binding name; own
                    // fields win, the surrounding data stays visible
                    code.push_str("((");
                    code.push_str(self.locals_name);
                    code.push_str(") => { ");
                    code.push_str(&fragment);
                    code.push_str(" })(_ext(");
                    code.push_str(self.locals_name);
                    code.push_str(", ");
                    code.push_str(data.as_str());
                    code.push_str("))");
                }
                None => {
                    // no overlay: the fragment closes over the surrounding
                    // bindings but still runs in its own scope
                    code.push_str("(() => { ");
                    code.push_str(&fragment);
                    code.push_str(" })()");
                }
            }
            last = found.end();
        }
        code.push_str(&script[last..]);
        Ok(())
    }

    /// Looks a fragment up in the cache, compiling it on first use.
    fn compiled_fragment(
        &self,
        key: &str,
        read: &(dyn Fn(&str) -> io::Result<String> + Send + Sync),
    ) -> Result<Arc<str>> {
        if let Some(found) = self.cache.lock().unwrap().get(key) {
            log::debug!("fragment cache hit for {key}");
            return Ok(found.clone());
        }
        if self.stack.borrow().iter().any(|open| open == key) {
            return Err(Error::CyclicInclude {
                path: key.to_string(),
            });
        }
        let text = read(key).map_err(|source| Error::Read {
            path: key.to_string(),
            source,
        })?;
        self.stack.borrow_mut().push(key.to_string());
        let compiled = self.fragment(&text, Some(key));
        self.stack.borrow_mut().pop();
        let body: Arc<str> = compiled?.into();
        let mut cache = self.cache.lock().unwrap();
        Ok(cache.entry(key.to_string()).or_insert(body).clone())
    }
}

/// Escapes a literal run for embedding in a program string. Exactly four
/// characters need it: the escape character, both line break characters and
/// the string delimiter.
fn escape_literal(run: &str, code: &mut String) {
    for c in run.chars() {
        match c {
            '\\' => code.push_str("\\\\"),
            '\r' => code.push_str("\\r"),
            '\n' => code.push_str("\\n"),
            '"' => code.push_str("\\\""),
            _ => code.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn compile(src: &str) -> String {
        let cache = FragmentCache::default();
        Compiler::new("locals", &[], None, None, &cache)
            .compile(src, None)
            .unwrap()
    }

    fn compile_err(src: &str) -> Error {
        let cache = FragmentCache::default();
        Compiler::new("locals", &[], None, None, &cache)
            .compile(src, None)
            .unwrap_err()
    }

    #[test]
    fn plain_text() {
        assert_eq!(compile("<p>"), r#"var _out = "<p>";return _out;"#);
        assert_eq!(compile(""), r#"var _out = "";return _out;"#);
    }

    #[test]
    fn literal_escaping() {
        assert_eq!(compile(r"\foo"), r#"var _out = "\\foo";return _out;"#);
        assert_eq!(
            compile("a\r\nb\"c"),
            r#"var _out = "a\r\nb\"c";return _out;"#
        );
    }

    #[test]
    fn escaped_expression() {
        assert_eq!(
            compile("<p><%= locals.foo %></p>"),
            "var _out = \"<p>\";_out += _esc(_str( locals.foo \n));_out += \"</p>\";return _out;"
        );
    }

    #[test]
    fn raw_expression() {
        assert_eq!(
            compile("<%- locals.foo %>"),
            "var _out = \"\";_out += _str(( locals.foo \n));_out += \"\";return _out;"
        );
    }

    #[test]
    fn script_region() {
        assert_eq!(
            compile("a<% foo() %>b"),
            "var _out = \"a\"; foo() \n_out += \"b\";return _out;"
        );
    }

    #[test]
    fn comment_region_is_inert() {
        assert_eq!(
            compile("a<%# ignored %>b"),
            r#"var _out = "ab";return _out;"#
        );
        // literal markers inside a comment are consumed with it
        assert_eq!(
            compile("a<%# x <%% y %>b"),
            r#"var _out = "ab";return _out;"#
        );
    }

    #[test]
    fn destructured_locals_prologue() {
        let cache = FragmentCache::default();
        let locals = vec!["foo".to_string(), "bar".to_string()];
        let code = Compiler::new("locals", &locals, None, None, &cache)
            .compile("<%= foo %>", None)
            .unwrap();
        assert_eq!(
            code,
            "var foo = locals.foo;var bar = locals.bar;\
             var _out = \"\";_out += _esc(_str( foo \n));_out += \"\";return _out;"
        );
    }

    #[test]
    fn literal_markers_render_markers() {
        assert_eq!(
            compile("<%%- \"foo\" %>"),
            "var _out = \"<%- \\\"foo\\\" %>\";return _out;"
        );
        assert_eq!(compile("<%%-"), r#"var _out = "<%-";return _out;"#);
        assert_eq!(compile("%%>"), r#"var _out = "%>";return _out;"#);
    }

    #[test]
    fn orphan_close_tag_renders_itself() {
        assert_eq!(compile("a %> b"), r#"var _out = "a %> b";return _out;"#);
        // and its trim variant still trims the following run
        assert_eq!(compile("a -%>\nb"), r#"var _out = "a -%>b";return _out;"#);
    }

    #[test]
    fn slurp_open_strips_preceding_spaces() {
        assert_eq!(
            compile("a \t<%_ x %>"),
            "var _out = \"a\"; x \n_out += \"\";return _out;"
        );
    }

    #[test]
    fn trim_close_strips_one_break() {
        assert_eq!(
            compile("<% x -%>\r\nb"),
            "var _out = \"\"; x \n_out += \"b\";return _out;"
        );
        assert_eq!(
            compile("<% x -%>\n\nb"),
            "var _out = \"\"; x \n_out += \"\\nb\";return _out;"
        );
    }

    #[test]
    fn slurp_close_strips_spaces_and_break() {
        assert_eq!(
            compile("<% x _%> \t\nb"),
            "var _out = \"\"; x \n_out += \"b\";return _out;"
        );
    }

    #[test]
    fn unmatched_open_tag_fails_naming_marker() {
        match compile_err("<h1>oops</h1><%= name ->") {
            Error::Parse { tag } => assert_eq!(tag, "<%="),
            other => panic!("unexpected error {other:?}"),
        }
        match compile_err("<% a <%= b %>") {
            Error::Parse { tag } => assert_eq!(tag, "<%"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn include_without_read_fails_at_compile_time() {
        match compile_err("<div><%- include('yo') %></div>") {
            Error::Configuration { path } => assert_eq!(path, "yo"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn include_splices_cached_fragment() {
        let cache = FragmentCache::default();
        let reads = AtomicUsize::new(0);
        let read = |key: &str| {
            reads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("<b><%= \"{key}\" %></b>"))
        };
        let compiler = Compiler::new("locals", &[], Some(&read), None, &cache);
        let code = compiler
            .compile("<%- include('yo') %><%- include('yo') %>", Some("top"))
            .unwrap();

        // one read, one compile, one cache entry for the two directives
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.lock().unwrap().len(), 1);
        let fragment =
            "var _out = \"<b>\";_out += _esc(_str( \"yo\" \n));_out += \"</b>\";return _out;";
        assert_eq!(
            code,
            format!(
                "var _out = \"\";_out += _str(( (() => {{ {fragment} }})() \n));\
                 _out += \"\";_out += _str(( (() => {{ {fragment} }})() \n));\
                 _out += \"\";return _out;"
            )
        );
    }

    #[test]
    fn include_with_data_overlays_locals() {
        let cache = FragmentCache::default();
        let read = |_key: &str| Ok("<%= locals.x %>".to_string());
        let compiler = Compiler::new("locals", &[], Some(&read), None, &cache);
        let code = compiler
            .compile("<% include('part', {x: 1}) %>", Some("top"))
            .unwrap();
        assert!(code.contains("((locals) => { "));
        assert!(code.contains(" })(_ext(locals, {x: 1}))"));
    }

    #[test]
    fn include_resolves_against_parent_key() {
        let cache = FragmentCache::default();
        let read = |key: &str| match key {
            "pages/side" => Ok(String::new()),
            other => Err(io::Error::new(io::ErrorKind::NotFound, other.to_string())),
        };
        let resolve = |parent: Option<&str>, path: &str| {
            assert_eq!(parent, Some("pages/home"));
            format!("pages/{path}")
        };
        let compiler = Compiler::new("locals", &[], Some(&read), Some(&resolve), &cache);
        compiler
            .compile("<% include('side') %>", Some("pages/home"))
            .unwrap();
        assert!(cache.lock().unwrap().contains_key("pages/side"));
    }

    #[test]
    fn include_read_failure_names_path() {
        let cache = FragmentCache::default();
        let read =
            |_key: &str| -> io::Result<String> { Err(io::Error::from(io::ErrorKind::NotFound)) };
        let compiler = Compiler::new("locals", &[], Some(&read), None, &cache);
        match compiler.compile("<% include('gone') %>", None).unwrap_err() {
            Error::Read { path, .. } => assert_eq!(path, "gone"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn self_include_is_a_cycle() {
        let cache = FragmentCache::default();
        let read = |_key: &str| Ok("<% include('a') %>".to_string());
        let compiler = Compiler::new("locals", &[], Some(&read), None, &cache);
        match compiler.compile("<% include('a') %>", Some("a")).unwrap_err() {
            Error::CyclicInclude { path } => assert_eq!(path, "a"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn indirect_cycle_is_detected() {
        let cache = FragmentCache::default();
        let read = |key: &str| match key {
            "a" => Ok("<% include('b') %>".to_string()),
            _ => Ok("<% include('a') %>".to_string()),
        };
        let compiler = Compiler::new("locals", &[], Some(&read), None, &cache);
        match compiler.compile("<% include('a') %>", Some("top")).unwrap_err() {
            Error::CyclicInclude { path } => assert_eq!(path, "a"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn consecutive_regions_concatenate() {
        assert_eq!(
            compile("<% var a = 'foo' %><% var b = 'bar' %><%= a %>"),
            "var _out = \"\"; var a = 'foo' \n_out += \"\"; var b = 'bar' \n_out += \"\";\
             _out += _esc(_str( a \n));_out += \"\";return _out;"
        );
    }
}
