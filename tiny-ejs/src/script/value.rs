//! Script runtime values and scopes

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as Json;
use tiny_ejs_compiler::EvaluationError;
use tiny_ejs_compiler::helpers::format_number;

use super::ast::FnDef;

/// A host function exposed to scripts.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvaluationError>;

/// A script runtime value
///
/// Aggregates are reference counted and shared, so property and element
/// mutation behaves the way scripts expect.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<ObjectData>),
    Function(Rc<Closure>),
    Native(Rc<NativeFn>),
}

/// Property storage with an optional fallback value
///
/// The fallback is what makes include overlays work: own fields win, and
/// lookups fall through to the overlaid value.
pub struct ObjectData {
    pub props: RefCell<IndexMap<String, Value>>,
    pub fallback: Option<Value>,
}

/// A script function together with its captured scope.
pub struct Closure {
    pub def: FnDef,
    pub scope: Rc<Scope>,
}

impl Value {
    pub fn str(text: impl Into<Rc<str>>) -> Self {
        Value::Str(text.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(props: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(ObjectData {
            props: RefCell::new(props),
            fallback: None,
        }))
    }

    pub fn native(f: impl Fn(&[Value]) -> Result<Value, EvaluationError> + 'static) -> Self {
        Value::Native(Rc::new(f))
    }

    /// The overlay object used by `_ext`: the overlay's own fields in
    /// front, the parent value behind them.
    pub fn overlay(parent: Value, overlay: Value) -> Self {
        let props = match &overlay {
            Value::Object(data) => data.props.borrow().clone(),
            _ => IndexMap::new(),
        };
        Value::Object(Rc::new(ObjectData {
            props: RefCell::new(props),
            fallback: Some(parent),
        }))
    }

    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            Json::String(s) => Value::str(s.as_str()),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(fields) => Value::object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Own properties only; functions and non-finite numbers become null.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.to_string()),
            Value::Array(items) => {
                Json::Array(items.borrow().iter().map(Value::to_json).collect())
            }
            Value::Object(data) => Json::Object(
                data.props
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Function(_) | Value::Native(_) => Json::Null,
        }
    }

    /// Property lookup on objects, following the fallback chain.
    pub fn get_prop(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(data) => {
                if let Some(found) = data.props.borrow().get(name) {
                    return Some(found.clone());
                }
                data.fallback.as_ref().and_then(|f| f.get_prop(name))
            }
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Native(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion, as in `"" + value`.
    pub fn display(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|item| match item {
                        Value::Undefined | Value::Null => String::new(),
                        other => other.display(),
                    })
                    .collect();
                parts.join(",")
            }
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(_) | Value::Native(_) => "function".to_string(),
        }
    }

    /// The final program result as output text: absent values render empty.
    pub fn into_output(self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::Str(s) => s.to_string(),
            other => other.display(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// `===`
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`, with the null/undefined and number/string coercions scripts
    /// lean on.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Number(_), Value::Str(_)) | (Value::Str(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            _ => self.strict_eq(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Function(_) | Value::Native(_) => f.write_str("function"),
            other => f.write_str(&other.display()),
        }
    }
}

/// A lexical scope
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        })
    }

    /// Declares in this scope, shadowing outer bindings.
    pub fn declare(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(found) = self.vars.borrow().get(name) {
            return Some(found.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Assigns to the nearest declaration. False when none exists.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        if self.vars.borrow().contains_key(name) {
            self.vars.borrow_mut().insert(name.to_string(), value);
            return true;
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn truthiness_follows_script_rules() {
        assert!(!Value::Undefined.truthy());
        assert!(!Value::Null.truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(!Value::str("").truthy());
        assert!(Value::str("x").truthy());
        assert!(Value::array(vec![]).truthy());
    }

    #[test]
    fn display_matches_script_conversions() {
        assert_eq!(Value::Number(5.0).display(), "5");
        assert_eq!(Value::Number(1.5).display(), "1.5");
        assert_eq!(
            Value::from_json(&json!(["a", null, 1])).display(),
            "a,,1"
        );
        assert_eq!(Value::from_json(&json!({"a": 1})).display(), "[object Object]");
    }

    #[test]
    fn overlay_fields_win_over_parent() {
        let parent = Value::from_json(&json!({"a": 1, "b": 2}));
        let child = Value::overlay(parent, Value::from_json(&json!({"b": 3})));
        assert_eq!(child.get_prop("b").unwrap().to_number(), 3.0);
        assert_eq!(child.get_prop("a").unwrap().to_number(), 1.0);
        assert!(child.get_prop("c").is_none());
    }

    #[test]
    fn scopes_shadow_and_assign_through() {
        let root = Scope::root();
        root.declare("x", Value::Number(1.0));
        let inner = Scope::child(&root);
        assert!(inner.assign("x", Value::Number(2.0)));
        assert_eq!(root.get("x").unwrap().to_number(), 2.0);
        inner.declare("x", Value::Number(3.0));
        assert_eq!(inner.get("x").unwrap().to_number(), 3.0);
        assert_eq!(root.get("x").unwrap().to_number(), 2.0);
        assert!(!inner.assign("missing", Value::Null));
    }
}
