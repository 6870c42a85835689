//! Tree-walking interpreter for the script language

use std::rc::Rc;

use tiny_ejs_compiler::EvaluationError;

use super::ast::{AssignOp, BinaryOp, Expr, Stmt, UnaryOp};
use super::value::{Closure, Scope, Value};

/// Statement completion: either fall through or unwind with a value.
pub enum Flow {
    Normal,
    Return(Value),
}

/// One program execution. Holds the ambient `this` value; everything else
/// lives in the scopes.
pub struct Interp {
    this: Value,
}

impl Interp {
    pub fn new(this: Value) -> Self {
        Self { this }
    }

    pub fn exec_stmts(&self, stmts: &[Stmt], scope: &Rc<Scope>) -> Result<Flow, EvaluationError> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec_stmt(stmt, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow, EvaluationError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Decl(decls) => {
                for (name, init) in decls {
                    let value = match init {
                        Some(expr) => self.eval(expr, scope)?,
                        None => Value::Undefined,
                    };
                    scope.declare(name, value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If(cond, then, alt) => {
                if self.eval(cond, scope)?.truthy() {
                    self.exec_stmts(then, &Scope::child(scope))
                } else if let Some(alt) = alt {
                    self.exec_stmts(alt, &Scope::child(scope))
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While(cond, body) => {
                while self.eval(cond, scope)?.truthy() {
                    if let Flow::Return(value) = self.exec_stmts(body, &Scope::child(scope))? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                let header = Scope::child(scope);
                if let Some(init) = init {
                    if let Flow::Return(value) = self.exec_stmt(init, &header)? {
                        return Ok(Flow::Return(value));
                    }
                }
                loop {
                    if let Some(cond) = cond {
                        if !self.eval(cond, &header)?.truthy() {
                            break;
                        }
                    }
                    if let Flow::Return(value) = self.exec_stmts(body, &Scope::child(&header))? {
                        return Ok(Flow::Return(value));
                    }
                    if let Some(step) = step {
                        self.eval(step, &header)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(stmts) => self.exec_stmts(stmts, &Scope::child(scope)),
        }
    }

    fn eval(&self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::str(s.as_str())),
            Expr::This => Ok(self.this.clone()),
            Expr::Ident(name) => scope
                .get(name)
                .ok_or_else(|| EvaluationError::new(format!("{name} is not defined"))),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, scope)?);
                }
                Ok(Value::array(values))
            }
            Expr::Object(props) => {
                let mut fields = indexmap::IndexMap::new();
                for (key, value) in props {
                    fields.insert(key.clone(), self.eval(value, scope)?);
                }
                Ok(Value::object(fields))
            }
            Expr::Member(object, name) => {
                let object = self.eval(object, scope)?;
                self.member(&object, name)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                self.index(&object, &index)
            }
            Expr::Call(callee, args) => self.call_expr(callee, args, scope),
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand, scope)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!operand.truthy()),
                    UnaryOp::Neg => Value::Number(-operand.to_number()),
                    UnaryOp::Pos => Value::Number(operand.to_number()),
                })
            }
            Expr::Binary(op, left, right) => self.binary(*op, left, right, scope),
            Expr::Ternary(cond, then, alt) => {
                if self.eval(cond, scope)?.truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(alt, scope)
                }
            }
            Expr::Assign(op, name, value) => {
                let value = self.eval(value, scope)?;
                let value = match op {
                    AssignOp::Set => value,
                    AssignOp::Add => {
                        let current = scope
                            .get(name)
                            .ok_or_else(|| EvaluationError::new(format!("{name} is not defined")))?;
                        add(&current, &value)
                    }
                    AssignOp::Sub => {
                        let current = scope
                            .get(name)
                            .ok_or_else(|| EvaluationError::new(format!("{name} is not defined")))?;
                        Value::Number(current.to_number() - value.to_number())
                    }
                };
                if !scope.assign(name, value.clone()) {
                    return Err(EvaluationError::new(format!("{name} is not defined")));
                }
                Ok(value)
            }
            Expr::Update {
                name,
                delta,
                prefix,
            } => {
                let old = scope
                    .get(name)
                    .ok_or_else(|| EvaluationError::new(format!("{name} is not defined")))?
                    .to_number();
                let new = old + delta;
                scope.assign(name, Value::Number(new));
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Function(def) => Ok(Value::Function(Rc::new(Closure {
                def: def.clone(),
                scope: scope.clone(),
            }))),
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: &Rc<Scope>,
    ) -> Result<Value, EvaluationError> {
        // && and || return an operand, not a boolean
        if op == BinaryOp::And {
            let left = self.eval(left, scope)?;
            return if left.truthy() {
                self.eval(right, scope)
            } else {
                Ok(left)
            };
        }
        if op == BinaryOp::Or {
            let left = self.eval(left, scope)?;
            return if left.truthy() {
                Ok(left)
            } else {
                self.eval(right, scope)
            };
        }

        let left = self.eval(left, scope)?;
        let right = self.eval(right, scope)?;
        Ok(match op {
            BinaryOp::Add => add(&left, &right),
            BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
            BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
            BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
            BinaryOp::Mod => Value::Number(left.to_number() % right.to_number()),
            BinaryOp::Eq => Value::Bool(left.loose_eq(&right)),
            BinaryOp::Ne => Value::Bool(!left.loose_eq(&right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_eq(&right)),
            BinaryOp::StrictNe => Value::Bool(!left.strict_eq(&right)),
            BinaryOp::Lt => compare(&left, &right, |o| o.is_lt()),
            BinaryOp::Gt => compare(&left, &right, |o| o.is_gt()),
            BinaryOp::Le => compare(&left, &right, |o| o.is_le()),
            BinaryOp::Ge => compare(&left, &right, |o| o.is_ge()),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        })
    }

    fn member(&self, object: &Value, name: &str) -> Result<Value, EvaluationError> {
        match object {
            Value::Undefined | Value::Null => Err(EvaluationError::new(format!(
                "cannot read property '{name}' of {}",
                object.type_name()
            ))),
            Value::Object(_) => Ok(object.get_prop(name).unwrap_or(Value::Undefined)),
            Value::Array(items) => match name {
                "length" => Ok(Value::Number(items.borrow().len() as f64)),
                _ => Ok(Value::Undefined),
            },
            Value::Str(s) => match name {
                "length" => Ok(Value::Number(s.chars().count() as f64)),
                _ => Ok(Value::Undefined),
            },
            _ => Ok(Value::Undefined),
        }
    }

    fn index(&self, object: &Value, index: &Value) -> Result<Value, EvaluationError> {
        match object {
            Value::Undefined | Value::Null => Err(EvaluationError::new(format!(
                "cannot read properties of {}",
                object.type_name()
            ))),
            Value::Array(items) => {
                let at = index.to_number();
                if at.fract() == 0.0 && at >= 0.0 && (at as usize) < items.borrow().len() {
                    Ok(items.borrow()[at as usize].clone())
                } else {
                    Ok(Value::Undefined)
                }
            }
            Value::Object(_) => Ok(object.get_prop(&index.display()).unwrap_or(Value::Undefined)),
            Value::Str(s) => {
                let at = index.to_number();
                if at.fract() == 0.0 && at >= 0.0 {
                    match s.chars().nth(at as usize) {
                        Some(c) => Ok(Value::str(c.to_string())),
                        None => Ok(Value::Undefined),
                    }
                } else {
                    Ok(Value::Undefined)
                }
            }
            _ => Ok(Value::Undefined),
        }
    }

    fn call_expr(
        &self,
        callee: &Expr,
        args: &[Expr],
        scope: &Rc<Scope>,
    ) -> Result<Value, EvaluationError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, scope)?);
        }

        // method calls dispatch on the receiver so built-ins can run inside
        // the interpreter
        if let Expr::Member(object, name) = callee {
            let object = self.eval(object, scope)?;
            return self.call_method(&object, name, values);
        }

        let callee = self.eval(callee, scope)?;
        self.call_value(&callee, values)
    }

    fn call_method(
        &self,
        object: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, EvaluationError> {
        if let Value::Array(items) = object {
            match name {
                "forEach" => {
                    let callback = args
                        .first()
                        .ok_or_else(|| EvaluationError::new("forEach expects a callback"))?;
                    // snapshot so the callback may push without holding the
                    // element borrow
                    let snapshot: Vec<Value> = items.borrow().clone();
                    for (at, item) in snapshot.into_iter().enumerate() {
                        self.call_value(callback, vec![item, Value::Number(at as f64)])?;
                    }
                    return Ok(Value::Undefined);
                }
                "join" => {
                    let separator = match args.first() {
                        Some(sep) => sep.display(),
                        None => ",".to_string(),
                    };
                    let parts: Vec<String> = items
                        .borrow()
                        .iter()
                        .map(|item| match item {
                            Value::Undefined | Value::Null => String::new(),
                            other => other.display(),
                        })
                        .collect();
                    return Ok(Value::str(parts.join(&separator)));
                }
                "push" => {
                    items.borrow_mut().extend(args);
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                _ => {}
            }
        }
        let callee = self.member(object, name)?;
        match &callee {
            Value::Function(_) | Value::Native(_) => self.call_value(&callee, args),
            _ => Err(EvaluationError::new(format!("{name} is not a function"))),
        }
    }

    pub fn call_value(&self, callee: &Value, args: Vec<Value>) -> Result<Value, EvaluationError> {
        match callee {
            Value::Native(native) => native(&args),
            Value::Function(closure) => {
                let scope = Scope::child(&closure.scope);
                for (at, param) in closure.def.params.iter().enumerate() {
                    let value = args.get(at).cloned().unwrap_or(Value::Undefined);
                    scope.declare(param, value);
                }
                match self.exec_stmts(&closure.def.body, &scope)? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal => Ok(Value::Undefined),
                }
            }
            other => Err(EvaluationError::new(format!(
                "{} is not a function",
                other.type_name()
            ))),
        }
    }
}

fn add(left: &Value, right: &Value) -> Value {
    if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
        Value::str(format!("{}{}", left.display(), right.display()))
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn compare(left: &Value, right: &Value, pick: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    Value::Bool(ordering.is_some_and(pick))
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_program;
    use super::*;

    fn run(src: &str) -> Value {
        let program = parse_program(src).unwrap();
        let scope = Scope::root();
        match Interp::new(Value::Undefined)
            .exec_stmts(&program, &scope)
            .unwrap()
        {
            Flow::Return(value) => value,
            Flow::Normal => Value::Undefined,
        }
    }

    #[test]
    fn arithmetic_and_concatenation() {
        assert_eq!(run("return 1 + 2 * 3").to_number(), 7.0);
        assert_eq!(run("return 'a' + 1").display(), "a1");
        assert_eq!(run("return 10 % 4").to_number(), 2.0);
    }

    #[test]
    fn logical_operators_return_operands() {
        assert_eq!(run("return 0 || 'fallback'").display(), "fallback");
        assert_eq!(run("return 'x' && 'y'").display(), "y");
        assert_eq!(run("return null || undefined").type_name(), "undefined");
    }

    #[test]
    fn closures_capture_their_scope() {
        let out = run("var n = 1\nvar f = () => { n += 1; return n }\nf()\nreturn f()");
        assert_eq!(out.to_number(), 3.0);
    }

    #[test]
    fn for_each_visits_in_order() {
        let out = run(
            "var items = ['a', 'b', 'c']\nvar out = ''\nitems.forEach((item, at) => { out += item + at })\nreturn out",
        );
        assert_eq!(out.display(), "a0b1c2");
    }

    #[test]
    fn control_flow_runs() {
        assert_eq!(run("var x = 2\nif (x > 1) { x = 10 } else { x = 20 }\nreturn x").to_number(), 10.0);
        assert_eq!(
            run("var total = 0\nfor (var i = 0; i < 4; i++) { total += i }\nreturn total")
                .to_number(),
            6.0
        );
        assert_eq!(
            run("var i = 0\nwhile (i < 5) i++\nreturn i").to_number(),
            5.0
        );
    }

    #[test]
    fn undefined_variables_are_errors() {
        let program = parse_program("missing + 1").unwrap();
        let err = Interp::new(Value::Undefined)
            .exec_stmts(&program, &Scope::root())
            .unwrap_err();
        assert!(err.message().contains("missing is not defined"));
    }

    #[test]
    fn member_of_null_is_an_error() {
        let program = parse_program("null.x").unwrap();
        assert!(
            Interp::new(Value::Undefined)
                .exec_stmts(&program, &Scope::root())
                .is_err()
        );
    }
}
