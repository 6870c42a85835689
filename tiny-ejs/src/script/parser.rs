//! Script parser
//!
//! Recursive descent over the token stream with precedence climbing for
//! expressions. Semicolons are optional statement terminators: generated
//! program bodies separate spliced statements with newlines, so the parser
//! ends a statement wherever no operator continues the expression.

use std::rc::Rc;

use tiny_ejs_compiler::EvaluationError;

use super::ast::{AssignOp, BinaryOp, Expr, FnDef, Stmt, UnaryOp};
use super::lexer::{Token, tokenize};

/// Parses a whole program body into statements.
pub fn parse_program(src: &str) -> Result<Vec<Stmt>, EvaluationError> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
    };
    let mut program = Vec::new();
    while !parser.at_end() {
        if parser.eat_punct(";") {
            continue;
        }
        program.push(parser.statement()?);
    }
    Ok(program)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, at)| *at)
            .unwrap_or(0)
    }

    fn error(&self, message: impl std::fmt::Display) -> EvaluationError {
        EvaluationError::new(format!("script parse error: {message} at byte {}", self.offset()))
    }

    fn check_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.check_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), EvaluationError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error(format_args!("expected `{punct}`")))
        }
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Keyword(k)) if *k == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> Result<String, EvaluationError> {
        match self.peek() {
            Some(Token::Ident(_)) => match self.advance() {
                Some(Token::Ident(name)) => Ok(name),
                _ => unreachable!(),
            },
            _ => Err(self.error("expected an identifier")),
        }
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<Stmt, EvaluationError> {
        if self.eat_keyword("var") || self.eat_keyword("let") || self.eat_keyword("const") {
            return self.declaration();
        }
        if self.eat_keyword("return") {
            let value = if self.at_end() || self.check_punct(";") || self.check_punct("}") {
                None
            } else {
                Some(self.expression()?)
            };
            self.eat_punct(";");
            return Ok(Stmt::Return(value));
        }
        if self.eat_keyword("if") {
            return self.if_statement();
        }
        if self.eat_keyword("while") {
            self.expect_punct("(")?;
            let cond = self.expression()?;
            self.expect_punct(")")?;
            return Ok(Stmt::While(cond, self.body()?));
        }
        if self.eat_keyword("for") {
            return self.for_statement();
        }
        if self.check_punct("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        let expr = self.expression()?;
        self.eat_punct(";");
        Ok(Stmt::Expr(expr))
    }

    fn declaration(&mut self) -> Result<Stmt, EvaluationError> {
        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        self.eat_punct(";");
        Ok(Stmt::Decl(decls))
    }

    fn if_statement(&mut self) -> Result<Stmt, EvaluationError> {
        self.expect_punct("(")?;
        let cond = self.expression()?;
        self.expect_punct(")")?;
        let then = self.body()?;
        let alt = if self.eat_keyword("else") {
            if self.check_keyword("if") {
                self.pos += 1;
                Some(vec![self.if_statement()?])
            } else {
                Some(self.body()?)
            }
        } else {
            None
        };
        Ok(Stmt::If(cond, then, alt))
    }

    fn for_statement(&mut self) -> Result<Stmt, EvaluationError> {
        self.expect_punct("(")?;
        let init = if self.eat_punct(";") {
            None
        } else {
            // declaration() and expression statements both eat the `;`
            Some(Box::new(self.statement()?))
        };
        let cond = if self.check_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.eat_punct(";");
        let step = if self.check_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body: self.body()?,
        })
    }

    /// A braced block or a single statement.
    fn body(&mut self) -> Result<Vec<Stmt>, EvaluationError> {
        if self.check_punct("{") {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, EvaluationError> {
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        while !self.check_punct("}") {
            if self.at_end() {
                return Err(self.error("expected `}`"));
            }
            if self.eat_punct(";") {
                continue;
            }
            stmts.push(self.statement()?);
        }
        self.expect_punct("}")?;
        Ok(stmts)
    }

    // ---- expressions, lowest precedence first ----

    fn expression(&mut self) -> Result<Expr, EvaluationError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, EvaluationError> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }
        let target = self.ternary()?;
        let op = if self.check_punct("=") {
            Some(AssignOp::Set)
        } else if self.check_punct("+=") {
            Some(AssignOp::Add)
        } else if self.check_punct("-=") {
            Some(AssignOp::Sub)
        } else {
            None
        };
        let Some(op) = op else {
            return Ok(target);
        };
        self.pos += 1;
        let Expr::Ident(name) = target else {
            return Err(self.error("invalid assignment target"));
        };
        Ok(Expr::Assign(op, name, Box::new(self.assignment()?)))
    }

    /// Recognizes `x => …`, `() => …` and `(a, b) => …` before normal
    /// expression parsing gets a chance to misread the parameter list.
    fn try_arrow(&mut self) -> Result<Option<Expr>, EvaluationError> {
        if let (Some(Token::Ident(_)), Some(Token::Punct("=>"))) = (self.peek(), self.peek_at(1)) {
            let name = self.expect_ident()?;
            self.pos += 1; // the arrow
            return Ok(Some(self.arrow_tail(vec![name])?));
        }
        if self.check_punct("(") {
            if let Some(close) = self.matching_paren() {
                if matches!(self.tokens.get(close + 1), Some((Token::Punct("=>"), _))) {
                    self.pos += 1; // the open paren
                    let mut params = Vec::new();
                    while !self.check_punct(")") {
                        params.push(self.expect_ident()?);
                        if !self.eat_punct(",") {
                            break;
                        }
                    }
                    self.expect_punct(")")?;
                    self.pos += 1; // the arrow
                    return Ok(Some(self.arrow_tail(params)?));
                }
            }
        }
        Ok(None)
    }

    /// Token index of the `)` matching the `(` at the current position.
    fn matching_paren(&self) -> Option<usize> {
        let mut depth = 0usize;
        for (ahead, (token, _)) in self.tokens[self.pos..].iter().enumerate() {
            match token {
                Token::Punct("(") => depth += 1,
                Token::Punct(")") => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(self.pos + ahead);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn arrow_tail(&mut self, params: Vec<String>) -> Result<Expr, EvaluationError> {
        let body = if self.check_punct("{") {
            self.block()?
        } else {
            vec![Stmt::Return(Some(self.assignment()?))]
        };
        Ok(Expr::Function(FnDef {
            params,
            body: Rc::new(body),
        }))
    }

    fn ternary(&mut self) -> Result<Expr, EvaluationError> {
        let cond = self.binary(0)?;
        if !self.eat_punct("?") {
            return Ok(cond);
        }
        let then = self.assignment()?;
        self.expect_punct(":")?;
        let alt = self.assignment()?;
        Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(alt)))
    }

    /// Left-associative binary operators by precedence level.
    fn binary(&mut self, level: usize) -> Result<Expr, EvaluationError> {
        const LEVELS: &[&[(&str, BinaryOp)]] = &[
            &[("||", BinaryOp::Or)],
            &[("&&", BinaryOp::And)],
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
            ],
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Mod),
            ],
        ];
        if level == LEVELS.len() {
            return self.unary();
        }
        let mut left = self.binary(level + 1)?;
        loop {
            let found = LEVELS[level]
                .iter()
                .find(|pair| self.check_punct(pair.0))
                .copied();
            let Some((_, op)) = found else {
                return Ok(left);
            };
            self.pos += 1;
            let right = self.binary(level + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, EvaluationError> {
        for (punct, op) in [
            ("!", UnaryOp::Not),
            ("-", UnaryOp::Neg),
            ("+", UnaryOp::Pos),
        ] {
            if self.eat_punct(punct) {
                return Ok(Expr::Unary(op, Box::new(self.unary()?)));
            }
        }
        for (punct, delta) in [("++", 1.0), ("--", -1.0)] {
            if self.eat_punct(punct) {
                let name = self.expect_ident()?;
                return Ok(Expr::Update {
                    name,
                    delta,
                    prefix: true,
                });
            }
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, EvaluationError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_punct(".") {
                expr = Expr::Member(Box::new(expr), self.expect_ident()?);
                continue;
            }
            if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
                continue;
            }
            if self.eat_punct("(") {
                let mut args = Vec::new();
                while !self.check_punct(")") {
                    args.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")")?;
                expr = Expr::Call(Box::new(expr), args);
                continue;
            }
            if self.check_punct("++") || self.check_punct("--") {
                let delta = if self.check_punct("++") { 1.0 } else { -1.0 };
                let Expr::Ident(name) = expr else {
                    return Err(self.error("invalid increment target"));
                };
                self.pos += 1;
                return Ok(Expr::Update {
                    name,
                    delta,
                    prefix: false,
                });
            }
            return Ok(expr);
        }
    }

    fn primary(&mut self) -> Result<Expr, EvaluationError> {
        match self.peek() {
            Some(Token::Number(_)) => match self.advance() {
                Some(Token::Number(n)) => Ok(Expr::Number(n)),
                _ => unreachable!(),
            },
            Some(Token::Str(_)) => match self.advance() {
                Some(Token::Str(s)) => Ok(Expr::Str(s)),
                _ => unreachable!(),
            },
            Some(Token::Ident(_)) => Ok(Expr::Ident(self.expect_ident()?)),
            Some(Token::Keyword("true")) => {
                self.pos += 1;
                Ok(Expr::Bool(true))
            }
            Some(Token::Keyword("false")) => {
                self.pos += 1;
                Ok(Expr::Bool(false))
            }
            Some(Token::Keyword("null")) => {
                self.pos += 1;
                Ok(Expr::Null)
            }
            Some(Token::Keyword("undefined")) => {
                self.pos += 1;
                Ok(Expr::Undefined)
            }
            Some(Token::Keyword("this")) => {
                self.pos += 1;
                Ok(Expr::This)
            }
            Some(Token::Keyword("function")) => {
                self.pos += 1;
                // the optional name is not bound anywhere
                if matches!(self.peek(), Some(Token::Ident(_))) {
                    self.pos += 1;
                }
                self.expect_punct("(")?;
                let mut params = Vec::new();
                while !self.check_punct(")") {
                    params.push(self.expect_ident()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")")?;
                let body = self.block()?;
                Ok(Expr::Function(FnDef {
                    params,
                    body: Rc::new(body),
                }))
            }
            Some(Token::Punct("(")) => {
                self.pos += 1;
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Some(Token::Punct("[")) => {
                self.pos += 1;
                let mut items = Vec::new();
                while !self.check_punct("]") {
                    items.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(Expr::Array(items))
            }
            Some(Token::Punct("{")) => {
                self.pos += 1;
                let mut props = Vec::new();
                while !self.check_punct("}") {
                    let key = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        Some(Token::Keyword(word)) => word.to_string(),
                        Some(Token::Str(text)) => text,
                        _ => return Err(self.error("expected a property name")),
                    };
                    self.expect_punct(":")?;
                    props.push((key, self.assignment()?));
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("}")?;
                Ok(Expr::Object(props))
            }
            Some(other) => Err(self.error(format_args!("unexpected token {other:?}"))),
            None => Err(self.error("unexpected end of script")),
        }
    }
}
