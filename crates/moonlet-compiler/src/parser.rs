//! Recursive-descent parser producing the [`ast`](crate::ast).
//!
//! Tokens are pulled one at a time from the [`Lexer`]; binary expressions
//! use precedence climbing over [`BinOp::priority`].
use crate::ast::*;
use crate::error::CompileError;
use crate::lexer::Lexer;
use crate::token::{Span, Token};
use moonlet_core::string::{StringId, StringInterner};

/// Nesting limit for statements and sub-expressions, and the tallest
/// tree any block, statement or expression may form.
pub const MAX_LEVELS: u32 = 200;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    /// Whether each enclosing function accepts `...`; innermost last.
    vararg: Vec<bool>,
    /// Active `statement`/`sub_expr` frames.
    level: u32,
}

/// Parse a whole source unit.
pub fn parse(source: &[u8], chunk: &str, strings: &mut StringInterner) -> Result<Chunk, CompileError> {
    Parser::new(source, chunk, strings).parse_chunk()
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a [u8], chunk: &str, strings: &'a mut StringInterner) -> Self {
        Parser {
            lexer: Lexer::new(source, chunk, strings),
            vararg: Vec::new(),
            level: 0,
        }
    }

    pub fn parse_chunk(mut self) -> Result<Chunk, CompileError> {
        self.vararg.push(true);
        let body = self.block()?;
        if self.token()? != Token::Eof {
            return Err(self.error_expected("'<eof>'"));
        }
        Ok(Chunk {
            body,
            end_line: self.lexer.lastline,
        })
    }

    // ---- Token helpers ----

    fn token(&self) -> Result<Token, CompileError> {
        match self.lexer.current() {
            Ok(tok) => Ok(tok.token.clone()),
            Err(e) => Err(e.clone()),
        }
    }

    fn span(&self) -> Span {
        match self.lexer.current() {
            Ok(tok) => tok.span,
            Err(e) => Span::new(e.line(), e.column()),
        }
    }

    fn check(&self, expected: &Token) -> Result<bool, CompileError> {
        Ok(self.token()? == *expected)
    }

    fn advance(&mut self) -> Result<Token, CompileError> {
        Ok(self.lexer.advance()?.token)
    }

    fn test_next(&mut self, expected: &Token) -> Result<bool, CompileError> {
        if self.check(expected)? {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn error(&self, message: String) -> CompileError {
        let span = self.span();
        CompileError::Syntax {
            chunk: self.lexer.chunk().to_string(),
            line: span.line,
            column: span.column,
            message,
        }
    }

    /// `msg near 'tok'`
    fn error_near(&self, msg: &str) -> CompileError {
        self.error(format!("{msg} near {}", self.lexer.near()))
    }

    fn error_expected(&self, what: &str) -> CompileError {
        self.error_near(&format!("{what} expected"))
    }

    fn expect(&mut self, expected: &Token) -> Result<(), CompileError> {
        if self.test_next(expected)? {
            Ok(())
        } else {
            Err(self.error_expected(&format!("'{expected}'")))
        }
    }

    fn enter_level(&mut self) -> Result<(), CompileError> {
        self.level += 1;
        if self.level > MAX_LEVELS {
            return Err(self.error_near("chunk has too many C levels"));
        }
        Ok(())
    }

    /// Reject trees too tall for the code generator to walk.
    fn check_depth(&self, depth: u32) -> Result<(), CompileError> {
        if depth > MAX_LEVELS {
            return Err(self.error_near("chunk has too many C levels"));
        }
        Ok(())
    }

    /// Expect the closing token of a construct opened on `line`.
    fn expect_match(&mut self, what: &Token, who: &Token, line: u32) -> Result<(), CompileError> {
        if self.test_next(what)? {
            return Ok(());
        }
        if line == self.span().line {
            Err(self.error_expected(&format!("'{what}'")))
        } else {
            Err(self.error_near(&format!(
                "'{what}' expected (to close '{who}' at line {line})"
            )))
        }
    }

    fn expect_name(&mut self) -> Result<StringId, CompileError> {
        match self.token()? {
            Token::Name(id) => {
                self.advance()?;
                Ok(id)
            }
            _ => Err(self.error_expected("<name>")),
        }
    }

    fn name_text(&self, id: StringId) -> String {
        self.lexer.strings.get_lossy(id).into_owned()
    }

    // ---- Blocks and statements ----

    fn block(&mut self) -> Result<Block, CompileError> {
        let mut stats = Vec::new();
        loop {
            let tok = self.token()?;
            if tok.is_block_end() {
                return Ok(Block::new(stats, None));
            }
            if tok == Token::Return {
                let ret = self.return_stat()?;
                return Ok(Block::new(stats, Some(ret)));
            }
            self.enter_level()?;
            let stat = self.statement()?;
            self.level -= 1;
            if let Some(stat) = stat {
                self.check_depth(stat.depth)?;
                stats.push(stat);
            }
        }
    }

    fn return_stat(&mut self) -> Result<Return, CompileError> {
        let span = self.span();
        self.advance()?;
        let tok = self.token()?;
        let values = if tok.is_block_end() || tok == Token::Semi {
            Vec::new()
        } else {
            self.expr_list()?
        };
        self.test_next(&Token::Semi)?;
        Ok(Return { values, span })
    }

    fn statement(&mut self) -> Result<Option<Stat>, CompileError> {
        let span = self.span();
        let kind = match self.token()? {
            Token::Semi => {
                self.advance()?;
                return Ok(None);
            }
            Token::If => self.if_stat(span.line)?,
            Token::While => {
                self.advance()?;
                let cond = self.expr()?;
                self.expect(&Token::Do)?;
                let body = self.block()?;
                self.expect_match(&Token::End, &Token::While, span.line)?;
                StatKind::While { cond, body }
            }
            Token::Do => {
                self.advance()?;
                let body = self.block()?;
                self.expect_match(&Token::End, &Token::Do, span.line)?;
                StatKind::Do(body)
            }
            Token::For => self.for_stat(span.line)?,
            Token::Repeat => {
                self.advance()?;
                let body = self.block()?;
                self.expect_match(&Token::Until, &Token::Repeat, span.line)?;
                let cond = self.expr()?;
                StatKind::Repeat { body, cond }
            }
            Token::Function => self.function_stat(span)?,
            Token::Local => {
                self.advance()?;
                if self.test_next(&Token::Function)? {
                    let name = self.expect_name()?;
                    let label = self.name_text(name);
                    let func = self.func_body(span, false, Some(label))?;
                    StatKind::LocalFunction {
                        name,
                        func: Box::new(func),
                    }
                } else {
                    self.local_stat()?
                }
            }
            Token::DoubleColon => {
                self.advance()?;
                let name = self.expect_name()?;
                self.expect(&Token::DoubleColon)?;
                StatKind::Label(name)
            }
            Token::Break => {
                self.advance()?;
                StatKind::Break
            }
            Token::Goto => {
                self.advance()?;
                StatKind::Goto(self.expect_name()?)
            }
            _ => self.expr_stat()?,
        };
        Ok(Some(Stat::new(kind, span)))
    }

    fn if_stat(&mut self, line: u32) -> Result<StatKind, CompileError> {
        let mut clauses = Vec::new();
        let mut else_block = None;
        // current token is `if` or `elseif`
        loop {
            self.advance()?;
            let cond = self.expr()?;
            self.expect(&Token::Then)?;
            let body = self.block()?;
            clauses.push((cond, body));
            match self.token()? {
                Token::ElseIf => continue,
                Token::Else => {
                    self.advance()?;
                    else_block = Some(self.block()?);
                    break;
                }
                _ => break,
            }
        }
        self.expect_match(&Token::End, &Token::If, line)?;
        Ok(StatKind::If {
            clauses,
            else_block,
        })
    }

    fn for_stat(&mut self, line: u32) -> Result<StatKind, CompileError> {
        self.advance()?;
        let first = self.expect_name()?;
        let kind = match self.token()? {
            Token::Assign => {
                self.advance()?;
                let start = self.expr()?;
                self.expect(&Token::Comma)?;
                let limit = self.expr()?;
                let step = if self.test_next(&Token::Comma)? {
                    Some(self.expr()?)
                } else {
                    None
                };
                self.expect(&Token::Do)?;
                let body = self.block()?;
                StatKind::NumericFor {
                    var: first,
                    start,
                    limit,
                    step,
                    body,
                }
            }
            Token::Comma | Token::In => {
                let mut names = vec![first];
                while self.test_next(&Token::Comma)? {
                    names.push(self.expect_name()?);
                }
                self.expect(&Token::In)?;
                let exprs = self.expr_list()?;
                self.expect(&Token::Do)?;
                let body = self.block()?;
                StatKind::GenericFor { names, exprs, body }
            }
            _ => return Err(self.error_expected("'=' or 'in'")),
        };
        self.expect_match(&Token::End, &Token::For, line)?;
        Ok(kind)
    }

    fn function_stat(&mut self, span: Span) -> Result<StatKind, CompileError> {
        self.advance()?;
        let base = self.expect_name()?;
        let mut label = self.name_text(base);
        let mut fields = Vec::new();
        let mut method = None;
        while self.test_next(&Token::Dot)? {
            let field = self.expect_name()?;
            label.push('.');
            label.push_str(&self.name_text(field));
            fields.push(field);
        }
        if self.test_next(&Token::Colon)? {
            let m = self.expect_name()?;
            label.push(':');
            label.push_str(&self.name_text(m));
            method = Some(m);
        }
        let func = self.func_body(span, method.is_some(), Some(label))?;
        Ok(StatKind::Function {
            name: FuncName {
                base,
                fields,
                method,
            },
            func: Box::new(func),
        })
    }

    fn local_stat(&mut self) -> Result<StatKind, CompileError> {
        let mut names = Vec::new();
        let mut has_close = false;
        loop {
            let name = self.expect_name()?;
            let attrib = if self.test_next(&Token::Less)? {
                let attr = self.expect_name()?;
                let attr_text = self.name_text(attr);
                self.expect(&Token::Greater)?;
                match attr_text.as_str() {
                    "const" => Attrib::Const,
                    "close" => {
                        if has_close {
                            return Err(
                                self.error_near("multiple to-be-closed variables in local list")
                            );
                        }
                        has_close = true;
                        Attrib::Close
                    }
                    _ => {
                        return Err(self.error_near(&format!("unknown attribute '{attr_text}'")));
                    }
                }
            } else {
                Attrib::None
            };
            names.push(LocalName { name, attrib });
            if !self.test_next(&Token::Comma)? {
                break;
            }
        }
        let values = if self.test_next(&Token::Assign)? {
            self.expr_list()?
        } else {
            Vec::new()
        };
        Ok(StatKind::Local { names, values })
    }

    fn expr_stat(&mut self) -> Result<StatKind, CompileError> {
        let first = self.suffixed_expr()?;
        if self.check(&Token::Assign)? || self.check(&Token::Comma)? {
            let mut targets = vec![first];
            while self.test_next(&Token::Comma)? {
                targets.push(self.suffixed_expr()?);
            }
            if targets
                .iter()
                .any(|t| !matches!(t.kind, ExprKind::Name(_) | ExprKind::Index { .. }))
            {
                return Err(self.error_near("syntax error"));
            }
            self.expect(&Token::Assign)?;
            let values = self.expr_list()?;
            return Ok(StatKind::Assign { targets, values });
        }
        if !matches!(first.kind, ExprKind::Call { .. } | ExprKind::Method { .. }) {
            return Err(self.error_near("syntax error"));
        }
        Ok(StatKind::Call(first))
    }

    /// Parameter list and body, starting at `(`.
    fn func_body(
        &mut self,
        span: Span,
        is_method: bool,
        name: Option<String>,
    ) -> Result<FuncBody, CompileError> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if !self.check(&Token::RParen)? {
            loop {
                match self.token()? {
                    Token::Name(id) => {
                        self.advance()?;
                        params.push(id);
                    }
                    Token::DotDotDot => {
                        self.advance()?;
                        is_vararg = true;
                        break;
                    }
                    _ => return Err(self.error_expected("<name>")),
                }
                if !self.test_next(&Token::Comma)? {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        self.vararg.push(is_vararg);
        let body = self.block();
        self.vararg.pop();
        let body = body?;
        let end_line = self.span().line;
        self.expect_match(&Token::End, &Token::Function, span.line)?;
        Ok(FuncBody {
            params,
            is_vararg,
            is_method,
            body,
            span,
            end_line,
            name,
        })
    }

    // ---- Expressions ----

    fn expr_list(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut list = vec![self.expr()?];
        while self.test_next(&Token::Comma)? {
            list.push(self.expr()?);
        }
        Ok(list)
    }

    pub fn expr(&mut self) -> Result<Expr, CompileError> {
        self.sub_expr(0, None)
    }

    /// Precedence climbing. `prefix` is an already-parsed primary expression
    /// (used when a table field turned out not to be `name = value`).
    fn sub_expr(&mut self, limit: u8, prefix: Option<Expr>) -> Result<Expr, CompileError> {
        self.enter_level()?;
        let mut lhs = match prefix {
            Some(primary) => self.suffixed_tail(primary)?,
            None => match unary_op(&self.token()?) {
                Some(op) => {
                    let span = self.span();
                    self.advance()?;
                    let operand = self.sub_expr(UNARY_PRIORITY, None)?;
                    fold_unary(op, operand, span)
                }
                None => self.simple_expr()?,
            },
        };
        while let Some(op) = binary_op(&self.token()?) {
            let (left, right) = op.priority();
            if left <= limit {
                break;
            }
            let span = self.span();
            self.advance()?;
            let rhs = self.sub_expr(right, None)?;
            lhs = fold_binary(op, lhs, rhs, span);
            self.check_depth(lhs.depth)?;
        }
        self.check_depth(lhs.depth)?;
        self.level -= 1;
        Ok(lhs)
    }

    fn simple_expr(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        let kind = match self.token()? {
            Token::Number(n) => ExprKind::Number(n),
            Token::String(s) => ExprKind::String(s),
            Token::Nil => ExprKind::Nil,
            Token::True => ExprKind::True,
            Token::False => ExprKind::False,
            Token::DotDotDot => {
                if !self.vararg.last().copied().unwrap_or(false) {
                    return Err(self.error_near("cannot use '...' outside a vararg function"));
                }
                ExprKind::Vararg
            }
            Token::LBrace => return self.table_constructor(),
            Token::Function => {
                self.advance()?;
                let func = self.func_body(span, false, None)?;
                return Ok(Expr::new(ExprKind::Function(Box::new(func)), span));
            }
            _ => return self.suffixed_expr(),
        };
        self.advance()?;
        Ok(Expr::new(kind, span))
    }

    fn primary_expr(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        match self.token()? {
            Token::Name(id) => {
                self.advance()?;
                Ok(Expr::new(ExprKind::Name(id), span))
            }
            Token::LParen => {
                self.advance()?;
                let inner = self.expr()?;
                self.expect_match(&Token::RParen, &Token::LParen, span.line)?;
                Ok(Expr::new(ExprKind::Paren(Box::new(inner)), span))
            }
            _ => Err(self.error_near("unexpected symbol")),
        }
    }

    fn suffixed_expr(&mut self) -> Result<Expr, CompileError> {
        let primary = self.primary_expr()?;
        self.suffixed_tail(primary)
    }

    fn suffixed_tail(&mut self, mut expr: Expr) -> Result<Expr, CompileError> {
        let span = expr.span;
        loop {
            self.check_depth(expr.depth)?;
            match self.token()? {
                Token::Dot => {
                    self.advance()?;
                    let key_span = self.span();
                    let name = self.expect_name()?;
                    expr = Expr::new(
                        ExprKind::Index {
                            obj: Box::new(expr),
                            key: Box::new(Expr::new(ExprKind::String(name), key_span)),
                        },
                        span,
                    );
                }
                Token::LBracket => {
                    self.advance()?;
                    let key = self.expr()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::new(
                        ExprKind::Index {
                            obj: Box::new(expr),
                            key: Box::new(key),
                        },
                        span,
                    );
                }
                Token::Colon => {
                    self.advance()?;
                    let name = self.expect_name()?;
                    let args = self.call_args()?;
                    expr = Expr::new(
                        ExprKind::Method {
                            obj: Box::new(expr),
                            name,
                            args,
                        },
                        span,
                    );
                }
                Token::LParen | Token::String(_) | Token::LBrace => {
                    let args = self.call_args()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        let span = self.span();
        match self.token()? {
            Token::String(s) => {
                self.advance()?;
                Ok(vec![Expr::new(ExprKind::String(s), span)])
            }
            Token::LBrace => Ok(vec![self.table_constructor()?]),
            Token::LParen => {
                self.advance()?;
                if self.test_next(&Token::RParen)? {
                    return Ok(Vec::new());
                }
                let args = self.expr_list()?;
                self.expect_match(&Token::RParen, &Token::LParen, span.line)?;
                Ok(args)
            }
            _ => Err(self.error_expected("function arguments")),
        }
    }

    fn table_constructor(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        loop {
            if self.check(&Token::RBrace)? {
                break;
            }
            let field = match self.token()? {
                Token::LBracket => {
                    self.advance()?;
                    let key = self.expr()?;
                    self.expect(&Token::RBracket)?;
                    self.expect(&Token::Assign)?;
                    Field::Keyed(key, self.expr()?)
                }
                Token::Name(id) => {
                    let name_span = self.span();
                    self.advance()?;
                    if self.test_next(&Token::Assign)? {
                        Field::Named(id, self.expr()?)
                    } else {
                        let primary = Expr::new(ExprKind::Name(id), name_span);
                        Field::Positional(self.sub_expr(0, Some(primary))?)
                    }
                }
                _ => Field::Positional(self.expr()?),
            };
            fields.push(field);
            if !(self.test_next(&Token::Comma)? || self.test_next(&Token::Semi)?) {
                break;
            }
        }
        self.expect_match(&Token::RBrace, &Token::LBrace, span.line)?;
        Ok(Expr::new(ExprKind::Table(fields), span))
    }
}

fn unary_op(tok: &Token) -> Option<UnOp> {
    match tok {
        Token::Not => Some(UnOp::Not),
        Token::Minus => Some(UnOp::Neg),
        Token::Tilde => Some(UnOp::BNot),
        Token::Hash => Some(UnOp::Len),
        _ => None,
    }
}

fn binary_op(tok: &Token) -> Option<BinOp> {
    Some(match tok {
        Token::Plus => BinOp::Add,
        Token::Minus => BinOp::Sub,
        Token::Star => BinOp::Mul,
        Token::Slash => BinOp::Div,
        Token::FloorDiv => BinOp::IDiv,
        Token::Percent => BinOp::Mod,
        Token::Caret => BinOp::Pow,
        Token::DotDot => BinOp::Concat,
        Token::ShiftLeft => BinOp::Shl,
        Token::ShiftRight => BinOp::Shr,
        Token::Ampersand => BinOp::BAnd,
        Token::Pipe => BinOp::BOr,
        Token::Tilde => BinOp::BXor,
        Token::Equal => BinOp::Eq,
        Token::NotEqual => BinOp::NotEq,
        Token::Less => BinOp::Lt,
        Token::LessEq => BinOp::LtEq,
        Token::Greater => BinOp::Gt,
        Token::GreaterEq => BinOp::GtEq,
        Token::And => BinOp::And,
        Token::Or => BinOp::Or,
        _ => return None,
    })
}

/// Fold `-<number>` at parse time so negative literals become constants.
fn fold_unary(op: UnOp, operand: Expr, span: Span) -> Expr {
    if let (UnOp::Neg, ExprKind::Number(n)) = (op, &operand.kind) {
        if *n != 0.0 {
            return Expr::new(ExprKind::Number(-n), span);
        }
    }
    Expr::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        span,
    )
}

/// Fold arithmetic on two numeric literals. Folds that would produce NaN
/// or -0 are left to run time so constants stay canonical.
fn fold_binary(op: BinOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
    if let (ExprKind::Number(a), ExprKind::Number(b)) = (&lhs.kind, &rhs.kind) {
        let (a, b) = (*a, *b);
        let folded = match op {
            BinOp::Add => Some(a + b),
            BinOp::Sub => Some(a - b),
            BinOp::Mul => Some(a * b),
            BinOp::Div if b != 0.0 => Some(a / b),
            BinOp::Pow => Some(a.powf(b)),
            BinOp::IDiv if b != 0.0 => Some((a / b).floor()),
            BinOp::Mod if b != 0.0 && b.is_finite() => {
                let r = a % b;
                Some(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r })
            }
            _ => None,
        };
        if let Some(v) = folded {
            if !v.is_nan() && !(v == 0.0 && v.is_sign_negative()) {
                return Expr::new(ExprKind::Number(v), span);
            }
        }
    }
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}
