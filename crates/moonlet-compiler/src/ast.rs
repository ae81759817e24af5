//! Syntax tree produced by the parser and consumed by the code generator.
//!
//! Nodes own their children and carry the [`Span`] of their first token.
//! Every block, statement and expression also records its `depth`: the
//! height of the subtree below it, which bounds the recursion of any pass
//! that walks it.
use crate::token::Span;
use moonlet_core::string::StringId;

/// A parsed source unit: the body of the implicit vararg main function.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub body: Block,
    /// Line of the last token, used for the implicit final return.
    pub end_line: u32,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Block {
    pub stats: Vec<Stat>,
    pub ret: Option<Return>,
    pub depth: u32,
}

impl Block {
    pub fn new(stats: Vec<Stat>, ret: Option<Return>) -> Self {
        let ret_depth = ret.as_ref().map_or(0, |r| max_depth(&r.values));
        let depth = stats.iter().map(|s| s.depth).fold(ret_depth, u32::max);
        Block { stats, ret, depth }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Return {
    pub values: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stat {
    pub kind: StatKind,
    pub span: Span,
    pub depth: u32,
}

impl Stat {
    pub fn new(kind: StatKind, span: Span) -> Self {
        let depth = kind.child_depth() + 1;
        Stat { kind, span, depth }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attrib {
    None,
    Const,
    Close,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalName {
    pub name: StringId,
    pub attrib: Attrib,
}

/// `function a.b.c:m()` target.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncName {
    pub base: StringId,
    pub fields: Vec<StringId>,
    pub method: Option<StringId>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StatKind {
    /// Function call used as a statement.
    Call(Expr),
    Assign {
        targets: Vec<Expr>,
        values: Vec<Expr>,
    },
    Local {
        names: Vec<LocalName>,
        values: Vec<Expr>,
    },
    LocalFunction {
        name: StringId,
        func: Box<FuncBody>,
    },
    Function {
        name: FuncName,
        func: Box<FuncBody>,
    },
    Do(Block),
    While {
        cond: Expr,
        body: Block,
    },
    Repeat {
        body: Block,
        cond: Expr,
    },
    If {
        clauses: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },
    NumericFor {
        var: StringId,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    GenericFor {
        names: Vec<StringId>,
        exprs: Vec<Expr>,
        body: Block,
    },
    Break,
    Goto(StringId),
    Label(StringId),
}

impl StatKind {
    fn child_depth(&self) -> u32 {
        match self {
            StatKind::Call(e) => e.depth,
            StatKind::Assign { targets, values } => max_depth(targets).max(max_depth(values)),
            StatKind::Local { values, .. } => max_depth(values),
            StatKind::LocalFunction { func, .. } | StatKind::Function { func, .. } => func.body.depth,
            StatKind::Do(body) => body.depth,
            StatKind::While { cond, body } | StatKind::Repeat { body, cond } => cond.depth.max(body.depth),
            StatKind::If { clauses, else_block } => clauses
                .iter()
                .map(|(cond, body)| cond.depth.max(body.depth))
                .fold(else_block.as_ref().map_or(0, |b| b.depth), u32::max),
            StatKind::NumericFor {
                start,
                limit,
                step,
                body,
                ..
            } => start
                .depth
                .max(limit.depth)
                .max(step.as_ref().map_or(0, |e| e.depth))
                .max(body.depth),
            StatKind::GenericFor { exprs, body, .. } => max_depth(exprs).max(body.depth),
            StatKind::Break | StatKind::Goto(_) | StatKind::Label(_) => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncBody {
    pub params: Vec<StringId>,
    pub is_vararg: bool,
    /// Methods get an implicit `self` first parameter.
    pub is_method: bool,
    pub body: Block,
    pub span: Span,
    pub end_line: u32,
    /// Name used in tracebacks (`f`, `a.b`, `a:m`), if statically known.
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub depth: u32,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        let depth = kind.child_depth() + 1;
        Expr { kind, span, depth }
    }

    /// Calls and `...` can produce a variable number of values.
    pub fn is_multi(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Call { .. } | ExprKind::Method { .. } | ExprKind::Vararg
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Nil,
    True,
    False,
    Number(f64),
    String(StringId),
    Vararg,
    Function(Box<FuncBody>),
    Table(Vec<Field>),
    Name(StringId),
    Index {
        obj: Box<Expr>,
        key: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Method {
        obj: Box<Expr>,
        name: StringId,
        args: Vec<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    /// Parenthesized expression; truncates multiple results to one.
    Paren(Box<Expr>),
}

impl ExprKind {
    fn child_depth(&self) -> u32 {
        match self {
            ExprKind::Function(func) => func.body.depth,
            ExprKind::Table(fields) => fields.iter().map(Field::depth).max().unwrap_or(0),
            ExprKind::Index { obj, key } => obj.depth.max(key.depth),
            ExprKind::Call { func, args } => func.depth.max(max_depth(args)),
            ExprKind::Method { obj, args, .. } => obj.depth.max(max_depth(args)),
            ExprKind::Binary { lhs, rhs, .. } => lhs.depth.max(rhs.depth),
            ExprKind::Unary { operand, .. } | ExprKind::Paren(operand) => operand.depth,
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    /// `expr`
    Positional(Expr),
    /// `name = expr`
    Named(StringId, Expr),
    /// `[key] = expr`
    Keyed(Expr, Expr),
}

impl Field {
    fn depth(&self) -> u32 {
        match self {
            Field::Positional(e) | Field::Named(_, e) => e.depth,
            Field::Keyed(k, v) => k.depth.max(v.depth),
        }
    }
}

fn max_depth(exprs: &[Expr]) -> u32 {
    exprs.iter().map(|e| e.depth).max().unwrap_or(0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Shl,
    Shr,
    BAnd,
    BOr,
    BXor,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    BNot,
    Not,
    Len,
}

/// Binding power of unary operators.
pub const UNARY_PRIORITY: u8 = 12;

impl BinOp {
    /// (left, right) binding priority; right < left means right-associative.
    pub fn priority(self) -> (u8, u8) {
        match self {
            BinOp::Or => (1, 1),
            BinOp::And => (2, 2),
            BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq | BinOp::NotEq | BinOp::Eq => (3, 3),
            BinOp::BOr => (4, 4),
            BinOp::BXor => (5, 5),
            BinOp::BAnd => (6, 6),
            BinOp::Shl | BinOp::Shr => (7, 7),
            BinOp::Concat => (9, 8),
            BinOp::Add | BinOp::Sub => (10, 10),
            BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Mod => (11, 11),
            BinOp::Pow => (14, 13),
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq
        )
    }

    pub fn is_arith(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Mod | BinOp::Pow
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinOp::BAnd | BinOp::BOr | BinOp::BXor | BinOp::Shl | BinOp::Shr
        )
    }
}
