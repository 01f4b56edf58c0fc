//! AST contract consumed by the evaluator.
//!
//! Every node carries a [`Pos`], a byte offset into the source, for error reporting.
//! Tagged variants over inheritance, so each node shape is checked exhaustively at
//! every match site instead of relying on virtual dispatch.

/// Byte offset into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pos(pub u32);

/// The two mutability tokens that make up a declaration's flavor.
///
/// Reassignable iff the first token is `var`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    VarVar,
    VarConst,
    ConstVar,
    ConstConst,
}

impl Mutability {
    #[must_use]
    pub fn is_reassignable(self) -> bool {
        matches!(self, Self::VarVar | Self::VarConst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifetimeKind {
    None,
    Infinity,
    Lines(u64),
    Seconds(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    EqLoose,
    EqStrict,
    EqVeryStrict,
    EqVeryLoose,
}

/// Logical `not` is a stdlib function (`not(x)`), not a unary operator, so the only
/// true prefix operator here is minus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostfixKind {
    Inc,
    Dec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(TriLit),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriLit {
    False,
    True,
    Maybe,
}

/// Array/object destructuring pattern used by `when target matches <pattern>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Binding { name: String, default: Option<Expr> },
    Array { elements: Vec<Pattern>, rest: Option<String> },
    Object { fields: Vec<ObjectPatternField> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatternField {
    pub key: String,
    pub pattern: Box<Pattern>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal, Pos),
    Identifier(String, Pos),
    ArrayLiteral(Vec<Expr>, Pos),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr>, pos: Pos },
    Unary { op: UnaryOp, expr: Box<Expr>, pos: Pos },
    /// `c ? t : f`, with optional extra arms for `maybe` and `undefined`.
    Conditional {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        maybe_branch: Option<Box<Expr>>,
        undefined_branch: Option<Box<Expr>>,
        pos: Pos,
    },
    Call { callee: Box<Expr>, args: Vec<Expr>, pos: Pos },
    Index { target: Box<Expr>, index: Box<Expr>, pos: Pos },
    /// `target[i] = v`; the base of `target` must resolve to an identifier at eval time.
    IndexAssign { target: Box<Expr>, index: Box<Expr>, value: Box<Expr>, pos: Pos },
    /// `x++`, `x++++`, `x--`, also valid with an `Index` operand.
    PostfixUpdate { target: Box<Expr>, kind: PostfixKind, delta: u32, pos: Pos },
    /// `x**`, `x****`.
    PowerStars { target: Box<Expr>, delta: u32, pos: Pos },
    /// prefix `\\x` -- fixed square root.
    PrefixRoot { expr: Box<Expr>, pos: Pos },
    /// `a \\ n` -- n-th root.
    RootInfix { base: Box<Expr>, degree: Box<Expr>, pos: Pos },
}

impl Expr {
    #[must_use]
    pub fn pos(&self) -> Pos {
        match self {
            Self::Literal(_, p)
            | Self::Identifier(_, p)
            | Self::ArrayLiteral(_, p)
            | Self::Binary { pos: p, .. }
            | Self::Unary { pos: p, .. }
            | Self::Conditional { pos: p, .. }
            | Self::Call { pos: p, .. }
            | Self::Index { pos: p, .. }
            | Self::IndexAssign { pos: p, .. }
            | Self::PostfixUpdate { pos: p, .. }
            | Self::PowerStars { pos: p, .. }
            | Self::PrefixRoot { pos: p, .. }
            | Self::RootInfix { pos: p, .. } => *p,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub name: String,
    pub is_static: bool,
    pub initializer: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub properties: Vec<PropertyDecl>,
    pub instance_methods: Vec<FunctionDecl>,
    pub static_methods: Vec<FunctionDecl>,
    pub instance_fallback: Option<String>,
    pub static_fallback: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenDecl {
    pub condition: Expr,
    pub pattern: Option<(Expr, Pattern, Option<Expr>)>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    Binding(String),
    Value(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl {
        mutability: Mutability,
        name: String,
        priority: u32,
        lifetime: LifetimeKind,
        init: Expr,
        pos: Pos,
    },
    ConstConstConst {
        name: String,
        init: Expr,
        pos: Pos,
    },
    Assign {
        name: String,
        value: Expr,
        pos: Pos,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        idk_branch: Option<Vec<Stmt>>,
        pos: Pos,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        pos: Pos,
    },
    Break(Pos),
    Continue(Pos),
    Return(Option<Expr>, Pos),
    When(WhenDecl, Pos),
    Delete(DeleteTarget, Pos),
    Function(FunctionDecl, Pos),
    Class(ClassDecl, Pos),
    Block(Vec<Stmt>, Pos),
    /// An expression statement; `debug_print` is set when the source had a trailing `?`.
    ExpressionStatement { expr: Expr, debug_print: bool, pos: Pos },
}

impl Stmt {
    #[must_use]
    pub fn pos(&self) -> Pos {
        match self {
            Self::VarDecl { pos, .. }
            | Self::ConstConstConst { pos, .. }
            | Self::Assign { pos, .. }
            | Self::If { pos, .. }
            | Self::While { pos, .. }
            | Self::Break(pos)
            | Self::Continue(pos)
            | Self::Return(_, pos)
            | Self::When(_, pos)
            | Self::Delete(_, pos)
            | Self::Function(_, pos)
            | Self::Class(_, pos)
            | Self::Block(_, pos)
            | Self::ExpressionStatement { pos, .. } => *pos,
        }
    }
}

pub type Program = Vec<Stmt>;
