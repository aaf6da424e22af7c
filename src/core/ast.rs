// Expression tree produced by the parser. Nodes own their children; every node
// records the position of its first character.
use crate::core::diagnostic::Pos;

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
    height: u32,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        let height = kind.child_height().saturating_add(1);
        Self { kind, pos, height }
    }

    /// Number of nodes on the longest path from this node to a leaf.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Node kind label used in diagnostics ("Num", "Call", "ListComp", ...).
    pub fn node_name(&self) -> &'static str {
        self.kind.node_name()
    }

    /// Dotted name spelled by a `Name`/`Attribute` chain, if the chain is rooted at a name.
    pub fn dotted_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Name(name) => Some(name.clone()),
            ExprKind::Attribute { value, attr } => {
                let mut prefix = value.dotted_name()?;
                prefix.push('.');
                prefix.push_str(attr);
                Some(prefix)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    MatMul,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Invert,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComprehensionKind {
    List,
    Set,
    Dict,
    Generator,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Keyword {
    pub name: String,
    pub value: Expr,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Imaginary(f64),
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
    None,
    Name(String),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    // Parsed only so they can be rejected with a precise diagnostic.
    Starred(Box<Expr>),
    DoubleStarred(Box<Expr>),
    Compare {
        left: Box<Expr>,
        rest: Vec<Expr>,
    },
    BoolOp(Vec<Expr>),
    IfExp {
        body: Box<Expr>,
        test: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        body: Box<Expr>,
    },
    Comprehension {
        kind: ComprehensionKind,
        element: Box<Expr>,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    FormattedString(String),
}

impl ExprKind {
    pub fn node_name(&self) -> &'static str {
        match self {
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Imaginary(_) => "Num",
            ExprKind::Str(_) => "Str",
            ExprKind::Bytes(_) => "Bytes",
            ExprKind::Bool(_) | ExprKind::None => "NameConstant",
            ExprKind::Name(_) => "Name",
            ExprKind::Attribute { .. } => "Attribute",
            ExprKind::Tuple(_) => "Tuple",
            ExprKind::List(_) => "List",
            ExprKind::Set(_) => "Set",
            ExprKind::Dict(_) => "Dict",
            ExprKind::Call { .. } => "Call",
            ExprKind::BinOp { .. } => "BinOp",
            ExprKind::UnaryOp { .. } => "UnaryOp",
            ExprKind::Starred(_) | ExprKind::DoubleStarred(_) => "Starred",
            ExprKind::Compare { .. } => "Compare",
            ExprKind::BoolOp(_) => "BoolOp",
            ExprKind::IfExp { .. } => "IfExp",
            ExprKind::Lambda { .. } => "Lambda",
            ExprKind::Comprehension { kind, .. } => match kind {
                ComprehensionKind::List => "ListComp",
                ComprehensionKind::Set => "SetComp",
                ComprehensionKind::Dict => "DictComp",
                ComprehensionKind::Generator => "GeneratorExp",
            },
            ExprKind::Subscript { .. } => "Subscript",
            ExprKind::FormattedString(_) => "JoinedStr",
        }
    }

    fn child_height(&self) -> u32 {
        fn tallest<'a>(items: impl IntoIterator<Item = &'a Expr>) -> u32 {
            items.into_iter().map(Expr::height).max().unwrap_or(0)
        }
        match self {
            ExprKind::Attribute { value, .. }
            | ExprKind::UnaryOp { operand: value, .. }
            | ExprKind::Starred(value)
            | ExprKind::DoubleStarred(value)
            | ExprKind::Lambda { body: value }
            | ExprKind::Comprehension { element: value, .. } => value.height,
            ExprKind::Tuple(items)
            | ExprKind::List(items)
            | ExprKind::Set(items)
            | ExprKind::BoolOp(items) => tallest(items),
            ExprKind::Dict(entries) => {
                tallest(entries.iter().flat_map(|(key, value)| [key, value]))
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => func
                .height
                .max(tallest(args))
                .max(tallest(keywords.iter().map(|keyword| &keyword.value))),
            ExprKind::BinOp { left, right, .. }
            | ExprKind::Subscript {
                value: left,
                index: right,
            } => left.height.max(right.height),
            ExprKind::Compare { left, rest } => left.height.max(tallest(rest)),
            ExprKind::IfExp { body, test, orelse } => tallest([&**body, &**test, &**orelse]),
            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Imaginary(_)
            | ExprKind::Str(_)
            | ExprKind::Bytes(_)
            | ExprKind::Bool(_)
            | ExprKind::None
            | ExprKind::Name(_)
            | ExprKind::FormattedString(_) => 0,
        }
    }

    pub fn is_numeric_atom(&self) -> bool {
        matches!(
            self,
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Imaginary(_)
        )
    }
}
