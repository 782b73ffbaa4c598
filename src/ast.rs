//! Immutable AST for block programs.
//!
//! Nodes are built only through their `make` factories, which check every
//! precondition before a value exists. Fields are private and there are no
//! mutating accessors, so a finished tree can be shared freely between
//! threads.

pub mod expr;
pub mod stmt;

pub use crate::block::{Comment, Mutation, Position};
pub use expr::{
    BinaryExpr, BinaryOp, BoolConst, Expr, ListCreate, ListLength, NumConst, StringConst,
    TextJoin, UnaryExpr, UnaryOp, Var,
};
pub use stmt::{
    AssignStmt, FlowControlStmt, FlowKind, ForEachStmt, ForStmt, IfStmt, LoopMode, PrintStmt,
    RepeatTimesStmt, Stmt, StmtList, WaitTimeStmt, WhileUntilStmt,
};

/// Display-only metadata copied from the originating block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockProperties {
    pub block_id: String,
    pub position: Option<Position>,
    pub disabled: bool,
    pub collapsed: bool,
    pub inline: Option<bool>,
    pub deletable: Option<bool>,
    pub movable: Option<bool>,
    /// The mutation as it was read. Attributes derived from the tree are
    /// rendered over it; the rest come back untouched.
    pub mutation: Option<Mutation>,
}

impl BlockProperties {
    pub fn new(block_id: &str) -> Self {
        Self {
            block_id: block_id.to_string(),
            ..Self::default()
        }
    }
}

/// Where a node came from: block properties plus the user's comment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Provenance {
    properties: BlockProperties,
    comment: Option<Comment>,
}

impl Provenance {
    pub fn new(properties: BlockProperties, comment: Option<Comment>) -> Self {
        Self {
            properties,
            comment,
        }
    }

    pub fn properties(&self) -> &BlockProperties {
        &self.properties
    }

    pub fn comment(&self) -> Option<&Comment> {
        self.comment.as_ref()
    }

    pub fn block_id(&self) -> &str {
        &self.properties.block_id
    }
}

/// Variant tag of a node, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    AssignStmt,
    IfStmt,
    RepeatTimesStmt,
    WhileUntilStmt,
    ForStmt,
    ForEachStmt,
    FlowControlStmt,
    WaitTimeStmt,
    PrintStmt,
    Var,
    NumConst,
    BoolConst,
    StringConst,
    Binary,
    Unary,
    ListCreate,
    ListLength,
    TextJoin,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::AssignStmt => "ASSIGN_STMT",
            Kind::IfStmt => "IF_STMT",
            Kind::RepeatTimesStmt => "REPEAT_TIMES_STMT",
            Kind::WhileUntilStmt => "WHILE_UNTIL_STMT",
            Kind::ForStmt => "FOR_STMT",
            Kind::ForEachStmt => "FOR_EACH_STMT",
            Kind::FlowControlStmt => "FLOW_CONTROL_STMT",
            Kind::WaitTimeStmt => "WAIT_TIME_STMT",
            Kind::PrintStmt => "PRINT_STMT",
            Kind::Var => "VAR",
            Kind::NumConst => "NUM_CONST",
            Kind::BoolConst => "BOOL_CONST",
            Kind::StringConst => "STRING_CONST",
            Kind::Binary => "BINARY",
            Kind::Unary => "UNARY",
            Kind::ListCreate => "LIST_CREATE",
            Kind::ListLength => "LIST_LENGTH",
            Kind::TextJoin => "TEXT_JOIN",
        }
    }

    pub fn is_stmt(self) -> bool {
        matches!(
            self,
            Kind::AssignStmt
                | Kind::IfStmt
                | Kind::RepeatTimesStmt
                | Kind::WhileUntilStmt
                | Kind::ForStmt
                | Kind::ForEachStmt
                | Kind::FlowControlStmt
                | Kind::WaitTimeStmt
                | Kind::PrintStmt
        )
    }
}

/// Any node of the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Phrase {
    Stmt(Stmt),
    Expr(Expr),
}

impl Phrase {
    pub fn kind(&self) -> Kind {
        match self {
            Phrase::Stmt(stmt) => stmt.kind(),
            Phrase::Expr(expr) => expr.kind(),
        }
    }

    pub fn provenance(&self) -> &Provenance {
        match self {
            Phrase::Stmt(stmt) => stmt.provenance(),
            Phrase::Expr(expr) => expr.provenance(),
        }
    }
}

/// One top-level entry of the workspace.
#[derive(Debug, Clone, PartialEq)]
pub enum Root {
    Statements(StmtList),
    Expr(Expr),
}

impl Root {
    pub fn is_disabled(&self) -> bool {
        match self {
            Root::Statements(list) => list
                .iter()
                .next()
                .map(|s| s.provenance().properties().disabled)
                .unwrap_or(false),
            Root::Expr(expr) => expr.provenance().properties().disabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    roots: Vec<Root>,
}

impl Program {
    pub fn new(roots: Vec<Root>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[Root] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
