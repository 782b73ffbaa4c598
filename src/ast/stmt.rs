use super::{BlockProperties, Comment, Expr, Kind, Provenance, Var};
use crate::error::NodeDefect;
use crate::types::{is_assignable, BlocklyType};

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign(AssignStmt),
    If(IfStmt),
    RepeatTimes(RepeatTimesStmt),
    WhileUntil(WhileUntilStmt),
    For(ForStmt),
    ForEach(ForEachStmt),
    FlowControl(FlowControlStmt),
    WaitTime(WaitTimeStmt),
    Print(PrintStmt),
}

impl Stmt {
    pub fn kind(&self) -> Kind {
        match self {
            Stmt::Assign(_) => Kind::AssignStmt,
            Stmt::If(_) => Kind::IfStmt,
            Stmt::RepeatTimes(_) => Kind::RepeatTimesStmt,
            Stmt::WhileUntil(_) => Kind::WhileUntilStmt,
            Stmt::For(_) => Kind::ForStmt,
            Stmt::ForEach(_) => Kind::ForEachStmt,
            Stmt::FlowControl(_) => Kind::FlowControlStmt,
            Stmt::WaitTime(_) => Kind::WaitTimeStmt,
            Stmt::Print(_) => Kind::PrintStmt,
        }
    }

    pub fn provenance(&self) -> &Provenance {
        match self {
            Stmt::Assign(s) => &s.provenance,
            Stmt::If(s) => &s.provenance,
            Stmt::RepeatTimes(s) => &s.provenance,
            Stmt::WhileUntil(s) => &s.provenance,
            Stmt::For(s) => &s.provenance,
            Stmt::ForEach(s) => &s.provenance,
            Stmt::FlowControl(s) => &s.provenance,
            Stmt::WaitTime(s) => &s.provenance,
            Stmt::Print(s) => &s.provenance,
        }
    }

    pub fn block_id(&self) -> &str {
        self.provenance().block_id()
    }
}

/// Statements in execution order, as threaded through `next` links.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StmtList {
    stmts: Vec<Stmt>,
}

impl StmtList {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stmt> {
        self.stmts.iter()
    }

    pub fn as_slice(&self) -> &[Stmt] {
        &self.stmts
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

impl<'a> IntoIterator for &'a StmtList {
    type Item = &'a Stmt;
    type IntoIter = std::slice::Iter<'a, Stmt>;

    fn into_iter(self) -> Self::IntoIter {
        self.stmts.iter()
    }
}

fn expect_type(
    node: &'static str,
    what: &str,
    expected: &BlocklyType,
    expr: &Expr,
) -> Result<(), NodeDefect> {
    if is_assignable(expected, &expr.ty()) {
        Ok(())
    } else {
        Err(NodeDefect::new(
            node,
            format!("{} has type {}, expected {}", what, expr.ty(), expected),
        ))
    }
}

/// The `variables_set` block: `name := expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignStmt {
    name: Var,
    expr: Expr,
    provenance: Provenance,
}

impl AssignStmt {
    /// Both children are complete nodes; the target's type must accept the
    /// value's type.
    pub fn make(
        name: Var,
        expr: Expr,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        expect_type("AssignStmt", "assigned value", name.var_type(), &expr)?;
        Ok(Self {
            name,
            expr,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn name(&self) -> &Var {
        &self.name
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// `controls_if`: one or more guarded branches and an optional else.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    conditions: Vec<Expr>,
    then_branches: Vec<StmtList>,
    else_branch: Option<StmtList>,
    provenance: Provenance,
}

impl IfStmt {
    pub fn make(
        conditions: Vec<Expr>,
        then_branches: Vec<StmtList>,
        else_branch: Option<StmtList>,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        if conditions.is_empty() {
            return Err(NodeDefect::new("IfStmt", "at least one branch is required"));
        }
        if conditions.len() != then_branches.len() {
            return Err(NodeDefect::new(
                "IfStmt",
                format!(
                    "{} conditions but {} branches",
                    conditions.len(),
                    then_branches.len()
                ),
            ));
        }
        for condition in &conditions {
            expect_type("IfStmt", "condition", &BlocklyType::Boolean, condition)?;
        }
        Ok(Self {
            conditions,
            then_branches,
            else_branch,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn conditions(&self) -> &[Expr] {
        &self.conditions
    }

    pub fn then_branches(&self) -> &[StmtList] {
        &self.then_branches
    }

    /// Pairs of condition and guarded body, in order.
    pub fn branches(&self) -> impl Iterator<Item = (&Expr, &StmtList)> {
        self.conditions.iter().zip(self.then_branches.iter())
    }

    pub fn else_branch(&self) -> Option<&StmtList> {
        self.else_branch.as_ref()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepeatTimesStmt {
    times: Expr,
    body: StmtList,
    provenance: Provenance,
}

impl RepeatTimesStmt {
    pub fn make(
        times: Expr,
        body: StmtList,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        expect_type("RepeatTimesStmt", "repeat count", &BlocklyType::Number, &times)?;
        Ok(Self {
            times,
            body,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn times(&self) -> &Expr {
        &self.times
    }

    pub fn body(&self) -> &StmtList {
        &self.body
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopMode {
    While,
    Until,
}

impl LoopMode {
    pub fn field_value(self) -> &'static str {
        match self {
            LoopMode::While => "WHILE",
            LoopMode::Until => "UNTIL",
        }
    }

    pub fn from_field(value: &str) -> Option<Self> {
        match value {
            "WHILE" => Some(LoopMode::While),
            "UNTIL" => Some(LoopMode::Until),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileUntilStmt {
    mode: LoopMode,
    condition: Expr,
    body: StmtList,
    provenance: Provenance,
}

impl WhileUntilStmt {
    pub fn make(
        mode: LoopMode,
        condition: Expr,
        body: StmtList,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        expect_type(
            "WhileUntilStmt",
            "loop condition",
            &BlocklyType::Boolean,
            &condition,
        )?;
        Ok(Self {
            mode,
            condition,
            body,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    pub fn body(&self) -> &StmtList {
        &self.body
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Counting loop `for var from .. to .. by ..`, bounds inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    var: Var,
    from: Expr,
    to: Expr,
    by: Expr,
    body: StmtList,
    provenance: Provenance,
}

impl ForStmt {
    pub fn make(
        var: Var,
        from: Expr,
        to: Expr,
        by: Expr,
        body: StmtList,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        if !is_assignable(&BlocklyType::Number, var.var_type()) {
            return Err(NodeDefect::new(
                "ForStmt",
                format!("loop variable has type {}", var.var_type()),
            ));
        }
        for (what, bound) in [("FROM", &from), ("TO", &to), ("BY", &by)] {
            expect_type("ForStmt", what, &BlocklyType::Number, bound)?;
        }
        Ok(Self {
            var,
            from,
            to,
            by,
            body,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn var(&self) -> &Var {
        &self.var
    }

    pub fn from(&self) -> &Expr {
        &self.from
    }

    pub fn to(&self) -> &Expr {
        &self.to
    }

    pub fn by(&self) -> &Expr {
        &self.by
    }

    pub fn body(&self) -> &StmtList {
        &self.body
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEachStmt {
    var: Var,
    list: Expr,
    body: StmtList,
    provenance: Provenance,
}

impl ForEachStmt {
    pub fn make(
        var: Var,
        list: Expr,
        body: StmtList,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        let expected = BlocklyType::array_of(var.var_type().clone());
        expect_type("ForEachStmt", "iterated list", &expected, &list)?;
        Ok(Self {
            var,
            list,
            body,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn var(&self) -> &Var {
        &self.var
    }

    pub fn list(&self) -> &Expr {
        &self.list
    }

    pub fn body(&self) -> &StmtList {
        &self.body
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Break,
    Continue,
}

impl FlowKind {
    pub fn field_value(self) -> &'static str {
        match self {
            FlowKind::Break => "BREAK",
            FlowKind::Continue => "CONTINUE",
        }
    }

    pub fn from_field(value: &str) -> Option<Self> {
        match value {
            "BREAK" => Some(FlowKind::Break),
            "CONTINUE" => Some(FlowKind::Continue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowControlStmt {
    flow: FlowKind,
    provenance: Provenance,
}

impl FlowControlStmt {
    pub fn make(
        flow: FlowKind,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        Ok(Self {
            flow,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn flow(&self) -> FlowKind {
        self.flow
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Pause for a number of milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitTimeStmt {
    time: Expr,
    provenance: Provenance,
}

impl WaitTimeStmt {
    pub fn make(
        time: Expr,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        expect_type("WaitTimeStmt", "wait time", &BlocklyType::Number, &time)?;
        Ok(Self {
            time,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn time(&self) -> &Expr {
        &self.time
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrintStmt {
    text: Expr,
    provenance: Provenance,
}

impl PrintStmt {
    pub fn make(
        text: Expr,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        Ok(Self {
            text,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn text(&self) -> &Expr {
        &self.text
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NumConst, StringConst};

    fn props(id: &str) -> BlockProperties {
        BlockProperties::new(id)
    }

    fn var(name: &str, ty: BlocklyType) -> Var {
        Var::make(name, ty, props("v"), None).unwrap()
    }

    fn num(literal: &str) -> Expr {
        Expr::Num(NumConst::make(literal, props("n"), None).unwrap())
    }

    fn text(value: &str) -> Expr {
        Expr::Str(StringConst::make(value, props("s"), None).unwrap())
    }

    #[test]
    fn assign_keeps_children() {
        let stmt = AssignStmt::make(
            var("x", BlocklyType::Number),
            num("5"),
            props("b1"),
            Some(Comment::new("set x")),
        )
        .unwrap();
        assert_eq!(stmt.name().name(), "x");
        assert_eq!(stmt.expr().ty(), BlocklyType::Number);
        assert_eq!(stmt.provenance().comment().map(|c| c.text.as_str()), Some("set x"));
    }

    #[test]
    fn assign_rejects_incompatible_value() {
        let err = AssignStmt::make(var("x", BlocklyType::Number), text("hi"), props("b1"), None)
            .unwrap_err();
        assert_eq!(err.node, "AssignStmt");
    }

    #[test]
    fn assign_accepts_placeholder_target() {
        assert!(
            AssignStmt::make(var("x", BlocklyType::Captured), text("hi"), props("b1"), None)
                .is_ok()
        );
    }

    #[test]
    fn if_requires_matching_branches() {
        let cond = || {
            Expr::Bool(crate::ast::BoolConst::make(true, props("c"), None).unwrap())
        };
        assert!(IfStmt::make(vec![], vec![], None, props("i"), None).is_err());
        assert!(IfStmt::make(vec![cond()], vec![], None, props("i"), None).is_err());
        assert!(IfStmt::make(vec![num("1")], vec![StmtList::default()], None, props("i"), None)
            .is_err());
        let stmt = IfStmt::make(
            vec![cond(), cond()],
            vec![StmtList::default(), StmtList::default()],
            Some(StmtList::default()),
            props("i"),
            None,
        )
        .unwrap();
        assert_eq!(stmt.branches().count(), 2);
        assert!(stmt.else_branch().is_some());
    }

    #[test]
    fn for_loop_variable_must_be_numeric() {
        let body = StmtList::default();
        assert!(ForStmt::make(
            var("i", BlocklyType::String),
            num("1"),
            num("10"),
            num("1"),
            body.clone(),
            props("f"),
            None
        )
        .is_err());
        assert!(ForStmt::make(
            var("i", BlocklyType::Number),
            num("1"),
            num("10"),
            num("1"),
            body,
            props("f"),
            None
        )
        .is_ok());
    }

    #[test]
    fn for_each_requires_matching_list() {
        let body = StmtList::default();
        assert!(
            ForEachStmt::make(var("x", BlocklyType::Number), num("3"), body, props("fe"), None)
                .is_err()
        );
    }
}
