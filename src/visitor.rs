//! Per-variant dispatch.
//!
//! Every method of [`AstVisitor`] is required. `accept` is an exhaustive
//! `match`, so a new variant does not compile until every visitor handles it.

use crate::ast::{
    AssignStmt, BinaryExpr, BoolConst, Expr, FlowControlStmt, ForEachStmt, ForStmt, IfStmt,
    ListCreate, ListLength, NumConst, Phrase, PrintStmt, RepeatTimesStmt, Stmt, StmtList,
    StringConst, TextJoin, UnaryExpr, Var, WaitTimeStmt, WhileUntilStmt,
};

pub trait AstVisitor {
    type Output;

    fn visit_assign_stmt(&mut self, stmt: &AssignStmt) -> Self::Output;
    fn visit_if_stmt(&mut self, stmt: &IfStmt) -> Self::Output;
    fn visit_repeat_times_stmt(&mut self, stmt: &RepeatTimesStmt) -> Self::Output;
    fn visit_while_until_stmt(&mut self, stmt: &WhileUntilStmt) -> Self::Output;
    fn visit_for_stmt(&mut self, stmt: &ForStmt) -> Self::Output;
    fn visit_for_each_stmt(&mut self, stmt: &ForEachStmt) -> Self::Output;
    fn visit_flow_control_stmt(&mut self, stmt: &FlowControlStmt) -> Self::Output;
    fn visit_wait_time_stmt(&mut self, stmt: &WaitTimeStmt) -> Self::Output;
    fn visit_print_stmt(&mut self, stmt: &PrintStmt) -> Self::Output;

    fn visit_var(&mut self, var: &Var) -> Self::Output;
    fn visit_num_const(&mut self, num: &NumConst) -> Self::Output;
    fn visit_bool_const(&mut self, value: &BoolConst) -> Self::Output;
    fn visit_string_const(&mut self, value: &StringConst) -> Self::Output;
    fn visit_binary(&mut self, expr: &BinaryExpr) -> Self::Output;
    fn visit_unary(&mut self, expr: &UnaryExpr) -> Self::Output;
    fn visit_list_create(&mut self, expr: &ListCreate) -> Self::Output;
    fn visit_list_length(&mut self, expr: &ListLength) -> Self::Output;
    fn visit_text_join(&mut self, expr: &TextJoin) -> Self::Output;
}

impl Stmt {
    pub fn accept<V: AstVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match self {
            Stmt::Assign(s) => visitor.visit_assign_stmt(s),
            Stmt::If(s) => visitor.visit_if_stmt(s),
            Stmt::RepeatTimes(s) => visitor.visit_repeat_times_stmt(s),
            Stmt::WhileUntil(s) => visitor.visit_while_until_stmt(s),
            Stmt::For(s) => visitor.visit_for_stmt(s),
            Stmt::ForEach(s) => visitor.visit_for_each_stmt(s),
            Stmt::FlowControl(s) => visitor.visit_flow_control_stmt(s),
            Stmt::WaitTime(s) => visitor.visit_wait_time_stmt(s),
            Stmt::Print(s) => visitor.visit_print_stmt(s),
        }
    }
}

impl Expr {
    pub fn accept<V: AstVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match self {
            Expr::Var(e) => visitor.visit_var(e),
            Expr::Num(e) => visitor.visit_num_const(e),
            Expr::Bool(e) => visitor.visit_bool_const(e),
            Expr::Str(e) => visitor.visit_string_const(e),
            Expr::Binary(e) => visitor.visit_binary(e),
            Expr::Unary(e) => visitor.visit_unary(e),
            Expr::ListCreate(e) => visitor.visit_list_create(e),
            Expr::ListLength(e) => visitor.visit_list_length(e),
            Expr::TextJoin(e) => visitor.visit_text_join(e),
        }
    }
}

impl Phrase {
    pub fn accept<V: AstVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match self {
            Phrase::Stmt(stmt) => stmt.accept(visitor),
            Phrase::Expr(expr) => expr.accept(visitor),
        }
    }
}

/// Visits each statement of `list` in order.
pub fn walk_stmt_list<V: AstVisitor + ?Sized>(visitor: &mut V, list: &StmtList) -> Vec<V::Output> {
    list.iter().map(|stmt| stmt.accept(visitor)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, BlockProperties, FlowKind, LoopMode, UnaryOp};
    use crate::types::BlocklyType;

    /// Records the name of the handler that ran.
    struct Recorder;

    impl AstVisitor for Recorder {
        type Output = &'static str;

        fn visit_assign_stmt(&mut self, _: &AssignStmt) -> &'static str {
            "assign"
        }
        fn visit_if_stmt(&mut self, _: &IfStmt) -> &'static str {
            "if"
        }
        fn visit_repeat_times_stmt(&mut self, _: &RepeatTimesStmt) -> &'static str {
            "repeat_times"
        }
        fn visit_while_until_stmt(&mut self, _: &WhileUntilStmt) -> &'static str {
            "while_until"
        }
        fn visit_for_stmt(&mut self, _: &ForStmt) -> &'static str {
            "for"
        }
        fn visit_for_each_stmt(&mut self, _: &ForEachStmt) -> &'static str {
            "for_each"
        }
        fn visit_flow_control_stmt(&mut self, _: &FlowControlStmt) -> &'static str {
            "flow"
        }
        fn visit_wait_time_stmt(&mut self, _: &WaitTimeStmt) -> &'static str {
            "wait"
        }
        fn visit_print_stmt(&mut self, _: &PrintStmt) -> &'static str {
            "print"
        }
        fn visit_var(&mut self, _: &Var) -> &'static str {
            "var"
        }
        fn visit_num_const(&mut self, _: &NumConst) -> &'static str {
            "num"
        }
        fn visit_bool_const(&mut self, _: &BoolConst) -> &'static str {
            "bool"
        }
        fn visit_string_const(&mut self, _: &StringConst) -> &'static str {
            "string"
        }
        fn visit_binary(&mut self, _: &BinaryExpr) -> &'static str {
            "binary"
        }
        fn visit_unary(&mut self, _: &UnaryExpr) -> &'static str {
            "unary"
        }
        fn visit_list_create(&mut self, _: &ListCreate) -> &'static str {
            "list_create"
        }
        fn visit_list_length(&mut self, _: &ListLength) -> &'static str {
            "list_length"
        }
        fn visit_text_join(&mut self, _: &TextJoin) -> &'static str {
            "text_join"
        }
    }

    fn p() -> BlockProperties {
        BlockProperties::new("t")
    }

    fn num() -> Expr {
        Expr::Num(NumConst::make("1", p(), None).unwrap())
    }

    fn truth() -> Expr {
        Expr::Bool(BoolConst::make(true, p(), None).unwrap())
    }

    fn var(ty: BlocklyType) -> Var {
        Var::make("v", ty, p(), None).unwrap()
    }

    #[test]
    fn expressions_dispatch_to_their_handler() {
        let numbers = Expr::ListCreate(
            ListCreate::make(BlocklyType::Number, vec![num()], p(), None).unwrap(),
        );
        let cases = vec![
            (Expr::Var(var(BlocklyType::Number)), "var"),
            (num(), "num"),
            (truth(), "bool"),
            (Expr::Str(StringConst::make("a", p(), None).unwrap()), "string"),
            (
                Expr::Binary(BinaryExpr::make(BinaryOp::Add, num(), num(), p(), None).unwrap()),
                "binary",
            ),
            (
                Expr::Unary(UnaryExpr::make(UnaryOp::Not, truth(), p(), None).unwrap()),
                "unary",
            ),
            (numbers.clone(), "list_create"),
            (
                Expr::ListLength(ListLength::make(numbers, p(), None).unwrap()),
                "list_length",
            ),
            (
                Expr::TextJoin(TextJoin::make(vec![num()], p(), None).unwrap()),
                "text_join",
            ),
        ];
        for (expr, expected) in cases {
            assert_eq!(expr.accept(&mut Recorder), expected);
            assert_eq!(Phrase::Expr(expr).accept(&mut Recorder), expected);
        }
    }

    #[test]
    fn statements_dispatch_to_their_handler() {
        let body = StmtList::default;
        let list = Expr::ListCreate(
            ListCreate::make(BlocklyType::Number, vec![num()], p(), None).unwrap(),
        );
        let cases = vec![
            (
                Stmt::Assign(
                    AssignStmt::make(var(BlocklyType::Number), num(), p(), None).unwrap(),
                ),
                "assign",
            ),
            (
                Stmt::If(IfStmt::make(vec![truth()], vec![body()], None, p(), None).unwrap()),
                "if",
            ),
            (
                Stmt::RepeatTimes(RepeatTimesStmt::make(num(), body(), p(), None).unwrap()),
                "repeat_times",
            ),
            (
                Stmt::WhileUntil(
                    WhileUntilStmt::make(LoopMode::Until, truth(), body(), p(), None).unwrap(),
                ),
                "while_until",
            ),
            (
                Stmt::For(
                    ForStmt::make(
                        var(BlocklyType::Number),
                        num(),
                        num(),
                        num(),
                        body(),
                        p(),
                        None,
                    )
                    .unwrap(),
                ),
                "for",
            ),
            (
                Stmt::ForEach(
                    ForEachStmt::make(var(BlocklyType::Number), list, body(), p(), None).unwrap(),
                ),
                "for_each",
            ),
            (
                Stmt::FlowControl(FlowControlStmt::make(FlowKind::Continue, p(), None).unwrap()),
                "flow",
            ),
            (
                Stmt::WaitTime(WaitTimeStmt::make(num(), p(), None).unwrap()),
                "wait",
            ),
            (Stmt::Print(PrintStmt::make(num(), p(), None).unwrap()), "print"),
        ];
        let list = StmtList::new(cases.iter().map(|(stmt, _)| stmt.clone()).collect());
        let expected = cases.iter().map(|(_, name)| *name).collect::<Vec<_>>();
        assert_eq!(walk_stmt_list(&mut Recorder, &list), expected);
    }
}
