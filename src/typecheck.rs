//! Re-derives every expression type of a finished tree.
//!
//! Trees coming out of the forward transformer always pass. The check exists
//! for trees assembled by hand through the node factories, which accept
//! placeholders, before they reach a code generator.

use crate::ast::{
    AssignStmt, BinaryExpr, BoolConst, Expr, FlowControlStmt, ForEachStmt, ForStmt, IfStmt,
    ListCreate, ListLength, NumConst, PrintStmt, Program, RepeatTimesStmt, Root, StmtList,
    StringConst, TextJoin, UnaryExpr, Var, WaitTimeStmt, WhileUntilStmt,
};
use crate::error::TransformError;
use crate::types::{is_assignable, BlocklyType};
use crate::visitor::AstVisitor;

pub fn check_program(program: &Program) -> Result<(), TransformError> {
    let mut checker = TypeChecker;
    for root in program.roots() {
        match root {
            Root::Statements(list) => checker.check_list(list)?,
            Root::Expr(expr) => {
                expr.accept(&mut checker)?;
            }
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct TypeChecker;

type Checked = Result<BlocklyType, TransformError>;

impl TypeChecker {
    fn check_list(&mut self, list: &StmtList) -> Result<(), TransformError> {
        for stmt in list {
            stmt.accept(self)?;
        }
        Ok(())
    }

    /// Checks `expr` and that its type fits `expected`.
    fn expect(&mut self, expr: &Expr, expected: &BlocklyType) -> Checked {
        let found = expr.accept(self)?;
        if is_assignable(expected, &found) {
            Ok(found)
        } else {
            Err(TransformError::mismatch(expected, &found, expr.block_id()))
        }
    }

    fn concrete(ty: &BlocklyType, block_id: &str) -> Checked {
        if ty.is_concrete() {
            Ok(ty.clone())
        } else {
            Err(TransformError::unresolved(ty, block_id))
        }
    }
}

// Statements yield `Boolean` as a stand-in; callers ignore it.
impl AstVisitor for TypeChecker {
    type Output = Checked;

    fn visit_assign_stmt(&mut self, stmt: &AssignStmt) -> Checked {
        let target = self.visit_var(stmt.name())?;
        self.expect(stmt.expr(), &target)?;
        Ok(BlocklyType::Boolean)
    }

    fn visit_if_stmt(&mut self, stmt: &IfStmt) -> Checked {
        for (condition, body) in stmt.branches() {
            self.expect(condition, &BlocklyType::Boolean)?;
            self.check_list(body)?;
        }
        if let Some(body) = stmt.else_branch() {
            self.check_list(body)?;
        }
        Ok(BlocklyType::Boolean)
    }

    fn visit_repeat_times_stmt(&mut self, stmt: &RepeatTimesStmt) -> Checked {
        self.expect(stmt.times(), &BlocklyType::Number)?;
        self.check_list(stmt.body())?;
        Ok(BlocklyType::Boolean)
    }

    fn visit_while_until_stmt(&mut self, stmt: &WhileUntilStmt) -> Checked {
        self.expect(stmt.condition(), &BlocklyType::Boolean)?;
        self.check_list(stmt.body())?;
        Ok(BlocklyType::Boolean)
    }

    fn visit_for_stmt(&mut self, stmt: &ForStmt) -> Checked {
        self.visit_var(stmt.var())?;
        for bound in [stmt.from(), stmt.to(), stmt.by()] {
            self.expect(bound, &BlocklyType::Number)?;
        }
        self.check_list(stmt.body())?;
        Ok(BlocklyType::Boolean)
    }

    fn visit_for_each_stmt(&mut self, stmt: &ForEachStmt) -> Checked {
        let element = self.visit_var(stmt.var())?;
        self.expect(stmt.list(), &BlocklyType::array_of(element))?;
        self.check_list(stmt.body())?;
        Ok(BlocklyType::Boolean)
    }

    fn visit_flow_control_stmt(&mut self, _: &FlowControlStmt) -> Checked {
        Ok(BlocklyType::Boolean)
    }

    fn visit_wait_time_stmt(&mut self, stmt: &WaitTimeStmt) -> Checked {
        self.expect(stmt.time(), &BlocklyType::Number)?;
        Ok(BlocklyType::Boolean)
    }

    fn visit_print_stmt(&mut self, stmt: &PrintStmt) -> Checked {
        stmt.text().accept(self)?;
        Ok(BlocklyType::Boolean)
    }

    fn visit_var(&mut self, var: &Var) -> Checked {
        Self::concrete(var.var_type(), var.provenance().block_id())
    }

    fn visit_num_const(&mut self, _: &NumConst) -> Checked {
        Ok(BlocklyType::Number)
    }

    fn visit_bool_const(&mut self, _: &BoolConst) -> Checked {
        Ok(BlocklyType::Boolean)
    }

    fn visit_string_const(&mut self, _: &StringConst) -> Checked {
        Ok(BlocklyType::String)
    }

    fn visit_binary(&mut self, expr: &BinaryExpr) -> Checked {
        let operand = expr.op().operand_type();
        let left = self.expect(expr.left(), &operand)?;
        self.expect(expr.right(), &left)?;
        Ok(expr.op().result_type())
    }

    fn visit_unary(&mut self, expr: &UnaryExpr) -> Checked {
        self.expect(expr.operand(), &expr.op().operand_type())
    }

    fn visit_list_create(&mut self, expr: &ListCreate) -> Checked {
        let element = Self::concrete(expr.element_type(), expr.provenance().block_id())?;
        for item in expr.items() {
            self.expect(item, &element)?;
        }
        Ok(BlocklyType::array_of(element))
    }

    fn visit_list_length(&mut self, expr: &ListLength) -> Checked {
        self.expect(expr.list(), &BlocklyType::array_of(BlocklyType::Captured))?;
        Ok(BlocklyType::Number)
    }

    fn visit_text_join(&mut self, expr: &TextJoin) -> Checked {
        for item in expr.items() {
            item.accept(self)?;
        }
        Ok(BlocklyType::String)
    }
}
