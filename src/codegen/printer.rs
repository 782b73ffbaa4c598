//! Compact textual rendering of a tree, used by `--emit ast` and the
//! `Display` impls of the node types.

use super::{number_literal, quote, GenerateOptions, Lines};
use crate::ast::{
    AssignStmt, BinaryExpr, BinaryOp, BoolConst, Expr, FlowControlStmt, FlowKind, ForEachStmt,
    ForStmt, IfStmt, ListCreate, ListLength, LoopMode, NumConst, Phrase, PrintStmt, Program,
    RepeatTimesStmt, Root, Stmt, StmtList, StringConst, TextJoin, UnaryExpr, UnaryOp, Var,
    WaitTimeStmt, WhileUntilStmt,
};
use crate::visitor::AstVisitor;
use std::fmt::{Display, Formatter};

pub fn print_program(program: &Program) -> String {
    let mut printer = AstPrinter::new();
    program
        .roots()
        .iter()
        .map(|root| match root {
            Root::Statements(list) => printer.list(list),
            Root::Expr(expr) => {
                let text = expr.accept(&mut printer);
                printer.lines.line(&text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct AstPrinter {
    lines: Lines,
}

impl AstPrinter {
    pub fn new() -> Self {
        Self {
            lines: Lines::new(GenerateOptions {
                indent: 2,
                include_disabled: true,
            }),
        }
    }

    fn list(&mut self, list: &StmtList) -> String {
        list.iter().map(|stmt| stmt.accept(self)).collect()
    }

    fn braced(&mut self, header: String, body: &StmtList) -> String {
        let mut out = self.lines.line(&format!("{} {{", header));
        self.lines.enter();
        out.push_str(&self.list(body));
        self.lines.leave();
        out.push_str(&self.lines.line("}"));
        out
    }

    fn operand(&mut self, expr: &Expr) -> String {
        let text = expr.accept(self);
        match expr {
            Expr::Binary(_) => format!("({})", text),
            _ => text,
        }
    }

    fn items(&mut self, items: &[Expr]) -> String {
        items
            .iter()
            .map(|item| item.accept(self))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for AstPrinter {
    fn default() -> Self {
        Self::new()
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Minus => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Power => "^",
        BinaryOp::Eq => "==",
        BinaryOp::Neq => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Lte => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Gte => ">=",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

impl AstVisitor for AstPrinter {
    type Output = String;

    fn visit_assign_stmt(&mut self, stmt: &AssignStmt) -> String {
        let value = stmt.expr().accept(self);
        self.lines
            .line(&format!("{} := {}", stmt.name().name(), value))
    }

    fn visit_if_stmt(&mut self, stmt: &IfStmt) -> String {
        let mut out = String::new();
        for (i, (condition, body)) in stmt.branches().enumerate() {
            let condition = condition.accept(self);
            let header = if i == 0 {
                format!("if {}", condition)
            } else {
                format!("else if {}", condition)
            };
            out.push_str(&self.braced(header, body));
        }
        if let Some(body) = stmt.else_branch() {
            out.push_str(&self.braced("else".to_string(), body));
        }
        out
    }

    fn visit_repeat_times_stmt(&mut self, stmt: &RepeatTimesStmt) -> String {
        let times = stmt.times().accept(self);
        self.braced(format!("repeat {} times", times), stmt.body())
    }

    fn visit_while_until_stmt(&mut self, stmt: &WhileUntilStmt) -> String {
        let keyword = match stmt.mode() {
            LoopMode::While => "while",
            LoopMode::Until => "until",
        };
        let condition = stmt.condition().accept(self);
        self.braced(format!("{} {}", keyword, condition), stmt.body())
    }

    fn visit_for_stmt(&mut self, stmt: &ForStmt) -> String {
        let header = format!(
            "for {} from {} to {} by {}",
            stmt.var().name(),
            stmt.from().accept(self),
            stmt.to().accept(self),
            stmt.by().accept(self)
        );
        self.braced(header, stmt.body())
    }

    fn visit_for_each_stmt(&mut self, stmt: &ForEachStmt) -> String {
        let header = format!(
            "for each {} in {}",
            stmt.var().name(),
            stmt.list().accept(self)
        );
        self.braced(header, stmt.body())
    }

    fn visit_flow_control_stmt(&mut self, stmt: &FlowControlStmt) -> String {
        self.lines.line(match stmt.flow() {
            FlowKind::Break => "break",
            FlowKind::Continue => "continue",
        })
    }

    fn visit_wait_time_stmt(&mut self, stmt: &WaitTimeStmt) -> String {
        let time = stmt.time().accept(self);
        self.lines.line(&format!("wait {} ms", time))
    }

    fn visit_print_stmt(&mut self, stmt: &PrintStmt) -> String {
        let text = stmt.text().accept(self);
        self.lines.line(&format!("print({})", text))
    }

    fn visit_var(&mut self, var: &Var) -> String {
        var.name().to_string()
    }

    fn visit_num_const(&mut self, num: &NumConst) -> String {
        number_literal(num)
    }

    fn visit_bool_const(&mut self, value: &BoolConst) -> String {
        value.value().to_string()
    }

    fn visit_string_const(&mut self, value: &StringConst) -> String {
        quote(value.value())
    }

    fn visit_binary(&mut self, expr: &BinaryExpr) -> String {
        let left = self.operand(expr.left());
        let right = self.operand(expr.right());
        format!("{} {} {}", left, binary_symbol(expr.op()), right)
    }

    fn visit_unary(&mut self, expr: &UnaryExpr) -> String {
        let function = match expr.op() {
            UnaryOp::Not => return format!("not {}", self.operand(expr.operand())),
            UnaryOp::Neg => return format!("-{}", self.operand(expr.operand())),
            UnaryOp::Pow10 => return format!("10 ^ {}", self.operand(expr.operand())),
            UnaryOp::Root => "sqrt",
            UnaryOp::Abs => "abs",
            UnaryOp::Ln => "ln",
            UnaryOp::Log10 => "log10",
            UnaryOp::Exp => "exp",
        };
        format!("{}({})", function, expr.operand().accept(self))
    }

    fn visit_list_create(&mut self, expr: &ListCreate) -> String {
        format!("[{}]", self.items(expr.items()))
    }

    fn visit_list_length(&mut self, expr: &ListLength) -> String {
        format!("length({})", expr.list().accept(self))
    }

    fn visit_text_join(&mut self, expr: &TextJoin) -> String {
        format!("join({})", self.items(expr.items()))
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&print_program(self))
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.accept(&mut AstPrinter::new()).trim_end())
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.accept(&mut AstPrinter::new()))
    }
}

impl Display for Phrase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Phrase::Stmt(stmt) => Display::fmt(stmt, f),
            Phrase::Expr(expr) => Display::fmt(expr, f),
        }
    }
}
