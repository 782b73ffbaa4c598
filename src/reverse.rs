//! AST back to blocks.
//!
//! [`BlockRenderer`] undoes each parse function of the forward transformer:
//! same tag, same field and slot names, provenance copied back. The mutation
//! read with the block comes back as written; typing and shape attributes
//! (`datatype`, `list_type`, `items`, `elseif`, `else`) are derived from the
//! resolved tree and only overwrite a value that means something else.

use crate::ast::{
    AssignStmt, BinaryExpr, BoolConst, FlowControlStmt, ForEachStmt, ForStmt, IfStmt,
    ListCreate, ListLength, NumConst, Phrase, PrintStmt, Program, Provenance, RepeatTimesStmt,
    Root, StmtList, StringConst, TextJoin, UnaryExpr, Var, WaitTimeStmt, WhileUntilStmt,
};
use crate::block::{Block, Mutation};
use crate::types::BlocklyType;
use crate::forward::{
    ASSIGN_BLOCK, BOOLEAN_BLOCK, FLOW_BLOCK, FOR_BLOCK, FOR_EACH_BLOCK, IF_BLOCK,
    LIST_CREATE_BLOCK, LIST_LENGTH_BLOCK, NUMBER_BLOCK, PRINT_BLOCK, REPEAT_TIMES_BLOCK,
    TEXT_BLOCK, TEXT_JOIN_BLOCK, VAR_BLOCK, WAIT_TIME_BLOCK, WHILE_UNTIL_BLOCK,
};
use crate::visitor::{walk_stmt_list, AstVisitor};

/// Renders every root of `program` as a top-level block.
pub fn program_to_blocks(program: &Program) -> Vec<Block> {
    let mut renderer = BlockRenderer;
    program
        .roots()
        .iter()
        .filter_map(|root| match root {
            Root::Statements(list) => renderer.render_chain(list),
            Root::Expr(expr) => Some(expr.accept(&mut renderer)),
        })
        .collect()
}

/// Renders a single node; a statement comes back without `next`.
pub fn phrase_to_block(phrase: &Phrase) -> Block {
    phrase.accept(&mut BlockRenderer)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BlockRenderer;

impl BlockRenderer {
    /// Links the rendered statements through `next`; `None` for an empty
    /// list.
    pub fn render_chain(&mut self, list: &StmtList) -> Option<Block> {
        let mut rendered = walk_stmt_list(self, list);
        let mut next: Option<Block> = None;
        while let Some(mut block) = rendered.pop() {
            block.next = next.map(Box::new);
            next = Some(block);
        }
        next
    }

    fn with_body(&mut self, block: Block, slot: &str, body: &StmtList) -> Block {
        match self.render_chain(body) {
            Some(first) => block.with_statement(slot, first),
            None => block,
        }
    }
}

fn base(tag: &str, provenance: &Provenance) -> Block {
    let properties = provenance.properties();
    let mut block = Block::new(tag, &properties.block_id);
    block.position = properties.position;
    block.disabled = properties.disabled;
    block.collapsed = properties.collapsed;
    block.inline = properties.inline;
    block.deletable = properties.deletable;
    block.movable = properties.movable;
    block.comment = provenance.comment().cloned();
    block.mutation = properties.mutation.clone();
    block
}

/// Sets a derived mutation attribute unless the block already spells the
/// same value its own way.
fn derive(mut block: Block, key: &str, value: impl Into<String>) -> Block {
    let value = value.into();
    let mutation = block.mutation.get_or_insert_with(Mutation::new);
    if !mutation
        .get(key)
        .is_some_and(|kept| same_attribute(key, kept, &value))
    {
        mutation.insert(key, value);
    }
    block
}

fn same_attribute(key: &str, kept: &str, derived: &str) -> bool {
    let count = |text: &str| text.trim().parse::<usize>().ok();
    match key {
        // A blank type name is read as undeclared and inferred again.
        "datatype" | "list_type" => {
            kept.trim().is_empty()
                || BlocklyType::from_datatype_name(kept)
                    .is_some_and(|ty| BlocklyType::from_datatype_name(derived) == Some(ty))
        }
        // The ELSE input decides whether there is an else branch.
        "else" => count(kept).is_some(),
        _ => count(kept).is_some_and(|n| count(derived) == Some(n)),
    }
}

fn with_datatype(block: Block, var: &Var) -> Block {
    match var.var_type().datatype_name() {
        Some(name) => derive(block, "datatype", name),
        None => block,
    }
}

impl AstVisitor for BlockRenderer {
    type Output = Block;

    fn visit_assign_stmt(&mut self, stmt: &AssignStmt) -> Block {
        let block = base(ASSIGN_BLOCK, stmt.provenance())
            .with_field("VAR", stmt.name().name())
            .with_value("VALUE", stmt.expr().accept(self));
        with_datatype(block, stmt.name())
    }

    fn visit_if_stmt(&mut self, stmt: &IfStmt) -> Block {
        let mut block = base(IF_BLOCK, stmt.provenance());
        for (i, (condition, body)) in stmt.branches().enumerate() {
            block = block.with_value(&format!("IF{}", i), condition.accept(self));
            block = self.with_body(block, &format!("DO{}", i), body);
        }
        if let Some(body) = stmt.else_branch() {
            block = self.with_body(block, "ELSE", body);
        }

        let else_ifs = stmt.conditions().len() - 1;
        if else_ifs > 0 {
            block = derive(block, "elseif", else_ifs.to_string());
        }
        if stmt.else_branch().is_some() {
            block = derive(block, "else", "1");
        }
        block
    }

    fn visit_repeat_times_stmt(&mut self, stmt: &RepeatTimesStmt) -> Block {
        let block =
            base(REPEAT_TIMES_BLOCK, stmt.provenance()).with_value("TIMES", stmt.times().accept(self));
        self.with_body(block, "DO", stmt.body())
    }

    fn visit_while_until_stmt(&mut self, stmt: &WhileUntilStmt) -> Block {
        let block = base(WHILE_UNTIL_BLOCK, stmt.provenance())
            .with_field("MODE", stmt.mode().field_value())
            .with_value("BOOL", stmt.condition().accept(self));
        self.with_body(block, "DO", stmt.body())
    }

    fn visit_for_stmt(&mut self, stmt: &ForStmt) -> Block {
        let block = base(FOR_BLOCK, stmt.provenance())
            .with_field("VAR", stmt.var().name())
            .with_value("FROM", stmt.from().accept(self))
            .with_value("TO", stmt.to().accept(self))
            .with_value("BY", stmt.by().accept(self));
        self.with_body(block, "DO", stmt.body())
    }

    fn visit_for_each_stmt(&mut self, stmt: &ForEachStmt) -> Block {
        let block = base(FOR_EACH_BLOCK, stmt.provenance())
            .with_field("VAR", stmt.var().name())
            .with_value("LIST", stmt.list().accept(self));
        self.with_body(block, "DO", stmt.body())
    }

    fn visit_flow_control_stmt(&mut self, stmt: &FlowControlStmt) -> Block {
        base(FLOW_BLOCK, stmt.provenance()).with_field("FLOW", stmt.flow().field_value())
    }

    fn visit_wait_time_stmt(&mut self, stmt: &WaitTimeStmt) -> Block {
        base(WAIT_TIME_BLOCK, stmt.provenance()).with_value("WAIT", stmt.time().accept(self))
    }

    fn visit_print_stmt(&mut self, stmt: &PrintStmt) -> Block {
        base(PRINT_BLOCK, stmt.provenance()).with_value("TEXT", stmt.text().accept(self))
    }

    fn visit_var(&mut self, var: &Var) -> Block {
        let block = base(VAR_BLOCK, var.provenance()).with_field("VAR", var.name());
        with_datatype(block, var)
    }

    fn visit_num_const(&mut self, num: &NumConst) -> Block {
        base(NUMBER_BLOCK, num.provenance()).with_field("NUM", num.literal())
    }

    fn visit_bool_const(&mut self, value: &BoolConst) -> Block {
        let text = if value.value() { "TRUE" } else { "FALSE" };
        base(BOOLEAN_BLOCK, value.provenance()).with_field("BOOL", text)
    }

    fn visit_string_const(&mut self, value: &StringConst) -> Block {
        base(TEXT_BLOCK, value.provenance()).with_field("TEXT", value.value())
    }

    fn visit_binary(&mut self, expr: &BinaryExpr) -> Block {
        base(expr.op().block_type(), expr.provenance())
            .with_field("OP", expr.op().field_value())
            .with_value("A", expr.left().accept(self))
            .with_value("B", expr.right().accept(self))
    }

    fn visit_unary(&mut self, expr: &UnaryExpr) -> Block {
        let op = expr.op();
        let mut block = base(op.block_type(), expr.provenance());
        if let Some(field) = op.field_value() {
            block = block.with_field("OP", field);
        }
        block.with_value(op.slot(), expr.operand().accept(self))
    }

    fn visit_list_create(&mut self, expr: &ListCreate) -> Block {
        let mut block = derive(
            base(LIST_CREATE_BLOCK, expr.provenance()),
            "items",
            expr.items().len().to_string(),
        );
        if let Some(name) = expr.element_type().datatype_name() {
            block = derive(block, "list_type", name);
        }
        for (i, item) in expr.items().iter().enumerate() {
            block = block.with_value(&format!("ADD{}", i), item.accept(self));
        }
        block
    }

    fn visit_list_length(&mut self, expr: &ListLength) -> Block {
        base(LIST_LENGTH_BLOCK, expr.provenance()).with_value("VALUE", expr.list().accept(self))
    }

    fn visit_text_join(&mut self, expr: &TextJoin) -> Block {
        let mut block = derive(
            base(TEXT_JOIN_BLOCK, expr.provenance()),
            "items",
            expr.items().len().to_string(),
        );
        for (i, item) in expr.items().iter().enumerate() {
            block = block.with_value(&format!("ADD{}", i), item.accept(self));
        }
        block
    }
}
