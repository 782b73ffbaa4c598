//! Block graph to AST.
//!
//! Every supported block type has one parse function in [`PARSERS`]. A parse
//! function reads the block's fields and mutation, transforms its child slots
//! through the [`Transformer`], and builds the node through its factory.

use crate::ast::{
    AssignStmt, BinaryExpr, BinaryOp, BlockProperties, BoolConst, Comment, Expr, FlowControlStmt,
    FlowKind, ForEachStmt, ForStmt, IfStmt, ListCreate, ListLength, LoopMode, NumConst, Phrase,
    PrintStmt, Program, RepeatTimesStmt, Root, Stmt, StmtList, StringConst, TextJoin, UnaryExpr,
    UnaryOp, Var, WaitTimeStmt, WhileUntilStmt,
};
use crate::ast::expr::{
    is_number_literal, ARITHMETIC_BLOCK, COMPARE_BLOCK, LOGIC_BLOCK, MATH_SINGLE_BLOCK,
    NEGATE_BLOCK,
};
use crate::block::Block;
use crate::error::{report_defect, NodeDefect, TransformError};
use crate::infer::{resolve_program, TypeEnv};
use crate::types::{unify, BlocklyType};
use std::collections::HashMap;

pub type ParseFn = fn(&mut Transformer<'_>, &Block) -> Result<Phrase, TransformError>;

pub const ASSIGN_BLOCK: &str = "variables_set";
pub const VAR_BLOCK: &str = "variables_get";
pub const IF_BLOCK: &str = "controls_if";
pub const REPEAT_TIMES_BLOCK: &str = "controls_repeat_ext";
pub const WHILE_UNTIL_BLOCK: &str = "controls_whileUntil";
pub const FOR_BLOCK: &str = "controls_for";
pub const FOR_EACH_BLOCK: &str = "controls_forEach";
pub const FLOW_BLOCK: &str = "controls_flow_statements";
pub const WAIT_TIME_BLOCK: &str = "robControls_wait_time";
pub const PRINT_BLOCK: &str = "text_print";
pub const NUMBER_BLOCK: &str = "math_number";
pub const BOOLEAN_BLOCK: &str = "logic_boolean";
pub const TEXT_BLOCK: &str = "text";
pub const LIST_CREATE_BLOCK: &str = "lists_create_with";
pub const LIST_LENGTH_BLOCK: &str = "lists_length";
pub const TEXT_JOIN_BLOCK: &str = "text_join";

/// Every block type the transformer understands.
pub const PARSERS: &[(&str, ParseFn)] = &[
    (ASSIGN_BLOCK, parse_assign),
    (IF_BLOCK, parse_if),
    (REPEAT_TIMES_BLOCK, parse_repeat_times),
    (WHILE_UNTIL_BLOCK, parse_while_until),
    (FOR_BLOCK, parse_for),
    (FOR_EACH_BLOCK, parse_for_each),
    (FLOW_BLOCK, parse_flow_control),
    (WAIT_TIME_BLOCK, parse_wait_time),
    (PRINT_BLOCK, parse_print),
    (VAR_BLOCK, parse_var),
    (NUMBER_BLOCK, parse_number),
    (BOOLEAN_BLOCK, parse_boolean),
    (TEXT_BLOCK, parse_text),
    (ARITHMETIC_BLOCK, parse_binary),
    (COMPARE_BLOCK, parse_binary),
    (LOGIC_BLOCK, parse_binary),
    (NEGATE_BLOCK, parse_negate),
    (MATH_SINGLE_BLOCK, parse_math_single),
    (LIST_CREATE_BLOCK, parse_list_create),
    (LIST_LENGTH_BLOCK, parse_list_length),
    (TEXT_JOIN_BLOCK, parse_text_join),
];

/// Tag to parse function lookup, built once from [`PARSERS`] and shared by
/// reference between transformations.
#[derive(Debug, Clone)]
pub struct Registry {
    parsers: HashMap<&'static str, ParseFn>,
}

impl Registry {
    pub fn standard() -> Self {
        Self {
            parsers: PARSERS.iter().copied().collect(),
        }
    }

    pub fn lookup(&self, tag: &str) -> Option<ParseFn> {
        self.parsers.get(tag).copied()
    }

    pub fn supports(&self, tag: &str) -> bool {
        self.parsers.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformOptions {
    /// Accept top-level value blocks that are not plugged into anything.
    pub allow_floating_expressions: bool,
}

/// A value slot to read and the type the slot requires.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprParam<'a> {
    pub slot: &'a str,
    pub expected: BlocklyType,
}

impl<'a> ExprParam<'a> {
    pub fn new(slot: &'a str, expected: BlocklyType) -> Self {
        Self { slot, expected }
    }
}

/// Per-request transformation state.
pub struct Transformer<'r> {
    registry: &'r Registry,
    options: TransformOptions,
    env: TypeEnv,
}

impl<'r> Transformer<'r> {
    pub fn new(registry: &'r Registry, options: TransformOptions) -> Self {
        Self {
            registry,
            options,
            env: TypeEnv::new(),
        }
    }

    /// Transforms every top-level block of a workspace and resolves the
    /// variable types across the whole program.
    pub fn transform_program(mut self, blocks: &[Block]) -> Result<Program, TransformError> {
        tracing::debug!(roots = blocks.len(), "transforming program");
        let mut roots = Vec::with_capacity(blocks.len());
        for block in blocks {
            roots.push(self.transform_root(block)?);
        }
        resolve_program(&Program::new(roots), self.env)
    }

    /// Transforms a single block, ignoring its `next` link, and resolves the
    /// result on its own.
    pub fn transform_phrase(mut self, block: &Block) -> Result<Phrase, TransformError> {
        let root = match self.parse_block(block)? {
            Phrase::Stmt(stmt) => Root::Statements(StmtList::new(vec![stmt])),
            Phrase::Expr(expr) => Root::Expr(expr),
        };
        let program = resolve_program(&Program::new(vec![root]), self.env)?;
        match program.roots().first() {
            Some(Root::Statements(list)) => match list.as_slice().first() {
                Some(stmt) => Ok(Phrase::Stmt(stmt.clone())),
                None => Err(TransformError::malformed(&block.id, "empty statement list")),
            },
            Some(Root::Expr(expr)) => Ok(Phrase::Expr(expr.clone())),
            None => Err(TransformError::malformed(&block.id, "nothing to transform")),
        }
    }

    fn transform_root(&mut self, block: &Block) -> Result<Root, TransformError> {
        match self.parse_block(block)? {
            Phrase::Stmt(first) => Ok(Root::Statements(
                self.collect_chain(first, block.next.as_deref())?,
            )),
            Phrase::Expr(expr) => {
                if block.next.is_some() {
                    return Err(TransformError::malformed(
                        &block.id,
                        "a value block cannot have a next block",
                    ));
                }
                if !self.options.allow_floating_expressions {
                    return Err(TransformError::malformed(
                        &block.id,
                        format!("value block '{}' is not connected to anything", block.type_tag),
                    ));
                }
                Ok(Root::Expr(expr))
            }
        }
    }

    fn parse_block(&mut self, block: &Block) -> Result<Phrase, TransformError> {
        let parse = self.registry.lookup(&block.type_tag).ok_or_else(|| {
            TransformError::UnknownBlockType {
                tag: block.type_tag.clone(),
                block_id: block.id.clone(),
            }
        })?;
        tracing::debug!(tag = %block.type_tag, block_id = %block.id, "transforming block");
        parse(self, block)
    }

    /// Follows `next` links from `first` into a statement list.
    pub fn transform_chain(&mut self, first: &Block) -> Result<StmtList, TransformError> {
        let head = self.transform_stmt(first)?;
        self.collect_chain(head, first.next.as_deref())
    }

    fn collect_chain(
        &mut self,
        head: Stmt,
        mut next: Option<&Block>,
    ) -> Result<StmtList, TransformError> {
        let mut stmts = vec![head];
        while let Some(block) = next {
            stmts.push(self.transform_stmt(block)?);
            next = block.next.as_deref();
        }
        Ok(StmtList::new(stmts))
    }

    pub fn transform_stmt(&mut self, block: &Block) -> Result<Stmt, TransformError> {
        match self.parse_block(block)? {
            Phrase::Stmt(stmt) => Ok(stmt),
            Phrase::Expr(_) => Err(TransformError::malformed(
                &block.id,
                format!("value block '{}' used as a statement", block.type_tag),
            )),
        }
    }

    pub fn transform_expr(&mut self, block: &Block) -> Result<Expr, TransformError> {
        if block.next.is_some() {
            return Err(TransformError::malformed(
                &block.id,
                "a value block cannot have a next block",
            ));
        }
        match self.parse_block(block)? {
            Phrase::Expr(expr) => Ok(expr),
            Phrase::Stmt(_) => Err(TransformError::malformed(
                &block.id,
                format!("statement block '{}' used as a value", block.type_tag),
            )),
        }
    }

    /// Transforms the block plugged into `param.slot` and checks it against
    /// the slot's type.
    pub fn extract_value(
        &mut self,
        block: &Block,
        param: ExprParam<'_>,
    ) -> Result<Expr, TransformError> {
        let child = block
            .value(param.slot)
            .ok_or_else(|| TransformError::MissingSlot {
                slot: param.slot.to_string(),
                block_id: block.id.clone(),
            })?;
        let expr = self.transform_expr(child)?;
        self.constrain(&expr, &param.expected)?;
        Ok(expr)
    }

    /// Statement slots may be empty.
    pub fn extract_statements(
        &mut self,
        block: &Block,
        slot: &str,
    ) -> Result<StmtList, TransformError> {
        match block.statement(slot) {
            Some(first) => self.transform_chain(first),
            None => Ok(StmtList::default()),
        }
    }

    /// Checks `expr` against `expected`, binding placeholder variables it
    /// refers to.
    fn constrain(
        &mut self,
        expr: &Expr,
        expected: &BlocklyType,
    ) -> Result<BlocklyType, TransformError> {
        let found = expr.ty();
        let unified = unify(expected, &found)
            .map_err(|_| TransformError::mismatch(expected, &found, expr.block_id()))?;
        match expr {
            Expr::Var(var) if unified != found => {
                self.env.bind(var.name(), &unified, expr.block_id())?;
            }
            Expr::ListCreate(list) => {
                if let Some(element) = unified.element_type() {
                    for item in list.items() {
                        self.constrain(item, element)?;
                    }
                }
            }
            _ => {}
        }
        Ok(unified)
    }
}

fn required_field<'b>(block: &'b Block, name: &str) -> Result<&'b str, TransformError> {
    block
        .field(name)
        .ok_or_else(|| TransformError::MissingField {
            field: name.to_string(),
            block_id: block.id.clone(),
        })
}

fn invalid_field(block: &Block, field: &str, value: &str) -> TransformError {
    TransformError::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
        block_id: block.id.clone(),
    }
}

fn block_properties(block: &Block) -> BlockProperties {
    BlockProperties {
        block_id: block.id.clone(),
        position: block.position,
        disabled: block.disabled,
        collapsed: block.collapsed,
        inline: block.inline,
        deletable: block.deletable,
        movable: block.movable,
        mutation: block.mutation.clone(),
    }
}

fn block_comment(block: &Block) -> Option<Comment> {
    block.comment.clone().filter(|c| !c.text.is_empty())
}

fn checked<T>(made: Result<T, NodeDefect>, block: &Block) -> Result<T, TransformError> {
    made.map_err(|defect| report_defect(defect, &block.id))
}

/// Type declared in a mutation attribute such as `datatype`.
fn declared_type(block: &Block, key: &str) -> Result<Option<BlocklyType>, TransformError> {
    match block.mutation_attr(key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) => BlocklyType::from_datatype_name(name)
            .map(Some)
            .ok_or_else(|| invalid_field(block, &format!("mutation.{}", key), name)),
    }
}

fn mutation_count(block: &Block, key: &str) -> Result<Option<usize>, TransformError> {
    match block.mutation_attr(key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<usize>()
            .map(Some)
            .map_err(|_| invalid_field(block, &format!("mutation.{}", key), text)),
    }
}

/// Like [`mutation_count`], but a count above `limit` is rejected before any
/// slot names are built from it.
fn bounded_count(
    block: &Block,
    key: &str,
    limit: usize,
) -> Result<Option<usize>, TransformError> {
    match mutation_count(block, key)? {
        Some(count) if count > limit => Err(invalid_field(
            block,
            &format!("mutation.{}", key),
            block.mutation_attr(key).unwrap_or_default(),
        )),
        count => Ok(count),
    }
}

/// Number of `ADD<n>` inputs. Without an `items` mutation the inputs present
/// from `ADD0` upwards are counted. A declared count can never exceed the
/// inputs the block carries.
fn item_count(block: &Block) -> Result<usize, TransformError> {
    if let Some(count) = bounded_count(block, "items", block.values.len())? {
        return Ok(count);
    }
    Ok((0..)
        .take_while(|i| block.value(&format!("ADD{}", i)).is_some())
        .count())
}

/// Rejects inputs the mutation does not account for; they would otherwise be
/// dropped silently.
fn reject_extra_slots(
    block: &Block,
    expected_values: &[String],
    expected_statements: &[String],
) -> Result<(), TransformError> {
    let extra_value = block
        .values
        .keys()
        .find(|slot| !expected_values.contains(slot));
    let extra_statement = block
        .statements
        .keys()
        .find(|slot| !expected_statements.contains(slot));
    match extra_value.or(extra_statement) {
        Some(slot) => Err(TransformError::malformed(
            &block.id,
            format!("unexpected input '{}'", slot),
        )),
        None => Ok(()),
    }
}

/// The `VAR` field; a blank name is bad input, not a factory defect.
fn required_name<'b>(block: &'b Block) -> Result<&'b str, TransformError> {
    let name = required_field(block, "VAR")?;
    if name.trim().is_empty() {
        return Err(invalid_field(block, "VAR", name));
    }
    Ok(name)
}

fn parse_assign(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let name = required_name(block)?;
    let declared = declared_type(block, "datatype")?;
    let expr = t.extract_value(block, ExprParam::new("VALUE", BlocklyType::Captured))?;
    if let Some(declared) = &declared {
        t.env.bind(name, declared, &block.id)?;
    }
    let target = t.env.lookup(name);
    let found = expr.ty();
    let ty = unify(&target, &found)
        .map_err(|_| TransformError::mismatch(&target, &found, &block.id))?;
    t.env.bind(name, &ty, &block.id)?;
    t.constrain(&expr, &ty)?;
    if let Expr::Var(source) = &expr {
        if !ty.is_concrete() {
            t.env.alias(name, source.name(), &block.id);
        }
    }
    let var = checked(Var::make(name, ty, block_properties(block), None), block)?;
    let stmt = checked(
        AssignStmt::make(var, expr, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Stmt(Stmt::Assign(stmt)))
}

fn parse_if(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    // IF0 plus one condition per else-if, all of which must be present.
    let else_ifs = bounded_count(block, "elseif", block.values.len().saturating_sub(1))?
        .unwrap_or(0);
    let branch_count = else_ifs
        .checked_add(1)
        .ok_or_else(|| invalid_field(block, "mutation.elseif", &else_ifs.to_string()))?;
    let has_else =
        mutation_count(block, "else")?.unwrap_or(0) > 0 || block.statement("ELSE").is_some();

    let mut conditions = Vec::with_capacity(branch_count);
    let mut bodies = Vec::with_capacity(branch_count);
    for i in 0..branch_count {
        let slot = format!("IF{}", i);
        conditions.push(t.extract_value(block, ExprParam::new(&slot, BlocklyType::Boolean))?);
        bodies.push(t.extract_statements(block, &format!("DO{}", i))?);
    }
    let else_branch = if has_else {
        Some(t.extract_statements(block, "ELSE")?)
    } else {
        None
    };

    let values = (0..branch_count).map(|i| format!("IF{}", i)).collect::<Vec<_>>();
    let mut statements = (0..branch_count)
        .map(|i| format!("DO{}", i))
        .collect::<Vec<_>>();
    statements.push("ELSE".to_string());
    reject_extra_slots(block, &values, &statements)?;

    let stmt = checked(
        IfStmt::make(
            conditions,
            bodies,
            else_branch,
            block_properties(block),
            block_comment(block),
        ),
        block,
    )?;
    Ok(Phrase::Stmt(Stmt::If(stmt)))
}

fn parse_repeat_times(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let times = t.extract_value(block, ExprParam::new("TIMES", BlocklyType::Number))?;
    let body = t.extract_statements(block, "DO")?;
    let stmt = checked(
        RepeatTimesStmt::make(times, body, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Stmt(Stmt::RepeatTimes(stmt)))
}

fn parse_while_until(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let mode_text = required_field(block, "MODE")?;
    let mode =
        LoopMode::from_field(mode_text).ok_or_else(|| invalid_field(block, "MODE", mode_text))?;
    let condition = t.extract_value(block, ExprParam::new("BOOL", BlocklyType::Boolean))?;
    let body = t.extract_statements(block, "DO")?;
    let stmt = checked(
        WhileUntilStmt::make(
            mode,
            condition,
            body,
            block_properties(block),
            block_comment(block),
        ),
        block,
    )?;
    Ok(Phrase::Stmt(Stmt::WhileUntil(stmt)))
}

fn parse_for(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let name = required_name(block)?;
    let ty = t.env.bind(name, &BlocklyType::Number, &block.id)?;
    let from = t.extract_value(block, ExprParam::new("FROM", BlocklyType::Number))?;
    let to = t.extract_value(block, ExprParam::new("TO", BlocklyType::Number))?;
    let by = t.extract_value(block, ExprParam::new("BY", BlocklyType::Number))?;
    let body = t.extract_statements(block, "DO")?;
    let var = checked(Var::make(name, ty, block_properties(block), None), block)?;
    let stmt = checked(
        ForStmt::make(
            var,
            from,
            to,
            by,
            body,
            block_properties(block),
            block_comment(block),
        ),
        block,
    )?;
    Ok(Phrase::Stmt(Stmt::For(stmt)))
}

fn parse_for_each(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let name = required_name(block)?;
    let expected = BlocklyType::array_of(t.env.lookup(name));
    let list = t.extract_value(block, ExprParam::new("LIST", expected))?;
    let element = list
        .ty()
        .element_type()
        .cloned()
        .unwrap_or(BlocklyType::Captured);
    let ty = t.env.bind(name, &element, &block.id)?;
    if let Expr::Var(source) = &list {
        if !ty.is_concrete() {
            t.env.element_of(name, source.name(), &block.id);
        }
    }
    let body = t.extract_statements(block, "DO")?;
    let var = checked(Var::make(name, ty, block_properties(block), None), block)?;
    let stmt = checked(
        ForEachStmt::make(var, list, body, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Stmt(Stmt::ForEach(stmt)))
}

fn parse_flow_control(_: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let text = required_field(block, "FLOW")?;
    let flow = FlowKind::from_field(text).ok_or_else(|| invalid_field(block, "FLOW", text))?;
    let stmt = checked(
        FlowControlStmt::make(flow, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Stmt(Stmt::FlowControl(stmt)))
}

fn parse_wait_time(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let time = t.extract_value(block, ExprParam::new("WAIT", BlocklyType::Number))?;
    let stmt = checked(
        WaitTimeStmt::make(time, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Stmt(Stmt::WaitTime(stmt)))
}

fn parse_print(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let text = t.extract_value(block, ExprParam::new("TEXT", BlocklyType::Captured))?;
    let stmt = checked(
        PrintStmt::make(text, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Stmt(Stmt::Print(stmt)))
}

fn parse_var(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let name = required_name(block)?;
    if let Some(declared) = declared_type(block, "datatype")? {
        t.env.bind(name, &declared, &block.id)?;
    }
    let ty = t.env.lookup(name);
    let var = checked(
        Var::make(name, ty, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Expr(Expr::Var(var)))
}

fn parse_number(_: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let literal = required_field(block, "NUM")?;
    if !is_number_literal(literal) {
        return Err(invalid_field(block, "NUM", literal));
    }
    // The pattern admits exponents that overflow to infinity.
    let num = NumConst::make(literal, block_properties(block), block_comment(block))
        .map_err(|_| invalid_field(block, "NUM", literal))?;
    Ok(Phrase::Expr(Expr::Num(num)))
}

fn parse_boolean(_: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let text = required_field(block, "BOOL")?;
    let value = match text {
        "TRUE" => true,
        "FALSE" => false,
        _ => return Err(invalid_field(block, "BOOL", text)),
    };
    let constant = checked(
        BoolConst::make(value, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Expr(Expr::Bool(constant)))
}

fn parse_text(_: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let text = required_field(block, "TEXT")?;
    let constant = checked(
        StringConst::make(text, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Expr(Expr::Str(constant)))
}

fn parse_binary(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let op_text = required_field(block, "OP")?;
    let op = BinaryOp::from_field(&block.type_tag, op_text)
        .ok_or_else(|| invalid_field(block, "OP", op_text))?;
    let left = t.extract_value(block, ExprParam::new("A", op.operand_type()))?;
    let right = t.extract_value(block, ExprParam::new("B", op.operand_type()))?;
    if matches!(op, BinaryOp::Eq | BinaryOp::Neq) {
        let shared = unify(&left.ty(), &right.ty())
            .map_err(|_| TransformError::mismatch(&left.ty(), &right.ty(), right.block_id()))?;
        t.constrain(&left, &shared)?;
        t.constrain(&right, &shared)?;
        if let (Expr::Var(a), Expr::Var(b)) = (&left, &right) {
            if !shared.is_concrete() {
                t.env.alias(a.name(), b.name(), &block.id);
            }
        }
    }
    let expr = checked(
        BinaryExpr::make(op, left, right, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Expr(Expr::Binary(expr)))
}

fn parse_negate(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    parse_unary(t, block, UnaryOp::Not)
}

fn parse_math_single(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let op_text = required_field(block, "OP")?;
    let op = UnaryOp::from_math_field(op_text).ok_or_else(|| invalid_field(block, "OP", op_text))?;
    parse_unary(t, block, op)
}

fn parse_unary(
    t: &mut Transformer<'_>,
    block: &Block,
    op: UnaryOp,
) -> Result<Phrase, TransformError> {
    let operand = t.extract_value(block, ExprParam::new(op.slot(), op.operand_type()))?;
    let expr = checked(
        UnaryExpr::make(op, operand, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Expr(Expr::Unary(expr)))
}

fn parse_items(
    t: &mut Transformer<'_>,
    block: &Block,
    element: &mut BlocklyType,
) -> Result<Vec<Expr>, TransformError> {
    let count = item_count(block)?;
    let slots = (0..count).map(|i| format!("ADD{}", i)).collect::<Vec<_>>();
    reject_extra_slots(block, &slots, &[])?;
    let mut items = Vec::with_capacity(count);
    for slot in &slots {
        let item = t.extract_value(block, ExprParam::new(slot, element.clone()))?;
        *element = unify(element, &item.ty())
            .map_err(|_| TransformError::mismatch(element, &item.ty(), item.block_id()))?;
        items.push(item);
    }
    Ok(items)
}

fn parse_list_create(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let mut element = declared_type(block, "list_type")?.unwrap_or(BlocklyType::Captured);
    let items = parse_items(t, block, &mut element)?;
    let list = checked(
        ListCreate::make(element, items, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Expr(Expr::ListCreate(list)))
}

fn parse_list_length(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    let list = t.extract_value(
        block,
        ExprParam::new("VALUE", BlocklyType::array_of(BlocklyType::Captured)),
    )?;
    let expr = checked(
        ListLength::make(list, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Expr(Expr::ListLength(expr)))
}

fn parse_text_join(t: &mut Transformer<'_>, block: &Block) -> Result<Phrase, TransformError> {
    // Items of any type are joined; each keeps its own type.
    let mut items = Vec::new();
    let count = item_count(block)?;
    let slots = (0..count).map(|i| format!("ADD{}", i)).collect::<Vec<_>>();
    reject_extra_slots(block, &slots, &[])?;
    for slot in &slots {
        items.push(t.extract_value(block, ExprParam::new(slot, BlocklyType::Captured))?);
    }
    let expr = checked(
        TextJoin::make(items, block_properties(block), block_comment(block)),
        block,
    )?;
    Ok(Phrase::Expr(Expr::TextJoin(expr)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Mutation;

    fn number(id: &str, literal: &str) -> Block {
        Block::new(NUMBER_BLOCK, id).with_field("NUM", literal)
    }

    fn text(id: &str, value: &str) -> Block {
        Block::new(TEXT_BLOCK, id).with_field("TEXT", value)
    }

    fn get(id: &str, name: &str) -> Block {
        Block::new(VAR_BLOCK, id).with_field("VAR", name)
    }

    fn set(id: &str, name: &str, value: Block) -> Block {
        Block::new(ASSIGN_BLOCK, id)
            .with_field("VAR", name)
            .with_value("VALUE", value)
    }

    fn print(id: &str, value: Block) -> Block {
        Block::new(PRINT_BLOCK, id).with_value("TEXT", value)
    }

    fn transform(blocks: &[Block]) -> Result<Program, TransformError> {
        let registry = Registry::standard();
        Transformer::new(&registry, TransformOptions::default()).transform_program(blocks)
    }

    fn statements(program: &Program) -> &StmtList {
        match &program.roots()[0] {
            Root::Statements(list) => list,
            Root::Expr(_) => panic!("expected a statement root"),
        }
    }

    #[test]
    fn registry_covers_every_tag_once() {
        let registry = Registry::standard();
        assert_eq!(registry.len(), PARSERS.len());
        assert!(registry.supports("controls_if"));
        assert!(!registry.supports("procedures_defnoreturn"));
    }

    #[test]
    fn simple_assignment() {
        let program = transform(&[set("b1", "x", number("b2", "5"))]).unwrap();
        let Stmt::Assign(assign) = &statements(&program).as_slice()[0] else {
            panic!("expected assignment");
        };
        assert_eq!(assign.name().name(), "x");
        assert_eq!(assign.name().var_type(), &BlocklyType::Number);
        let Expr::Num(num) = assign.expr() else {
            panic!("expected number");
        };
        assert_eq!(num.value(), 5.0);
        assert_eq!(assign.provenance().block_id(), "b1");
    }

    #[test]
    fn missing_value_slot() {
        let block = Block::new(ASSIGN_BLOCK, "b1").with_field("VAR", "x");
        assert_eq!(
            transform(&[block]).unwrap_err(),
            TransformError::MissingSlot {
                slot: "VALUE".to_string(),
                block_id: "b1".to_string(),
            }
        );
    }

    #[test]
    fn missing_field() {
        let block = Block::new(ASSIGN_BLOCK, "b1").with_value("VALUE", number("b2", "1"));
        assert_eq!(
            transform(&[block]).unwrap_err(),
            TransformError::MissingField {
                field: "VAR".to_string(),
                block_id: "b1".to_string(),
            }
        );
    }

    #[test]
    fn string_assigned_to_number_variable() {
        let block = set("b1", "x", text("b2", "hello"))
            .with_mutation(Mutation::new().with("datatype", "Number"));
        let err = transform(&[block]).unwrap_err();
        assert_eq!(
            err,
            TransformError::TypeMismatch {
                expected: Some(BlocklyType::Number),
                found: BlocklyType::String,
                block_id: "b1".to_string(),
            }
        );
    }

    #[test]
    fn reassigning_with_another_type_is_rejected() {
        let chain = set("b1", "x", number("n1", "1")).with_next(set("b2", "x", text("t1", "a")));
        let err = transform(&[chain]).unwrap_err();
        assert_eq!(err.block_id(), Some("b2"));
    }

    #[test]
    fn chained_statements_keep_order() {
        let chain = set("b1", "x", number("n1", "1")).with_next(set("b2", "y", number("n2", "2")));
        let program = transform(&[chain]).unwrap();
        let ids = statements(&program)
            .iter()
            .map(|s| s.block_id().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["b1", "b2"]);
    }

    #[test]
    fn variable_read_before_assignment_is_resolved() {
        let chain = print("p1", get("g1", "x")).with_next(set("b1", "x", text("t1", "hi")));
        let program = transform(&[chain]).unwrap();
        let Stmt::Print(print) = &statements(&program).as_slice()[0] else {
            panic!("expected print");
        };
        assert_eq!(print.text().ty(), BlocklyType::String);
    }

    #[test]
    fn variable_never_typed_is_rejected() {
        let err = transform(&[print("p1", get("g1", "ghost"))]).unwrap_err();
        assert_eq!(
            err,
            TransformError::TypeMismatch {
                expected: None,
                found: BlocklyType::Captured,
                block_id: "g1".to_string(),
            }
        );
    }

    #[test]
    fn typed_slot_binds_placeholder_variable() {
        let wait = Block::new(WAIT_TIME_BLOCK, "w1").with_value("WAIT", get("g1", "delay"));
        let program = transform(&[wait]).unwrap();
        let Stmt::WaitTime(wait) = &statements(&program).as_slice()[0] else {
            panic!("expected wait");
        };
        assert_eq!(wait.time().ty(), BlocklyType::Number);
    }

    #[test]
    fn unknown_block_type() {
        let block = Block::new("robSensors_ultrasonic_getSample", "s1");
        assert_eq!(
            transform(&[block]).unwrap_err(),
            TransformError::UnknownBlockType {
                tag: "robSensors_ultrasonic_getSample".to_string(),
                block_id: "s1".to_string(),
            }
        );
    }

    #[test]
    fn statement_in_value_slot_is_malformed() {
        let block = set("b1", "x", print("p1", number("n1", "1")));
        let err = transform(&[block]).unwrap_err();
        assert!(matches!(err, TransformError::MalformedGraph { ref block_id, .. } if block_id == "p1"));
    }

    #[test]
    fn floating_expression_needs_option() {
        let registry = Registry::standard();
        let floating = [number("n1", "3")];
        let err = Transformer::new(&registry, TransformOptions::default())
            .transform_program(&floating)
            .unwrap_err();
        assert_eq!(err.block_id(), Some("n1"));

        let options = TransformOptions {
            allow_floating_expressions: true,
        };
        let program = Transformer::new(&registry, options)
            .transform_program(&floating)
            .unwrap();
        assert!(matches!(program.roots()[0], Root::Expr(Expr::Num(_))));
    }

    #[test]
    fn if_reads_every_branch() {
        let truth = |id: &str| Block::new(BOOLEAN_BLOCK, id).with_field("BOOL", "TRUE");
        let block = Block::new(IF_BLOCK, "i1")
            .with_mutation(Mutation::new().with("elseif", "1").with("else", "1"))
            .with_value("IF0", truth("c0"))
            .with_statement("DO0", set("s0", "x", number("n0", "0")))
            .with_value("IF1", truth("c1"))
            .with_statement("ELSE", set("s2", "x", number("n2", "2")));
        let program = transform(&[block]).unwrap();
        let Stmt::If(stmt) = &statements(&program).as_slice()[0] else {
            panic!("expected if");
        };
        assert_eq!(stmt.conditions().len(), 2);
        assert_eq!(stmt.then_branches()[0].len(), 1);
        assert!(stmt.then_branches()[1].is_empty());
        assert_eq!(stmt.else_branch().map(StmtList::len), Some(1));
    }

    #[test]
    fn if_condition_must_be_boolean() {
        let block = Block::new(IF_BLOCK, "i1").with_value("IF0", number("n1", "1"));
        let err = transform(&[block]).unwrap_err();
        assert_eq!(
            err,
            TransformError::TypeMismatch {
                expected: Some(BlocklyType::Boolean),
                found: BlocklyType::Number,
                block_id: "n1".to_string(),
            }
        );
    }

    #[test]
    fn if_inputs_beyond_mutation_are_malformed() {
        let truth = |id: &str| Block::new(BOOLEAN_BLOCK, id).with_field("BOOL", "TRUE");
        let block = Block::new(IF_BLOCK, "i1")
            .with_value("IF0", truth("c0"))
            .with_value("IF1", truth("c1"));
        let err = transform(&[block]).unwrap_err();
        assert!(matches!(err, TransformError::MalformedGraph { .. }));
    }

    #[test]
    fn for_each_types_loop_variable_from_list() {
        let list = Block::new(LIST_CREATE_BLOCK, "l1")
            .with_mutation(Mutation::new().with("items", "2"))
            .with_value("ADD0", text("t0", "a"))
            .with_value("ADD1", text("t1", "b"));
        let block = Block::new(FOR_EACH_BLOCK, "f1")
            .with_field("VAR", "item")
            .with_value("LIST", list)
            .with_statement("DO", print("p1", get("g1", "item")));
        let program = transform(&[block]).unwrap();
        let Stmt::ForEach(stmt) = &statements(&program).as_slice()[0] else {
            panic!("expected for each");
        };
        assert_eq!(stmt.var().var_type(), &BlocklyType::String);
        assert_eq!(stmt.list().ty(), BlocklyType::array_of(BlocklyType::String));
    }

    #[test]
    fn mixed_list_items_are_rejected() {
        let list = Block::new(LIST_CREATE_BLOCK, "l1")
            .with_value("ADD0", number("n0", "1"))
            .with_value("ADD1", text("t1", "b"));
        let err = transform(&[set("b1", "xs", list)]).unwrap_err();
        assert_eq!(err.block_id(), Some("t1"));
    }

    #[test]
    fn invalid_operator_and_literal() {
        let bad_op = Block::new(ARITHMETIC_BLOCK, "a1")
            .with_field("OP", "AND")
            .with_value("A", number("n1", "1"))
            .with_value("B", number("n2", "2"));
        assert_eq!(
            transform(&[set("b1", "x", bad_op)]).unwrap_err(),
            TransformError::InvalidField {
                field: "OP".to_string(),
                value: "AND".to_string(),
                block_id: "a1".to_string(),
            }
        );
        let err = transform(&[set("b1", "x", number("n1", "five"))]).unwrap_err();
        assert!(matches!(err, TransformError::InvalidField { ref field, .. } if field == "NUM"));
    }

    #[test]
    fn comparison_shares_operand_type() {
        let compare = Block::new(COMPARE_BLOCK, "c1")
            .with_field("OP", "EQ")
            .with_value("A", get("g1", "name"))
            .with_value("B", text("t1", "bob"));
        let block = Block::new(IF_BLOCK, "i1").with_value("IF0", compare);
        let program = transform(&[block]).unwrap();
        let Stmt::If(stmt) = &statements(&program).as_slice()[0] else {
            panic!("expected if");
        };
        let Expr::Binary(binary) = &stmt.conditions()[0] else {
            panic!("expected comparison");
        };
        assert_eq!(binary.left().ty(), BlocklyType::String);
    }

    #[test]
    fn unknown_datatype_is_an_invalid_field() {
        let block = get("g1", "x").with_mutation(Mutation::new().with("datatype", "Colour"));
        let err = transform(&[print("p1", block)]).unwrap_err();
        assert_eq!(
            err,
            TransformError::InvalidField {
                field: "mutation.datatype".to_string(),
                value: "Colour".to_string(),
                block_id: "g1".to_string(),
            }
        );
    }

    #[test]
    fn oversized_counts_are_rejected() {
        let truth = Block::new(BOOLEAN_BLOCK, "c0").with_field("BOOL", "TRUE");
        let branches = Block::new(IF_BLOCK, "i1")
            .with_mutation(Mutation::new().with("elseif", "18446744073709551615"))
            .with_value("IF0", truth);
        assert_eq!(
            transform(&[branches]).unwrap_err(),
            TransformError::InvalidField {
                field: "mutation.elseif".to_string(),
                value: "18446744073709551615".to_string(),
                block_id: "i1".to_string(),
            }
        );

        let list = Block::new(LIST_CREATE_BLOCK, "l1")
            .with_mutation(Mutation::new().with("items", "18446744073709551615"))
            .with_value("ADD0", number("n0", "1"));
        let err = transform(&[set("b1", "xs", list)]).unwrap_err();
        assert!(matches!(
            err,
            TransformError::InvalidField { ref field, ref block_id, .. }
                if field == "mutation.items" && block_id == "l1"
        ));

        let join = Block::new(TEXT_JOIN_BLOCK, "j1")
            .with_mutation(Mutation::new().with("items", "100000000"));
        let err = transform(&[print("p1", join)]).unwrap_err();
        assert_eq!(err.block_id(), Some("j1"));
    }

    #[test]
    fn blank_variable_name_is_invalid_input() {
        let err = transform(&[set("b1", "", number("n1", "1"))]).unwrap_err();
        assert_eq!(
            err,
            TransformError::InvalidField {
                field: "VAR".to_string(),
                value: String::new(),
                block_id: "b1".to_string(),
            }
        );
        assert!(err.is_user_error());

        let err = transform(&[print("p1", get("g1", "  "))]).unwrap_err();
        assert_eq!(err.block_id(), Some("g1"));
        assert!(err.is_user_error());

        let each = Block::new(FOR_EACH_BLOCK, "f1")
            .with_field("VAR", "")
            .with_value("LIST", get("g2", "xs"));
        assert!(matches!(
            transform(&[each]).unwrap_err(),
            TransformError::InvalidField { ref field, .. } if field == "VAR"
        ));
    }

    #[test]
    fn compared_variables_typed_apart_later_are_a_mismatch() {
        let compare = Block::new(COMPARE_BLOCK, "c1")
            .with_field("OP", "EQ")
            .with_value("A", get("g1", "x"))
            .with_value("B", get("g2", "y"));
        let chain = Block::new(IF_BLOCK, "i1")
            .with_value("IF0", compare)
            .with_next(set("b1", "x", number("n1", "1")).with_next(set("b2", "y", text("t1", "a"))));
        let err = transform(&[chain]).unwrap_err();
        assert!(matches!(err, TransformError::TypeMismatch { .. }));
        assert!(err.is_user_error());
        assert_eq!(err.block_id(), Some("c1"));
    }

    #[test]
    fn compared_variables_share_a_later_type() {
        let compare = Block::new(COMPARE_BLOCK, "c1")
            .with_field("OP", "NEQ")
            .with_value("A", get("g1", "x"))
            .with_value("B", get("g2", "y"));
        let chain = Block::new(IF_BLOCK, "i1")
            .with_value("IF0", compare)
            .with_next(set("b1", "x", text("t1", "a")));
        let program = transform(&[chain]).unwrap();
        let Stmt::If(stmt) = &statements(&program).as_slice()[0] else {
            panic!("expected if");
        };
        let Expr::Binary(binary) = &stmt.conditions()[0] else {
            panic!("expected comparison");
        };
        assert_eq!(binary.right().ty(), BlocklyType::String);
    }

    #[test]
    fn for_each_over_list_assigned_later() {
        let each = Block::new(FOR_EACH_BLOCK, "f1")
            .with_field("VAR", "item")
            .with_value("LIST", get("g1", "xs"))
            .with_statement("DO", print("p1", get("g2", "item")));
        let list = Block::new(LIST_CREATE_BLOCK, "l1")
            .with_mutation(Mutation::new().with("items", "1"))
            .with_value("ADD0", text("t0", "a"));
        let program = transform(&[each.with_next(set("b1", "xs", list))]).unwrap();
        let Stmt::ForEach(stmt) = &statements(&program).as_slice()[0] else {
            panic!("expected for each");
        };
        assert_eq!(stmt.var().var_type(), &BlocklyType::String);
        assert_eq!(stmt.list().ty(), BlocklyType::array_of(BlocklyType::String));
    }

    #[test]
    fn for_each_item_typed_against_its_list_is_a_mismatch() {
        let each = Block::new(FOR_EACH_BLOCK, "f1")
            .with_field("VAR", "item")
            .with_value("LIST", get("g1", "xs"));
        let list = Block::new(LIST_CREATE_BLOCK, "l1")
            .with_mutation(Mutation::new().with("items", "1"))
            .with_value("ADD0", text("t0", "a"));
        let chain = each.with_next(
            set("b1", "item", number("n1", "1")).with_next(set("b2", "xs", list)),
        );
        let err = transform(&[chain]).unwrap_err();
        assert!(matches!(err, TransformError::TypeMismatch { .. }));
        assert_eq!(err.block_id(), Some("f1"));
    }

    #[test]
    fn single_phrase_transform() {
        let registry = Registry::standard();
        let phrase = Transformer::new(&registry, TransformOptions::default())
            .transform_phrase(&set("b1", "x", number("b2", "5")))
            .unwrap();
        assert_eq!(phrase.kind(), crate::ast::Kind::AssignStmt);
    }
}
