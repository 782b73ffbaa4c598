//! Placeholder resolution.
//!
//! The forward transformer records what it learns about each variable in a
//! [`TypeEnv`] while it reads the graph in document order. A variable read
//! before anything pins its type is built with [`BlocklyType::Captured`];
//! [`resolve_program`] rebuilds those nodes once the whole program is known
//! and rejects anything that is still a placeholder.

use crate::ast::{
    AssignStmt, BinaryExpr, BinaryOp, BlockProperties, Comment, Expr, ForEachStmt, ForStmt,
    IfStmt, ListCreate, ListLength, PrintStmt, Program, Provenance, RepeatTimesStmt, Root, Stmt,
    StmtList, TextJoin, UnaryExpr, Var, WaitTimeStmt, WhileUntilStmt,
};
use crate::error::{report_defect, NodeDefect, TransformError};
use crate::types::{is_assignable, unify, BlocklyType};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Alias {
    target: String,
    source: String,
    block_id: String,
}

/// `item` ranges over the elements of the list held in `list`.
#[derive(Debug, Clone)]
struct ElementOf {
    item: String,
    list: String,
    block_id: String,
}

/// Program-wide variable types. Blockly variables are global, so there is a
/// single scope.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    bindings: HashMap<String, BlocklyType>,
    aliases: Vec<Alias>,
    elements: Vec<ElementOf>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> BlocklyType {
        self.bindings
            .get(name)
            .cloned()
            .unwrap_or(BlocklyType::Captured)
    }

    /// Narrows `name` to `ty`, failing if it already holds an incompatible
    /// type.
    pub fn bind(
        &mut self,
        name: &str,
        ty: &BlocklyType,
        block_id: &str,
    ) -> Result<BlocklyType, TransformError> {
        let current = self.lookup(name);
        let unified =
            unify(&current, ty).map_err(|_| TransformError::mismatch(&current, ty, block_id))?;
        self.bindings.insert(name.to_string(), unified.clone());
        Ok(unified)
    }

    /// Records `target := source` between two variables whose types are not
    /// known yet; [`TypeEnv::settle`] propagates whatever either side learns.
    pub fn alias(&mut self, target: &str, source: &str, block_id: &str) {
        if target != source {
            self.aliases.push(Alias {
                target: target.to_string(),
                source: source.to_string(),
                block_id: block_id.to_string(),
            });
        }
    }

    /// Records that the loop variable `item` walks the list variable `list`,
    /// so a type learned for either one later fixes the other.
    pub fn element_of(&mut self, item: &str, list: &str, block_id: &str) {
        self.elements.push(ElementOf {
            item: item.to_string(),
            list: list.to_string(),
            block_id: block_id.to_string(),
        });
    }

    /// Propagates types along aliases and element links until nothing
    /// changes.
    pub fn settle(mut self) -> Result<Self, TransformError> {
        let aliases = std::mem::take(&mut self.aliases);
        let elements = std::mem::take(&mut self.elements);
        loop {
            let mut changed = false;
            for link in &elements {
                let item = self.lookup(&link.item);
                let list = self.lookup(&link.list);
                let wanted = BlocklyType::array_of(item.clone());
                let unified = unify(&list, &wanted)
                    .map_err(|_| TransformError::mismatch(&wanted, &list, &link.block_id))?;
                let element = unified
                    .element_type()
                    .cloned()
                    .unwrap_or(BlocklyType::Captured);
                if unified != list {
                    self.bindings.insert(link.list.clone(), unified);
                    changed = true;
                }
                if element != item {
                    self.bindings.insert(link.item.clone(), element);
                    changed = true;
                }
            }
            for alias in &aliases {
                let target = self.lookup(&alias.target);
                let source = self.lookup(&alias.source);
                let unified = unify(&target, &source)
                    .map_err(|_| TransformError::mismatch(&target, &source, &alias.block_id))?;
                if unified != target {
                    self.bindings.insert(alias.target.clone(), unified.clone());
                    changed = true;
                }
                if unified != source {
                    self.bindings.insert(alias.source.clone(), unified);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        self.aliases = aliases;
        self.elements = elements;
        Ok(self)
    }
}

/// Rebuilds `program` with every placeholder replaced by the type recorded
/// in `env`.
pub fn resolve_program(program: &Program, env: TypeEnv) -> Result<Program, TransformError> {
    let env = env.settle()?;
    let resolver = Resolver { env: &env };
    let mut roots = Vec::with_capacity(program.roots().len());
    for root in program.roots() {
        roots.push(match root {
            Root::Statements(list) => Root::Statements(resolver.stmt_list(list)?),
            Root::Expr(expr) => Root::Expr(resolver.expr(expr, &BlocklyType::Captured)?),
        });
    }
    Ok(Program::new(roots))
}

fn parts(provenance: &Provenance) -> (BlockProperties, Option<Comment>) {
    (
        provenance.properties().clone(),
        provenance.comment().cloned(),
    )
}

/// Checks a resolved child against the type its parent requires, so a
/// conflict is reported against the child's block.
fn expect(expected: &BlocklyType, expr: Expr) -> Result<Expr, TransformError> {
    let found = expr.ty();
    if is_assignable(expected, &found) {
        Ok(expr)
    } else {
        Err(TransformError::mismatch(expected, &found, expr.block_id()))
    }
}

fn rebuild<T>(made: Result<T, NodeDefect>, provenance: &Provenance) -> Result<T, TransformError> {
    made.map_err(|defect| report_defect(defect, provenance.block_id()))
}

struct Resolver<'e> {
    env: &'e TypeEnv,
}

impl Resolver<'_> {
    fn stmt_list(&self, list: &StmtList) -> Result<StmtList, TransformError> {
        let mut stmts = Vec::with_capacity(list.len());
        for stmt in list {
            stmts.push(self.stmt(stmt)?);
        }
        Ok(StmtList::new(stmts))
    }

    fn stmt(&self, stmt: &Stmt) -> Result<Stmt, TransformError> {
        let (properties, comment) = parts(stmt.provenance());
        let provenance = stmt.provenance();
        let resolved = match stmt {
            Stmt::Assign(s) => {
                let name = self.var(s.name())?;
                let expr = self.typed(s.expr(), name.var_type())?;
                Stmt::Assign(rebuild(
                    AssignStmt::make(name, expr, properties, comment),
                    provenance,
                )?)
            }
            Stmt::If(s) => {
                let mut conditions = Vec::with_capacity(s.conditions().len());
                let mut branches = Vec::with_capacity(s.then_branches().len());
                for (condition, body) in s.branches() {
                    conditions.push(self.typed(condition, &BlocklyType::Boolean)?);
                    branches.push(self.stmt_list(body)?);
                }
                let else_branch = match s.else_branch() {
                    Some(body) => Some(self.stmt_list(body)?),
                    None => None,
                };
                Stmt::If(rebuild(
                    IfStmt::make(conditions, branches, else_branch, properties, comment),
                    provenance,
                )?)
            }
            Stmt::RepeatTimes(s) => Stmt::RepeatTimes(rebuild(
                RepeatTimesStmt::make(
                    self.typed(s.times(), &BlocklyType::Number)?,
                    self.stmt_list(s.body())?,
                    properties,
                    comment,
                ),
                provenance,
            )?),
            Stmt::WhileUntil(s) => Stmt::WhileUntil(rebuild(
                WhileUntilStmt::make(
                    s.mode(),
                    self.typed(s.condition(), &BlocklyType::Boolean)?,
                    self.stmt_list(s.body())?,
                    properties,
                    comment,
                ),
                provenance,
            )?),
            Stmt::For(s) => Stmt::For(rebuild(
                ForStmt::make(
                    self.var(s.var())?,
                    self.typed(s.from(), &BlocklyType::Number)?,
                    self.typed(s.to(), &BlocklyType::Number)?,
                    self.typed(s.by(), &BlocklyType::Number)?,
                    self.stmt_list(s.body())?,
                    properties,
                    comment,
                ),
                provenance,
            )?),
            Stmt::ForEach(s) => {
                let var = self.var(s.var())?;
                let list = self.typed(s.list(), &BlocklyType::array_of(var.var_type().clone()))?;
                Stmt::ForEach(rebuild(
                    ForEachStmt::make(var, list, self.stmt_list(s.body())?, properties, comment),
                    provenance,
                )?)
            }
            Stmt::FlowControl(s) => Stmt::FlowControl(s.clone()),
            Stmt::WaitTime(s) => Stmt::WaitTime(rebuild(
                WaitTimeStmt::make(
                    self.typed(s.time(), &BlocklyType::Number)?,
                    properties,
                    comment,
                ),
                provenance,
            )?),
            Stmt::Print(s) => Stmt::Print(rebuild(
                PrintStmt::make(
                    self.expr(s.text(), &BlocklyType::Captured)?,
                    properties,
                    comment,
                ),
                provenance,
            )?),
        };
        Ok(resolved)
    }

    fn var(&self, var: &Var) -> Result<Var, TransformError> {
        let block_id = var.provenance().block_id();
        let known = self.env.lookup(var.name());
        let ty = unify(var.var_type(), &known)
            .map_err(|_| TransformError::mismatch(var.var_type(), &known, block_id))?;
        if !ty.is_concrete() {
            return Err(TransformError::unresolved(&ty, block_id));
        }
        let (properties, comment) = parts(var.provenance());
        rebuild(Var::make(var.name(), ty, properties, comment), var.provenance())
    }

    fn typed(&self, expr: &Expr, expected: &BlocklyType) -> Result<Expr, TransformError> {
        expect(expected, self.expr(expr, expected)?)
    }

    /// `expected` is the type the surrounding node wants; it only refines
    /// list literals whose element type is still open.
    fn expr(&self, expr: &Expr, expected: &BlocklyType) -> Result<Expr, TransformError> {
        let provenance = expr.provenance();
        let (properties, comment) = parts(provenance);
        let resolved = match expr {
            Expr::Var(var) => Expr::Var(self.var(var)?),
            Expr::Num(_) | Expr::Bool(_) | Expr::Str(_) => expr.clone(),
            Expr::Binary(binary) => {
                let op = binary.op();
                let (left_hint, right_hint) = match op {
                    BinaryOp::Eq | BinaryOp::Neq => {
                        (binary.right().ty(), binary.left().ty())
                    }
                    _ => (op.operand_type(), op.operand_type()),
                };
                let left = expect(&op.operand_type(), self.expr(binary.left(), &left_hint)?)?;
                let right = expect(&op.operand_type(), self.expr(binary.right(), &right_hint)?)?;
                if unify(&left.ty(), &right.ty()).is_err() {
                    return Err(TransformError::mismatch(
                        &left.ty(),
                        &right.ty(),
                        provenance.block_id(),
                    ));
                }
                Expr::Binary(rebuild(
                    BinaryExpr::make(op, left, right, properties, comment),
                    provenance,
                )?)
            }
            Expr::Unary(unary) => Expr::Unary(rebuild(
                UnaryExpr::make(
                    unary.op(),
                    self.typed(unary.operand(), &unary.op().operand_type())?,
                    properties,
                    comment,
                ),
                provenance,
            )?),
            Expr::ListCreate(list) => {
                let hint = expected.element_type().unwrap_or(&BlocklyType::Captured);
                let mut element =
                    unify(list.element_type(), hint).unwrap_or_else(|_| list.element_type().clone());
                let mut items = Vec::with_capacity(list.items().len());
                for item in list.items() {
                    let resolved = self.expr(item, &element)?;
                    element = unify(&element, &resolved.ty()).map_err(|_| {
                        TransformError::mismatch(&element, &resolved.ty(), resolved.block_id())
                    })?;
                    items.push(resolved);
                }
                if !element.is_concrete() {
                    return Err(TransformError::unresolved(
                        &BlocklyType::array_of(element),
                        provenance.block_id(),
                    ));
                }
                Expr::ListCreate(rebuild(
                    ListCreate::make(element, items, properties, comment),
                    provenance,
                )?)
            }
            Expr::ListLength(length) => Expr::ListLength(rebuild(
                ListLength::make(
                    self.typed(length.list(), &BlocklyType::array_of(BlocklyType::Captured))?,
                    properties,
                    comment,
                ),
                provenance,
            )?),
            Expr::TextJoin(join) => {
                let mut items = Vec::with_capacity(join.items().len());
                for item in join.items() {
                    items.push(self.expr(item, &BlocklyType::Captured)?);
                }
                Expr::TextJoin(rebuild(TextJoin::make(items, properties, comment), provenance)?)
            }
        };
        Ok(resolved)
    }
}
