//! Source generators.
//!
//! Each generator is an [`AstVisitor`]. Programs are type-checked before a
//! generator sees them, so generators can rely on every type being concrete.

pub mod arduino;
pub mod printer;
pub mod python;

use crate::ast::{
    AssignStmt, BinaryExpr, BoolConst, Comment, FlowControlStmt, ForEachStmt, ForStmt, IfStmt,
    ListCreate, ListLength, NumConst, PrintStmt, Program, RepeatTimesStmt, Root, StmtList,
    StringConst, TextJoin, UnaryExpr, Var, WaitTimeStmt, WhileUntilStmt,
};
use crate::error::TransformError;
use crate::typecheck::check_program;
use crate::types::BlocklyType;
use crate::visitor::{walk_stmt_list, AstVisitor};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Python,
    Arduino,
}

impl Target {
    pub fn name(self) -> &'static str {
        match self {
            Target::Python => "Python",
            Target::Arduino => "Arduino",
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Spaces per nesting level.
    pub indent: usize,
    /// Also emit top-level stacks whose first block is disabled.
    pub include_disabled: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            indent: 4,
            include_disabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Unresolved(#[from] TransformError),

    #[error("{target} cannot express {construct} (block '{block_id}').")]
    Unsupported {
        target: &'static str,
        construct: String,
        block_id: String,
    },
}

impl GenerateError {
    pub(crate) fn unsupported(target: Target, construct: impl Into<String>, block_id: &str) -> Self {
        GenerateError::Unsupported {
            target: target.name(),
            construct: construct.into(),
            block_id: block_id.to_string(),
        }
    }
}

pub fn generate(
    program: &Program,
    target: Target,
    options: GenerateOptions,
) -> Result<String, GenerateError> {
    check_program(program)?;
    tracing::debug!(%target, roots = program.roots().len(), "generating source");
    match target {
        Target::Python => python::generate(program, options),
        Target::Arduino => arduino::generate(program, options),
    }
}

pub(crate) fn active_roots(
    program: &Program,
    options: GenerateOptions,
) -> impl Iterator<Item = &Root> {
    program
        .roots()
        .iter()
        .filter(move |root| options.include_disabled || !root.is_disabled())
}

/// Nesting-aware line writer shared by the generators.
#[derive(Debug)]
pub(crate) struct Lines {
    unit: usize,
    depth: usize,
}

impl Lines {
    pub(crate) fn new(options: GenerateOptions) -> Self {
        Self {
            unit: options.indent,
            depth: 0,
        }
    }

    pub(crate) fn line(&self, text: &str) -> String {
        format!("{}{}\n", " ".repeat(self.unit * self.depth), text)
    }

    pub(crate) fn comment(&self, marker: &str, comment: Option<&Comment>) -> String {
        let Some(comment) = comment.filter(|c| !c.text.trim().is_empty()) else {
            return String::new();
        };
        comment
            .text
            .lines()
            .map(|text| self.line(&format!("{} {}", marker, text.trim_end())))
            .collect()
    }

    pub(crate) fn enter(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }
}

/// A variable together with the first block that mentions it.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: BlocklyType,
    pub block_id: String,
}

/// Every variable of a program with its resolved type, in first-use order.
pub fn collect_variables(program: &Program) -> Vec<Variable> {
    variables_of(program.roots())
}

pub(crate) fn variables_of<'a>(roots: impl IntoIterator<Item = &'a Root>) -> Vec<Variable> {
    let mut collector = VariableCollector::default();
    for root in roots {
        match root {
            Root::Statements(list) => collector.list(list),
            Root::Expr(expr) => expr.accept(&mut collector),
        }
    }
    collector.found
}

#[derive(Debug, Default)]
struct VariableCollector {
    seen: HashSet<String>,
    found: Vec<Variable>,
}

impl VariableCollector {
    fn list(&mut self, list: &StmtList) {
        walk_stmt_list(self, list);
    }
}

impl AstVisitor for VariableCollector {
    type Output = ();

    fn visit_assign_stmt(&mut self, stmt: &AssignStmt) {
        self.visit_var(stmt.name());
        stmt.expr().accept(self);
    }

    fn visit_if_stmt(&mut self, stmt: &IfStmt) {
        for (condition, body) in stmt.branches() {
            condition.accept(self);
            self.list(body);
        }
        if let Some(body) = stmt.else_branch() {
            self.list(body);
        }
    }

    fn visit_repeat_times_stmt(&mut self, stmt: &RepeatTimesStmt) {
        stmt.times().accept(self);
        self.list(stmt.body());
    }

    fn visit_while_until_stmt(&mut self, stmt: &WhileUntilStmt) {
        stmt.condition().accept(self);
        self.list(stmt.body());
    }

    fn visit_for_stmt(&mut self, stmt: &ForStmt) {
        self.visit_var(stmt.var());
        for bound in [stmt.from(), stmt.to(), stmt.by()] {
            bound.accept(self);
        }
        self.list(stmt.body());
    }

    fn visit_for_each_stmt(&mut self, stmt: &ForEachStmt) {
        self.visit_var(stmt.var());
        stmt.list().accept(self);
        self.list(stmt.body());
    }

    fn visit_flow_control_stmt(&mut self, _: &FlowControlStmt) {}

    fn visit_wait_time_stmt(&mut self, stmt: &WaitTimeStmt) {
        stmt.time().accept(self);
    }

    fn visit_print_stmt(&mut self, stmt: &PrintStmt) {
        stmt.text().accept(self);
    }

    fn visit_var(&mut self, var: &Var) {
        if self.seen.insert(var.name().to_string()) {
            self.found.push(Variable {
                name: var.name().to_string(),
                ty: var.var_type().clone(),
                block_id: var.provenance().block_id().to_string(),
            });
        }
    }

    fn visit_num_const(&mut self, _: &NumConst) {}

    fn visit_bool_const(&mut self, _: &BoolConst) {}

    fn visit_string_const(&mut self, _: &StringConst) {}

    fn visit_binary(&mut self, expr: &BinaryExpr) {
        expr.left().accept(self);
        expr.right().accept(self);
    }

    fn visit_unary(&mut self, expr: &UnaryExpr) {
        expr.operand().accept(self);
    }

    fn visit_list_create(&mut self, expr: &ListCreate) {
        for item in expr.items() {
            item.accept(self);
        }
    }

    fn visit_list_length(&mut self, expr: &ListLength) {
        expr.list().accept(self);
    }

    fn visit_text_join(&mut self, expr: &TextJoin) {
        for item in expr.items() {
            item.accept(self);
        }
    }
}

fn invalid_identifier_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]+").expect("valid identifier pattern"))
}

/// Turns a Blockly variable name into an identifier of the target language.
pub(crate) fn identifier(name: &str, reserved: &[&str]) -> String {
    let mut ident = invalid_identifier_chars()
        .replace_all(name.trim(), "_")
        .into_owned();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if reserved.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

/// Identifiers for the variables of one generation run.
///
/// [`identifier`] alone folds `my var` and `my_var` together, so later
/// names that land on a taken identifier get a numeric suffix.
#[derive(Debug, Clone, Default)]
pub(crate) struct Names {
    reserved: &'static [&'static str],
    assigned: HashMap<String, String>,
}

impl Names {
    /// Assigns in first-use order.
    pub(crate) fn new(variables: &[Variable], reserved: &'static [&'static str]) -> Self {
        let mut taken = HashSet::new();
        let mut assigned = HashMap::with_capacity(variables.len());
        for variable in variables {
            let base = identifier(&variable.name, reserved);
            let mut candidate = base.clone();
            let mut suffix = 2;
            while taken.contains(&candidate) || reserved.contains(&candidate.as_str()) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            taken.insert(candidate.clone());
            assigned.insert(variable.name.clone(), candidate);
        }
        Self { reserved, assigned }
    }

    pub(crate) fn get(&self, name: &str) -> String {
        self.assigned
            .get(name)
            .cloned()
            .unwrap_or_else(|| identifier(name, self.reserved))
    }
}

pub(crate) fn integer_value(num: &NumConst) -> Option<i64> {
    let value = num.value();
    (value.fract() == 0.0 && value.abs() < 1e15).then_some(value as i64)
}

/// Literal text safe for both targets. A leading zero would read as octal
/// in C++ and is a syntax error in Python, so such literals are re-printed.
pub(crate) fn number_literal(num: &NumConst) -> String {
    let literal = num.literal().trim().trim_start_matches('+');
    let digits = literal.trim_start_matches('-');
    let leading_zero = digits.len() > 1
        && digits.starts_with('0')
        && digits[1..].starts_with(|c: char| c.is_ascii_digit());
    if !leading_zero && !literal.is_empty() {
        return literal.to_string();
    }
    match integer_value(num) {
        Some(value) => value.to_string(),
        None => num.value().to_string(),
    }
}

/// Escapes `text` for a double-quoted literal in Python or C++.
pub(crate) fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BlockProperties;

    #[test]
    fn unresolved_program_is_rejected_before_generation() {
        let var = Var::make("x", BlocklyType::Captured, BlockProperties::new("v1"), None).unwrap();
        let program = Program::new(vec![Root::Expr(crate::ast::Expr::Var(var))]);
        let err = generate(&program, Target::Python, GenerateOptions::default()).unwrap_err();
        assert!(matches!(err, GenerateError::Unresolved(_)));
    }

    #[test]
    fn variables_are_listed_once_in_first_use_order() {
        use crate::block::Block;
        use crate::forward::{Registry, TransformOptions, Transformer};

        let chain = Block::new("variables_set", "s1")
            .with_field("VAR", "name")
            .with_value("VALUE", Block::new("text", "t1").with_field("TEXT", "bo"))
            .with_next(
                Block::new("controls_for", "f1")
                    .with_field("VAR", "i")
                    .with_value("FROM", Block::new("math_number", "n1").with_field("NUM", "1"))
                    .with_value("TO", Block::new("math_number", "n2").with_field("NUM", "2"))
                    .with_value("BY", Block::new("math_number", "n3").with_field("NUM", "1"))
                    .with_statement(
                        "DO",
                        Block::new("text_print", "p1").with_value(
                            "TEXT",
                            Block::new("variables_get", "g1").with_field("VAR", "name"),
                        ),
                    ),
            );
        let registry = Registry::standard();
        let program = Transformer::new(&registry, TransformOptions::default())
            .transform_program(&[chain])
            .unwrap();
        let variables = collect_variables(&program);
        assert_eq!(
            variables
                .iter()
                .map(|v| (v.name.as_str(), v.ty.clone(), v.block_id.as_str()))
                .collect::<Vec<_>>(),
            vec![
                ("name", BlocklyType::String, "s1"),
                ("i", BlocklyType::Number, "f1"),
            ]
        );
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
        assert_eq!(quote("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn identifiers_are_sanitised() {
        assert_eq!(identifier("my var", &[]), "my_var");
        assert_eq!(identifier("2nd", &[]), "_2nd");
        assert_eq!(identifier("while", &["while"]), "while_");
    }

    #[test]
    fn colliding_names_get_distinct_identifiers() {
        let variable = |name: &str| Variable {
            name: name.to_string(),
            ty: BlocklyType::Number,
            block_id: "b".to_string(),
        };
        let variables = [
            variable("my var"),
            variable("my_var"),
            variable("while_"),
            variable("while"),
        ];
        let names = Names::new(&variables, &["while"]);
        assert_eq!(names.get("my var"), "my_var");
        assert_eq!(names.get("my_var"), "my_var_2");
        assert_eq!(names.get("while_"), "while_");
        assert_eq!(names.get("while"), "while__2");
        assert_eq!(names.get("unlisted"), "unlisted");
    }

    #[test]
    fn number_literals_avoid_leading_zeros() {
        let num = |text: &str| NumConst::make(text, BlockProperties::new("n"), None).unwrap();
        assert_eq!(number_literal(&num("2.50")), "2.50");
        assert_eq!(number_literal(&num("007")), "7");
        assert_eq!(number_literal(&num("+3")), "3");
        assert_eq!(number_literal(&num("0.5")), "0.5");
    }

    #[test]
    fn lines_indent_by_depth() {
        let mut lines = Lines::new(GenerateOptions {
            indent: 2,
            include_disabled: false,
        });
        lines.enter();
        assert_eq!(lines.line("x"), "  x\n");
        lines.leave();
        assert_eq!(lines.line("y"), "y\n");
        assert_eq!(
            lines.comment("#", Some(&Comment::new("two\nlines"))),
            "# two\n# lines\n"
        );
    }
}
