use super::{
    active_roots, integer_value, number_literal, quote, variables_of, GenerateError,
    GenerateOptions, Lines, Names,
};
use crate::ast::{
    AssignStmt, BinaryExpr, BinaryOp, BoolConst, Expr, FlowControlStmt, FlowKind, ForEachStmt,
    ForStmt, IfStmt, ListCreate, ListLength, LoopMode, NumConst, PrintStmt, Program,
    RepeatTimesStmt, Root, StmtList, StringConst, TextJoin, UnaryExpr, UnaryOp, Var,
    WaitTimeStmt, WhileUntilStmt,
};
use crate::visitor::AstVisitor;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield", "math", "time", "print", "len", "str", "abs", "range",
    "blockly_range",
];

const RANGE_HELPER: &str = "blockly_range";

pub fn generate(program: &Program, options: GenerateOptions) -> Result<String, GenerateError> {
    let mut generator = PythonGenerator::new(options);
    generator.names = Names::new(&variables_of(active_roots(program, options)), KEYWORDS);
    let mut stacks = Vec::new();
    for root in active_roots(program, options) {
        stacks.push(match root {
            Root::Statements(list) => generator.block(list)?,
            Root::Expr(expr) => {
                let text = expr.accept(&mut generator)?;
                generator.lines.line(&text)
            }
        });
    }

    let mut out = String::new();
    if generator.uses_math {
        out.push_str("import math\n");
    }
    if generator.uses_time {
        out.push_str("import time\n");
    }
    if !out.is_empty() {
        out.push('\n');
    }
    if generator.uses_range {
        out.push_str(&range_helper(options));
        out.push('\n');
    }
    out.push_str(&stacks.join("\n"));
    Ok(out)
}

/// Inclusive counting in either direction, like the Blockly `for` block.
fn range_helper(options: GenerateOptions) -> String {
    let body: &[(usize, &str)] = &[
        (0, "def blockly_range(start, stop, step):"),
        (1, "step = abs(step) or 1"),
        (1, "if start <= stop:"),
        (2, "while start <= stop:"),
        (3, "yield start"),
        (3, "start += step"),
        (1, "else:"),
        (2, "while start >= stop:"),
        (3, "yield start"),
        (3, "start -= step"),
    ];
    body.iter()
        .map(|(depth, text)| format!("{}{}\n", " ".repeat(options.indent * depth), text))
        .collect()
}

pub struct PythonGenerator {
    lines: Lines,
    names: Names,
    uses_math: bool,
    uses_time: bool,
    uses_range: bool,
}

type Generated = Result<String, GenerateError>;

impl PythonGenerator {
    pub fn new(options: GenerateOptions) -> Self {
        Self {
            lines: Lines::new(options),
            names: Names::default(),
            uses_math: false,
            uses_time: false,
            uses_range: false,
        }
    }

    fn block(&mut self, list: &StmtList) -> Generated {
        if list.is_empty() {
            return Ok(self.lines.line("pass"));
        }
        let mut out = String::new();
        for stmt in list {
            out.push_str(&stmt.accept(self)?);
        }
        Ok(out)
    }

    fn nested(&mut self, list: &StmtList) -> Generated {
        self.lines.enter();
        let body = self.block(list);
        self.lines.leave();
        body
    }

    fn operand(&mut self, expr: &Expr) -> Generated {
        let text = expr.accept(self)?;
        Ok(match expr {
            Expr::Binary(_) | Expr::Unary(_) => format!("({})", text),
            _ => text,
        })
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Minus => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Power => "**",
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

impl AstVisitor for PythonGenerator {
    type Output = Generated;

    fn visit_assign_stmt(&mut self, stmt: &AssignStmt) -> Generated {
        let value = stmt.expr().accept(self)?;
        let mut out = self.lines.comment("#", stmt.provenance().comment());
        out.push_str(
            &self
                .lines
                .line(&format!("{} = {}", self.names.get(stmt.name().name()), value)),
        );
        Ok(out)
    }

    fn visit_if_stmt(&mut self, stmt: &IfStmt) -> Generated {
        let mut out = self.lines.comment("#", stmt.provenance().comment());
        for (i, (condition, body)) in stmt.branches().enumerate() {
            let keyword = if i == 0 { "if" } else { "elif" };
            let condition = condition.accept(self)?;
            out.push_str(&self.lines.line(&format!("{} {}:", keyword, condition)));
            out.push_str(&self.nested(body)?);
        }
        if let Some(body) = stmt.else_branch() {
            out.push_str(&self.lines.line("else:"));
            out.push_str(&self.nested(body)?);
        }
        Ok(out)
    }

    fn visit_repeat_times_stmt(&mut self, stmt: &RepeatTimesStmt) -> Generated {
        let times = stmt.times().accept(self)?;
        let mut out = self.lines.comment("#", stmt.provenance().comment());
        out.push_str(&self.lines.line(&format!("for _ in range(int({})):", times)));
        out.push_str(&self.nested(stmt.body())?);
        Ok(out)
    }

    fn visit_while_until_stmt(&mut self, stmt: &WhileUntilStmt) -> Generated {
        let condition = stmt.condition().accept(self)?;
        let header = match stmt.mode() {
            LoopMode::While => format!("while {}:", condition),
            LoopMode::Until => format!("while not ({}):", condition),
        };
        let mut out = self.lines.comment("#", stmt.provenance().comment());
        out.push_str(&self.lines.line(&header));
        out.push_str(&self.nested(stmt.body())?);
        Ok(out)
    }

    fn visit_for_stmt(&mut self, stmt: &ForStmt) -> Generated {
        let literal = |expr: &Expr| match expr {
            Expr::Num(num) => integer_value(num),
            _ => None,
        };
        let range = match (literal(stmt.from()), literal(stmt.to()), literal(stmt.by())) {
            (Some(from), Some(to), Some(by)) => {
                let step = by.abs().max(1);
                if from <= to {
                    format!("range({}, {}, {})", from, to + 1, step)
                } else {
                    format!("range({}, {}, {})", from, to - 1, -step)
                }
            }
            _ => {
                self.uses_range = true;
                format!(
                    "{}({}, {}, {})",
                    RANGE_HELPER,
                    stmt.from().accept(self)?,
                    stmt.to().accept(self)?,
                    stmt.by().accept(self)?
                )
            }
        };
        let mut out = self.lines.comment("#", stmt.provenance().comment());
        out.push_str(
            &self
                .lines
                .line(&format!("for {} in {}:", self.names.get(stmt.var().name()), range)),
        );
        out.push_str(&self.nested(stmt.body())?);
        Ok(out)
    }

    fn visit_for_each_stmt(&mut self, stmt: &ForEachStmt) -> Generated {
        let list = stmt.list().accept(self)?;
        let mut out = self.lines.comment("#", stmt.provenance().comment());
        out.push_str(
            &self
                .lines
                .line(&format!("for {} in {}:", self.names.get(stmt.var().name()), list)),
        );
        out.push_str(&self.nested(stmt.body())?);
        Ok(out)
    }

    fn visit_flow_control_stmt(&mut self, stmt: &FlowControlStmt) -> Generated {
        let keyword = match stmt.flow() {
            FlowKind::Break => "break",
            FlowKind::Continue => "continue",
        };
        let mut out = self.lines.comment("#", stmt.provenance().comment());
        out.push_str(&self.lines.line(keyword));
        Ok(out)
    }

    fn visit_wait_time_stmt(&mut self, stmt: &WaitTimeStmt) -> Generated {
        self.uses_time = true;
        let time = self.operand(stmt.time())?;
        let mut out = self.lines.comment("#", stmt.provenance().comment());
        out.push_str(&self.lines.line(&format!("time.sleep({} / 1000)", time)));
        Ok(out)
    }

    fn visit_print_stmt(&mut self, stmt: &PrintStmt) -> Generated {
        let text = stmt.text().accept(self)?;
        let mut out = self.lines.comment("#", stmt.provenance().comment());
        out.push_str(&self.lines.line(&format!("print({})", text)));
        Ok(out)
    }

    fn visit_var(&mut self, var: &Var) -> Generated {
        Ok(self.names.get(var.name()))
    }

    fn visit_num_const(&mut self, num: &NumConst) -> Generated {
        Ok(number_literal(num))
    }

    fn visit_bool_const(&mut self, value: &BoolConst) -> Generated {
        Ok(if value.value() { "True" } else { "False" }.to_string())
    }

    fn visit_string_const(&mut self, value: &StringConst) -> Generated {
        Ok(quote(value.value()))
    }

    fn visit_binary(&mut self, expr: &BinaryExpr) -> Generated {
        let mut left = self.operand(expr.left())?;
        // `-2 ** 2` is `-(2 ** 2)` in Python.
        if expr.op() == BinaryOp::Power && left.starts_with('-') {
            left = format!("({})", left);
        }
        let right = self.operand(expr.right())?;
        Ok(format!("{} {} {}", left, binary_symbol(expr.op()), right))
    }

    fn visit_unary(&mut self, expr: &UnaryExpr) -> Generated {
        let operand = self.operand(expr.operand())?;
        let text = match expr.op() {
            UnaryOp::Not => format!("not {}", operand),
            UnaryOp::Neg => format!("-{}", operand),
            UnaryOp::Abs => format!("abs({})", operand),
            UnaryOp::Pow10 => format!("10 ** {}", operand),
            UnaryOp::Root | UnaryOp::Ln | UnaryOp::Log10 | UnaryOp::Exp => {
                self.uses_math = true;
                let function = match expr.op() {
                    UnaryOp::Root => "sqrt",
                    UnaryOp::Ln => "log",
                    UnaryOp::Log10 => "log10",
                    _ => "exp",
                };
                format!("math.{}({})", function, operand)
            }
        };
        Ok(text)
    }

    fn visit_list_create(&mut self, expr: &ListCreate) -> Generated {
        let items = expr
            .items()
            .iter()
            .map(|item| item.accept(self))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("[{}]", items.join(", ")))
    }

    fn visit_list_length(&mut self, expr: &ListLength) -> Generated {
        Ok(format!("len({})", expr.list().accept(self)?))
    }

    fn visit_text_join(&mut self, expr: &TextJoin) -> Generated {
        let mut parts = Vec::with_capacity(expr.items().len());
        for item in expr.items() {
            let text = item.accept(self)?;
            parts.push(match item {
                Expr::Str(_) => text,
                _ => format!("str({})", text),
            });
        }
        if parts.is_empty() {
            return Ok("\"\"".to_string());
        }
        Ok(parts.join(" + "))
    }
}
