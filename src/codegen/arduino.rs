use super::{
    active_roots, integer_value, number_literal, quote, variables_of, GenerateError,
    GenerateOptions, Lines, Names, Target,
};
use crate::ast::{
    AssignStmt, BinaryExpr, BinaryOp, BoolConst, Expr, FlowControlStmt, FlowKind, ForEachStmt,
    ForStmt, IfStmt, ListCreate, ListLength, LoopMode, NumConst, PrintStmt, Program,
    RepeatTimesStmt, Root, StmtList, StringConst, TextJoin, UnaryExpr, UnaryOp, Var,
    WaitTimeStmt, WhileUntilStmt,
};
use crate::error::TransformError;
use crate::types::BlocklyType;
use crate::visitor::AstVisitor;

const KEYWORDS: &[&str] = &[
    "auto", "bool", "break", "case", "char", "class", "const", "continue", "default", "delete",
    "do", "double", "else", "enum", "false", "float", "for", "goto", "if", "int", "long", "new",
    "return", "short", "signed", "sizeof", "static", "struct", "switch", "this", "true",
    "unsigned", "void", "while", "and", "or", "not", "String", "Serial", "setup", "loop",
    "delay", "pow", "sqrt", "fabs", "log", "log10", "exp", "std",
];

const BAUD_RATE: u32 = 9600;

pub fn generate(program: &Program, options: GenerateOptions) -> Result<String, GenerateError> {
    let variables = variables_of(active_roots(program, options));
    let mut generator = ArduinoGenerator::new(options);
    generator.names = Names::new(&variables, KEYWORDS);
    generator.lines.enter();
    let mut stacks = Vec::new();
    for root in active_roots(program, options) {
        match root {
            Root::Statements(list) => stacks.push(generator.block(list)?),
            Root::Expr(expr) => {
                return Err(GenerateError::unsupported(
                    Target::Arduino,
                    "a floating expression",
                    expr.block_id(),
                ))
            }
        }
    }

    let mut declarations = String::new();
    for variable in &variables {
        let ty = cpp_type(&variable.ty, &variable.block_id)?;
        generator.note_type(&variable.ty);
        declarations.push_str(&format!("{} {};\n", ty, generator.names.get(&variable.name)));
    }

    let indent = " ".repeat(options.indent);
    let mut out = String::from("#include <Arduino.h>\n");
    if generator.uses_vector {
        out.push_str("#include <vector>\n");
    }
    out.push('\n');
    if !declarations.is_empty() {
        out.push_str(&declarations);
        out.push('\n');
    }
    out.push_str("void setup() {\n");
    out.push_str(&format!("{}Serial.begin({});\n", indent, BAUD_RATE));
    for stack in stacks {
        out.push_str(&stack);
    }
    out.push_str("}\n\nvoid loop() {\n}\n");
    Ok(out)
}

fn cpp_type(ty: &BlocklyType, block_id: &str) -> Result<String, GenerateError> {
    match ty {
        BlocklyType::Number => Ok("double".to_string()),
        BlocklyType::Boolean => Ok("bool".to_string()),
        BlocklyType::String => Ok("String".to_string()),
        BlocklyType::Array(element) if element.element_type().is_some() => Err(
            GenerateError::unsupported(Target::Arduino, "nested lists", block_id),
        ),
        BlocklyType::Array(element) => {
            Ok(format!("std::vector<{}>", cpp_type(element, block_id)?))
        }
        BlocklyType::Captured => Err(TransformError::unresolved(ty, block_id).into()),
    }
}

pub struct ArduinoGenerator {
    lines: Lines,
    names: Names,
    uses_vector: bool,
}

type Generated = Result<String, GenerateError>;

impl ArduinoGenerator {
    pub fn new(options: GenerateOptions) -> Self {
        Self {
            lines: Lines::new(options),
            names: Names::default(),
            uses_vector: false,
        }
    }

    fn note_type(&mut self, ty: &BlocklyType) {
        if ty.element_type().is_some() {
            self.uses_vector = true;
        }
    }

    fn block(&mut self, list: &StmtList) -> Generated {
        let mut out = String::new();
        for stmt in list {
            out.push_str(&stmt.accept(self)?);
        }
        Ok(out)
    }

    /// `header {`, the nested body, then the closing brace.
    fn braced(&mut self, header: &str, prelude: Option<String>, body: &StmtList) -> Generated {
        let mut out = self.lines.line(&format!("{} {{", header));
        self.lines.enter();
        if let Some(prelude) = prelude {
            out.push_str(&self.lines.line(&prelude));
        }
        let inner = self.block(body);
        self.lines.leave();
        out.push_str(&inner?);
        out.push_str(&self.lines.line("}"));
        Ok(out)
    }

    fn operand(&mut self, expr: &Expr) -> Generated {
        let text = expr.accept(self)?;
        Ok(match expr {
            Expr::Binary(binary) if binary.op() != BinaryOp::Power => format!("({})", text),
            _ => text,
        })
    }

    /// Operand of `/`. Integer literals and lengths are widened so the
    /// quotient is not truncated.
    fn quotient_operand(&mut self, expr: &Expr) -> Generated {
        let text = self.operand(expr)?;
        Ok(match expr {
            Expr::Num(_) if text.trim_start_matches('-').bytes().all(|b| b.is_ascii_digit()) => {
                format!("{}.0", text)
            }
            Expr::ListLength(_) => format!("(double) {}", text),
            _ => text,
        })
    }

    /// Operand of a prefix operator; `--x` would read as a decrement.
    fn prefix_operand(&mut self, expr: &Expr) -> Generated {
        let text = self.operand(expr)?;
        Ok(match expr {
            Expr::Unary(_) => format!("({})", text),
            _ if text.starts_with('-') => format!("({})", text),
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
        BinaryOp::Power => "pow",
        BinaryOp::Eq => "==",
        BinaryOp::Neq => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Lte => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Gte => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

impl AstVisitor for ArduinoGenerator {
    type Output = Generated;

    fn visit_assign_stmt(&mut self, stmt: &AssignStmt) -> Generated {
        let name = self.visit_var(stmt.name())?;
        let value = stmt.expr().accept(self)?;
        let mut out = self.lines.comment("//", stmt.provenance().comment());
        out.push_str(&self.lines.line(&format!("{} = {};", name, value)));
        Ok(out)
    }

    fn visit_if_stmt(&mut self, stmt: &IfStmt) -> Generated {
        let mut out = self.lines.comment("//", stmt.provenance().comment());
        let mut first = true;
        for (condition, body) in stmt.branches() {
            let condition = condition.accept(self)?;
            let header = if first {
                format!("if ({})", condition)
            } else {
                format!("}} else if ({})", condition)
            };
            let mut part = self.braced(&header, None, body)?;
            // Every branch but the last shares its closing brace with the next header.
            let closing = self.lines.line("}");
            part.truncate(part.len() - closing.len());
            out.push_str(&part);
            first = false;
        }
        if let Some(body) = stmt.else_branch() {
            let part = self.braced("} else", None, body)?;
            out.push_str(&part);
        } else {
            out.push_str(&self.lines.line("}"));
        }
        Ok(out)
    }

    fn visit_repeat_times_stmt(&mut self, stmt: &RepeatTimesStmt) -> Generated {
        let times = stmt.times().accept(self)?;
        let counter = format!("_k{}", self.lines.depth());
        let header = format!(
            "for (int {c} = 0; {c} < {t}; {c}++)",
            c = counter,
            t = times
        );
        let mut out = self.lines.comment("//", stmt.provenance().comment());
        out.push_str(&self.braced(&header, None, stmt.body())?);
        Ok(out)
    }

    fn visit_while_until_stmt(&mut self, stmt: &WhileUntilStmt) -> Generated {
        let condition = stmt.condition().accept(self)?;
        let header = match stmt.mode() {
            LoopMode::While => format!("while ({})", condition),
            LoopMode::Until => format!("while (!({}))", condition),
        };
        let mut out = self.lines.comment("//", stmt.provenance().comment());
        out.push_str(&self.braced(&header, None, stmt.body())?);
        Ok(out)
    }

    fn visit_for_stmt(&mut self, stmt: &ForStmt) -> Generated {
        let var = self.visit_var(stmt.var())?;
        let from = stmt.from().accept(self)?;
        let to = stmt.to().accept(self)?;
        let by = self.operand(stmt.by())?;
        let descending = match (stmt.from(), stmt.to()) {
            (Expr::Num(from), Expr::Num(to)) => {
                matches!((integer_value(from), integer_value(to)), (Some(a), Some(b)) if a > b)
            }
            _ => false,
        };
        let header = if descending {
            format!("for ({v} = {f}; {v} >= {t}; {v} -= {b})", v = var, f = from, t = to, b = by)
        } else {
            format!("for ({v} = {f}; {v} <= {t}; {v} += {b})", v = var, f = from, t = to, b = by)
        };
        let mut out = self.lines.comment("//", stmt.provenance().comment());
        out.push_str(&self.braced(&header, None, stmt.body())?);
        Ok(out)
    }

    fn visit_for_each_stmt(&mut self, stmt: &ForEachStmt) -> Generated {
        let var = self.visit_var(stmt.var())?;
        let element = cpp_type(stmt.var().var_type(), stmt.provenance().block_id())?;
        let list = stmt.list().accept(self)?;
        let item = format!("_item{}", self.lines.depth());
        let header = format!("for ({} {} : {})", element, item, list);
        let mut out = self.lines.comment("//", stmt.provenance().comment());
        out.push_str(&self.braced(&header, Some(format!("{} = {};", var, item)), stmt.body())?);
        Ok(out)
    }

    fn visit_flow_control_stmt(&mut self, stmt: &FlowControlStmt) -> Generated {
        let keyword = match stmt.flow() {
            FlowKind::Break => "break;",
            FlowKind::Continue => "continue;",
        };
        let mut out = self.lines.comment("//", stmt.provenance().comment());
        out.push_str(&self.lines.line(keyword));
        Ok(out)
    }

    fn visit_wait_time_stmt(&mut self, stmt: &WaitTimeStmt) -> Generated {
        let time = stmt.time().accept(self)?;
        let mut out = self.lines.comment("//", stmt.provenance().comment());
        out.push_str(&self.lines.line(&format!("delay({});", time)));
        Ok(out)
    }

    fn visit_print_stmt(&mut self, stmt: &PrintStmt) -> Generated {
        let text = stmt.text().accept(self)?;
        let mut out = self.lines.comment("//", stmt.provenance().comment());
        out.push_str(&self.lines.line(&format!("Serial.println({});", text)));
        Ok(out)
    }

    fn visit_var(&mut self, var: &Var) -> Generated {
        cpp_type(var.var_type(), var.provenance().block_id())?;
        Ok(self.names.get(var.name()))
    }

    fn visit_num_const(&mut self, num: &NumConst) -> Generated {
        Ok(number_literal(num))
    }

    fn visit_bool_const(&mut self, value: &BoolConst) -> Generated {
        Ok(value.value().to_string())
    }

    fn visit_string_const(&mut self, value: &StringConst) -> Generated {
        Ok(format!("String({})", quote(value.value())))
    }

    fn visit_binary(&mut self, expr: &BinaryExpr) -> Generated {
        if expr.op() == BinaryOp::Power {
            let base = expr.left().accept(self)?;
            let exponent = expr.right().accept(self)?;
            return Ok(format!("pow({}, {})", base, exponent));
        }
        let (left, right) = if expr.op() == BinaryOp::Divide {
            (
                self.quotient_operand(expr.left())?,
                self.quotient_operand(expr.right())?,
            )
        } else {
            (self.operand(expr.left())?, self.operand(expr.right())?)
        };
        Ok(format!("{} {} {}", left, binary_symbol(expr.op()), right))
    }

    fn visit_unary(&mut self, expr: &UnaryExpr) -> Generated {
        let text = match expr.op() {
            UnaryOp::Not => format!("!{}", self.prefix_operand(expr.operand())?),
            UnaryOp::Neg => format!("-{}", self.prefix_operand(expr.operand())?),
            op => {
                let operand = expr.operand().accept(self)?;
                match op {
                    UnaryOp::Root => format!("sqrt({})", operand),
                    UnaryOp::Abs => format!("fabs({})", operand),
                    UnaryOp::Ln => format!("log({})", operand),
                    UnaryOp::Log10 => format!("log10({})", operand),
                    UnaryOp::Exp => format!("exp({})", operand),
                    _ => format!("pow(10, {})", operand),
                }
            }
        };
        Ok(text)
    }

    fn visit_list_create(&mut self, expr: &ListCreate) -> Generated {
        let element = cpp_type(expr.element_type(), expr.provenance().block_id())?;
        self.uses_vector = true;
        let items = expr
            .items()
            .iter()
            .map(|item| item.accept(self))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("std::vector<{}>{{{}}}", element, items.join(", ")))
    }

    fn visit_list_length(&mut self, expr: &ListLength) -> Generated {
        Ok(format!("{}.size()", expr.list().accept(self)?))
    }

    fn visit_text_join(&mut self, expr: &TextJoin) -> Generated {
        if expr.items().is_empty() {
            return Ok("String(\"\")".to_string());
        }
        let mut parts = Vec::with_capacity(expr.items().len());
        for item in expr.items() {
            let text = item.accept(self)?;
            parts.push(match item {
                Expr::Str(_) => text,
                _ => format!("String({})", text),
            });
        }
        Ok(parts.join(" + "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BlockProperties;
    use crate::block::{Block, Mutation};
    use crate::forward::{Registry, TransformOptions, Transformer};

    fn program(blocks: &[Block]) -> Program {
        let registry = Registry::standard();
        Transformer::new(&registry, TransformOptions::default())
            .transform_program(blocks)
            .unwrap()
    }

    fn number(id: &str, literal: &str) -> Block {
        Block::new("math_number", id).with_field("NUM", literal)
    }

    fn arduino(blocks: &[Block]) -> String {
        generate(&program(blocks), GenerateOptions::default()).unwrap()
    }

    #[test]
    fn sketch_declares_globals_and_runs_once_in_setup() {
        let chain = Block::new("variables_set", "b1")
            .with_field("VAR", "x")
            .with_value("VALUE", number("n1", "5"))
            .with_next(
                Block::new("text_print", "p1").with_value(
                    "TEXT",
                    Block::new("variables_get", "g1").with_field("VAR", "x"),
                ),
            );
        assert_eq!(
            arduino(&[chain]),
            "#include <Arduino.h>\n\ndouble x;\n\nvoid setup() {\n    Serial.begin(9600);\n    x = 5;\n    Serial.println(x);\n}\n\nvoid loop() {\n}\n"
        );
    }

    #[test]
    fn if_chain_shares_braces() {
        let truth = |id: &str| Block::new("logic_boolean", id).with_field("BOOL", "TRUE");
        let print = |id: &str, text: &str| {
            Block::new("text_print", id)
                .with_value("TEXT", Block::new("text", &format!("{}-t", id)).with_field("TEXT", text))
        };
        let block = Block::new("controls_if", "i1")
            .with_mutation(Mutation::new().with("elseif", "1").with("else", "1"))
            .with_value("IF0", truth("c0"))
            .with_statement("DO0", print("p0", "a"))
            .with_value("IF1", truth("c1"))
            .with_statement("DO1", print("p1", "b"))
            .with_statement("ELSE", print("p2", "c"));
        let source = arduino(&[block]);
        assert!(source.contains(
            "    if (true) {\n        Serial.println(String(\"a\"));\n    } else if (true) {\n        Serial.println(String(\"b\"));\n    } else {\n        Serial.println(String(\"c\"));\n    }\n"
        ));
    }

    #[test]
    fn lists_pull_in_vector() {
        let list = Block::new("lists_create_with", "l1")
            .with_mutation(Mutation::new().with("items", "2"))
            .with_value("ADD0", number("n1", "1"))
            .with_value("ADD1", number("n2", "2"));
        let block = Block::new("controls_forEach", "e1")
            .with_field("VAR", "item")
            .with_value("LIST", list)
            .with_statement(
                "DO",
                Block::new("text_print", "p1").with_value(
                    "TEXT",
                    Block::new("variables_get", "g1").with_field("VAR", "item"),
                ),
            );
        let source = arduino(&[block]);
        assert!(source.starts_with("#include <Arduino.h>\n#include <vector>\n"));
        assert!(source.contains("double item;\n"));
        assert!(source.contains(
            "    for (double _item1 : std::vector<double>{1, 2}) {\n        item = _item1;\n        Serial.println(item);\n    }\n"
        ));
    }

    #[test]
    fn power_and_descending_for() {
        let power = Block::new("math_arithmetic", "a1")
            .with_field("OP", "POWER")
            .with_value("A", number("n1", "2"))
            .with_value("B", number("n2", "3"));
        let block = Block::new("controls_for", "f1")
            .with_field("VAR", "i")
            .with_value("FROM", number("n3", "10"))
            .with_value("TO", number("n4", "1"))
            .with_value("BY", number("n5", "1"))
            .with_statement("DO", Block::new("robControls_wait_time", "w1").with_value("WAIT", power));
        let source = arduino(&[block]);
        assert!(source.contains("    for (i = 10; i >= 1; i -= 1) {\n        delay(pow(2, 3));\n    }\n"));
    }

    fn set(id: &str, name: &str, value: Block) -> Block {
        Block::new("variables_set", id)
            .with_field("VAR", name)
            .with_value("VALUE", value)
    }

    #[test]
    fn division_is_never_integer_division() {
        let quotient = Block::new("math_arithmetic", "a1")
            .with_field("OP", "DIVIDE")
            .with_value("A", number("n1", "1"))
            .with_value("B", number("n2", "2"));
        let length = Block::new("math_arithmetic", "a2")
            .with_field("OP", "DIVIDE")
            .with_value(
                "A",
                Block::new("lists_length", "len1")
                    .with_value("VALUE", Block::new("variables_get", "g1").with_field("VAR", "xs")),
            )
            .with_value("B", number("n3", "2.5"));
        let list = Block::new("lists_create_with", "l1")
            .with_mutation(Mutation::new().with("items", "1"))
            .with_value("ADD0", number("n4", "7"));
        let chain = set("b1", "xs", list)
            .with_next(set("b2", "q", quotient).with_next(set("b3", "h", length)));
        let source = arduino(&[chain]);
        assert!(source.contains("    q = 1.0 / 2.0;\n"));
        assert!(source.contains("    h = (double) xs.size() / 2.5;\n"));
    }

    #[test]
    fn negated_negative_literal_is_parenthesised() {
        let negate = |id: &str, operand: Block| {
            Block::new("math_single", id)
                .with_field("OP", "NEG")
                .with_value("NUM", operand)
        };
        let chain = set("b1", "r", negate("m1", number("n1", "-3")))
            .with_next(set("b2", "s", negate("m2", negate("m3", number("n2", "4")))));
        let source = arduino(&[chain]);
        assert!(source.contains("    r = -(-3);\n"));
        assert!(source.contains("    s = -(-4);\n"));
    }

    #[test]
    fn colliding_variable_names_stay_distinct() {
        let text = Block::new("text", "t1").with_field("TEXT", "a");
        let chain = set("b1", "my var", number("n1", "1")).with_next(set("b2", "my_var", text));
        let source = arduino(&[chain]);
        assert!(source.contains("double my_var;\nString my_var_2;\n"));
        assert!(source.contains("    my_var = 1;\n"));
        assert!(source.contains("    my_var_2 = "));
    }

    #[test]
    fn floating_expression_is_unsupported() {
        let registry = Registry::standard();
        let options = TransformOptions {
            allow_floating_expressions: true,
        };
        let program = Transformer::new(&registry, options)
            .transform_program(&[number("n1", "3")])
            .unwrap();
        assert_eq!(
            generate(&program, GenerateOptions::default()),
            Err(GenerateError::unsupported(Target::Arduino, "a floating expression", "n1"))
        );
    }

    #[test]
    fn nested_list_type_is_unsupported() {
        let nested = BlocklyType::array_of(BlocklyType::array_of(BlocklyType::Number));
        let var = Var::make("grid", nested, BlockProperties::new("v1"), None).unwrap();
        let err = ArduinoGenerator::new(GenerateOptions::default())
            .visit_var(&var)
            .unwrap_err();
        assert_eq!(
            err,
            GenerateError::unsupported(Target::Arduino, "nested lists", "v1")
        );
    }
}
