use super::{BlockProperties, Comment, Kind, Provenance};
use crate::error::NodeDefect;
use crate::types::{is_assignable, unify, BlocklyType};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Var(Var),
    Num(NumConst),
    Bool(BoolConst),
    Str(StringConst),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    ListCreate(ListCreate),
    ListLength(ListLength),
    TextJoin(TextJoin),
}

impl Expr {
    pub fn kind(&self) -> Kind {
        match self {
            Expr::Var(_) => Kind::Var,
            Expr::Num(_) => Kind::NumConst,
            Expr::Bool(_) => Kind::BoolConst,
            Expr::Str(_) => Kind::StringConst,
            Expr::Binary(_) => Kind::Binary,
            Expr::Unary(_) => Kind::Unary,
            Expr::ListCreate(_) => Kind::ListCreate,
            Expr::ListLength(_) => Kind::ListLength,
            Expr::TextJoin(_) => Kind::TextJoin,
        }
    }

    pub fn provenance(&self) -> &Provenance {
        match self {
            Expr::Var(e) => &e.provenance,
            Expr::Num(e) => &e.provenance,
            Expr::Bool(e) => &e.provenance,
            Expr::Str(e) => &e.provenance,
            Expr::Binary(e) => &e.provenance,
            Expr::Unary(e) => &e.provenance,
            Expr::ListCreate(e) => &e.provenance,
            Expr::ListLength(e) => &e.provenance,
            Expr::TextJoin(e) => &e.provenance,
        }
    }

    pub fn block_id(&self) -> &str {
        self.provenance().block_id()
    }

    /// Type of the value this expression produces.
    pub fn ty(&self) -> BlocklyType {
        match self {
            Expr::Var(var) => var.ty.clone(),
            Expr::Num(_) | Expr::ListLength(_) => BlocklyType::Number,
            Expr::Bool(_) => BlocklyType::Boolean,
            Expr::Str(_) | Expr::TextJoin(_) => BlocklyType::String,
            Expr::Binary(binary) => binary.op.result_type(),
            Expr::Unary(unary) => unary.op.operand_type(),
            Expr::ListCreate(list) => BlocklyType::array_of(list.element_type.clone()),
        }
    }
}

/// A variable reference, or the target of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    name: String,
    ty: BlocklyType,
    provenance: Provenance,
}

impl Var {
    pub fn make(
        name: &str,
        ty: BlocklyType,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        if name.trim().is_empty() {
            return Err(NodeDefect::new("Var", "variable name must not be empty"));
        }
        Ok(Self {
            name: name.to_string(),
            ty,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var_type(&self) -> &BlocklyType {
        &self.ty
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

fn number_literal() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid number pattern")
    })
}

pub fn is_number_literal(text: &str) -> bool {
    number_literal().is_match(text.trim())
}

/// Numeric literal. The source text is kept verbatim so re-rendering
/// reproduces exactly what the user typed.
#[derive(Debug, Clone, PartialEq)]
pub struct NumConst {
    literal: String,
    value: f64,
    provenance: Provenance,
}

impl NumConst {
    pub fn make(
        literal: &str,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        if !is_number_literal(literal) {
            return Err(NodeDefect::new(
                "NumConst",
                format!("'{}' is not a number literal", literal),
            ));
        }
        let value = literal
            .trim()
            .parse::<f64>()
            .map_err(|e| NodeDefect::new("NumConst", e.to_string()))?;
        if !value.is_finite() {
            return Err(NodeDefect::new(
                "NumConst",
                format!("'{}' is not finite", literal),
            ));
        }
        Ok(Self {
            literal: literal.to_string(),
            value,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoolConst {
    value: bool,
    provenance: Provenance,
}

impl BoolConst {
    pub fn make(
        value: bool,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        Ok(Self {
            value,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn value(&self) -> bool {
        self.value
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringConst {
    value: String,
    provenance: Provenance,
}

impl StringConst {
    pub fn make(
        value: &str,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        Ok(Self {
            value: value.to_string(),
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Minus,
    Multiply,
    Divide,
    Power,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

pub const ARITHMETIC_BLOCK: &str = "math_arithmetic";
pub const COMPARE_BLOCK: &str = "logic_compare";
pub const LOGIC_BLOCK: &str = "logic_operation";

impl BinaryOp {
    /// Block type that renders this operator.
    pub fn block_type(self) -> &'static str {
        match self {
            BinaryOp::Add
            | BinaryOp::Minus
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Power => ARITHMETIC_BLOCK,
            BinaryOp::Eq
            | BinaryOp::Neq
            | BinaryOp::Lt
            | BinaryOp::Lte
            | BinaryOp::Gt
            | BinaryOp::Gte => COMPARE_BLOCK,
            BinaryOp::And | BinaryOp::Or => LOGIC_BLOCK,
        }
    }

    /// Value of the `OP` field.
    pub fn field_value(self) -> &'static str {
        match self {
            BinaryOp::Add => "ADD",
            BinaryOp::Minus => "MINUS",
            BinaryOp::Multiply => "MULTIPLY",
            BinaryOp::Divide => "DIVIDE",
            BinaryOp::Power => "POWER",
            BinaryOp::Eq => "EQ",
            BinaryOp::Neq => "NEQ",
            BinaryOp::Lt => "LT",
            BinaryOp::Lte => "LTE",
            BinaryOp::Gt => "GT",
            BinaryOp::Gte => "GTE",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    pub fn from_field(block_type: &str, value: &str) -> Option<Self> {
        let op = match value {
            "ADD" => BinaryOp::Add,
            "MINUS" => BinaryOp::Minus,
            "MULTIPLY" => BinaryOp::Multiply,
            "DIVIDE" => BinaryOp::Divide,
            "POWER" => BinaryOp::Power,
            "EQ" => BinaryOp::Eq,
            "NEQ" => BinaryOp::Neq,
            "LT" => BinaryOp::Lt,
            "LTE" => BinaryOp::Lte,
            "GT" => BinaryOp::Gt,
            "GTE" => BinaryOp::Gte,
            "AND" => BinaryOp::And,
            "OR" => BinaryOp::Or,
            _ => return None,
        };
        (op.block_type() == block_type).then_some(op)
    }

    /// Required operand type; `Captured` means "both sides agree".
    pub fn operand_type(self) -> BlocklyType {
        match self {
            BinaryOp::Eq | BinaryOp::Neq => BlocklyType::Captured,
            BinaryOp::And | BinaryOp::Or => BlocklyType::Boolean,
            _ => BlocklyType::Number,
        }
    }

    pub fn result_type(self) -> BlocklyType {
        match self.block_type() {
            ARITHMETIC_BLOCK => BlocklyType::Number,
            _ => BlocklyType::Boolean,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    op: BinaryOp,
    left: Box<Expr>,
    right: Box<Expr>,
    provenance: Provenance,
}

impl BinaryExpr {
    pub fn make(
        op: BinaryOp,
        left: Expr,
        right: Expr,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        let operand = op.operand_type();
        for side in [&left, &right] {
            if !is_assignable(&operand, &side.ty()) {
                return Err(NodeDefect::new(
                    "Binary",
                    format!(
                        "{} operand has type {}, expected {}",
                        op.field_value(),
                        side.ty(),
                        operand
                    ),
                ));
            }
        }
        if unify(&left.ty(), &right.ty()).is_err() {
            return Err(NodeDefect::new(
                "Binary",
                format!(
                    "{} operands disagree: {} vs {}",
                    op.field_value(),
                    left.ty(),
                    right.ty()
                ),
            ));
        }
        Ok(Self {
            op,
            left: Box::new(left),
            right: Box::new(right),
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn op(&self) -> BinaryOp {
        self.op
    }

    pub fn left(&self) -> &Expr {
        &self.left
    }

    pub fn right(&self) -> &Expr {
        &self.right
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Root,
    Abs,
    Neg,
    Ln,
    Log10,
    Exp,
    Pow10,
}

pub const NEGATE_BLOCK: &str = "logic_negate";
pub const MATH_SINGLE_BLOCK: &str = "math_single";

impl UnaryOp {
    pub fn block_type(self) -> &'static str {
        match self {
            UnaryOp::Not => NEGATE_BLOCK,
            _ => MATH_SINGLE_BLOCK,
        }
    }

    /// Slot holding the operand.
    pub fn slot(self) -> &'static str {
        match self {
            UnaryOp::Not => "BOOL",
            _ => "NUM",
        }
    }

    /// Value of the `OP` field; `logic_negate` has none.
    pub fn field_value(self) -> Option<&'static str> {
        match self {
            UnaryOp::Not => None,
            UnaryOp::Root => Some("ROOT"),
            UnaryOp::Abs => Some("ABS"),
            UnaryOp::Neg => Some("NEG"),
            UnaryOp::Ln => Some("LN"),
            UnaryOp::Log10 => Some("LOG10"),
            UnaryOp::Exp => Some("EXP"),
            UnaryOp::Pow10 => Some("POW10"),
        }
    }

    pub fn from_math_field(value: &str) -> Option<Self> {
        match value {
            "ROOT" => Some(UnaryOp::Root),
            "ABS" => Some(UnaryOp::Abs),
            "NEG" => Some(UnaryOp::Neg),
            "LN" => Some(UnaryOp::Ln),
            "LOG10" => Some(UnaryOp::Log10),
            "EXP" => Some(UnaryOp::Exp),
            "POW10" => Some(UnaryOp::Pow10),
            _ => None,
        }
    }

    /// Operand and result share one type.
    pub fn operand_type(self) -> BlocklyType {
        match self {
            UnaryOp::Not => BlocklyType::Boolean,
            _ => BlocklyType::Number,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    op: UnaryOp,
    operand: Box<Expr>,
    provenance: Provenance,
}

impl UnaryExpr {
    pub fn make(
        op: UnaryOp,
        operand: Expr,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        if !is_assignable(&op.operand_type(), &operand.ty()) {
            return Err(NodeDefect::new(
                "Unary",
                format!(
                    "operand has type {}, expected {}",
                    operand.ty(),
                    op.operand_type()
                ),
            ));
        }
        Ok(Self {
            op,
            operand: Box::new(operand),
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn op(&self) -> UnaryOp {
        self.op
    }

    pub fn operand(&self) -> &Expr {
        &self.operand
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListCreate {
    element_type: BlocklyType,
    items: Vec<Expr>,
    provenance: Provenance,
}

impl ListCreate {
    pub fn make(
        element_type: BlocklyType,
        items: Vec<Expr>,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        for (index, item) in items.iter().enumerate() {
            if !is_assignable(&element_type, &item.ty()) {
                return Err(NodeDefect::new(
                    "ListCreate",
                    format!(
                        "item {} has type {}, list holds {}",
                        index,
                        item.ty(),
                        element_type
                    ),
                ));
            }
        }
        Ok(Self {
            element_type,
            items,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn element_type(&self) -> &BlocklyType {
        &self.element_type
    }

    pub fn items(&self) -> &[Expr] {
        &self.items
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListLength {
    list: Box<Expr>,
    provenance: Provenance,
}

impl ListLength {
    pub fn make(
        list: Expr,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        let ty = list.ty();
        if !matches!(ty, BlocklyType::Array(_) | BlocklyType::Captured) {
            return Err(NodeDefect::new(
                "ListLength",
                format!("operand has type {}, expected a list", ty),
            ));
        }
        Ok(Self {
            list: Box::new(list),
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn list(&self) -> &Expr {
        &self.list
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// String concatenation of any number of values of any type.
#[derive(Debug, Clone, PartialEq)]
pub struct TextJoin {
    items: Vec<Expr>,
    provenance: Provenance,
}

impl TextJoin {
    pub fn make(
        items: Vec<Expr>,
        properties: BlockProperties,
        comment: Option<Comment>,
    ) -> Result<Self, NodeDefect> {
        Ok(Self {
            items,
            provenance: Provenance::new(properties, comment),
        })
    }

    pub fn items(&self) -> &[Expr] {
        &self.items
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}
