use std::fmt::{Display, Formatter};

/// Value types known to the block language.
///
/// `Captured` is the placeholder carried by a node whose type has to be
/// inferred from the surrounding blocks. It never reaches a code generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlocklyType {
    Number,
    Boolean,
    String,
    Array(Box<BlocklyType>),
    Captured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incompatible {
    pub expected: BlocklyType,
    pub found: BlocklyType,
}

const ARRAY_PREFIX: &str = "Array_";

impl BlocklyType {
    pub fn array_of(element: BlocklyType) -> Self {
        BlocklyType::Array(Box::new(element))
    }

    pub fn is_captured(&self) -> bool {
        matches!(self, BlocklyType::Captured)
    }

    /// True when no placeholder occurs anywhere inside the type.
    pub fn is_concrete(&self) -> bool {
        match self {
            BlocklyType::Captured => false,
            BlocklyType::Array(element) => element.is_concrete(),
            _ => true,
        }
    }

    pub fn element_type(&self) -> Option<&BlocklyType> {
        match self {
            BlocklyType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Name written into `mutation.datatype`.
    ///
    /// The names are enumerated per type instead of being derived from a
    /// display string, so list types keep their element name capitalised
    /// (`Array_Number`, not `Array_number`).
    pub fn datatype_name(&self) -> Option<String> {
        match self {
            BlocklyType::Number => Some("Number".to_string()),
            BlocklyType::Boolean => Some("Boolean".to_string()),
            BlocklyType::String => Some("String".to_string()),
            BlocklyType::Array(element) => element
                .datatype_name()
                .map(|inner| format!("{}{}", ARRAY_PREFIX, inner)),
            BlocklyType::Captured => None,
        }
    }

    /// Inverse of [`BlocklyType::datatype_name`], ASCII case-insensitive.
    pub fn from_datatype_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        if trimmed.len() > ARRAY_PREFIX.len()
            && trimmed[..ARRAY_PREFIX.len()].eq_ignore_ascii_case(ARRAY_PREFIX)
        {
            return Self::from_datatype_name(&trimmed[ARRAY_PREFIX.len()..]).map(Self::array_of);
        }
        if trimmed.eq_ignore_ascii_case("number") {
            Some(BlocklyType::Number)
        } else if trimmed.eq_ignore_ascii_case("boolean") {
            Some(BlocklyType::Boolean)
        } else if trimmed.eq_ignore_ascii_case("string") {
            Some(BlocklyType::String)
        } else {
            None
        }
    }
}

impl Display for BlocklyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BlocklyType::Number => write!(f, "NUMBER"),
            BlocklyType::Boolean => write!(f, "BOOLEAN"),
            BlocklyType::String => write!(f, "STRING"),
            BlocklyType::Array(element) => write!(f, "ARRAY<{}>", element),
            BlocklyType::Captured => write!(f, "CAPTURED_TYPE"),
        }
    }
}

/// Combines two types. A placeholder adopts the other side.
pub fn unify(a: &BlocklyType, b: &BlocklyType) -> Result<BlocklyType, Incompatible> {
    match (a, b) {
        (BlocklyType::Captured, other) | (other, BlocklyType::Captured) => Ok(other.clone()),
        (BlocklyType::Array(left), BlocklyType::Array(right)) => unify(left, right)
            .map(BlocklyType::array_of)
            .map_err(|_| Incompatible {
                expected: a.clone(),
                found: b.clone(),
            }),
        (left, right) if left == right => Ok(left.clone()),
        _ => Err(Incompatible {
            expected: a.clone(),
            found: b.clone(),
        }),
    }
}

pub fn is_assignable(target: &BlocklyType, value: &BlocklyType) -> bool {
    unify(target, value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_adopts_concrete_side() {
        assert_eq!(
            unify(&BlocklyType::Captured, &BlocklyType::Number),
            Ok(BlocklyType::Number)
        );
        assert_eq!(
            unify(&BlocklyType::String, &BlocklyType::Captured),
            Ok(BlocklyType::String)
        );
    }

    #[test]
    fn unequal_concrete_types_fail() {
        let err = unify(&BlocklyType::Number, &BlocklyType::String).unwrap_err();
        assert_eq!(err.expected, BlocklyType::Number);
        assert_eq!(err.found, BlocklyType::String);
        assert!(!is_assignable(&BlocklyType::Boolean, &BlocklyType::Number));
    }

    #[test]
    fn arrays_unify_element_wise() {
        let open = BlocklyType::array_of(BlocklyType::Captured);
        let numbers = BlocklyType::array_of(BlocklyType::Number);
        assert_eq!(unify(&open, &numbers), Ok(numbers.clone()));
        assert!(!open.is_concrete());
        assert!(numbers.is_concrete());
        assert!(unify(&numbers, &BlocklyType::array_of(BlocklyType::String)).is_err());
    }

    #[test]
    fn datatype_names_are_enumerated() {
        assert_eq!(BlocklyType::Number.datatype_name().as_deref(), Some("Number"));
        assert_eq!(
            BlocklyType::array_of(BlocklyType::Boolean).datatype_name().as_deref(),
            Some("Array_Boolean")
        );
        assert_eq!(BlocklyType::Captured.datatype_name(), None);
        assert_eq!(
            BlocklyType::from_datatype_name("NUMBER"),
            Some(BlocklyType::Number)
        );
        assert_eq!(
            BlocklyType::from_datatype_name("array_string"),
            Some(BlocklyType::array_of(BlocklyType::String))
        );
        assert_eq!(BlocklyType::from_datatype_name("Colour"), None);
    }
}
