use crate::types::BlocklyType;
use thiserror::Error;

/// Rejection of a user-supplied block graph.
///
/// Every variant that can be traced back to a block carries its id so the
/// workspace can highlight the offending block.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("Block '{block_id}' is missing required slot '{slot}'.")]
    MissingSlot { slot: String, block_id: String },

    #[error("Block '{block_id}' is missing required field '{field}'.")]
    MissingField { field: String, block_id: String },

    #[error("Block '{block_id}' has invalid value '{value}' for '{field}'.")]
    InvalidField {
        field: String,
        value: String,
        block_id: String,
    },

    #[error("Unknown block type '{tag}' (block '{block_id}').")]
    UnknownBlockType { tag: String, block_id: String },

    #[error(
        "Type mismatch at block '{block_id}': expected {}, found {found}.",
        describe_expected(.expected)
    )]
    TypeMismatch {
        expected: Option<BlocklyType>,
        found: BlocklyType,
        block_id: String,
    },

    #[error("Malformed block graph at '{block_id}': {reason}")]
    MalformedGraph { block_id: String, reason: String },

    #[error("Invalid {format} document: {message}")]
    InvalidDocument {
        format: &'static str,
        message: String,
    },

    #[error("Internal transformer error: {0}")]
    Internal(#[from] NodeDefect),
}

impl TransformError {
    pub fn block_id(&self) -> Option<&str> {
        match self {
            TransformError::MissingSlot { block_id, .. }
            | TransformError::MissingField { block_id, .. }
            | TransformError::InvalidField { block_id, .. }
            | TransformError::UnknownBlockType { block_id, .. }
            | TransformError::TypeMismatch { block_id, .. }
            | TransformError::MalformedGraph { block_id, .. } => Some(block_id),
            TransformError::InvalidDocument { .. } | TransformError::Internal(_) => None,
        }
    }

    /// Whether the error points at bad input rather than at a bug.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, TransformError::Internal(_))
    }

    pub(crate) fn mismatch(expected: &BlocklyType, found: &BlocklyType, block_id: &str) -> Self {
        TransformError::TypeMismatch {
            expected: Some(expected.clone()),
            found: found.clone(),
            block_id: block_id.to_string(),
        }
    }

    pub(crate) fn unresolved(found: &BlocklyType, block_id: &str) -> Self {
        TransformError::TypeMismatch {
            expected: None,
            found: found.clone(),
            block_id: block_id.to_string(),
        }
    }

    pub(crate) fn malformed(block_id: &str, reason: impl Into<String>) -> Self {
        TransformError::MalformedGraph {
            block_id: block_id.to_string(),
            reason: reason.into(),
        }
    }
}

fn describe_expected(expected: &Option<BlocklyType>) -> String {
    match expected {
        Some(ty) => ty.to_string(),
        None => "a resolved type".to_string(),
    }
}

/// A node factory precondition that did not hold.
///
/// Factories only see values produced by the transformer (or by library
/// callers building trees by hand), so this always indicates a bug upstream
/// of the factory, never bad user input.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{node} precondition violated: {reason}")]
pub struct NodeDefect {
    pub node: &'static str,
    pub reason: String,
}

impl NodeDefect {
    pub(crate) fn new(node: &'static str, reason: impl Into<String>) -> Self {
        Self {
            node,
            reason: reason.into(),
        }
    }
}

/// Converts a factory rejection into a request-scoped failure, logging it for
/// follow-up.
pub(crate) fn report_defect(defect: NodeDefect, block_id: &str) -> TransformError {
    tracing::error!(
        block_id,
        node = defect.node,
        reason = %defect.reason,
        "node factory rejected transformer output"
    );
    TransformError::Internal(defect)
}
