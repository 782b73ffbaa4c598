use std::collections::BTreeMap;

/// Workspace coordinates of a top-level block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Comment {
    pub text: String,
    pub pinned: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Per-instance attributes that do not fit into plain fields
/// (`datatype`, `items`, `elseif`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mutation {
    attributes: BTreeMap<String, String>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// One block of the external graph.
///
/// This is the loosely typed side of the transformation: tags, fields and
/// slots are plain strings and nothing is validated until the forward
/// transformer reads the block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub type_tag: String,
    pub id: String,
    pub position: Option<Position>,
    pub fields: BTreeMap<String, String>,
    pub values: BTreeMap<String, Block>,
    pub statements: BTreeMap<String, Block>,
    pub mutation: Option<Mutation>,
    pub next: Option<Box<Block>>,
    pub comment: Option<Comment>,
    pub disabled: bool,
    pub collapsed: bool,
    pub inline: Option<bool>,
    pub deletable: Option<bool>,
    pub movable: Option<bool>,
}

impl Block {
    pub fn new(type_tag: &str, id: &str) -> Self {
        Self {
            type_tag: type_tag.to_string(),
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_value(mut self, slot: &str, child: Block) -> Self {
        self.values.insert(slot.to_string(), child);
        self
    }

    pub fn with_statement(mut self, slot: &str, first: Block) -> Self {
        self.statements.insert(slot.to_string(), first);
        self
    }

    pub fn with_mutation(mut self, mutation: Mutation) -> Self {
        self.mutation = Some(mutation);
        self
    }

    pub fn with_next(mut self, next: Block) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    pub fn with_comment(mut self, comment: Comment) -> Self {
        self.comment = Some(comment);
        self
    }

    pub fn with_position(mut self, x: i64, y: i64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn value(&self, slot: &str) -> Option<&Block> {
        self.values.get(slot)
    }

    pub fn statement(&self, slot: &str) -> Option<&Block> {
        self.statements.get(slot)
    }

    pub fn mutation_attr(&self, key: &str) -> Option<&str> {
        self.mutation.as_ref().and_then(|m| m.get(key))
    }

    /// This block followed by every block reachable through `next`.
    pub fn chain(&self) -> impl Iterator<Item = &Block> {
        std::iter::successors(Some(self), |block| block.next.as_deref())
    }

    fn normalized_comment(&self) -> Option<&Comment> {
        self.comment.as_ref().filter(|c| !c.text.is_empty())
    }
}

const TYPE_ATTRIBUTES: &[&str] = &["datatype", "list_type"];

/// Structural equality between an input graph and its re-rendering.
///
/// Compares tag, id, fields, slots, chain, comment and display flags. Every
/// mutation attribute of `original` must be reproduced by `rendered` (type
/// names case-insensitively); `rendered` may carry extra derived attributes.
/// Positions are display-only and ignored.
pub fn graph_equivalent(original: &Block, rendered: &Block) -> bool {
    let mut left = original.chain();
    let mut right = rendered.chain();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return true,
            (Some(a), Some(b)) => {
                if !block_equivalent(a, b) {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

fn block_equivalent(original: &Block, rendered: &Block) -> bool {
    original.type_tag == rendered.type_tag
        && original.id == rendered.id
        && original.fields == rendered.fields
        && original.disabled == rendered.disabled
        && original.collapsed == rendered.collapsed
        && original.inline == rendered.inline
        && original.normalized_comment() == rendered.normalized_comment()
        && mutation_reproduced(original.mutation.as_ref(), rendered.mutation.as_ref())
        && slots_equivalent(&original.values, &rendered.values)
        && slots_equivalent(&original.statements, &rendered.statements)
}

fn mutation_reproduced(original: Option<&Mutation>, rendered: Option<&Mutation>) -> bool {
    let Some(original) = original else {
        return true;
    };
    original.iter().all(|(key, value)| {
        let Some(found) = rendered.and_then(|m| m.get(key)) else {
            return false;
        };
        if TYPE_ATTRIBUTES.contains(&key) {
            found.eq_ignore_ascii_case(value)
        } else {
            found == value
        }
    })
}

fn slots_equivalent(original: &BTreeMap<String, Block>, rendered: &BTreeMap<String, Block>) -> bool {
    original.len() == rendered.len()
        && original.iter().all(|(slot, block)| {
            rendered
                .get(slot)
                .map(|other| graph_equivalent(block, other))
                .unwrap_or(false)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(id: &str, var: &str, num: &str) -> Block {
        Block::new("variables_set", id)
            .with_field("VAR", var)
            .with_value(
                "VALUE",
                Block::new("math_number", &format!("{}n", id)).with_field("NUM", num),
            )
    }

    #[test]
    fn chain_walks_next_links() {
        let chain = assignment("a", "x", "1").with_next(assignment("b", "y", "2"));
        let ids = chain.chain().map(|b| b.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn rendering_may_add_derived_mutation() {
        let original = assignment("b1", "x", "5");
        let rendered = assignment("b1", "x", "5")
            .with_mutation(Mutation::new().with("datatype", "Number"))
            .with_position(100, 20);
        assert!(graph_equivalent(&original, &rendered));
        assert!(!graph_equivalent(&rendered, &original));
    }

    #[test]
    fn type_names_compare_case_insensitively() {
        let original =
            assignment("b1", "x", "5").with_mutation(Mutation::new().with("datatype", "NUMBER"));
        let rendered =
            assignment("b1", "x", "5").with_mutation(Mutation::new().with("datatype", "Number"));
        assert!(graph_equivalent(&original, &rendered));
    }

    #[test]
    fn empty_comment_equals_absent_comment() {
        let original = assignment("b1", "x", "5").with_comment(Comment::new(""));
        let rendered = assignment("b1", "x", "5");
        assert!(graph_equivalent(&original, &rendered));
    }

    #[test]
    fn differing_chain_length_is_not_equivalent() {
        let original = assignment("a", "x", "1").with_next(assignment("b", "y", "2"));
        let rendered = assignment("a", "x", "1");
        assert!(!graph_equivalent(&original, &rendered));
    }

    #[test]
    fn differing_slot_content_is_not_equivalent() {
        assert!(!graph_equivalent(
            &assignment("b1", "x", "5"),
            &assignment("b1", "x", "6")
        ));
    }
}
