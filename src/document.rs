//! JSON block documents.
//!
//! A document is `{"blocks": [...]}`. A slot or `next` holds either a nested
//! block object or the id of another record of the top-level array; records
//! referenced that way are not roots. References are resolved here, so this
//! is where cycles, dangling ids and shared blocks are rejected.

use crate::block::{Block, Comment, Mutation, Position};
use crate::error::TransformError;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

const FORMAT: &str = "JSON";
const VALUE_SLOTS: &str = "value-slots";
const STATEMENT_SLOTS: &str = "statement-slots";

pub fn decode_str(text: &str) -> Result<Vec<Block>, TransformError> {
    let doc: Value = serde_json::from_str(text).map_err(|e| TransformError::InvalidDocument {
        format: FORMAT,
        message: e.to_string(),
    })?;
    decode_value(&doc)
}

pub fn decode_value(doc: &Value) -> Result<Vec<Block>, TransformError> {
    let records = match doc {
        Value::Array(records) => records,
        Value::Object(map) => map
            .get("blocks")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("missing 'blocks' array"))?,
        _ => return Err(invalid("expected an object with a 'blocks' array")),
    };
    Decoder::new(records)?.decode()
}

pub fn encode(blocks: &[Block]) -> Value {
    json!({ "blocks": blocks.iter().map(encode_block).collect::<Vec<_>>() })
}

pub fn encode_string(blocks: &[Block]) -> Result<String, TransformError> {
    serde_json::to_string_pretty(&encode(blocks)).map_err(|e| TransformError::InvalidDocument {
        format: FORMAT,
        message: e.to_string(),
    })
}

fn invalid(message: impl Into<String>) -> TransformError {
    TransformError::InvalidDocument {
        format: FORMAT,
        message: message.into(),
    }
}

struct Decoder<'d> {
    records: &'d [Value],
    ids: Vec<String>,
    index: HashMap<String, usize>,
    referenced: HashSet<String>,
    used: HashSet<usize>,
    in_progress: HashSet<usize>,
    seen: HashSet<String>,
    generated: usize,
}

impl<'d> Decoder<'d> {
    fn new(records: &'d [Value]) -> Result<Self, TransformError> {
        let mut decoder = Self {
            records,
            ids: Vec::with_capacity(records.len()),
            index: HashMap::new(),
            referenced: HashSet::new(),
            used: HashSet::new(),
            in_progress: HashSet::new(),
            seen: HashSet::new(),
            generated: 0,
        };
        let explicit = records
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str))
            .map(ToString::to_string)
            .collect::<HashSet<_>>();
        for (i, record) in records.iter().enumerate() {
            if !record.is_object() {
                return Err(invalid(format!("block record {} is not an object", i)));
            }
            let id = match record.get("id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => decoder.fresh_id(&explicit),
            };
            if decoder.index.insert(id.clone(), i).is_some() {
                return Err(TransformError::malformed(&id, "duplicate block id"));
            }
            decoder.ids.push(id);
        }
        for record in records {
            collect_references(record, &mut decoder.referenced);
        }
        Ok(decoder)
    }

    fn fresh_id(&mut self, taken: &HashSet<String>) -> String {
        loop {
            self.generated += 1;
            let id = format!("gen-{}", self.generated);
            if !taken.contains(&id) && !self.index.contains_key(&id) && !self.seen.contains(&id) {
                return id;
            }
        }
    }

    fn decode(mut self) -> Result<Vec<Block>, TransformError> {
        let mut roots = Vec::new();
        for i in 0..self.records.len() {
            if self.referenced.contains(&self.ids[i]) {
                continue;
            }
            self.used.insert(i);
            roots.push(self.build_record(i)?);
        }
        if let Some(i) = (0..self.records.len()).find(|i| !self.used.contains(i)) {
            return Err(TransformError::malformed(
                &self.ids[i],
                "block is only reachable through a cycle",
            ));
        }
        Ok(roots)
    }

    fn build_record(&mut self, i: usize) -> Result<Block, TransformError> {
        self.in_progress.insert(i);
        let id = self.ids[i].clone();
        let records = self.records;
        let block = self.build_object(&records[i], id)?;
        self.in_progress.remove(&i);
        Ok(block)
    }

    fn resolve(&mut self, from: &str, target: &Value) -> Result<Block, TransformError> {
        match target {
            Value::String(id) => {
                let i = *self.index.get(id).ok_or_else(|| {
                    TransformError::malformed(from, format!("references unknown block '{}'", id))
                })?;
                if self.in_progress.contains(&i) {
                    return Err(TransformError::malformed(
                        id,
                        "block references form a cycle",
                    ));
                }
                if !self.used.insert(i) {
                    return Err(TransformError::malformed(
                        id,
                        "block is referenced more than once",
                    ));
                }
                self.build_record(i)
            }
            Value::Object(_) => {
                let id = match target.get("id").and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => self.fresh_id(&HashSet::new()),
                };
                if self.index.contains_key(&id) {
                    return Err(TransformError::malformed(&id, "duplicate block id"));
                }
                self.build_object(target, id)
            }
            _ => Err(TransformError::malformed(
                from,
                "slot must hold a block object or a block id",
            )),
        }
    }

    fn build_object(&mut self, record: &Value, id: String) -> Result<Block, TransformError> {
        if !self.seen.insert(id.clone()) {
            return Err(TransformError::malformed(&id, "duplicate block id"));
        }
        let type_tag = record
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| TransformError::malformed(&id, "block has no 'type'"))?;
        let mut block = Block::new(type_tag, &id);
        block.position = read_position(record);
        block.fields = read_string_map(record.get("fields"), "fields", &id)?;
        let mutation = read_string_map(record.get("mutation"), "mutation", &id)?;
        if !mutation.is_empty() {
            let mut m = Mutation::new();
            for (key, value) in mutation {
                m.insert(&key, value);
            }
            block.mutation = Some(m);
        }
        block.values = self.read_slots(record.get(VALUE_SLOTS), &id)?;
        block.statements = self.read_slots(record.get(STATEMENT_SLOTS), &id)?;
        if let Some(next) = record.get("next").filter(|v| !v.is_null()) {
            block.next = Some(Box::new(self.resolve(&id, next)?));
        }
        block.comment = read_comment(record.get("comment"));
        block.disabled = record.get("disabled").and_then(Value::as_bool).unwrap_or(false);
        block.collapsed = record.get("collapsed").and_then(Value::as_bool).unwrap_or(false);
        block.inline = record.get("inline").and_then(Value::as_bool);
        block.deletable = record.get("deletable").and_then(Value::as_bool);
        block.movable = record.get("movable").and_then(Value::as_bool);
        Ok(block)
    }

    fn read_slots(
        &mut self,
        node: Option<&Value>,
        id: &str,
    ) -> Result<BTreeMap<String, Block>, TransformError> {
        let mut slots = BTreeMap::new();
        let Some(map) = node.and_then(Value::as_object) else {
            return Ok(slots);
        };
        for (name, target) in map {
            if target.is_null() {
                continue;
            }
            slots.insert(name.clone(), self.resolve(id, target)?);
        }
        Ok(slots)
    }
}

fn collect_references(record: &Value, out: &mut HashSet<String>) {
    let mut visit = |target: &Value| match target {
        Value::String(id) => {
            out.insert(id.clone());
        }
        Value::Object(_) => collect_references(target, out),
        _ => {}
    };
    for key in [VALUE_SLOTS, STATEMENT_SLOTS] {
        if let Some(map) = record.get(key).and_then(Value::as_object) {
            map.values().for_each(&mut visit);
        }
    }
    if let Some(next) = record.get("next") {
        visit(next);
    }
}

/// Field and mutation values are scalars; `null` counts as absent.
fn scalar_string(value: &Value) -> Result<Option<String>, Value> {
    match value {
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Null => Ok(None),
        other => Err(other.clone()),
    }
}

fn read_string_map(
    node: Option<&Value>,
    section: &str,
    block_id: &str,
) -> Result<BTreeMap<String, String>, TransformError> {
    let Some(map) = node.and_then(Value::as_object) else {
        return Ok(BTreeMap::new());
    };
    let mut out = BTreeMap::new();
    for (key, value) in map {
        match scalar_string(value) {
            Ok(Some(text)) => {
                out.insert(key.clone(), text);
            }
            Ok(None) => {}
            Err(found) => {
                return Err(invalid(format!(
                    "block '{}': {}.{} must be a string, number or boolean, found {}",
                    block_id, section, key, found
                )))
            }
        }
    }
    Ok(out)
}

fn read_coordinate(node: Option<&Value>) -> Option<i64> {
    let value = node?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
}

fn read_position(record: &Value) -> Option<Position> {
    let holder = record.get("position").unwrap_or(record);
    let x = read_coordinate(holder.get("x"))?;
    let y = read_coordinate(holder.get("y"))?;
    Some(Position::new(x, y))
}

fn read_comment(node: Option<&Value>) -> Option<Comment> {
    match node? {
        Value::String(text) => Some(Comment::new(text.as_str())),
        Value::Object(map) => {
            let text = map.get("text").and_then(Value::as_str).unwrap_or("");
            let size = |key: &str| {
                map.get(key)
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
            };
            Some(Comment {
                text: text.to_string(),
                pinned: map.get("pinned").and_then(Value::as_bool).unwrap_or(false),
                width: size("width"),
                height: size("height"),
            })
        }
        _ => None,
    }
}

fn encode_comment(comment: &Comment) -> Value {
    if !comment.pinned && comment.width.is_none() && comment.height.is_none() {
        return Value::String(comment.text.clone());
    }
    let mut map = Map::new();
    map.insert("text".to_string(), json!(comment.text));
    map.insert("pinned".to_string(), json!(comment.pinned));
    if let Some(width) = comment.width {
        map.insert("width".to_string(), json!(width));
    }
    if let Some(height) = comment.height {
        map.insert("height".to_string(), json!(height));
    }
    Value::Object(map)
}

fn encode_slots(slots: &BTreeMap<String, Block>) -> Value {
    Value::Object(
        slots
            .iter()
            .map(|(name, block)| (name.clone(), encode_block(block)))
            .collect(),
    )
}

pub fn encode_block(block: &Block) -> Value {
    let mut map = Map::new();
    map.insert("type".to_string(), json!(block.type_tag));
    map.insert("id".to_string(), json!(block.id));
    if let Some(position) = block.position {
        map.insert("position".to_string(), json!({"x": position.x, "y": position.y}));
    }
    if !block.fields.is_empty() {
        map.insert("fields".to_string(), json!(block.fields));
    }
    if let Some(mutation) = block.mutation.as_ref().filter(|m| !m.is_empty()) {
        let attrs = mutation
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect::<Map<_, _>>();
        map.insert("mutation".to_string(), Value::Object(attrs));
    }
    if !block.values.is_empty() {
        map.insert(VALUE_SLOTS.to_string(), encode_slots(&block.values));
    }
    if !block.statements.is_empty() {
        map.insert(STATEMENT_SLOTS.to_string(), encode_slots(&block.statements));
    }
    if let Some(next) = &block.next {
        map.insert("next".to_string(), encode_block(next));
    }
    if let Some(comment) = &block.comment {
        map.insert("comment".to_string(), encode_comment(comment));
    }
    if block.disabled {
        map.insert("disabled".to_string(), json!(true));
    }
    if block.collapsed {
        map.insert("collapsed".to_string(), json!(true));
    }
    for (key, flag) in [
        ("inline", block.inline),
        ("deletable", block.deletable),
        ("movable", block.movable),
    ] {
        if let Some(flag) = flag {
            map.insert(key.to_string(), json!(flag));
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_document() {
        let blocks = decode_str(
            r#"{"blocks": [{
                "type": "variables_set", "id": "b1",
                "position": {"x": 10, "y": 20},
                "fields": {"VAR": "x"},
                "mutation": {"datatype": "Number"},
                "value-slots": {"VALUE": {"type": "math_number", "id": "b2", "fields": {"NUM": 5}}},
                "comment": "start"
            }]}"#,
        )
        .unwrap();
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.type_tag, "variables_set");
        assert_eq!(block.position, Some(Position::new(10, 20)));
        assert_eq!(block.mutation_attr("datatype"), Some("Number"));
        assert_eq!(block.value("VALUE").and_then(|b| b.field("NUM")), Some("5"));
        assert_eq!(block.comment.as_ref().map(|c| c.text.as_str()), Some("start"));
    }

    #[test]
    fn referenced_records_are_not_roots() {
        let blocks = decode_str(
            r#"{"blocks": [
                {"type": "text_print", "id": "p1", "x": 0, "y": 0,
                 "value-slots": {"TEXT": "t1"}, "next": "p2"},
                {"type": "text", "id": "t1", "fields": {"TEXT": "a"}},
                {"type": "text_print", "id": "p2", "value-slots": {"TEXT": {"type": "text", "fields": {"TEXT": "b"}}}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(blocks.len(), 1);
        let ids = blocks[0].chain().map(|b| b.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(blocks[0].value("TEXT").map(|b| b.id.as_str()), Some("t1"));
        let generated = blocks[0].next.as_ref().and_then(|b| b.value("TEXT"));
        assert_eq!(generated.map(|b| b.id.as_str()), Some("gen-1"));
    }

    #[test]
    fn dangling_reference() {
        let err = decode_str(r#"{"blocks": [{"type": "text_print", "id": "p1", "next": "nope"}]}"#)
            .unwrap_err();
        assert_eq!(
            err,
            TransformError::MalformedGraph {
                block_id: "p1".to_string(),
                reason: "references unknown block 'nope'".to_string(),
            }
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let unreachable = decode_str(
            r#"{"blocks": [
                {"type": "text_print", "id": "a", "next": "b"},
                {"type": "text_print", "id": "b", "next": "a"}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(unreachable, TransformError::MalformedGraph { .. }));

        let from_root = decode_str(
            r#"{"blocks": [
                {"type": "text_print", "id": "root", "next": "a"},
                {"type": "text_print", "id": "a", "next": "b"},
                {"type": "text_print", "id": "b", "next": "a"}
            ]}"#,
        )
        .unwrap_err();
        assert_eq!(from_root.block_id(), Some("a"));
    }

    #[test]
    fn shared_and_duplicate_blocks_are_rejected() {
        let shared = decode_str(
            r#"{"blocks": [
                {"type": "text_print", "id": "p1", "value-slots": {"TEXT": "t"}},
                {"type": "text_print", "id": "p2", "value-slots": {"TEXT": "t"}},
                {"type": "text", "id": "t", "fields": {"TEXT": "x"}}
            ]}"#,
        )
        .unwrap_err();
        assert_eq!(
            shared,
            TransformError::MalformedGraph {
                block_id: "t".to_string(),
                reason: "block is referenced more than once".to_string(),
            }
        );

        let duplicate = decode_str(
            r#"{"blocks": [
                {"type": "text_print", "id": "p1", "value-slots": {"TEXT": {"type": "text", "id": "p1"}}}
            ]}"#,
        )
        .unwrap_err();
        assert_eq!(duplicate.block_id(), Some("p1"));
    }

    #[test]
    fn structured_field_values_are_rejected() {
        let err = decode_str(
            r#"{"blocks": [{"type": "text", "id": "t1", "fields": {"TEXT": ["a", "b"]}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::InvalidDocument { format: "JSON", .. }));
        assert!(err.to_string().contains("fields.TEXT"));

        let err = decode_str(
            r#"{"blocks": [{"type": "lists_create_with", "id": "l1", "mutation": {"items": {"n": 2}}}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("mutation.items"));

        let blocks = decode_str(
            r#"{"blocks": [{"type": "text", "id": "t1", "fields": {"TEXT": "a", "NOTE": null}}]}"#,
        )
        .unwrap();
        assert_eq!(blocks[0].field("TEXT"), Some("a"));
        assert_eq!(blocks[0].field("NOTE"), None);
    }

    #[test]
    fn invalid_json_text() {
        let err = decode_str("{\"blocks\": [").unwrap_err();
        assert!(matches!(err, TransformError::InvalidDocument { format: "JSON", .. }));
        assert!(decode_str("{\"workspace\": {}}").is_err());
    }

    #[test]
    fn encoded_document_decodes_to_same_blocks() {
        let mut comment = Comment::new("note");
        comment.pinned = true;
        comment.width = Some(120);
        let block = Block::new("variables_set", "b1")
            .with_field("VAR", "x")
            .with_mutation(Mutation::new().with("datatype", "Number"))
            .with_value("VALUE", Block::new("math_number", "b2").with_field("NUM", "5"))
            .with_comment(comment)
            .with_position(3, 4)
            .with_next(Block::new("controls_flow_statements", "b3").with_field("FLOW", "BREAK"));
        let text = encode_string(std::slice::from_ref(&block)).unwrap();
        assert_eq!(decode_str(&text).unwrap(), vec![block]);
    }
}
