//! Blockly XML documents.
//!
//! Reads `<xml>` workspaces as saved by Blockly and the `<block_set>` /
//! `<instance>` wrapper used by OpenRoberta; writes plain `<xml>`.

use crate::block::{Block, Comment, Mutation, Position};
use crate::error::TransformError;
use std::collections::HashSet;
use xmltree::{Element, EmitterConfig, XMLNode};

const FORMAT: &str = "XML";

fn invalid(message: impl Into<String>) -> TransformError {
    TransformError::InvalidDocument {
        format: FORMAT,
        message: message.into(),
    }
}

fn elements(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(|node| match node {
        XMLNode::Element(element) => Some(element),
        _ => None,
    })
}

fn is_block(element: &Element) -> bool {
    matches!(element.name.as_str(), "block" | "shadow")
}

fn attr<'e>(element: &'e Element, name: &str) -> Option<&'e str> {
    element.attributes.get(name).map(String::as_str)
}

fn flag(element: &Element, name: &str) -> Option<bool> {
    attr(element, name).map(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn coordinate(element: &Element, name: &str) -> Option<i64> {
    let text = attr(element, name)?.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(|f| f.round() as i64))
}

fn position(element: &Element) -> Option<Position> {
    Some(Position::new(
        coordinate(element, "x")?,
        coordinate(element, "y")?,
    ))
}

fn text_of(element: &Element) -> String {
    element
        .get_text()
        .map(|text| text.into_owned())
        .unwrap_or_default()
}

pub fn decode_str(text: &str) -> Result<Vec<Block>, TransformError> {
    let root = Element::parse(text.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(root.name.as_str(), "xml" | "block_set") {
        return Err(invalid(format!("unexpected root element <{}>", root.name)));
    }
    let mut decoder = Decoder::default();
    collect_ids(&root, &mut decoder.taken);
    let mut blocks = Vec::new();
    decoder.read_top_level(&root, &mut blocks)?;
    Ok(blocks)
}

fn collect_ids(element: &Element, out: &mut HashSet<String>) {
    if is_block(element) {
        if let Some(id) = attr(element, "id") {
            out.insert(id.to_string());
        }
    }
    for child in elements(element) {
        collect_ids(child, out);
    }
}

#[derive(Default)]
struct Decoder {
    taken: HashSet<String>,
    seen: HashSet<String>,
    generated: usize,
}

impl Decoder {
    fn fresh_id(&mut self) -> String {
        loop {
            self.generated += 1;
            let id = format!("gen-{}", self.generated);
            if !self.taken.contains(&id) {
                self.taken.insert(id.clone());
                return id;
            }
        }
    }

    fn read_top_level(
        &mut self,
        parent: &Element,
        out: &mut Vec<Block>,
    ) -> Result<(), TransformError> {
        for child in elements(parent) {
            match child.name.as_str() {
                "block" | "shadow" => out.push(self.read_block(child)?),
                "instance" => {
                    let at = position(child);
                    for element in elements(child).filter(|e| is_block(e)) {
                        let mut block = self.read_block(element)?;
                        if block.position.is_none() {
                            block.position = at;
                        }
                        out.push(block);
                    }
                }
                "block_set" => self.read_top_level(child, out)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// The block plugged into a `<value>`, `<statement>` or `<next>`; a real
    /// block wins over a shadow.
    fn read_connected(&mut self, holder: &Element) -> Result<Option<Block>, TransformError> {
        let connected = elements(holder)
            .find(|e| e.name == "block")
            .or_else(|| elements(holder).find(|e| e.name == "shadow"));
        connected.map(|e| self.read_block(e)).transpose()
    }

    fn read_block(&mut self, element: &Element) -> Result<Block, TransformError> {
        let id = match attr(element, "id") {
            Some(id) => id.to_string(),
            None => self.fresh_id(),
        };
        if !self.seen.insert(id.clone()) {
            return Err(TransformError::malformed(&id, "duplicate block id"));
        }
        let type_tag = attr(element, "type")
            .ok_or_else(|| TransformError::malformed(&id, "block has no 'type'"))?;

        let mut block = Block::new(type_tag, &id);
        block.position = position(element);
        block.disabled = flag(element, "disabled").unwrap_or(false);
        block.collapsed = flag(element, "collapsed").unwrap_or(false);
        block.inline = flag(element, "inline");
        block.deletable = flag(element, "deletable");
        block.movable = flag(element, "movable");

        for child in elements(element) {
            let name = attr(child, "name");
            match (child.name.as_str(), name) {
                ("mutation", _) => {
                    let mut mutation = Mutation::new();
                    for (key, value) in &child.attributes {
                        mutation.insert(key, value.as_str());
                    }
                    if !mutation.is_empty() {
                        block.mutation = Some(mutation);
                    }
                }
                ("field", Some(name)) => {
                    block.fields.insert(name.to_string(), text_of(child));
                }
                ("value", Some(name)) => {
                    if let Some(connected) = self.read_connected(child)? {
                        block.values.insert(name.to_string(), connected);
                    }
                }
                ("statement", Some(name)) => {
                    if let Some(connected) = self.read_connected(child)? {
                        block.statements.insert(name.to_string(), connected);
                    }
                }
                ("next", _) => {
                    block.next = self.read_connected(child)?.map(Box::new);
                }
                ("comment", _) => {
                    block.comment = Some(Comment {
                        text: text_of(child),
                        pinned: flag(child, "pinned").unwrap_or(false),
                        width: attr(child, "w").and_then(|v| v.trim().parse().ok()),
                        height: attr(child, "h").and_then(|v| v.trim().parse().ok()),
                    });
                }
                ("field" | "value" | "statement", None) => {
                    return Err(TransformError::malformed(
                        &id,
                        format!("<{}> without a name", child.name),
                    ));
                }
                _ => {}
            }
        }
        Ok(block)
    }
}

fn element_with_text(name: &str, text: &str) -> Element {
    let mut element = Element::new(name);
    if !text.is_empty() {
        element.children.push(XMLNode::Text(text.to_string()));
    }
    element
}

fn named(name: &str, slot: &str) -> Element {
    let mut element = Element::new(name);
    element
        .attributes
        .insert("name".to_string(), slot.to_string());
    element
}

pub fn encode_block(block: &Block) -> Element {
    let mut element = Element::new("block");
    element
        .attributes
        .insert("type".to_string(), block.type_tag.clone());
    element.attributes.insert("id".to_string(), block.id.clone());
    if let Some(position) = block.position {
        element
            .attributes
            .insert("x".to_string(), position.x.to_string());
        element
            .attributes
            .insert("y".to_string(), position.y.to_string());
    }
    if block.disabled {
        element
            .attributes
            .insert("disabled".to_string(), "true".to_string());
    }
    if block.collapsed {
        element
            .attributes
            .insert("collapsed".to_string(), "true".to_string());
    }
    for (key, value) in [
        ("inline", block.inline),
        ("deletable", block.deletable),
        ("movable", block.movable),
    ] {
        if let Some(value) = value {
            element.attributes.insert(key.to_string(), value.to_string());
        }
    }

    if let Some(mutation) = block.mutation.as_ref().filter(|m| !m.is_empty()) {
        let mut node = Element::new("mutation");
        for (key, value) in mutation.iter() {
            node.attributes.insert(key.to_string(), value.to_string());
        }
        element.children.push(XMLNode::Element(node));
    }
    if let Some(comment) = &block.comment {
        let mut node = element_with_text("comment", &comment.text);
        node.attributes
            .insert("pinned".to_string(), comment.pinned.to_string());
        if let Some(width) = comment.width {
            node.attributes.insert("w".to_string(), width.to_string());
        }
        if let Some(height) = comment.height {
            node.attributes.insert("h".to_string(), height.to_string());
        }
        element.children.push(XMLNode::Element(node));
    }
    for (name, value) in &block.fields {
        let mut node = named("field", name);
        if !value.is_empty() {
            node.children.push(XMLNode::Text(value.clone()));
        }
        element.children.push(XMLNode::Element(node));
    }
    for (holder, slots) in [("value", &block.values), ("statement", &block.statements)] {
        for (name, child) in slots {
            let mut node = named(holder, name);
            node.children.push(XMLNode::Element(encode_block(child)));
            element.children.push(XMLNode::Element(node));
        }
    }
    if let Some(next) = &block.next {
        let mut node = Element::new("next");
        node.children.push(XMLNode::Element(encode_block(next)));
        element.children.push(XMLNode::Element(node));
    }
    element
}

pub fn encode(blocks: &[Block]) -> Element {
    let mut root = Element::new("xml");
    for block in blocks {
        root.children.push(XMLNode::Element(encode_block(block)));
    }
    root
}

pub fn encode_string(blocks: &[Block]) -> Result<String, TransformError> {
    let mut out = Vec::new();
    encode(blocks)
        .write_with_config(
            &mut out,
            EmitterConfig::new()
                .perform_indent(true)
                .write_document_declaration(false),
        )
        .map_err(|e| invalid(e.to_string()))?;
    String::from_utf8(out).map_err(|e| invalid(e.to_string()))
}
