use crate::{
    document, generate, program_to_document, transform_blocks, DocumentFormat, GenerateOptions,
    Target, TransformOptions,
};
use wasm_bindgen::prelude::*;

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// JSON workspace in, Python or Arduino source out.
#[wasm_bindgen]
pub fn transform_json_to_source(
    workspace: &str,
    target: &str,
    allow_floating_expressions: bool,
) -> Result<String, JsValue> {
    let target = match target.to_ascii_lowercase().as_str() {
        "python" => Target::Python,
        "arduino" => Target::Arduino,
        other => return Err(js_error(format!("Unknown target '{}'.", other))),
    };
    let blocks = document::decode_str(workspace).map_err(js_error)?;
    let options = TransformOptions {
        allow_floating_expressions,
    };
    let program = transform_blocks(&blocks, options).map_err(js_error)?;
    generate(&program, target, GenerateOptions::default()).map_err(js_error)
}

/// Normalises a JSON workspace by transforming it and rendering the tree back.
#[wasm_bindgen]
pub fn round_trip_json(workspace: &str) -> Result<String, JsValue> {
    let blocks = document::decode_str(workspace).map_err(js_error)?;
    let program = transform_blocks(&blocks, TransformOptions::default()).map_err(js_error)?;
    program_to_document(&program, DocumentFormat::Json).map_err(js_error)
}
