pub mod ast;
pub mod block;
pub mod codegen;
pub mod document;
pub mod error;
pub mod forward;
pub mod infer;
pub mod reverse;
pub mod typecheck;
pub mod types;
pub mod visitor;
pub mod xml;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(all(target_arch = "wasm32", feature = "wasm-bindings"))]
pub mod wasm;

pub use ast::{Phrase, Program};
pub use block::Block;
pub use codegen::{generate, GenerateError, GenerateOptions, Target};
pub use error::TransformError;
pub use forward::{Registry, TransformOptions, Transformer};
pub use types::BlocklyType;

#[cfg(not(target_arch = "wasm32"))]
use anyhow::{Context, Result};
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Xml,
}

impl DocumentFormat {
    pub fn name(self) -> &'static str {
        match self {
            DocumentFormat::Json => "JSON",
            DocumentFormat::Xml => "XML",
        }
    }

    /// Guesses the encoding from the first meaningful character.
    pub fn detect(text: &str) -> Self {
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if text.starts_with('<') {
            DocumentFormat::Xml
        } else {
            DocumentFormat::Json
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(DocumentFormat::Json),
            "xml" | "blockly" => Some(DocumentFormat::Xml),
            _ => None,
        }
    }
}

pub fn parse_document(text: &str, format: DocumentFormat) -> Result<Vec<Block>, TransformError> {
    match format {
        DocumentFormat::Json => document::decode_str(text),
        DocumentFormat::Xml => xml::decode_str(text),
    }
}

/// Forward transformation with the standard block set.
pub fn transform_blocks(
    blocks: &[Block],
    options: TransformOptions,
) -> Result<Program, TransformError> {
    let registry = Registry::standard();
    Transformer::new(&registry, options).transform_program(blocks)
}

/// Reverse transformation straight to an encoded workspace.
pub fn program_to_document(
    program: &Program,
    format: DocumentFormat,
) -> Result<String, TransformError> {
    let blocks = reverse::program_to_blocks(program);
    match format {
        DocumentFormat::Json => document::encode_string(&blocks),
        DocumentFormat::Xml => xml::encode_string(&blocks),
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn run_cli(args: &cli::Args) -> Result<()> {
    use cli::{Emit, InputFormat};

    if args.include_disabled && !args.emit.is_source() {
        anyhow::bail!("--include-disabled requires --emit python or --emit arduino.");
    }
    if args.indent == 0 || args.indent > 16 {
        anyhow::bail!("--indent must be between 1 and 16.");
    }

    let total_stages = 4 + usize::from(args.output.is_some());
    let progress = CliProgress::new("Transform", total_stages);
    let mut stage = 0usize;

    stage += 1;
    progress.emit(stage, "Resolving input path");
    let input = canonicalize_file(&args.input)?;
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read '{}'.", pretty_path(&input)))?;

    stage += 1;
    progress.emit(stage, "Decoding workspace");
    let format = match args.input_format {
        InputFormat::Json => DocumentFormat::Json,
        InputFormat::Xml => DocumentFormat::Xml,
        InputFormat::Auto => input
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(DocumentFormat::from_extension)
            .unwrap_or_else(|| DocumentFormat::detect(&text)),
    };
    let blocks = parse_document(&text, format)
        .with_context(|| format!("Failed to decode '{}'.", pretty_path(&input)))?;
    tracing::info!(format = format.name(), blocks = blocks.len(), "decoded workspace");

    stage += 1;
    progress.emit(stage, "Building syntax tree");
    let options = TransformOptions {
        allow_floating_expressions: args.allow_floating_expressions,
    };
    let program = transform_blocks(&blocks, options)
        .with_context(|| format!("Failed to transform '{}'.", pretty_path(&input)))?;

    stage += 1;
    let rendered = match args.emit {
        Emit::Python | Emit::Arduino => {
            let target = if args.emit == Emit::Python {
                Target::Python
            } else {
                Target::Arduino
            };
            progress.emit(stage, &format!("Generating {} source", target));
            let options = GenerateOptions {
                indent: args.indent,
                include_disabled: args.include_disabled,
            };
            generate(&program, target, options)?
        }
        Emit::Ast => {
            progress.emit(stage, "Printing syntax tree");
            program.to_string()
        }
        Emit::Json | Emit::Xml => {
            let format = if args.emit == Emit::Json {
                DocumentFormat::Json
            } else {
                DocumentFormat::Xml
            };
            progress.emit(stage, &format!("Rendering {} workspace", format.name()));
            let mut text = program_to_document(&program, format)?;
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text
        }
    };

    match &args.output {
        Some(output) => {
            stage += 1;
            progress.emit(stage, "Writing output");
            std::fs::write(output, rendered.as_bytes())
                .with_context(|| format!("Failed to write '{}'.", output.display()))?;
        }
        None => print!("{}", rendered),
    }

    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub fn canonicalize_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!("Input file not found: '{}'.", path.display()));
    }
    Ok(path.canonicalize()?)
}

#[cfg(not(target_arch = "wasm32"))]
fn pretty_path(path: &Path) -> String {
    let raw = path.display().to_string();
    if let Some(stripped) = raw.strip_prefix(r"\\?\") {
        stripped.to_string()
    } else {
        raw
    }
}

#[cfg(not(target_arch = "wasm32"))]
struct CliProgress {
    prefix: &'static str,
    total: usize,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliProgress {
    fn new(prefix: &'static str, total: usize) -> Self {
        Self {
            prefix,
            total: total.max(1),
        }
    }

    fn emit(&self, step: usize, label: &str) {
        let step = step.clamp(1, self.total);
        let bar = render_progress_bar(step, self.total, 14);
        eprintln!(
            "[{}] {}... ({}/{}) {}",
            self.prefix, label, step, self.total, bar
        );
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    let width = width.max(1);
    let filled = ((step * width) + (total / 2)) / total;
    let mut s = String::with_capacity(width + 2);
    s.push('[');
    for i in 0..width {
        s.push(if i < filled { '=' } else { '-' });
    }
    s.push(']');
    s
}
