use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "blockly-ast",
    about = "Transforms Blockly workspaces into typed syntax trees and generates source code from them."
)]
pub struct Args {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        value_enum,
        default_value_t = InputFormat::Auto,
        help = "Workspace encoding. 'auto' looks at the file extension, then at the content."
    )]
    pub input_format: InputFormat,

    #[arg(long, value_enum, default_value_t = Emit::Python, help = "What to write.")]
    pub emit: Emit,

    #[arg(
        long,
        help = "Accept expression blocks that are not plugged into any statement."
    )]
    pub allow_floating_expressions: bool,

    #[arg(long, default_value_t = 4, help = "Spaces per indentation level in generated code.")]
    pub indent: usize,

    #[arg(
        long,
        help = "Also generate code for top-level stacks that are disabled in the editor."
    )]
    pub include_disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    Auto,
    Json,
    Xml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Emit {
    Python,
    Arduino,
    /// Textual dump of the syntax tree.
    Ast,
    /// The workspace re-rendered from the tree, as JSON.
    Json,
    /// The workspace re-rendered from the tree, as Blockly XML.
    Xml,
}

impl Emit {
    pub fn is_source(self) -> bool {
        matches!(self, Emit::Python | Emit::Arduino)
    }
}
