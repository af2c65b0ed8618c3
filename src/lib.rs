//! Crate root: wires together the KXI compilation pipeline.
//!
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and builds the `ast`; expressions
//!   go through the operator-precedence builder in `shunting`.
//! - `analyzer` walks the tree twice, declaring symbols and then checking
//!   types and emitting quadruples, with `eval` handling expressions.
//! - `symtab` and `ir` hold every symbol and the quadruple list.
//! - `codegen` lowers the quadruples into stack-VM assembly.
//! - `error` defines the diagnostics shared by every stage.

pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod eval;
pub mod ir;
pub mod parser;
pub mod shunting;
pub mod symtab;
pub mod tokenizer;
pub mod ty;

use std::fs;
use std::path::Path;

use log::{debug, info};
use snafu::ResultExt;

pub use error::{CompileError, CompileResult};
use error::IoSnafu;
use symtab::SymbolTable;

/// Result of a successful compilation.
#[derive(Debug)]
pub struct Compilation {
  /// Every symbol, with the quadruple list in `table.ir`.
  pub table: SymbolTable,
  pub assembly: String,
}

/// Compile KXI source text into VM assembly.
pub fn compile(source: &str) -> CompileResult<Compilation> {
  let tokens = tokenizer::tokenize(source)?;
  debug!("scanned {} tokens", tokens.len());
  let program = parser::parse(tokens)?;
  let table = analyzer::analyze(&program)?;
  let assembly = codegen::generate(&table)?;
  info!(
    "compiled {} classes into {} quads",
    program.classes.len(),
    table.ir.len()
  );
  Ok(Compilation { table, assembly })
}

/// Compile straight to assembly text.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  compile(source).map(|compilation| compilation.assembly)
}

pub fn read_source(path: &Path) -> CompileResult<String> {
  fs::read_to_string(path).context(IoSnafu {
    path: path.display().to_string(),
  })
}

/// Read and compile a source file.
pub fn compile_file(path: &Path) -> CompileResult<Compilation> {
  compile(&read_source(path)?)
}
