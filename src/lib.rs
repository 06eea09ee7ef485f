//! Compiscript compiler: semantic analysis, TAC generation, and a MIPS32
//! backend.

pub mod ast;
pub mod capture_analysis;
pub mod codegen;
pub mod config;
pub mod errors;
pub mod irgen;
pub mod lexer;
pub mod parser;
pub mod quad;
pub mod symbols;
pub mod typechecker;
pub mod types;

use std::fs;
use std::path::Path;

use tracing::{debug, info};

pub use config::CompilerConfig;
pub use errors::CompileError;
pub use parser::Parser;
pub use typechecker::Analysis;

/// The result of a full, successful compilation: the typed analysis, the
/// flattened quadruple stream, and the emitted assembly text.
pub struct CompileOutput {
    pub analysis: Analysis,
    pub ir: irgen::IrProgram,
    pub assembly: String,
}

/// Either an I/O failure reading the source or writing the output, or a
/// batch of compilation errors from `compile_source`. Kept distinct from
/// `CompileError::Resource` (reserved for backend register-pool exhaustion)
/// so a driver can tell a missing file apart from a generation failure.
#[derive(Debug, thiserror::Error)]
pub enum CompileFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("compilation failed")]
    Compile(Vec<CompileError>),
}

/// Compiles `source` end to end. Semantic errors are batched and returned
/// together; an error surfacing from IR generation or the backend is
/// returned alone, since both stages assume the input already type-checked.
pub fn compile_source(source: &str, config: &CompilerConfig) -> Result<CompileOutput, Vec<CompileError>> {
    info!("parsing source ({} bytes)", source.len());
    let program = Parser::new(source)
        .and_then(|mut p| p.parse())
        .map_err(|e| vec![e])?;

    debug!("running semantic analysis");
    let analysis = typechecker::analyze(&program)?;

    debug!("analyzing closure captures");
    let captures = capture_analysis::analyze_program(&program);

    debug!("lowering to quadruples");
    let ir = irgen::generate(&program, &analysis, &captures, config.zero_fill_new_fields);

    debug!("emitting MIPS32 assembly");
    let assembly =
        codegen::emit_program(&program, &ir, &analysis.symbols, config).map_err(|e| vec![e])?;

    Ok(CompileOutput { analysis, ir, assembly })
}

/// Reads `source_path`, compiles it, and writes the resulting assembly to
/// `output_path`.
pub fn compile_file(
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), CompileFileError> {
    let source = fs::read_to_string(source_path)?;
    let output = compile_source(&source, config).map_err(CompileFileError::Compile)?;
    fs::write(output_path, output.assembly)?;
    info!("wrote {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_small_program_to_assembly() {
        let config = CompilerConfig::default();
        let out = compile_source("print(1 + 2);", &config).unwrap();
        assert!(out.assembly.contains(".text"));
        assert!(out.assembly.contains("main:"));
    }

    #[test]
    fn batches_multiple_semantic_errors() {
        let config = CompilerConfig::default();
        let errs = compile_source("let x: integer = true; let y: string = 1;", &config).unwrap_err();
        assert!(errs.len() >= 2);
    }

    #[test]
    fn syntax_error_is_reported_alone() {
        let config = CompilerConfig::default();
        let errs = compile_source("let x: integer = ;", &config).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind(), "SyntaxError");
    }
}
