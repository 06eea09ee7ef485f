//! MIPS32 backend: turns a frozen `IrProgram` into assembly text. Registers
//! and stack frames are derived fresh per function by the emitter; this
//! module only wires the pieces together.

pub mod emitter;
pub mod frame;
pub mod registers;

use crate::ast::Program;
use crate::config::CompilerConfig;
use crate::errors::CompileError;
use crate::irgen::{self, IrProgram};
use crate::symbols::SymbolTable;

/// Assembles the final `.data`/`.text` program text for `ir`.
///
/// `program` is needed alongside `ir` only to recover each function's
/// parameter *names* (`FunctionSig` in the symbol table stores types, not
/// names) via [`irgen::function_param_names`].
pub fn emit_program(
    program: &Program,
    ir: &IrProgram,
    symbols: &SymbolTable,
    config: &CompilerConfig,
) -> Result<String, CompileError> {
    let param_names = irgen::function_param_names(program, &ir.closure_functions);
    let emitter = emitter::Emitter::new(symbols, &ir.env_layouts, &param_names, config);
    emitter.emit_program(&ir.quads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture_analysis;
    use crate::parser::Parser;
    use crate::typechecker;

    #[test]
    fn emits_a_runnable_looking_program_for_a_small_source() {
        let src = "function add(a: integer, b: integer): integer { return a + b; } print(add(1, 2));";
        let program = Parser::new(src).unwrap().parse().unwrap();
        let analysis = typechecker::analyze(&program).unwrap();
        let captures = capture_analysis::analyze_program(&program);
        let ir = irgen::generate(&program, &analysis, &captures, true);
        let config = CompilerConfig::default();
        let asm = emit_program(&program, &ir, &analysis.symbols, &config).unwrap();
        assert!(asm.contains(".data"));
        assert!(asm.contains(".text"));
        assert!(asm.contains("add:"));
        assert!(asm.contains("main:"));
    }
}
