//! End-to-end tests driving the full pipeline: parse -> analyze -> lower -> emit.
//!
//! Unlike the inline per-module tests, these exercise `cpsc::compile_source`
//! and `cpsc::compile_file` directly, the library entry points the CLI is
//! built on.

use cpsc::{compile_file, compile_source, CompileFileError, CompilerConfig};

#[test]
fn compiles_a_small_program_end_to_end() {
    let src = r#"
        function add(a: integer, b: integer): integer {
            return a + b;
        }
        let result: integer = add(2, 3);
        print(result);
    "#;
    let out = compile_source(src, &CompilerConfig::default()).expect("compilation should succeed");
    assert!(out.assembly.contains(".data"));
    assert!(out.assembly.contains(".text"));
    assert!(out.assembly.contains("add:"));
    assert!(out.assembly.contains("main:"));
    assert!(out.assembly.contains("j main"));
}

#[test]
fn class_inheritance_resolves_inherited_fields_and_methods() {
    let src = r#"
        class Animal {
            var name: string;
            function speak(): string {
                return this.name;
            }
        }
        class Dog: Animal {
            function bark(): string {
                return this.speak();
            }
        }
        let d: Dog = new Dog();
        print(d.bark());
    "#;
    let out = compile_source(src, &CompilerConfig::default()).expect("inheritance should typecheck");
    assert!(out.assembly.contains("Dog_bark:"));
    assert!(out.assembly.contains("Animal_speak:"));
}

#[test]
fn inheritance_cycle_is_reported_as_a_batched_semantic_error() {
    let src = r#"
        class A: B { }
        class B: A { }
    "#;
    let errs = compile_source(src, &CompilerConfig::default()).expect_err("a cycle must not typecheck");
    assert!(errs.iter().any(|e| e.kind() == "ClassError"));
}

#[test]
fn undeclared_variable_and_type_mismatch_both_surface_in_one_batch() {
    let src = r#"
        function f(): integer {
            let x: integer = "not a number";
            return y;
        }
    "#;
    let errs = compile_source(src, &CompilerConfig::default()).expect_err("both errors should be caught");
    assert!(errs.len() >= 2);
}

#[test]
fn syntax_error_short_circuits_before_semantic_analysis_runs() {
    let src = "function f( : integer { return 1; }";
    let errs = compile_source(src, &CompilerConfig::default()).expect_err("malformed source must not parse");
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].kind(), "SyntaxError");
}

#[test]
fn closure_over_enclosing_variable_lowers_through_an_environment_record() {
    let src = r#"
        function counter(): integer {
            let total: integer = 0;
            function add(n: integer): void {
                total = total + n;
            }
            add(1);
            add(2);
            return total;
        }
        print(counter());
    "#;
    let out = compile_source(src, &CompilerConfig::default()).expect("closures should compile");
    assert!(out.ir.env_layouts.contains_key("__Env_counter"));
    assert!(out.assembly.contains("counter:"));
}

#[test]
fn array_literal_and_length_access_compile() {
    let src = r#"
        let xs: integer[] = [1, 2, 3];
        print(xs.length);
        print(xs[0]);
    "#;
    let out = compile_source(src, &CompilerConfig::default()).expect("arrays should compile");
    assert!(out.assembly.contains("-4("));
}

#[test]
fn trapping_overflow_mode_picks_non_wrapping_arithmetic() {
    let src = "let x: integer = 1 + 2;";
    let mut config = CompilerConfig::default();
    config.overflow_mode = cpsc::config::OverflowMode::Trapping;
    let out = compile_source(src, &config).expect("simple addition should compile");
    assert!(out.assembly.contains("\n    add "));
    assert!(!out.assembly.contains("addu"));
}

#[test]
fn compile_file_reads_source_and_writes_assembly_to_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source_path = dir.path().join("prog.cps");
    let output_path = dir.path().join("prog.asm");
    std::fs::write(&source_path, "print(1);").expect("write source");

    compile_file(&source_path, &output_path, &CompilerConfig::default()).expect("file compile should succeed");

    let written = std::fs::read_to_string(&output_path).expect("read output");
    assert!(written.contains(".text"));
}

#[test]
fn compile_file_reports_missing_source_as_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("does_not_exist.cps");
    let output_path = dir.path().join("out.asm");

    let err = compile_file(&missing, &output_path, &CompilerConfig::default()).expect_err("missing file must fail");
    assert!(matches!(err, CompileFileError::Io(_)));
}
