//! Capture analysis for nested functions / closures.
//!
//! Closures are flattened via an explicit environment record rather than a
//! first-class function runtime: a nested function that reads or writes a
//! variable from an enclosing function scope gets that variable promoted to
//! a field of a synthesized environment object, passed as an implicit first
//! argument. This module only computes *which* variables each nested
//! function captures; the rewrite itself (environment class synthesis,
//! implicit parameter, turning accesses into `GET_FIELD`/`SET_FIELD`)
//! happens in `irgen.rs`, which reads this analysis to decide how to lower
//! a name.
//!
//! Shaped like `crates/compiler/src/capture_analysis.rs`
//! (free-variable-vs-available-set computation), adapted from quotation
//! stack effects to named-variable scoping.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::ast::{Block, Expr, ExprKind, FunctionDecl, Program, Stmt};

/// Maps a (possibly nested) function's name to the names it captures from
/// an enclosing function, in declaration order of first reference.
#[derive(Debug, Default, Clone)]
pub struct CaptureInfo {
    captures: HashMap<String, Vec<String>>,
}

impl CaptureInfo {
    pub fn captures_of(&self, function_name: &str) -> &[String] {
        self.captures.get(function_name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_closure(&self, function_name: &str) -> bool {
        !self.captures_of(function_name).is_empty()
    }
}

pub fn analyze_program(program: &Program) -> CaptureInfo {
    let mut info = CaptureInfo::default();
    for stmt in &program.statements {
        match stmt {
            Stmt::Function(f) => analyze_function(f, &HashSet::new(), &mut info),
            Stmt::Class(c) => {
                for m in &c.methods {
                    analyze_function(m, &HashSet::new(), &mut info);
                }
            }
            _ => {}
        }
    }
    info
}

fn analyze_function(f: &FunctionDecl, ancestor_available: &HashSet<String>, info: &mut CaptureInfo) {
    let own_bound = bound_names(f);
    let available_here: HashSet<String> = ancestor_available.union(&own_bound).cloned().collect();

    let mut nested = Vec::new();
    collect_nested_functions(&f.body, &mut nested);
    for n in nested {
        let mut referenced = Vec::new();
        referenced_idents_in_order(&n.body, &mut referenced);
        let nested_own_bound = bound_names(n);
        let mut seen = HashSet::new();
        let captured: Vec<String> = referenced
            .into_iter()
            .filter(|name| !nested_own_bound.contains(name) && available_here.contains(name))
            .filter(|name| seen.insert(name.clone()))
            .collect();
        info.captures.insert(n.name.clone(), captured);
        analyze_function(n, &available_here, info);
    }
}

/// Names bound directly inside a function: its parameters plus every
/// variable declared in its body (including nested blocks/loops), but NOT
/// names declared inside a nested function (that's a separate scope).
fn bound_names(f: &FunctionDecl) -> HashSet<String> {
    let mut names: HashSet<String> = f.params.iter().map(|p| p.name.clone()).collect();
    collect_bound_in_block(&f.body, &mut names);
    names
}

fn collect_bound_in_block(block: &Block, names: &mut HashSet<String>) {
    for stmt in &block.0 {
        collect_bound_in_stmt(stmt, names);
    }
}

fn collect_bound_in_stmt(stmt: &Stmt, names: &mut HashSet<String>) {
    match stmt {
        Stmt::VarDecl(v) => {
            names.insert(v.name.clone());
        }
        Stmt::Block(b) => collect_bound_in_block(b, names),
        Stmt::If { then_branch, else_branch, .. } => {
            collect_bound_in_block(then_branch, names);
            if let Some(e) = else_branch {
                collect_bound_in_block(e, names);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_bound_in_block(body, names),
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                collect_bound_in_stmt(init, names);
            }
            collect_bound_in_block(body, names);
        }
        Stmt::Foreach { var_name, body, .. } => {
            names.insert(var_name.clone());
            collect_bound_in_block(body, names);
        }
        // A nested function's own name becomes a value in the enclosing
        // scope, but its body's locals are its own scope, not ours.
        Stmt::Function(f) => {
            names.insert(f.name.clone());
        }
        Stmt::Expr(_) | Stmt::Return { .. } | Stmt::Break(_) | Stmt::Continue(_) | Stmt::Print(_, _) => {}
        Stmt::Class(_) => {}
    }
}

/// Every `Stmt::Function` reachable without crossing another function
/// boundary (direct and indirect children through blocks/loops/ifs).
fn collect_nested_functions<'a>(block: &'a Block, out: &mut Vec<&'a FunctionDecl>) {
    for stmt in &block.0 {
        collect_nested_in_stmt(stmt, out);
    }
}

fn collect_nested_in_stmt<'a>(stmt: &'a Stmt, out: &mut Vec<&'a FunctionDecl>) {
    match stmt {
        Stmt::Function(f) => out.push(f),
        Stmt::Block(b) => collect_nested_functions(b, out),
        Stmt::If { then_branch, else_branch, .. } => {
            collect_nested_functions(then_branch, out);
            if let Some(e) = else_branch {
                collect_nested_functions(e, out);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_nested_functions(body, out),
        Stmt::For { body, .. } | Stmt::Foreach { body, .. } => collect_nested_functions(body, out),
        _ => {}
    }
}

/// Every identifier referenced in `block`, including inside nested function
/// bodies (a doubly-nested function's free references may themselves need
/// to flow through as captures of the function in between).
fn referenced_idents_in_order(block: &Block, out: &mut Vec<String>) {
    for stmt in &block.0 {
        referenced_idents_in_stmt(stmt, out);
    }
}

fn referenced_idents_in_stmt(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::Expr(e) => referenced_idents_in_expr(e, out),
        Stmt::VarDecl(v) => {
            if let Some(init) = &v.init {
                referenced_idents_in_expr(init, out);
            }
        }
        Stmt::Block(b) => referenced_idents_in_order(b, out),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            referenced_idents_in_expr(cond, out);
            referenced_idents_in_order(then_branch, out);
            if let Some(e) = else_branch {
                referenced_idents_in_order(e, out);
            }
        }
        Stmt::While { cond, body, .. } => {
            referenced_idents_in_expr(cond, out);
            referenced_idents_in_order(body, out);
        }
        Stmt::DoWhile { body, cond, .. } => {
            referenced_idents_in_order(body, out);
            referenced_idents_in_expr(cond, out);
        }
        Stmt::For { init, cond, update, body, .. } => {
            if let Some(init) = init {
                referenced_idents_in_stmt(init, out);
            }
            if let Some(cond) = cond {
                referenced_idents_in_expr(cond, out);
            }
            if let Some(update) = update {
                referenced_idents_in_expr(update, out);
            }
            referenced_idents_in_order(body, out);
        }
        Stmt::Foreach { iterable, body, .. } => {
            referenced_idents_in_expr(iterable, out);
            referenced_idents_in_order(body, out);
        }
        Stmt::Return { value: Some(e), .. } => referenced_idents_in_expr(e, out),
        Stmt::Return { value: None, .. } | Stmt::Break(_) | Stmt::Continue(_) => {}
        Stmt::Print(e, _) => referenced_idents_in_expr(e, out),
        Stmt::Function(f) => referenced_idents_in_order(&f.body, out),
        Stmt::Class(_) => {}
    }
}

fn referenced_idents_in_expr(expr: &Expr, out: &mut Vec<String>) {
    match &expr.kind {
        ExprKind::Ident(name) => out.push(name.clone()),
        ExprKind::Literal(_) | ExprKind::This | ExprKind::New { .. } => {}
        ExprKind::Unary { operand, .. } => referenced_idents_in_expr(operand, out),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            referenced_idents_in_expr(left, out);
            referenced_idents_in_expr(right, out);
        }
        ExprKind::Ternary { cond, then_expr, else_expr } => {
            referenced_idents_in_expr(cond, out);
            referenced_idents_in_expr(then_expr, out);
            referenced_idents_in_expr(else_expr, out);
        }
        ExprKind::Assign { target, value } => {
            referenced_idents_in_expr(target, out);
            referenced_idents_in_expr(value, out);
        }
        ExprKind::Call { args, .. } => {
            for a in args {
                referenced_idents_in_expr(a, out);
            }
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            referenced_idents_in_expr(receiver, out);
            for a in args {
                referenced_idents_in_expr(a, out);
            }
        }
        ExprKind::FieldAccess { receiver, .. } => referenced_idents_in_expr(receiver, out),
        ExprKind::Index { array, index } => {
            referenced_idents_in_expr(array, out);
            referenced_idents_in_expr(index, out);
        }
        ExprKind::ArrayLiteral { elements } => {
            for e in elements {
                referenced_idents_in_expr(e, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn parse(src: &str) -> Program {
        Parser::new(src).unwrap().parse().unwrap()
    }

    #[test]
    fn nested_function_with_no_free_variables_captures_nothing() {
        let program = parse(
            "function outer(): void { function inner(x: integer): integer { return x; } }",
        );
        let info = analyze_program(&program);
        assert!(!info.is_closure("inner"));
    }

    #[test]
    fn nested_function_capturing_enclosing_variable() {
        let program = parse(
            "function outer(): integer { let total = 0; function inner(x: integer): void { total = total + x; } return total; }",
        );
        let info = analyze_program(&program);
        assert!(info.is_closure("inner"));
        assert_eq!(info.captures_of("inner"), &["total".to_string()]);
    }

    #[test]
    fn does_not_capture_globals() {
        let program = parse(
            "let g = 1; function outer(): void { function inner(): integer { return g; } }",
        );
        let info = analyze_program(&program);
        assert!(!info.is_closure("inner"));
    }

    #[test]
    fn does_not_capture_its_own_parameter() {
        let program = parse(
            "function outer(): void { let total = 0; function inner(total: integer): void { } }",
        );
        let info = analyze_program(&program);
        assert!(!info.is_closure("inner"));
    }
}
