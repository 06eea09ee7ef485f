//! Semantic analyzer: symbol/class registration plus the type checker.
//!
//! Errors are batched rather than fail-fast: every statement is checked even
//! after an earlier one fails, so a single `cpsc` invocation reports every
//! diagnostic it can find in one pass, the way
//! `crates/compiler/src/typechecker.rs` collects a `Vec<CodeGenError>` across
//! a whole program before deciding whether to proceed to codegen.

use std::collections::{HashMap, HashSet};

use crate::ast::{
    BinaryOp, Block, ClassDecl, Expr, ExprKind, FunctionDecl, Literal, NodeId, Program,
    SourceLocation, Stmt, TypeAnnotation, UnaryOp, VarDecl,
};
use crate::errors::CompileError;
use crate::symbols::{ClassInfo, FieldInfo, FunctionSig, MemberKind, ScopeKind, Symbol, SymbolKind, SymbolTable};
use crate::types::{are_assignable, promote, Type};

/// Side table mapping every expression's `NodeId` to its resolved type,
/// kept separate from the AST so the tree itself never needs interior
/// mutability (see `ast.rs`'s module doc comment).
#[derive(Debug, Default)]
pub struct TypeTable {
    types: HashMap<NodeId, Type>,
}

impl TypeTable {
    pub fn get(&self, id: NodeId) -> &Type {
        self.types.get(&id).unwrap_or(&Type::Error)
    }

    fn set(&mut self, id: NodeId, ty: Type) {
        self.types.insert(id, ty);
    }
}

/// Everything downstream IR generation needs from a fully analyzed program.
pub struct Analysis {
    pub symbols: SymbolTable,
    pub types: TypeTable,
}

pub fn analyze(program: &Program) -> Result<Analysis, Vec<CompileError>> {
    let mut checker = TypeChecker::new();
    checker.check_program(program);
    if checker.errors.is_empty() {
        Ok(Analysis {
            symbols: checker.symbols,
            types: checker.types,
        })
    } else {
        Err(checker.errors)
    }
}

struct TypeChecker {
    symbols: SymbolTable,
    types: TypeTable,
    errors: Vec<CompileError>,
}

impl TypeChecker {
    fn new() -> Self {
        TypeChecker {
            symbols: SymbolTable::new(),
            types: TypeTable::default(),
            errors: Vec::new(),
        }
    }

    fn error(&mut self, err: CompileError) {
        self.errors.push(err);
    }

    fn resolve_annotation(&mut self, ann: &TypeAnnotation, loc: SourceLocation) -> Type {
        match ann {
            TypeAnnotation::Integer => Type::Integer,
            TypeAnnotation::Float => Type::Float,
            TypeAnnotation::Boolean => Type::Boolean,
            TypeAnnotation::String => Type::String,
            TypeAnnotation::Void => Type::Void,
            TypeAnnotation::Array(e) => Type::Array(Box::new(self.resolve_annotation(e, loc))),
            TypeAnnotation::Class(name) => {
                if self.symbols.classes.contains_key(name) {
                    Type::Class(name.clone())
                } else {
                    self.error(CompileError::name(format!("unknown type '{}'", name), loc));
                    Type::Error
                }
            }
        }
    }

    /// Orchestration order: classes (so forward references between classes
    /// and from functions to classes both resolve), then every top-level
    /// function's signature, then every top-level `let`, and only then
    /// function/method bodies — bodies may reference any sibling declared
    /// above or below them.
    fn check_program(&mut self, program: &Program) {
        self.register_classes(&program.statements);
        self.register_function_signatures(&program.statements);

        for stmt in &program.statements {
            if let Stmt::VarDecl(v) = stmt {
                self.check_top_level_var(v);
            }
        }

        for stmt in &program.statements {
            match stmt {
                Stmt::Function(f) => self.check_function_body(f),
                Stmt::Class(c) => self.check_class_bodies(c),
                _ => {}
            }
        }

        // Every remaining non-declaration statement is the implicit entry
        // point's body, run top to bottom after every declaration is known.
        self.symbols.enter_function_scope("<main>");
        for stmt in &program.statements {
            match stmt {
                Stmt::Function(_) | Stmt::Class(_) | Stmt::VarDecl(_) => {}
                other => self.check_stmt(other),
            }
        }
        self.symbols.exit_scope();
    }

    fn check_top_level_var(&mut self, v: &VarDecl) {
        let declared = v.declared_type.as_ref().map(|a| self.resolve_annotation(a, v.loc));
        let init_ty = v.init.as_ref().map(|e| self.check_expr(e));
        let ty = self.reconcile_var_type(v, declared, init_ty);
        if let Err(msg) = self.symbols.declare(Symbol::new(v.name.clone(), SymbolKind::Variable, ty, v.loc)) {
            self.error(CompileError::name(msg, v.loc));
        }
    }

    fn reconcile_var_type(&mut self, v: &VarDecl, declared: Option<Type>, init_ty: Option<Type>) -> Type {
        match (declared, init_ty) {
            (Some(d), Some(i)) => {
                if !are_assignable(&i, &d) {
                    self.error(CompileError::ty(
                        format!("cannot assign value of type '{}' to '{}' of type '{}'", i, v.name, d),
                        v.loc,
                    ));
                }
                d
            }
            (Some(d), None) => d,
            (None, Some(i)) => i,
            (None, None) => {
                self.error(CompileError::ty(
                    format!("variable '{}' needs a type annotation or initializer", v.name),
                    v.loc,
                ));
                Type::Error
            }
        }
    }

    /// Phase 1: register every class by name with an empty field/method set,
    /// so a class body can reference a class declared later in the file.
    /// Phase 2: resolve fields and method signatures, detecting inheritance
    /// cycles via a "currently resolving" set and accumulating field offsets
    /// down the superclass chain.
    fn register_classes(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            if let Stmt::Class(c) = stmt {
                if self.symbols.classes.contains_key(&c.name) {
                    self.error(CompileError::class(format!("class '{}' is already declared", c.name), c.loc));
                    continue;
                }
                self.symbols.classes.insert(
                    c.name.clone(),
                    ClassInfo {
                        name: c.name.clone(),
                        superclass: c.superclass.clone(),
                        fields: Vec::new(),
                        methods: HashMap::new(),
                        loc: c.loc,
                    },
                );
            }
        }

        let names: Vec<String> = statements
            .iter()
            .filter_map(|s| if let Stmt::Class(c) = s { Some(c.name.clone()) } else { None })
            .collect();
        for name in names {
            let mut resolving = HashSet::new();
            self.resolve_class(&name, &mut resolving);
        }

        for stmt in statements {
            if let Stmt::Class(c) = stmt {
                self.register_method_signatures(c);
            }
        }
    }

    /// Populates `fields` for `name` (its own fields offset past its
    /// superclass's), recursing up the superclass chain first. Returns early
    /// without error if already resolved or if a cycle is detected.
    /// Walks the superclass chain of `name` depth-first, detecting cycles
    /// via `resolving` (the set of classes on the current recursion path).
    /// Field offsets themselves are assigned later, in
    /// `register_method_signatures`, once this walk has proven the whole
    /// chain is acyclic.
    fn resolve_class(&mut self, name: &str, resolving: &mut HashSet<String>) {
        let super_name = self.symbols.classes.get(name).and_then(|c| c.superclass.clone());

        if !resolving.insert(name.to_string()) {
            self.error(CompileError::class(
                format!("inheritance cycle detected involving class '{}'", name),
                self.symbols.classes.get(name).map(|c| c.loc).unwrap_or_default(),
            ));
            return;
        }

        if let Some(super_name) = &super_name {
            if !self.symbols.classes.contains_key(super_name) {
                let loc = self.symbols.classes.get(name).unwrap().loc;
                self.error(CompileError::class(
                    format!("class '{}' extends unknown class '{}'", name, super_name),
                    loc,
                ));
            } else {
                self.resolve_class(super_name, resolving);
            }
        }

        resolving.remove(name);
    }

    fn register_method_signatures(&mut self, c: &ClassDecl) {
        // Own-field registration happens here, once, after the superclass
        // chain above is guaranteed acyclic.
        let base_offset = c
            .superclass
            .as_ref()
            .and_then(|s| self.symbols.classes.get(s))
            .map(|s| s.field_count())
            .unwrap_or(0);

        let mut fields = Vec::new();
        for (i, f) in c.fields.iter().enumerate() {
            let ty = f.declared_type.as_ref().map(|a| self.resolve_annotation(a, f.loc)).unwrap_or(Type::Error);
            fields.push(FieldInfo {
                name: f.name.clone(),
                ty,
                offset: base_offset + i,
            });
        }

        let mut methods = HashMap::new();
        for m in &c.methods {
            let params: Vec<Type> = m.params.iter().map(|p| self.resolve_annotation(&p.ty, p.loc)).collect();
            let ret = self.resolve_annotation(&m.return_type, m.loc);
            if let Some(super_name) = &c.superclass {
                if let Some((_, MemberKind::Method(super_sig))) = self.symbols.resolve_member(super_name, &m.name) {
                    if super_sig.params != params || super_sig.ret != ret {
                        self.error(CompileError::class(
                            format!(
                                "method '{}' overrides '{}.{}' with a different signature",
                                m.name, super_name, m.name
                            ),
                            m.loc,
                        ));
                    }
                }
            }
            methods.insert(m.name.clone(), FunctionSig { params, ret });
        }

        if let Some(info) = self.symbols.classes.get_mut(&c.name) {
            info.fields = fields;
            info.methods = methods;
        }
    }

    fn register_function_signatures(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            if let Stmt::Function(f) = stmt {
                let params = f.params.iter().map(|p| self.resolve_annotation(&p.ty, p.loc)).collect();
                let ret = self.resolve_annotation(&f.return_type, f.loc);
                let sig = FunctionSig { params, ret: ret.clone() };
                let sym = Symbol {
                    signature: Some(sig.clone()),
                    ..Symbol::new(f.name.clone(), SymbolKind::Function, Type::Function { params: sig.params, ret: Box::new(ret) }, f.loc)
                };
                if let Err(msg) = self.symbols.declare(sym) {
                    self.error(CompileError::name(msg, f.loc));
                }
            }
        }
    }

    fn check_class_bodies(&mut self, c: &ClassDecl) {
        self.symbols.enter_class_scope(&c.name);
        for m in &c.methods {
            self.check_function_body(m);
        }
        self.symbols.exit_scope();
    }

    fn check_function_body(&mut self, f: &FunctionDecl) {
        self.symbols.enter_function_scope(&f.name);
        for p in &f.params {
            let ty = self.resolve_annotation(&p.ty, p.loc);
            if let Err(msg) = self.symbols.declare(Symbol::new(p.name.clone(), SymbolKind::Parameter, ty, p.loc)) {
                self.error(CompileError::name(msg, p.loc));
            }
        }
        self.check_block(&f.body);

        let ret_ty = self.resolve_annotation(&f.return_type, f.loc);
        if ret_ty != Type::Void && !block_returns(&f.body) {
            self.error(CompileError::control_flow(
                format!("function '{}' does not return a value on every path", f.name),
                f.loc,
            ));
        }
        self.symbols.exit_scope();
    }

    fn check_block(&mut self, block: &Block) {
        self.symbols.enter_scope(ScopeKind::Block);
        for stmt in &block.0 {
            self.check_stmt(stmt);
        }
        self.symbols.exit_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => {
                self.check_expr(e);
            }
            Stmt::VarDecl(v) => {
                let declared = v.declared_type.as_ref().map(|a| self.resolve_annotation(a, v.loc));
                let init_ty = v.init.as_ref().map(|e| self.check_expr(e));
                let ty = self.reconcile_var_type(v, declared, init_ty);
                if let Err(msg) = self.symbols.declare(Symbol::new(v.name.clone(), SymbolKind::Variable, ty, v.loc)) {
                    self.error(CompileError::name(msg, v.loc));
                }
            }
            Stmt::Block(b) => self.check_block(b),
            Stmt::If { cond, then_branch, else_branch, loc } => {
                self.expect_boolean(cond, *loc);
                self.check_block(then_branch);
                if let Some(e) = else_branch {
                    self.check_block(e);
                }
            }
            Stmt::While { cond, body, loc } => {
                self.expect_boolean(cond, *loc);
                self.symbols.enter_scope(ScopeKind::Loop);
                for s in &body.0 {
                    self.check_stmt(s);
                }
                self.symbols.exit_scope();
            }
            Stmt::DoWhile { body, cond, loc } => {
                self.symbols.enter_scope(ScopeKind::Loop);
                for s in &body.0 {
                    self.check_stmt(s);
                }
                self.symbols.exit_scope();
                self.expect_boolean(cond, *loc);
            }
            Stmt::For { init, cond, update, body, loc } => {
                self.symbols.enter_scope(ScopeKind::Loop);
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(cond) = cond {
                    self.expect_boolean(cond, *loc);
                }
                if let Some(update) = update {
                    self.check_expr(update);
                }
                for s in &body.0 {
                    self.check_stmt(s);
                }
                self.symbols.exit_scope();
            }
            Stmt::Foreach { var_name, iterable, body, loc } => {
                let iter_ty = self.check_expr(iterable);
                let elem_ty = match iter_ty {
                    Type::Array(e) => *e,
                    Type::Error => Type::Error,
                    other => {
                        self.error(CompileError::ty(format!("cannot iterate over '{}'", other), *loc));
                        Type::Error
                    }
                };
                self.symbols.enter_scope(ScopeKind::Foreach);
                if let Err(msg) = self.symbols.declare(Symbol::new(var_name.clone(), SymbolKind::Variable, elem_ty, *loc)) {
                    self.error(CompileError::name(msg, *loc));
                }
                for s in &body.0 {
                    self.check_stmt(s);
                }
                self.symbols.exit_scope();
            }
            Stmt::Return { value, loc } => {
                if self.symbols.current_function().is_none() {
                    self.error(CompileError::control_flow("'return' outside a function", *loc));
                }
                if let Some(v) = value {
                    self.check_expr(v);
                }
            }
            Stmt::Break(loc) => {
                if self.symbols.current_loop_depth() == 0 {
                    self.error(CompileError::control_flow("'break' outside a loop", *loc));
                }
            }
            Stmt::Continue(loc) => {
                if self.symbols.current_loop_depth() == 0 {
                    self.error(CompileError::control_flow("'continue' outside a loop", *loc));
                }
            }
            Stmt::Print(e, _) => {
                self.check_expr(e);
            }
            Stmt::Function(f) => {
                if !matches!(self.symbols.current_scope_kind(), ScopeKind::Function | ScopeKind::Block) {
                    self.error(CompileError::control_flow(
                        format!("function '{}' may only be declared at global scope or inside a function", f.name),
                        f.loc,
                    ));
                }
                let params = f.params.iter().map(|p| self.resolve_annotation(&p.ty, p.loc)).collect::<Vec<_>>();
                let ret = self.resolve_annotation(&f.return_type, f.loc);
                let sig = FunctionSig { params: params.clone(), ret: ret.clone() };
                let sym = Symbol {
                    signature: Some(sig),
                    ..Symbol::new(f.name.clone(), SymbolKind::Function, Type::Function { params, ret: Box::new(ret) }, f.loc)
                };
                if let Err(msg) = self.symbols.declare(sym) {
                    self.error(CompileError::name(msg, f.loc));
                }
                self.check_function_body(f);
            }
            Stmt::Class(c) => {
                self.error(CompileError::control_flow(
                    format!("class '{}' may only be declared at global scope", c.name),
                    c.loc,
                ));
            }
        }
    }

    fn expect_boolean(&mut self, expr: &Expr, loc: SourceLocation) {
        let ty = self.check_expr(expr);
        if ty != Type::Boolean && ty != Type::Error {
            self.error(CompileError::ty(format!("condition must be 'boolean', found '{}'", ty), loc));
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Type {
        let ty = self.check_expr_kind(&expr.kind, expr.loc);
        self.types.set(expr.id, ty.clone());
        ty
    }

    fn check_expr_kind(&mut self, kind: &ExprKind, loc: SourceLocation) -> Type {
        match kind {
            ExprKind::Literal(lit) => type_of_literal(lit),
            ExprKind::This => match self.symbols.current_class() {
                Some(name) => Type::Class(name.to_string()),
                None => {
                    self.error(CompileError::name("'this' used outside a class method", loc));
                    Type::Error
                }
            },
            ExprKind::Ident(name) => match self.symbols.resolve(name) {
                Some(sym) => sym.ty.clone(),
                None => {
                    self.error(CompileError::name(format!("undeclared identifier '{}'", name), loc));
                    Type::Error
                }
            },
            ExprKind::Unary { op, operand } => {
                let t = self.check_expr(operand);
                match op {
                    UnaryOp::Neg => {
                        if t.is_numeric() {
                            t
                        } else {
                            self.error(CompileError::ty(format!("cannot negate '{}'", t), loc));
                            Type::Error
                        }
                    }
                    UnaryOp::Not => {
                        if t == Type::Boolean || t == Type::Error {
                            Type::Boolean
                        } else {
                            self.error(CompileError::ty(format!("cannot apply '!' to '{}'", t), loc));
                            Type::Error
                        }
                    }
                }
            }
            ExprKind::Binary { op, left, right } => {
                let lt = self.check_expr(left);
                let rt = self.check_expr(right);
                self.check_binary(*op, &lt, &rt, loc)
            }
            ExprKind::Logical { left, right, .. } => {
                self.expect_boolean(left, loc);
                self.expect_boolean(right, loc);
                Type::Boolean
            }
            ExprKind::Ternary { cond, then_expr, else_expr } => {
                self.expect_boolean(cond, loc);
                let t = self.check_expr(then_expr);
                let e = self.check_expr(else_expr);
                if let Some(joined) = promote(&t, &e) {
                    joined
                } else if are_assignable(&e, &t) {
                    t
                } else if are_assignable(&t, &e) {
                    e
                } else {
                    self.error(CompileError::ty(
                        format!("ternary branches have incompatible types '{}' and '{}'", t, e),
                        loc,
                    ));
                    Type::Error
                }
            }
            ExprKind::Assign { target, value } => {
                let target_ty = self.check_assign_target(target);
                let value_ty = self.check_expr(value);
                if !are_assignable(&value_ty, &target_ty) {
                    self.error(CompileError::ty(
                        format!("cannot assign '{}' to target of type '{}'", value_ty, target_ty),
                        loc,
                    ));
                }
                target_ty
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args, loc),
            ExprKind::MethodCall { receiver, method, args } => self.check_method_call(receiver, method, args, loc),
            ExprKind::FieldAccess { receiver, field } => self.check_field_access(receiver, field, loc),
            ExprKind::Index { array, index } => {
                let arr_ty = self.check_expr(array);
                let idx_ty = self.check_expr(index);
                if idx_ty != Type::Integer && idx_ty != Type::Error {
                    self.error(CompileError::ty(format!("array index must be 'integer', found '{}'", idx_ty), loc));
                }
                match arr_ty {
                    Type::Array(e) => *e,
                    Type::Error => Type::Error,
                    other => {
                        self.error(CompileError::ty(format!("cannot index into '{}'", other), loc));
                        Type::Error
                    }
                }
            }
            ExprKind::ArrayLiteral { elements } => {
                if elements.is_empty() {
                    return Type::Array(Box::new(Type::Error));
                }
                let mut elem_ty = self.check_expr(&elements[0]);
                for e in &elements[1..] {
                    let t = self.check_expr(e);
                    match promote(&elem_ty, &t) {
                        Some(joined) => elem_ty = joined,
                        None if are_assignable(&t, &elem_ty) => {}
                        None => {
                            self.error(CompileError::ty(
                                format!("array literal mixes incompatible types '{}' and '{}'", elem_ty, t),
                                loc,
                            ));
                            elem_ty = Type::Error;
                        }
                    }
                }
                Type::Array(Box::new(elem_ty))
            }
            ExprKind::New { class_name } => {
                if self.symbols.classes.contains_key(class_name) {
                    Type::Class(class_name.clone())
                } else {
                    self.error(CompileError::name(format!("unknown class '{}'", class_name), loc));
                    Type::Error
                }
            }
        }
    }

    fn check_assign_target(&mut self, target: &Expr) -> Type {
        match &target.kind {
            ExprKind::Ident(_) | ExprKind::FieldAccess { .. } | ExprKind::Index { .. } => self.check_expr(target),
            _ => {
                self.error(CompileError::ty("invalid assignment target", target.loc));
                self.check_expr(target);
                Type::Error
            }
        }
    }

    fn check_binary(&mut self, op: BinaryOp, lt: &Type, rt: &Type, loc: SourceLocation) -> Type {
        use BinaryOp::*;
        match op {
            Add if *lt == Type::String || *rt == Type::String => {
                if (lt.is_numeric() || *lt == Type::String) && (rt.is_numeric() || *rt == Type::String) {
                    Type::String
                } else {
                    self.error(CompileError::ty(format!("cannot apply '+' to '{}' and '{}'", lt, rt), loc));
                    Type::Error
                }
            }
            Add | Sub | Mul | Div | Mod => match promote(lt, rt) {
                Some(t) => t,
                None => {
                    self.error(CompileError::ty(format!("cannot apply arithmetic to '{}' and '{}'", lt, rt), loc));
                    Type::Error
                }
            },
            Lt | Le | Gt | Ge => {
                if promote(lt, rt).is_some() {
                    Type::Boolean
                } else {
                    self.error(CompileError::ty(format!("cannot compare '{}' and '{}'", lt, rt), loc));
                    Type::Error
                }
            }
            Eq | Ne => {
                if are_assignable(lt, rt) || are_assignable(rt, lt) {
                    Type::Boolean
                } else {
                    self.error(CompileError::ty(format!("cannot compare '{}' and '{}' for equality", lt, rt), loc));
                    Type::Error
                }
            }
        }
    }

    fn check_call(&mut self, callee: &str, args: &[Expr], loc: SourceLocation) -> Type {
        let sig = match self.symbols.resolve(callee) {
            Some(sym) if sym.kind == SymbolKind::Function => sym.signature.clone(),
            Some(_) => {
                self.error(CompileError::ty(format!("'{}' is not callable", callee), loc));
                None
            }
            None => {
                self.error(CompileError::name(format!("undeclared function '{}'", callee), loc));
                None
            }
        };
        let arg_types: Vec<Type> = args.iter().map(|a| self.check_expr(a)).collect();
        match sig {
            Some(sig) => {
                self.check_arity_and_args(callee, &sig.params, &arg_types, loc);
                sig.ret
            }
            None => Type::Error,
        }
    }

    fn check_method_call(&mut self, receiver: &Expr, method: &str, args: &[Expr], loc: SourceLocation) -> Type {
        let recv_ty = self.check_expr(receiver);
        let class_name = match &recv_ty {
            Type::Class(n) => Some(n.clone()),
            Type::Error => None,
            other => {
                self.error(CompileError::ty(format!("cannot call a method on '{}'", other), loc));
                None
            }
        };
        let arg_types: Vec<Type> = args.iter().map(|a| self.check_expr(a)).collect();
        let Some(class_name) = class_name else { return Type::Error };
        match self.symbols.resolve_member(&class_name, method) {
            Some((_, MemberKind::Method(sig))) => {
                self.check_arity_and_args(method, &sig.params, &arg_types, loc);
                sig.ret
            }
            Some((_, MemberKind::Field(_))) => {
                self.error(CompileError::ty(format!("'{}' is a field, not a method", method), loc));
                Type::Error
            }
            None => {
                self.error(CompileError::name(format!("class '{}' has no method '{}'", class_name, method), loc));
                Type::Error
            }
        }
    }

    fn check_field_access(&mut self, receiver: &Expr, field: &str, loc: SourceLocation) -> Type {
        let recv_ty = self.check_expr(receiver);
        match &recv_ty {
            Type::Class(name) => match self.symbols.resolve_member(name, field) {
                Some((_, MemberKind::Field(f))) => f.ty,
                Some((_, MemberKind::Method(_))) => {
                    self.error(CompileError::ty(format!("'{}' is a method, not a field", field), loc));
                    Type::Error
                }
                None => {
                    self.error(CompileError::name(format!("class '{}' has no field '{}'", name, field), loc));
                    Type::Error
                }
            },
            Type::Array(_) if field == "length" => Type::Integer,
            Type::Error => Type::Error,
            other => {
                self.error(CompileError::ty(format!("cannot access a field on '{}'", other), loc));
                Type::Error
            }
        }
    }

    fn check_arity_and_args(&mut self, name: &str, params: &[Type], args: &[Type], loc: SourceLocation) {
        if params.len() != args.len() {
            self.error(CompileError::ty(
                format!("'{}' expects {} argument(s), found {}", name, params.len(), args.len()),
                loc,
            ));
            return;
        }
        for (i, (p, a)) in params.iter().zip(args.iter()).enumerate() {
            if !are_assignable(a, p) {
                self.error(CompileError::ty(
                    format!("argument {} to '{}' expects '{}', found '{}'", i + 1, name, p, a),
                    loc,
                ));
            }
        }
    }
}

fn type_of_literal(lit: &Literal) -> Type {
    match lit {
        Literal::Int(_) => Type::Integer,
        Literal::Float(_) => Type::Float,
        Literal::Bool(_) => Type::Boolean,
        Literal::Str(_) => Type::String,
        Literal::Null => Type::Null,
    }
}

/// Conservative structural check for "does every path through this block end
/// in a `return`?" Does not attempt to reason about condition values, so
/// `if (true) { return 1; }` with no `else` is (correctly, conservatively)
/// judged as not guaranteed to return.
fn block_returns(block: &Block) -> bool {
    block.0.iter().any(stmt_always_returns)
}

fn stmt_always_returns(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } => true,
        Stmt::Block(b) => block_returns(b),
        Stmt::If { then_branch, else_branch, .. } => match else_branch {
            Some(e) => block_returns(then_branch) && block_returns(e),
            None => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn analyze_src(src: &str) -> Result<Analysis, Vec<CompileError>> {
        let program = Parser::new(src).unwrap().parse().unwrap();
        analyze(&program)
    }

    #[test]
    fn simple_program_type_checks() {
        let result = analyze_src("let i: integer = 0; while (i < 3) { print(i); i = i + 1; }");
        assert!(result.is_ok());
    }

    #[test]
    fn integer_literal_assigned_to_float_is_allowed() {
        let result = analyze_src("let x: float = 1;");
        assert!(result.is_ok());
    }

    #[test]
    fn assigning_float_to_integer_is_rejected() {
        let errs = analyze_src("let x: integer = 1.5;").unwrap_err();
        assert_eq!(errs[0].kind(), "TypeError");
    }

    #[test]
    fn undeclared_identifier_is_a_name_error() {
        let errs = analyze_src("print(y);").unwrap_err();
        assert_eq!(errs[0].kind(), "NameError");
    }

    #[test]
    fn break_outside_loop_is_control_flow_error() {
        let errs = analyze_src("break;").unwrap_err();
        assert_eq!(errs[0].kind(), "ControlFlowError");
    }

    #[test]
    fn function_missing_return_on_every_path_is_rejected() {
        let errs = analyze_src("function f(): integer { let x = 1; }").unwrap_err();
        assert_eq!(errs[0].kind(), "ControlFlowError");
    }

    #[test]
    fn function_with_return_in_both_branches_is_accepted() {
        let result = analyze_src(
            "function f(x: integer): integer { if (x > 0) { return 1; } else { return 0; } }",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn class_inheritance_cycle_is_rejected() {
        let errs = analyze_src("class A: B {} class B: A {}").unwrap_err();
        assert!(errs.iter().any(|e| e.kind() == "ClassError"));
    }

    #[test]
    fn overriding_method_with_different_return_type_is_rejected() {
        let errs = analyze_src(
            "class Animal { function speak(): string { return \"hi\"; } } \
             class Dog: Animal { function speak(): integer { return 1; } }",
        )
        .unwrap_err();
        assert!(errs.iter().any(|e| e.kind() == "ClassError"));
    }

    #[test]
    fn overriding_method_with_different_param_types_is_rejected() {
        let errs = analyze_src(
            "class Animal { function feed(amount: integer): void {} } \
             class Dog: Animal { function feed(amount: string): void {} }",
        )
        .unwrap_err();
        assert!(errs.iter().any(|e| e.kind() == "ClassError"));
    }

    #[test]
    fn overriding_method_with_identical_signature_is_accepted() {
        let result = analyze_src(
            "class Animal { function speak(): string { return \"hi\"; } } \
             class Dog: Animal { function speak(): string { return \"woof\"; } }",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn inherited_field_is_visible_through_subclass_instance() {
        let result = analyze_src(
            "class Animal { let age: integer = 0; } class Dog: Animal {} let d = new Dog(); print(d.age);",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn call_with_wrong_argument_count_is_rejected() {
        let errs = analyze_src("function f(x: integer): void {} f(1, 2);").unwrap_err();
        assert_eq!(errs[0].kind(), "TypeError");
    }

    #[test]
    fn errors_accumulate_across_multiple_statements() {
        let errs = analyze_src("print(a); print(b); break;").unwrap_err();
        assert_eq!(errs.len(), 3);
    }
}
