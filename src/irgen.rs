//! IR generator: lowers the typed AST to a flat list of quadruples.
//!
//! Quad operand conventions used throughout this module (none of this is
//! enforced by the type system, so it is written down once here):
//!   ADD/SUB/MUL/DIV/MOD/AND/OR  (a1, a2, _, dest)
//!   NEG/NOT/ASSIGN/COPY         (src, _, _, dest)
//!   LT/LE/GT/GE/EQ/NE           (a1, a2, _, dest)      -- dest is boolean
//!   GOTO                        (_, _, _, label)
//!   IF_FALSE / IF_TRUE          (cond, _, _, label)
//!   LABEL                       (_, _, _, label)
//!   PARAM                       (value, _, _, _)        -- one per argument, emitted left to right, immediately before the CALL/CALL_METHOD it belongs to; a method call's receiver is itself emitted as the first PARAM, ahead of its explicit arguments, so it lands in the same argument-register slot 0 as any other call's first argument
//!   CALL                        (func_name, arg_count, dest)  -- arg_count includes the implicit __env param for a closure call; dest is Value::None for a void call
//!   CALL_METHOD                 (receiver, method_name, dest)  -- receiver is repeated here for dispatch bookkeeping; its register placement already happened via the leading PARAM
//!   RETURN                      (value, _, _, _)         -- value is Value::None for a void return
//!   BEGIN_FUNC / END_FUNC       (_, _, _, func_name)
//!   ARRAY_NEW                   (length, _, _, dest)
//!   ARRAY_LOAD                  (array, index, _, dest)
//!   ARRAY_STORE                 (array, index, value)    -- written to a1, a2, res respectively
//!   NEW                         (class_name, _, _, dest)
//!   GET_FIELD                   (object, field_name, _, dest)
//!   SET_FIELD                   (object, field_name, value)
//!   PRINT                       (value, _, _, _)
//!
//! Closures are flattened: a nested function that
//! is captured-from (per `capture_analysis::CaptureInfo`) has its captured
//! names backed by an environment record instead of plain locals. This
//! generator supports the common case the corpus of example programs
//! actually exercises -- a function directly capturing from its immediate
//! enclosing function -- rather than arbitrary multi-level capture chains;
//! see `DESIGN.md` for the reasoning.

use std::collections::{HashMap, HashSet};

use crate::ast::{
    BinaryOp, Block, ClassDecl, Expr, ExprKind, FunctionDecl, LogicalOp, Program, Stmt, UnaryOp,
};
use crate::capture_analysis::CaptureInfo;
use crate::quad::{LabelGen, Op, Quad, TempGen, Value};
use crate::symbols::SymbolTable;
use crate::types::{default_value, Type};
use crate::typechecker::{Analysis, TypeTable};

/// The function name used for the program's top-level statement list.
pub const MAIN_FUNCTION: &str = "main";

/// The emitted function name for a (possibly class-owned) declared
/// function, shared between this module and the backend so both mangle
/// method names identically.
pub fn mangled_function_name(name: &str, owner_class: Option<&str>) -> String {
    match owner_class {
        Some(c) => format!("{}_{}", c, name),
        None => name.to_string(),
    }
}

/// The declared parameter name list of every function/method in `program`,
/// keyed by its mangled emitted name, with `__env` prepended for functions
/// the closure rewrite turned into environment-taking closures. The
/// backend's stack-frame layer needs this to assign argument registers and
/// stack offsets by name.
pub fn function_param_names(program: &Program, closure_functions: &HashSet<String>) -> HashMap<String, Vec<String>> {
    let mut out = HashMap::new();
    for stmt in &program.statements {
        match stmt {
            Stmt::Function(f) => collect_param_names(f, None, closure_functions, &mut out),
            Stmt::Class(c) => {
                for m in &c.methods {
                    collect_param_names(m, Some(&c.name), closure_functions, &mut out);
                }
            }
            _ => {}
        }
    }
    out.insert(MAIN_FUNCTION.to_string(), Vec::new());
    out
}

fn collect_param_names(
    f: &FunctionDecl,
    owner_class: Option<&str>,
    closure_functions: &HashSet<String>,
    out: &mut HashMap<String, Vec<String>>,
) {
    let mangled = mangled_function_name(&f.name, owner_class);
    let mut names = Vec::new();
    if owner_class.is_none() && closure_functions.contains(&f.name) {
        names.push("__env".to_string());
    }
    names.extend(f.params.iter().map(|p| p.name.clone()));
    out.insert(mangled, names);

    for stmt in &f.body.0 {
        collect_nested_param_names(stmt, closure_functions, out);
    }
}

fn collect_nested_param_names(stmt: &Stmt, closure_functions: &HashSet<String>, out: &mut HashMap<String, Vec<String>>) {
    match stmt {
        Stmt::Function(f) => collect_param_names(f, None, closure_functions, out),
        Stmt::Block(b) => {
            for s in &b.0 {
                collect_nested_param_names(s, closure_functions, out);
            }
        }
        Stmt::If { then_branch, else_branch, .. } => {
            for s in &then_branch.0 {
                collect_nested_param_names(s, closure_functions, out);
            }
            if let Some(e) = else_branch {
                for s in &e.0 {
                    collect_nested_param_names(s, closure_functions, out);
                }
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::For { body, .. } | Stmt::Foreach { body, .. } => {
            for s in &body.0 {
                collect_nested_param_names(s, closure_functions, out);
            }
        }
        _ => {}
    }
}

/// The generated IR plus the field layout of every synthetic environment
/// record the closure rewrite introduced (`class_name -> ordered field
/// names`), since those classes exist only in the IR, not in the symbol
/// table the parser/analyzer built.
pub struct IrProgram {
    pub quads: Vec<Quad>,
    pub env_layouts: HashMap<String, Vec<String>>,
    /// Names of functions rewritten to take an implicit `__env` record as
    /// their first parameter, ahead of their declared parameter list.
    pub closure_functions: HashSet<String>,
}

pub fn generate(program: &Program, analysis: &Analysis, captures: &CaptureInfo, zero_fill_new_fields: bool) -> IrProgram {
    let mut gen = IrGen {
        symbols: &analysis.symbols,
        types: &analysis.types,
        captures,
        temps: TempGen::new(),
        labels: LabelGen::new(),
        quads: Vec::new(),
        loop_stack: Vec::new(),
        func_ctx_stack: Vec::new(),
        env_layouts: HashMap::new(),
        closure_functions: HashSet::new(),
        zero_fill_new_fields,
    };

    for stmt in &program.statements {
        if let Stmt::Class(c) = stmt {
            gen.lower_class(c);
        }
    }
    for stmt in &program.statements {
        if let Stmt::Function(f) = stmt {
            gen.lower_function(f, None);
        }
    }
    gen.lower_main(program);

    IrProgram { quads: gen.quads, env_layouts: gen.env_layouts, closure_functions: gen.closure_functions }
}

struct LoopLabels {
    continue_label: String,
    break_label: String,
}

/// How a nested function and its enclosing function share captured state.
#[derive(Default, Clone)]
struct FuncCtx {
    /// Maps a captured variable's source name to the environment-record
    /// value it is now backed by, for functions that read/write it through
    /// `GET_FIELD`/`SET_FIELD` instead of a plain local.
    heap: HashMap<String, Value>,
}

struct IrGen<'a> {
    symbols: &'a SymbolTable,
    types: &'a TypeTable,
    captures: &'a CaptureInfo,
    temps: TempGen,
    labels: LabelGen,
    quads: Vec<Quad>,
    loop_stack: Vec<LoopLabels>,
    func_ctx_stack: Vec<FuncCtx>,
    env_layouts: HashMap<String, Vec<String>>,
    closure_functions: HashSet<String>,
    zero_fill_new_fields: bool,
}

impl<'a> IrGen<'a> {
    fn emit(&mut self, op: Op, a1: Value, a2: Value, res: Value) {
        self.quads.push(Quad::new(op, a1, a2, res));
    }

    fn ctx(&self) -> &FuncCtx {
        self.func_ctx_stack.last().expect("lowering expression outside a function context")
    }

    fn lower_class(&mut self, c: &ClassDecl) {
        for m in &c.methods {
            self.lower_function(m, Some(&c.name));
        }
    }

    fn mangled_name(name: &str, owner_class: Option<&str>) -> String {
        mangled_function_name(name, owner_class)
    }

    /// Names nested directly in `body` that a directly-nested function
    /// captures from `f` -- these must be promoted to `f`'s own
    /// environment record so the nested function can reach them.
    fn owned_capture_names(&self, body: &Block) -> Vec<String> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        for stmt in &body.0 {
            if let Stmt::Function(nested) = stmt {
                for captured in self.captures.captures_of(&nested.name) {
                    if seen.insert(captured.clone()) {
                        names.push(captured.clone());
                    }
                }
            }
        }
        names
    }

    fn lower_function(&mut self, f: &FunctionDecl, owner_class: Option<&str>) {
        let name = Self::mangled_name(&f.name, owner_class);
        self.emit(Op::BeginFunc, Value::None, Value::None, Value::Label(name.clone()));
        self.temps.end_statement();

        let is_closure = owner_class.is_none() && self.captures.is_closure(&f.name);
        let owned_names = self.owned_capture_names(&f.body);

        let mut ctx = FuncCtx::default();
        if is_closure {
            self.closure_functions.insert(f.name.clone());
            for captured in self.captures.captures_of(&f.name) {
                ctx.heap.insert(captured.clone(), Value::Var("__env".to_string()));
            }
        } else if !owned_names.is_empty() {
            let env_class = format!("__Env_{}", f.name);
            self.emit(Op::New, Value::Str(env_class.clone()), Value::None, Value::Var("__env".to_string()));
            for n in &owned_names {
                ctx.heap.insert(n.clone(), Value::Var("__env".to_string()));
            }
            self.env_layouts.insert(env_class, owned_names.clone());
        }
        self.func_ctx_stack.push(ctx);

        for stmt in &f.body.0 {
            self.lower_stmt(stmt);
        }

        let implicit_void_return = !matches!(f.body.0.last(), Some(Stmt::Return { .. }));
        if implicit_void_return {
            self.emit(Op::Return, Value::None, Value::None, Value::None);
        }

        self.func_ctx_stack.pop();
        self.emit(Op::EndFunc, Value::None, Value::None, Value::Label(name));
    }

    fn lower_main(&mut self, program: &Program) {
        self.emit(Op::BeginFunc, Value::None, Value::None, Value::Label(MAIN_FUNCTION.to_string()));
        self.func_ctx_stack.push(FuncCtx::default());
        for stmt in &program.statements {
            match stmt {
                Stmt::Function(_) | Stmt::Class(_) => {}
                other => self.lower_stmt(other),
            }
        }
        self.func_ctx_stack.pop();
        self.emit(Op::Return, Value::None, Value::None, Value::None);
        self.emit(Op::EndFunc, Value::None, Value::None, Value::Label(MAIN_FUNCTION.to_string()));
    }

    fn lower_block(&mut self, block: &Block) {
        for stmt in &block.0 {
            self.lower_stmt(stmt);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => {
                self.lower_expr(e);
            }
            Stmt::VarDecl(v) => {
                let value = match &v.init {
                    Some(init) => self.lower_expr(init),
                    None => {
                        let ty = self.symbols.resolve(&v.name).map(|s| s.ty.clone()).unwrap_or(Type::Error);
                        Value::from_literal(&default_value(&ty))
                    }
                };
                self.store_name(&v.name, value);
            }
            Stmt::Block(b) => self.lower_block(b),
            Stmt::If { cond, then_branch, else_branch, .. } => self.lower_if(cond, then_branch, else_branch.as_ref()),
            Stmt::While { cond, body, .. } => self.lower_while(cond, body),
            Stmt::DoWhile { body, cond, .. } => self.lower_do_while(body, cond),
            Stmt::For { init, cond, update, body, .. } => self.lower_for(init.as_deref(), cond.as_ref(), update.as_ref(), body),
            Stmt::Foreach { var_name, iterable, body, .. } => self.lower_foreach(var_name, iterable, body),
            Stmt::Return { value, .. } => {
                let v = value.as_ref().map(|e| self.lower_expr(e)).unwrap_or(Value::None);
                self.emit(Op::Return, v, Value::None, Value::None);
            }
            Stmt::Break(_) => {
                let label = self.loop_stack.last().expect("break outside a loop").break_label.clone();
                self.emit(Op::Goto, Value::None, Value::None, Value::Label(label));
            }
            Stmt::Continue(_) => {
                let label = self.loop_stack.last().expect("continue outside a loop").continue_label.clone();
                self.emit(Op::Goto, Value::None, Value::None, Value::Label(label));
            }
            Stmt::Print(e, _) => {
                let v = self.lower_expr(e);
                self.emit(Op::Print, v, Value::None, Value::None);
            }
            Stmt::Function(f) => self.lower_function(f, None),
            Stmt::Class(_) => {}
        }
        self.temps.end_statement();
    }

    fn lower_if(&mut self, cond: &Expr, then_branch: &Block, else_branch: Option<&Block>) {
        let cond_val = self.lower_expr(cond);
        let end_label = self.labels.new_label("IF_END");
        match else_branch {
            None => {
                self.emit(Op::IfFalse, cond_val, Value::None, Value::Label(end_label.clone()));
                self.lower_block(then_branch);
                self.emit(Op::Label, Value::None, Value::None, Value::Label(end_label));
            }
            Some(else_block) => {
                let else_label = self.labels.new_label("ELSE");
                self.emit(Op::IfFalse, cond_val, Value::None, Value::Label(else_label.clone()));
                self.lower_block(then_branch);
                self.emit(Op::Goto, Value::None, Value::None, Value::Label(end_label.clone()));
                self.emit(Op::Label, Value::None, Value::None, Value::Label(else_label));
                self.lower_block(else_block);
                self.emit(Op::Label, Value::None, Value::None, Value::Label(end_label));
            }
        }
    }

    fn lower_while(&mut self, cond: &Expr, body: &Block) {
        let start_label = self.labels.new_label("WHILE");
        let end_label = self.labels.new_label("WHILE_END");
        self.emit(Op::Label, Value::None, Value::None, Value::Label(start_label.clone()));
        let cond_val = self.lower_expr(cond);
        self.emit(Op::IfFalse, cond_val, Value::None, Value::Label(end_label.clone()));
        self.loop_stack.push(LoopLabels { continue_label: start_label.clone(), break_label: end_label.clone() });
        self.lower_block(body);
        self.loop_stack.pop();
        self.emit(Op::Goto, Value::None, Value::None, Value::Label(start_label));
        self.emit(Op::Label, Value::None, Value::None, Value::Label(end_label));
    }

    fn lower_do_while(&mut self, body: &Block, cond: &Expr) {
        let start_label = self.labels.new_label("DOWHILE");
        let continue_label = self.labels.new_label("DOWHILE_COND");
        let end_label = self.labels.new_label("DOWHILE_END");
        self.emit(Op::Label, Value::None, Value::None, Value::Label(start_label.clone()));
        self.loop_stack.push(LoopLabels { continue_label: continue_label.clone(), break_label: end_label.clone() });
        self.lower_block(body);
        self.loop_stack.pop();
        self.emit(Op::Label, Value::None, Value::None, Value::Label(continue_label));
        let cond_val = self.lower_expr(cond);
        self.emit(Op::IfTrue, cond_val, Value::None, Value::Label(start_label));
        self.emit(Op::Label, Value::None, Value::None, Value::Label(end_label));
    }

    fn lower_for(&mut self, init: Option<&Stmt>, cond: Option<&Expr>, update: Option<&Expr>, body: &Block) {
        if let Some(init) = init {
            self.lower_stmt(init);
        }
        let start_label = self.labels.new_label("FOR");
        let continue_label = self.labels.new_label("FOR_STEP");
        let end_label = self.labels.new_label("FOR_END");
        self.emit(Op::Label, Value::None, Value::None, Value::Label(start_label.clone()));
        if let Some(cond) = cond {
            let cond_val = self.lower_expr(cond);
            self.emit(Op::IfFalse, cond_val, Value::None, Value::Label(end_label.clone()));
        }
        self.loop_stack.push(LoopLabels { continue_label: continue_label.clone(), break_label: end_label.clone() });
        self.lower_block(body);
        self.loop_stack.pop();
        self.emit(Op::Label, Value::None, Value::None, Value::Label(continue_label));
        if let Some(update) = update {
            self.lower_expr(update);
        }
        self.emit(Op::Goto, Value::None, Value::None, Value::Label(start_label));
        self.emit(Op::Label, Value::None, Value::None, Value::Label(end_label));
    }

    fn lower_foreach(&mut self, var_name: &str, iterable: &Expr, body: &Block) {
        let array_val = self.lower_expr(iterable);
        let idx = self.temps.new_temp();
        self.emit(Op::Assign, Value::Int(0), Value::None, Value::Temp(idx.clone()));
        let len = self.temps.new_temp();
        self.emit(Op::GetField, array_val.clone(), Value::Str("length".to_string()), Value::Temp(len.clone()));

        let start_label = self.labels.new_label("FOREACH");
        let continue_label = self.labels.new_label("FOREACH_STEP");
        let end_label = self.labels.new_label("FOREACH_END");
        self.emit(Op::Label, Value::None, Value::None, Value::Label(start_label.clone()));
        let cmp = self.temps.new_temp();
        self.emit(Op::Lt, Value::Temp(idx.clone()), Value::Temp(len.clone()), Value::Temp(cmp.clone()));
        self.emit(Op::IfFalse, Value::Temp(cmp), Value::None, Value::Label(end_label.clone()));

        let elem = self.temps.new_temp();
        self.emit(Op::ArrayLoad, array_val, Value::Temp(idx.clone()), Value::Temp(elem.clone()));
        self.store_name(var_name, Value::Temp(elem));

        self.loop_stack.push(LoopLabels { continue_label: continue_label.clone(), break_label: end_label.clone() });
        self.lower_block(body);
        self.loop_stack.pop();
        self.emit(Op::Label, Value::None, Value::None, Value::Label(continue_label));
        self.emit(Op::Add, Value::Temp(idx.clone()), Value::Int(1), Value::Temp(idx.clone()));
        self.emit(Op::Goto, Value::None, Value::None, Value::Label(start_label));
        self.emit(Op::Label, Value::None, Value::None, Value::Label(end_label));
    }

    /// Writes `value` into `name`, routing through the environment record
    /// if `name` has been promoted to heap storage.
    fn store_name(&mut self, name: &str, value: Value) {
        if let Some(env) = self.ctx().heap.get(name).cloned() {
            self.emit(Op::SetField, env, Value::Str(name.to_string()), value);
        } else {
            self.emit(Op::Assign, value, Value::None, Value::Var(name.to_string()));
        }
    }

    /// Reads `name` as a value, routing through the environment record if
    /// promoted to heap storage.
    fn load_name(&mut self, name: &str) -> Value {
        if let Some(env) = self.ctx().heap.get(name).cloned() {
            let dest = self.temps.new_temp();
            self.emit(Op::GetField, env, Value::Str(name.to_string()), Value::Temp(dest.clone()));
            Value::Temp(dest)
        } else {
            Value::Var(name.to_string())
        }
    }

    fn lower_expr(&mut self, expr: &Expr) -> Value {
        match &expr.kind {
            ExprKind::Literal(lit) => Value::from_literal(lit),
            ExprKind::This => Value::Var("this".to_string()),
            ExprKind::Ident(name) => self.load_name(name),
            ExprKind::Unary { op, operand } => {
                let v = self.lower_expr(operand);
                let dest = self.temps.new_temp();
                let quad_op = match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                };
                self.emit(quad_op, v, Value::None, Value::Temp(dest.clone()));
                Value::Temp(dest)
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.lower_expr(left);
                let r = self.lower_expr(right);
                let dest = self.temps.new_temp();
                self.emit(binary_op(*op), l, r, Value::Temp(dest.clone()));
                Value::Temp(dest)
            }
            ExprKind::Logical { op, left, right } => self.lower_logical(*op, left, right),
            ExprKind::Ternary { cond, then_expr, else_expr } => self.lower_ternary(cond, then_expr, else_expr),
            ExprKind::Assign { target, value } => self.lower_assign(target, value),
            ExprKind::Call { callee, args } => self.lower_call(callee, args),
            ExprKind::MethodCall { receiver, method, args } => self.lower_method_call(receiver, method, args, expr),
            ExprKind::FieldAccess { receiver, field } => {
                let recv = self.lower_expr(receiver);
                let dest = self.temps.new_temp();
                self.emit(Op::GetField, recv, Value::Str(field.clone()), Value::Temp(dest.clone()));
                Value::Temp(dest)
            }
            ExprKind::Index { array, index } => {
                let a = self.lower_expr(array);
                let i = self.lower_expr(index);
                let dest = self.temps.new_temp();
                self.emit(Op::ArrayLoad, a, i, Value::Temp(dest.clone()));
                Value::Temp(dest)
            }
            ExprKind::ArrayLiteral { elements } => self.lower_array_literal(elements),
            ExprKind::New { class_name } => self.lower_new(class_name),
        }
    }

    /// Short-circuit evaluation: `&&`/`||` branch around the right operand
    /// rather than always evaluating both sides.
    fn lower_logical(&mut self, op: LogicalOp, left: &Expr, right: &Expr) -> Value {
        let dest = self.temps.new_temp();
        let l = self.lower_expr(left);
        self.emit(Op::Assign, l.clone(), Value::None, Value::Temp(dest.clone()));
        match op {
            LogicalOp::And => {
                let end_label = self.labels.new_label("AND");
                self.emit(Op::IfFalse, Value::Temp(dest.clone()), Value::None, Value::Label(end_label.clone()));
                let r = self.lower_expr(right);
                self.emit(Op::Assign, r, Value::None, Value::Temp(dest.clone()));
                self.emit(Op::Label, Value::None, Value::None, Value::Label(end_label));
            }
            LogicalOp::Or => {
                let end_label = self.labels.new_label("OR");
                self.emit(Op::IfTrue, Value::Temp(dest.clone()), Value::None, Value::Label(end_label.clone()));
                let r = self.lower_expr(right);
                self.emit(Op::Assign, r, Value::None, Value::Temp(dest.clone()));
                self.emit(Op::Label, Value::None, Value::None, Value::Label(end_label));
            }
        }
        Value::Temp(dest)
    }

    fn lower_ternary(&mut self, cond: &Expr, then_expr: &Expr, else_expr: &Expr) -> Value {
        let dest = self.temps.new_temp();
        let cond_val = self.lower_expr(cond);
        let else_label = self.labels.new_label("TERN");
        let end_label = self.labels.new_label("TERN_END");
        self.emit(Op::IfFalse, cond_val, Value::None, Value::Label(else_label.clone()));
        let then_val = self.lower_expr(then_expr);
        self.emit(Op::Assign, then_val, Value::None, Value::Temp(dest.clone()));
        self.emit(Op::Goto, Value::None, Value::None, Value::Label(end_label.clone()));
        self.emit(Op::Label, Value::None, Value::None, Value::Label(else_label));
        let else_val = self.lower_expr(else_expr);
        self.emit(Op::Assign, else_val, Value::None, Value::Temp(dest.clone()));
        self.emit(Op::Label, Value::None, Value::None, Value::Label(end_label));
        Value::Temp(dest)
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr) -> Value {
        let v = self.lower_expr(value);
        match &target.kind {
            ExprKind::Ident(name) => {
                self.store_name(name, v.clone());
            }
            ExprKind::FieldAccess { receiver, field } => {
                let recv = self.lower_expr(receiver);
                self.emit(Op::SetField, recv, Value::Str(field.clone()), v.clone());
            }
            ExprKind::Index { array, index } => {
                let a = self.lower_expr(array);
                let i = self.lower_expr(index);
                self.emit(Op::ArrayStore, a, i, v.clone());
            }
            other => panic!("invalid assignment target reached irgen: {:?}", other),
        }
        v
    }

    fn lower_call(&mut self, callee: &str, args: &[Expr]) -> Value {
        let arg_vals: Vec<Value> = args.iter().map(|a| self.lower_expr(a)).collect();
        let is_closure = self.captures.is_closure(callee);
        if is_closure {
            self.emit(Op::Param, Value::Var("__env".to_string()), Value::None, Value::None);
        }
        let arg_count = arg_vals.len() + if is_closure { 1 } else { 0 };
        for v in arg_vals {
            self.emit(Op::Param, v, Value::None, Value::None);
        }
        let is_void = self.symbols.resolve(callee).map(|s| matches!(&s.ty, Type::Function { ret, .. } if **ret == Type::Void)).unwrap_or(false);
        let dest = if is_void { Value::None } else { Value::Temp(self.temps.new_temp()) };
        self.emit(Op::Call, Value::Label(callee.to_string()), Value::Int(arg_count as i64), dest.clone());
        dest
    }

    fn lower_method_call(&mut self, receiver: &Expr, method: &str, args: &[Expr], call_expr: &Expr) -> Value {
        let recv = self.lower_expr(receiver);
        self.emit(Op::Param, recv.clone(), Value::None, Value::None);
        for a in args {
            let v = self.lower_expr(a);
            self.emit(Op::Param, v, Value::None, Value::None);
        }
        let is_void = *self.types.get(call_expr.id) == Type::Void;
        let dest = if is_void { Value::None } else { Value::Temp(self.temps.new_temp()) };
        self.emit(Op::CallMethod, recv, Value::Str(method.to_string()), dest.clone());
        dest
    }

    fn lower_array_literal(&mut self, elements: &[Expr]) -> Value {
        let dest = self.temps.new_temp();
        self.emit(Op::ArrayNew, Value::Int(elements.len() as i64), Value::None, Value::Temp(dest.clone()));
        for (i, e) in elements.iter().enumerate() {
            let v = self.lower_expr(e);
            self.emit(Op::ArrayStore, Value::Temp(dest.clone()), Value::Int(i as i64), v);
        }
        Value::Temp(dest)
    }

    fn lower_new(&mut self, class_name: &str) -> Value {
        let dest = self.temps.new_temp();
        self.emit(Op::New, Value::Str(class_name.to_string()), Value::None, Value::Temp(dest.clone()));
        if self.zero_fill_new_fields {
            if let Some(class) = self.symbols.classes.get(class_name) {
                let fields = class.fields.clone();
                for field in fields {
                    let default = Value::from_literal(&default_value(&field.ty));
                    self.emit(Op::SetField, Value::Temp(dest.clone()), Value::Str(field.name.clone()), default);
                }
            }
        }
        Value::Temp(dest)
    }
}

fn binary_op(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Mod => Op::Mod,
        BinaryOp::Lt => Op::Lt,
        BinaryOp::Le => Op::Le,
        BinaryOp::Gt => Op::Gt,
        BinaryOp::Ge => Op::Ge,
        BinaryOp::Eq => Op::Eq,
        BinaryOp::Ne => Op::Ne,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture_analysis;
    use crate::parser::Parser;
    use crate::typechecker;

    fn compile(src: &str) -> IrProgram {
        let program = Parser::new(src).unwrap().parse().unwrap();
        let analysis = typechecker::analyze(&program).unwrap();
        let captures = capture_analysis::analyze_program(&program);
        generate(&program, &analysis, &captures, true)
    }

    #[test]
    fn every_function_is_bracketed_by_begin_and_end_func() {
        let ir = compile("function f(): void {}");
        let begins = ir.quads.iter().filter(|q| q.op == Op::BeginFunc).count();
        let ends = ir.quads.iter().filter(|q| q.op == Op::EndFunc).count();
        assert_eq!(begins, ends);
        assert!(begins >= 2); // f, plus the implicit main
    }

    #[test]
    fn while_loop_lowers_to_label_condition_and_backward_goto() {
        let ir = compile("let i: integer = 0; while (i < 3) { i = i + 1; }");
        assert!(ir.quads.iter().any(|q| q.op == Op::Lt));
        assert!(ir.quads.iter().any(|q| q.op == Op::IfFalse));
        assert!(ir.quads.iter().any(|q| q.op == Op::Goto));
    }

    #[test]
    fn short_circuit_and_skips_right_operand_label() {
        let ir = compile("function f(a: boolean, b: boolean): boolean { return a && b; }");
        assert!(ir.quads.iter().any(|q| matches!(&q.res, Value::Label(l) if l.starts_with("L_AND_"))));
    }

    #[test]
    fn break_and_continue_jump_to_loop_labels() {
        let ir = compile("while (true) { break; continue; }");
        let gotos: Vec<_> = ir.quads.iter().filter(|q| q.op == Op::Goto).collect();
        assert!(gotos.len() >= 2);
    }

    #[test]
    fn closure_capturing_enclosing_variable_reads_through_environment_record() {
        let ir = compile(
            "function outer(): integer { let total: integer = 0; function inner(x: integer): void { total = total + x; } inner(5); return total; }",
        );
        assert!(ir.quads.iter().any(|q| q.op == Op::New && matches!(&q.a1, Value::Str(s) if s == "__Env_outer")));
        assert!(ir.quads.iter().any(|q| q.op == Op::SetField));
        assert!(ir.env_layouts.contains_key("__Env_outer"));
        assert_eq!(ir.env_layouts["__Env_outer"], vec!["total".to_string()]);
    }

    #[test]
    fn new_zero_fills_fields_with_no_initializer() {
        let ir = compile("class P { var x: integer; } let p = new P();");
        assert!(ir.quads.iter().any(|q| q.op == Op::SetField && matches!(&q.a2, Value::Str(f) if f == "x")));
    }

    #[test]
    fn array_literal_allocates_then_stores_each_element() {
        let ir = compile("let a: integer[] = [1, 2, 3];");
        assert!(ir.quads.iter().any(|q| q.op == Op::ArrayNew));
        assert_eq!(ir.quads.iter().filter(|q| q.op == Op::ArrayStore).count(), 3);
    }

    #[test]
    fn method_call_passes_receiver_and_explicit_args_separately() {
        let ir = compile(
            "class P { function add(n: integer): integer { return n; } } let p = new P(); print(p.add(3));",
        );
        assert!(ir.quads.iter().any(|q| q.op == Op::CallMethod));
    }

    #[test]
    fn method_call_emits_receiver_as_the_leading_param() {
        let ir = compile(
            "class P { function add(n: integer): integer { return n; } } let p = new P(); print(p.add(3));",
        );
        let call_idx = ir.quads.iter().position(|q| q.op == Op::CallMethod).unwrap();
        let params_before: Vec<_> = ir.quads[..call_idx].iter().rev().take_while(|q| q.op == Op::Param).collect();
        assert_eq!(params_before.len(), 2);
    }

    #[test]
    fn call_quad_carries_its_argument_count() {
        let ir = compile("function f(a: integer, b: integer): void {} f(1, 2);");
        let call = ir.quads.iter().find(|q| q.op == Op::Call).unwrap();
        assert_eq!(call.a2, Value::Int(2));
    }

    #[test]
    fn closure_call_argument_count_includes_the_implicit_env() {
        let ir = compile(
            "function outer(): integer { let total: integer = 0; function inner(x: integer): void { total = total + x; } inner(5); return total; }",
        );
        let call = ir.quads.iter().find(|q| q.op == Op::Call && matches!(&q.a1, Value::Label(l) if l == "inner")).unwrap();
        assert_eq!(call.a2, Value::Int(2));
    }
}
