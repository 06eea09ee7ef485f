//! Symbol table: nested lexical scopes, symbol kinds, and the class
//! registry.
//!
//! Scopes are held in an arena (`Vec<Scope>`) addressed by index rather than
//! by parent pointers, so the table owns its whole lifetime without
//! borrowing tricks; `enter_scope`/`exit_scope` just move the `current`
//! cursor, mirroring the push/pop discipline of the scope stack around
//! `crates/compiler/src/typechecker.rs`, pulled out here into its own
//! component.

use std::collections::HashMap;

use crate::ast::SourceLocation;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
    Class,
    Loop,
    Foreach,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
    Class,
    Field,
    Method,
}

#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub params: Vec<Type>,
    pub ret: Type,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
    pub offset: usize,
}

/// A class registered in the flat class registry. Methods are looked up by
/// name string rather than holding a direct pointer to their function
/// symbol, which keeps this struct (and the registry it lives in) free of
/// the class<->method<->class reference cycle a direct pointer would create.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub superclass: Option<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: HashMap<String, FunctionSig>,
    pub loc: SourceLocation,
}

impl ClassInfo {
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub loc: SourceLocation,
    /// Set for `SymbolKind::Function`/`Method`.
    pub signature: Option<FunctionSig>,
    /// Set for `SymbolKind::Method`: the owning class name.
    pub owner_class: Option<String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: Type, loc: SourceLocation) -> Self {
        Symbol {
            name: name.into(),
            kind,
            ty,
            loc,
            signature: None,
            owner_class: None,
        }
    }
}

struct Scope {
    kind: ScopeKind,
    parent: Option<usize>,
    symbols: HashMap<String, Symbol>,
    /// Name of the enclosing function, if any, for `current_function()`.
    function_name: Option<String>,
    /// Name of the enclosing class, if any, for `current_class()`/`this`.
    class_name: Option<String>,
}

pub struct SymbolTable {
    scopes: Vec<Scope>,
    current: usize,
    pub classes: HashMap<String, ClassInfo>,
    enter_count: u64,
    exit_count: u64,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let global = Scope {
            kind: ScopeKind::Global,
            parent: None,
            symbols: HashMap::new(),
            function_name: None,
            class_name: None,
        };
        SymbolTable {
            scopes: vec![global],
            current: 0,
            classes: HashMap::new(),
            enter_count: 0,
            exit_count: 0,
        }
    }

    pub fn enter_scope(&mut self, kind: ScopeKind) {
        let parent = self.current;
        let function_name = self.scopes[parent].function_name.clone();
        let class_name = self.scopes[parent].class_name.clone();
        self.scopes.push(Scope {
            kind,
            parent: Some(parent),
            symbols: HashMap::new(),
            function_name,
            class_name,
        });
        self.current = self.scopes.len() - 1;
        self.enter_count += 1;
    }

    /// Enter a function scope, overriding the carried-down `function_name`
    /// so `current_function()` reports the innermost function, not an
    /// enclosing one (relevant for nested function declarations).
    pub fn enter_function_scope(&mut self, name: &str) {
        self.enter_scope(ScopeKind::Function);
        self.scopes[self.current].function_name = Some(name.to_string());
    }

    pub fn enter_class_scope(&mut self, name: &str) {
        self.enter_scope(ScopeKind::Class);
        self.scopes[self.current].class_name = Some(name.to_string());
    }

    pub fn exit_scope(&mut self) {
        let parent = self.scopes[self.current]
            .parent
            .expect("exit_scope called with unbalanced enter_scope calls");
        self.current = parent;
        self.exit_count += 1;
    }

    /// True once every `enter_scope` has a matching `exit_scope` and the
    /// cursor is back at the global scope.
    pub fn is_balanced(&self) -> bool {
        self.enter_count == self.exit_count && self.current == 0
    }

    pub fn declare(&mut self, symbol: Symbol) -> Result<(), String> {
        let scope = &mut self.scopes[self.current];
        if scope.symbols.contains_key(&symbol.name) {
            return Err(format!("'{}' is already declared in this scope", symbol.name));
        }
        scope.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Walk the scope chain from the current scope to the root looking for
    /// `name`.
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        let mut idx = Some(self.current);
        while let Some(i) = idx {
            if let Some(sym) = self.scopes[i].symbols.get(name) {
                return Some(sym);
            }
            idx = self.scopes[i].parent;
        }
        None
    }

    pub fn resolve_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let mut idx = Some(self.current);
        while let Some(i) = idx {
            if self.scopes[i].symbols.contains_key(name) {
                return self.scopes[i].symbols.get_mut(name);
            }
            idx = self.scopes[i].parent;
        }
        None
    }

    /// Walk a class's inheritance chain looking for a field or method named
    /// `name`. Returns the class that actually declares it.
    pub fn resolve_member(&self, class_name: &str, name: &str) -> Option<(&ClassInfo, MemberKind)> {
        let mut current = self.classes.get(class_name);
        while let Some(class) = current {
            if let Some(field) = class.fields.iter().find(|f| f.name == name) {
                return Some((class, MemberKind::Field(field.clone())));
            }
            if let Some(sig) = class.methods.get(name) {
                return Some((class, MemberKind::Method(sig.clone())));
            }
            current = class.superclass.as_ref().and_then(|s| self.classes.get(s));
        }
        None
    }

    pub fn current_function(&self) -> Option<&str> {
        self.scopes[self.current].function_name.as_deref()
    }

    pub fn current_class(&self) -> Option<&str> {
        self.scopes[self.current].class_name.as_deref()
    }

    pub fn current_loop_depth(&self) -> usize {
        let mut idx = Some(self.current);
        let mut depth = 0;
        while let Some(i) = idx {
            if matches!(self.scopes[i].kind, ScopeKind::Loop | ScopeKind::Foreach) {
                depth += 1;
            }
            idx = self.scopes[i].parent;
        }
        depth
    }

    pub fn current_scope_kind(&self) -> ScopeKind {
        self.scopes[self.current].kind
    }
}

#[derive(Debug, Clone)]
pub enum MemberKind {
    Field(FieldInfo),
    Method(FunctionSig),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_across_scopes_is_allowed() {
        let mut table = SymbolTable::new();
        let loc = SourceLocation::default();
        table
            .declare(Symbol::new("x", SymbolKind::Variable, Type::Integer, loc))
            .unwrap();
        table.enter_scope(ScopeKind::Block);
        table
            .declare(Symbol::new("x", SymbolKind::Variable, Type::String, loc))
            .unwrap();
        assert_eq!(table.resolve("x").unwrap().ty, Type::String);
        table.exit_scope();
        assert_eq!(table.resolve("x").unwrap().ty, Type::Integer);
        assert!(table.is_balanced());
    }

    #[test]
    fn duplicate_in_same_scope_is_rejected() {
        let mut table = SymbolTable::new();
        let loc = SourceLocation::default();
        table
            .declare(Symbol::new("x", SymbolKind::Variable, Type::Integer, loc))
            .unwrap();
        let err = table.declare(Symbol::new("x", SymbolKind::Variable, Type::Integer, loc));
        assert!(err.is_err());
    }

    #[test]
    fn inherited_fields_and_overridden_methods_resolve_through_superclass() {
        let mut table = SymbolTable::new();
        let loc = SourceLocation::default();
        table.classes.insert(
            "Animal".to_string(),
            ClassInfo {
                name: "Animal".to_string(),
                superclass: None,
                fields: vec![FieldInfo {
                    name: "age".to_string(),
                    ty: Type::Integer,
                    offset: 0,
                }],
                methods: HashMap::new(),
                loc,
            },
        );
        table.classes.insert(
            "Dog".to_string(),
            ClassInfo {
                name: "Dog".to_string(),
                superclass: Some("Animal".to_string()),
                fields: vec![FieldInfo {
                    name: "breed".to_string(),
                    ty: Type::String,
                    offset: 1,
                }],
                methods: HashMap::new(),
                loc,
            },
        );
        let (owner, member) = table.resolve_member("Dog", "age").unwrap();
        assert_eq!(owner.name, "Animal");
        assert!(matches!(member, MemberKind::Field(_)));
        assert!(table.resolve_member("Dog", "nonexistent").is_none());
    }

    #[test]
    fn loop_depth_counts_nested_loop_scopes() {
        let mut table = SymbolTable::new();
        assert_eq!(table.current_loop_depth(), 0);
        table.enter_scope(ScopeKind::Loop);
        assert_eq!(table.current_loop_depth(), 1);
        table.enter_scope(ScopeKind::Block);
        assert_eq!(table.current_loop_depth(), 1);
        table.enter_scope(ScopeKind::Loop);
        assert_eq!(table.current_loop_depth(), 2);
    }
}
