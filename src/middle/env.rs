//! The typing environment: a value namespace and a type namespace, each a
//! stack of lexical scopes.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::{
    frontend::intern::Symbol,
    index::simple_index,
    middle::{
        frame::FrameId,
        ir::{Label, Temp},
        ty::Type,
    },
};

simple_index! {
    /// Identifies a function entry in the analyzer's function arena
    pub struct FuncId;
}

#[derive(Debug, Clone)]
pub struct VarEntry {
    pub ty: Type,
    pub place: Temp,
    /// `for` induction variables can't be assigned to
    pub assignable: bool,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Symbol,
    pub ty: Type,
}

/// A call made from inside a function body, remembered for closure analysis
#[derive(Debug, Clone)]
pub struct Invoking {
    pub callee: FuncId,
    /// Names bound inside the caller at the call site
    pub locals: BTreeSet<Symbol>,
}

#[derive(Debug, Clone)]
pub struct FuncEntry {
    pub name: Symbol,
    pub params: Vec<Param>,
    /// Storage of each parameter inside the function, empty for externs
    pub formals: Vec<Temp>,
    pub result: Type,
    /// Where the function leaves its result, `None` for void functions
    pub result_place: Option<Temp>,
    pub label: Option<Label>,
    pub frame: Option<FrameId>,
    pub is_extern: bool,
    pub invokings: Vec<Invoking>,
    /// Variables of enclosing functions this function reads or writes, either
    /// directly or through the functions it calls
    pub foreigns: BTreeSet<Symbol>,
}

impl FuncEntry {
    pub fn new_extern(name: Symbol, params: Vec<Param>, result: Type) -> Self {
        Self {
            name,
            params,
            formals: Vec::new(),
            result,
            result_place: None,
            label: None,
            frame: None,
            is_extern: true,
            invokings: Vec::new(),
            foreigns: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ValueEntry {
    Variable(VarEntry),
    Function(FuncId),
}

#[derive(Debug)]
struct Scope<R> {
    bindings: HashMap<Symbol, R>,
    function_boundary: bool,
}

impl<R> Scope<R> {
    fn new(function_boundary: bool) -> Self {
        Self {
            bindings: HashMap::new(),
            function_boundary,
        }
    }
}

/// A stack of scopes within one namespace. The bottom (global) scope can't be
/// popped.
#[derive(Debug)]
pub struct ScopeStack<R> {
    scopes: Vec<Scope<R>>,
}

impl<R> Default for ScopeStack<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ScopeStack<R> {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(false)],
        }
    }

    /// Creates a new block scope
    pub fn begin_scope(&mut self) {
        self.scopes.push(Scope::new(false));
    }

    /// Creates the outermost scope of a function body
    pub fn begin_function_scope(&mut self) {
        self.scopes.push(Scope::new(true));
    }

    /// Destroys the current scope along with all of its bindings
    pub fn end_scope(&mut self) {
        assert!(
            self.scopes.len() > 1,
            "Attempted to pop a scope from the global context"
        );

        self.scopes.pop();
    }

    /// Adds a binding to the current (most nested) scope, shadowing any outer
    /// binding of the same name
    pub fn put(&mut self, name: Symbol, entry: R) {
        self.scopes
            .last_mut()
            .expect("the global scope is never popped")
            .bindings
            .insert(name, entry);
    }

    /// Traverses the scope stack from innermost to outermost looking for a
    /// binding
    pub fn get(&self, name: Symbol) -> Option<&R> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(&name))
    }

    /// Index of the scope holding the innermost binding of `name`
    fn depth_of(&self, name: Symbol) -> Option<usize> {
        self.scopes
            .iter()
            .rposition(|scope| scope.bindings.contains_key(&name))
    }

    /// Index of the innermost function scope, if we are inside a function
    fn innermost_boundary(&self) -> Option<usize> {
        self.scopes.iter().rposition(|scope| scope.function_boundary)
    }

    /// Whether `name` resolves to a binding outside of the innermost function
    pub fn is_foreign(&self, name: Symbol) -> bool {
        match (self.depth_of(name), self.innermost_boundary()) {
            (Some(depth), Some(boundary)) => depth < boundary,
            _ => false,
        }
    }

    /// Every name bound inside the innermost function
    pub fn locals(&self) -> BTreeSet<Symbol> {
        let start = self.innermost_boundary().unwrap_or(0);

        self.scopes[start..]
            .iter()
            .flat_map(|scope| scope.bindings.keys().copied())
            .collect()
    }
}

/// The two namespaces of the language
#[derive(Debug, Default)]
pub struct Env {
    pub values: ScopeStack<ValueEntry>,
    pub types: ScopeStack<Type>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_scope(&mut self) {
        self.values.begin_scope();
        self.types.begin_scope();
    }

    pub fn end_scope(&mut self) {
        self.values.end_scope();
        self.types.end_scope();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    #[test]
    fn inner_bindings_shadow_outer_ones() {
        let mut stack = ScopeStack::new();
        stack.put(sym("x"), 1);
        stack.begin_scope();
        stack.put(sym("x"), 2);

        assert_eq!(stack.get(sym("x")), Some(&2));

        stack.end_scope();
        assert_eq!(stack.get(sym("x")), Some(&1));
        assert_eq!(stack.get(sym("y")), None);
    }

    #[test]
    fn names_outside_the_function_are_foreign() {
        let mut stack = ScopeStack::new();
        stack.put(sym("global"), ());
        stack.begin_scope();
        stack.put(sym("outer"), ());

        // Nothing is foreign at the top level
        assert!(!stack.is_foreign(sym("outer")));

        stack.begin_function_scope();
        stack.put(sym("param"), ());
        stack.begin_scope();
        stack.put(sym("local"), ());

        assert!(stack.is_foreign(sym("global")));
        assert!(stack.is_foreign(sym("outer")));
        assert!(!stack.is_foreign(sym("param")));
        assert!(!stack.is_foreign(sym("local")));
        assert!(!stack.is_foreign(sym("missing")));

        assert_eq!(
            stack.locals(),
            BTreeSet::from([sym("param"), sym("local")])
        );

        // Shadowing an outer name makes it local again
        stack.put(sym("outer"), ());
        assert!(!stack.is_foreign(sym("outer")));
    }

    #[test]
    fn nested_functions_use_their_own_boundary() {
        let mut stack = ScopeStack::new();
        stack.begin_function_scope();
        stack.put(sym("a"), ());
        stack.begin_function_scope();
        stack.put(sym("b"), ());

        assert!(stack.is_foreign(sym("a")));
        assert!(!stack.is_foreign(sym("b")));

        stack.end_scope();
        assert!(!stack.is_foreign(sym("a")));
    }
}
