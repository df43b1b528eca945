//! Lexical scopes for local variables.
//!
//! Scopes are stored in an arena ([`Scopes`]) owned by the module they belong
//! to, and refer to their parent by [`ScopeId`].

use std::{collections::HashMap, fmt};

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({})", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Symbol<T> {
    pub name: String,
    /// Position of the symbol in its table, in definition order.
    pub id: usize,
    pub value_type: T,
    pub mutable: bool,
}

/// An ordered table of named symbols.
#[derive(Clone, Debug)]
pub struct SymbolTable<T> {
    symbols: Vec<Symbol<T>>,
    mapping: HashMap<String, usize>,
}

impl<T> SymbolTable<T> {
    pub fn new() -> SymbolTable<T> {
        SymbolTable {
            symbols: Vec::new(),
            mapping: HashMap::new(),
        }
    }

    /// Defines a symbol.
    ///
    /// Redefining a name replaces its type and mutability, but keeps its id.
    pub fn define(&mut self, name: impl Into<String>, value_type: T, mutable: bool) -> &Symbol<T> {
        let name = name.into();
        let id = match self.mapping.get(&name) {
            Some(&id) => {
                let symbol = &mut self.symbols[id];
                symbol.value_type = value_type;
                symbol.mutable = mutable;
                id
            }
            None => {
                let id = self.symbols.len();
                self.mapping.insert(name.clone(), id);
                self.symbols.push(Symbol {
                    name,
                    id,
                    value_type,
                    mutable,
                });
                id
            }
        };
        &self.symbols[id]
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol<T>> {
        self.mapping.get(name).map(|&id| &self.symbols[id])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mapping.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol<T>> {
        self.symbols.iter()
    }
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        SymbolTable::new()
    }
}

#[derive(Clone, Debug)]
pub struct VariableScope<T> {
    pub table: SymbolTable<T>,
    pub parent: Option<ScopeId>,
}

/// The scope arena of a single module.
#[derive(Clone, Debug)]
pub struct Scopes<T> {
    scopes: Vec<VariableScope<T>>,
}

impl<T> Scopes<T> {
    pub fn new() -> Scopes<T> {
        Scopes { scopes: Vec::new() }
    }

    pub fn add(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(u32::try_from(self.scopes.len()).expect("too many scopes"));
        self.scopes.push(VariableScope {
            table: SymbolTable::new(),
            parent,
        });
        id
    }

    pub fn get(&self, id: ScopeId) -> &VariableScope<T> {
        &self.scopes[id.index()]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut VariableScope<T> {
        &mut self.scopes[id.index()]
    }

    pub fn define(
        &mut self,
        id: ScopeId,
        name: impl Into<String>,
        value_type: T,
        mutable: bool,
    ) -> &Symbol<T> {
        self.get_mut(id).table.define(name, value_type, mutable)
    }

    /// Looks up a symbol in the given scope only.
    pub fn lookup(&self, id: ScopeId, name: &str) -> Option<&Symbol<T>> {
        self.get(id).table.lookup(name)
    }

    /// Looks up a symbol in the parents of the given scope, nearest first.
    ///
    /// The scope itself is not searched.
    pub fn lookup_in_parents(&self, id: ScopeId, name: &str) -> Option<&Symbol<T>> {
        self.resolve_from(self.get(id).parent, 1, name)
            .map(|(_, symbol)| symbol)
    }

    /// Resolves a symbol starting at the given scope, returning the number of
    /// parents walked to find it.
    pub fn resolve(&self, id: ScopeId, name: &str) -> Option<(usize, &Symbol<T>)> {
        self.resolve_from(Some(id), 0, name)
    }

    fn resolve_from(
        &self,
        mut current: Option<ScopeId>,
        mut depth: usize,
        name: &str,
    ) -> Option<(usize, &Symbol<T>)> {
        while let Some(id) = current {
            let scope = self.get(id);
            if let Some(symbol) = scope.table.lookup(name) {
                return Some((depth, symbol));
            }
            current = scope.parent;
            depth += 1;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl<T> Default for Scopes<T> {
    fn default() -> Self {
        Scopes::new()
    }
}
