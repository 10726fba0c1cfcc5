//! Parser-side static scope descriptor.
//!
//! Each scope-introducing node (`def`, blocks, class bodies, …) carries one.
//! The builder treats it as opaque apart from slot allocation and the arity
//! it records after receiving arguments; the runtime's argument binder reads
//! the arity back later.

use rustc_hash::FxHashMap;

use crate::Ident;

/// Positional arity recorded by the builder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Arity {
    pub required: u32,
    pub optional: u32,
    pub rest: bool,
    pub keywords: u32,
    pub keyword_rest: bool,
}

/// Variable table of one lexical scope, as seen by the parser.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StaticScope {
    variables: Vec<Ident>,
    slots: FxHashMap<Ident, u32>,
    arity: Option<Arity>,
    scope_type: Option<&'static str>,
}

impl StaticScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate slots in order, as the parser would.
    pub fn with_variables(names: &[&str]) -> Self {
        let mut scope = Self::new();
        for name in names {
            scope.add_variable(&Ident::from(*name));
        }
        scope
    }

    /// Slot for `name`, allocating the next one if absent.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "a scope never declares u32::MAX variables"
    )]
    pub fn add_variable(&mut self, name: &Ident) -> u32 {
        if let Some(&slot) = self.slots.get(name) {
            return slot;
        }
        let slot = self.variables.len() as u32;
        self.variables.push(name.clone());
        self.slots.insert(name.clone(), slot);
        slot
    }

    #[inline]
    pub fn slot_of(&self, name: &str) -> Option<u32> {
        self.slots.get(name).copied()
    }

    #[inline]
    pub fn variables(&self) -> &[Ident] {
        &self.variables
    }

    #[inline]
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn set_arities(&mut self, required: u32, optional: u32, rest: bool) {
        let arity = self.arity.get_or_insert_with(Arity::default);
        arity.required = required;
        arity.optional = optional;
        arity.rest = rest;
    }

    pub fn set_keyword_arity(&mut self, keywords: u32, keyword_rest: bool) {
        let arity = self.arity.get_or_insert_with(Arity::default);
        arity.keywords = keywords;
        arity.keyword_rest = keyword_rest;
    }

    /// Arity, once the builder has received the scope's arguments.
    #[inline]
    pub fn arity(&self) -> Option<Arity> {
        self.arity
    }

    /// Tag of the IR scope built from this descriptor.
    pub fn set_scope_type(&mut self, tag: &'static str) {
        self.scope_type = Some(tag);
    }

    #[inline]
    pub fn scope_type(&self) -> Option<&'static str> {
        self.scope_type
    }
}
