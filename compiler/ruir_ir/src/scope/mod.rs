//! IR scopes and the scope tree.
//!
//! Every lexical unit (script, eval, method, block, `for` body, class,
//! metaclass and module body) is one [`IrScope`] record whose behaviour
//! differs only through its [`ScopeKind`]. Scopes live in a [`ScopeTree`]
//! arena and refer to each other by [`ScopeId`]; the lexical-parent link is
//! a plain back-reference.
//!
//! # Frames
//!
//! A `for` body is a scope of its own (it has instructions and labels) but
//! shares the variable frame of its parent. Lookups and depth computations
//! skip over it as if it were not there.

use std::ops::{Index, IndexMut};

use ruir_ast::{ident, Ident, StaticScope};
use rustc_hash::FxHashMap;

use crate::flags::ScopeFlags;
use crate::instr::Instr;
use crate::label::Label;
use crate::variable::{LocalVariable, TempKind, TemporaryVariable};

mod descriptor;

pub use descriptor::{ArgDescriptor, ArgKind};

// ── Scope IDs ───────────────────────────────────────────────────────

/// Index of a scope in its [`ScopeTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ScopeId(u32);

impl ScopeId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        ScopeId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Scope kinds ─────────────────────────────────────────────────────

/// Payload shared by block and `for`-body scopes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClosureInfo {
    /// Number assigned by the lexical parent, unique among its closures.
    pub closure_id: u32,
    pub is_lambda: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    /// Top of a compiled file. `BEGIN {}` bodies register here.
    Script { begin_blocks: Vec<ScopeId> },
    EvalScript,
    /// `def m` (instance) or `def obj.m` (singleton).
    Method { instance: bool },
    Closure(ClosureInfo),
    For(ClosureInfo),
    ClassBody,
    MetaClassBody,
    ModuleBody,
}

impl ScopeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ScopeKind::Script { .. } => "ScriptBody",
            ScopeKind::EvalScript => "EvalScript",
            ScopeKind::Method { instance: true } => "InstanceMethod",
            ScopeKind::Method { instance: false } => "ClassMethod",
            ScopeKind::Closure(_) => "Closure",
            ScopeKind::For(_) => "For",
            ScopeKind::ClassBody => "ClassBody",
            ScopeKind::MetaClassBody => "MetaClassBody",
            ScopeKind::ModuleBody => "ModuleBody",
        }
    }

    #[inline]
    pub fn is_closure(&self) -> bool {
        matches!(self, ScopeKind::Closure(_) | ScopeKind::For(_))
    }

    #[inline]
    pub fn is_for(&self) -> bool {
        matches!(self, ScopeKind::For(_))
    }

    #[inline]
    pub fn is_method(&self) -> bool {
        matches!(self, ScopeKind::Method { .. })
    }

    #[inline]
    pub fn is_lambda(&self) -> bool {
        matches!(self, ScopeKind::Closure(info) if info.is_lambda)
    }

    #[inline]
    pub fn is_eval(&self) -> bool {
        matches!(self, ScopeKind::EvalScript)
    }

    #[inline]
    pub fn is_script(&self) -> bool {
        matches!(self, ScopeKind::Script { .. })
    }

    /// Class, metaclass or module body.
    #[inline]
    pub fn is_module_body(&self) -> bool {
        matches!(
            self,
            ScopeKind::ClassBody | ScopeKind::MetaClassBody | ScopeKind::ModuleBody
        )
    }

    /// Flip-flop state can be hosted here. Closures cannot host it.
    #[inline]
    pub fn is_flip_scope(&self) -> bool {
        !self.is_closure()
    }

    /// Owns a variable frame that lookups never walk past.
    #[inline]
    pub fn is_top_local_variable_scope(&self) -> bool {
        !self.is_closure()
    }

    /// Class variables resolve against this body's own module.
    #[inline]
    pub fn is_non_singleton_class_body(&self) -> bool {
        matches!(
            self,
            ScopeKind::ClassBody | ScopeKind::ModuleBody | ScopeKind::Script { .. }
        )
    }

    /// Statically knows which module it is nested in.
    #[inline]
    pub fn is_module_referencing(&self) -> bool {
        self.is_module_body() || self.is_script()
    }

    /// Binding reachable from anywhere (eval and top-level script).
    #[inline]
    pub fn binding_always_escapes(&self) -> bool {
        matches!(self, ScopeKind::EvalScript | ScopeKind::Script { .. })
    }

    #[inline]
    pub fn closure_id(&self) -> Option<u32> {
        match self {
            ScopeKind::Closure(info) | ScopeKind::For(info) => Some(info.closure_id),
            _ => None,
        }
    }
}

// ── IrScope ─────────────────────────────────────────────────────────

/// Temporaries allocated so far, per counter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct TempCounts {
    /// Shared by local, boolean, closure and current-module/scope temps.
    pub general: u32,
    pub float: u32,
    pub fixnum: u32,
}

/// One lexical unit and everything built for it.
#[derive(Clone, Debug)]
pub struct IrScope {
    pub kind: ScopeKind,
    pub name: Ident,
    pub file: Ident,
    pub line: u32,
    pub parent: Option<ScopeId>,
    pub static_scope: StaticScope,
    instrs: Vec<Instr>,
    pub(crate) flags: ScopeFlags,
    pub(crate) flags_computed: bool,
    local_vars: FxHashMap<Ident, LocalVariable>,
    temps: TempCounts,
    prefix_counters: FxHashMap<Ident, u32>,
    pub(crate) nested_closures: Vec<ScopeId>,
    lexical_children: Vec<ScopeId>,
    current_module: Option<TemporaryVariable>,
    current_scope: Option<TemporaryVariable>,
    thread_poll_count: u32,
    next_closure_id: u32,
    arg_descriptors: Vec<ArgDescriptor>,
}

impl IrScope {
    pub fn new(
        kind: ScopeKind,
        name: Ident,
        file: Ident,
        line: u32,
        parent: Option<ScopeId>,
        mut static_scope: StaticScope,
    ) -> Self {
        static_scope.set_scope_type(kind.tag());
        IrScope {
            kind,
            name,
            file,
            line,
            parent,
            static_scope,
            instrs: Vec::new(),
            flags: ScopeFlags::CONSERVATIVE,
            flags_computed: false,
            local_vars: FxHashMap::default(),
            temps: TempCounts::default(),
            prefix_counters: FxHashMap::default(),
            nested_closures: Vec::new(),
            lexical_children: Vec::new(),
            current_module: None,
            current_scope: None,
            thread_poll_count: 0,
            next_closure_id: 0,
            arg_descriptors: Vec::new(),
        }
    }

    // Instructions

    #[inline]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Append `instr`, folding its flag contribution in incrementally.
    /// Returns its index.
    pub fn add_instr(&mut self, instr: Instr) -> usize {
        if matches!(instr, Instr::ThreadPoll) {
            self.thread_poll_count += 1;
        }
        instr.compute_scope_flags(&mut self.flags);
        self.instrs.push(instr);
        self.instrs.len() - 1
    }

    /// Insert `instr` ahead of everything built so far.
    pub fn prepend_instr(&mut self, instr: Instr) {
        instr.compute_scope_flags(&mut self.flags);
        self.instrs.insert(0, instr);
    }

    /// Replace the whole instruction list. Computed flags become stale.
    pub fn replace_instrs(&mut self, instrs: Vec<Instr>) {
        self.instrs = instrs;
        self.thread_poll_count = count_thread_polls(&self.instrs);
        self.flags_computed = false;
    }

    #[inline]
    pub fn thread_poll_count(&self) -> u32 {
        self.thread_poll_count
    }

    // Labels and prefixed names

    /// Next number for `prefix`; labels and synthetic names share the map.
    pub fn next_prefixed_index(&mut self, prefix: &str) -> u32 {
        let counter = self.prefix_counters.entry(ident(prefix)).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    pub fn new_label(&mut self, prefix: &str) -> Label {
        let id = self.next_prefixed_index(prefix);
        Label::new(ident(prefix), id)
    }

    pub fn new_default_label(&mut self) -> Label {
        self.new_label(Label::DEFAULT_PREFIX)
    }

    // Temporaries

    /// Kind handed out for ordinary scratch slots in this scope.
    pub fn general_temp_kind(&self) -> TempKind {
        match self.kind.closure_id() {
            Some(closure_id) => TempKind::Closure { closure_id },
            None => TempKind::Local,
        }
    }

    /// Next index of `kind`'s counter.
    pub fn new_temp_index(&mut self, kind: TempKind) -> u32 {
        let counter = match kind {
            TempKind::Float => &mut self.temps.float,
            TempKind::Fixnum => &mut self.temps.fixnum,
            _ => &mut self.temps.general,
        };
        let index = *counter;
        *counter += 1;
        index
    }

    pub fn new_temporary(&mut self, kind: TempKind) -> TemporaryVariable {
        TemporaryVariable::new(kind, self.new_temp_index(kind))
    }

    #[inline]
    pub fn temp_counts(&self) -> TempCounts {
        self.temps
    }

    /// `%current_module`, allocated on first use.
    pub fn current_module_variable(&mut self) -> TemporaryVariable {
        if let Some(tv) = self.current_module {
            return tv;
        }
        let tv = self.new_temporary(TempKind::CurrentModule);
        self.current_module = Some(tv);
        tv
    }

    /// `%current_scope`, allocated on first use.
    pub fn current_scope_variable(&mut self) -> TemporaryVariable {
        if let Some(tv) = self.current_scope {
            return tv;
        }
        let tv = self.new_temporary(TempKind::CurrentScope);
        self.current_scope = Some(tv);
        tv
    }

    // Locals

    #[inline]
    pub fn find_local(&self, name: &str) -> Option<&LocalVariable> {
        self.local_vars.get(name)
    }

    /// Locals owned by this scope, in slot order.
    pub fn local_variables(&self) -> Vec<&LocalVariable> {
        let mut vars: Vec<_> = self.local_vars.values().collect();
        vars.sort_by_key(|v| (v.depth, v.slot));
        vars
    }

    /// Bind `name` in this scope. `depth` is non-zero only for eval scopes,
    /// whose outer frames belong to the caller's binding.
    pub fn new_local_variable(&mut self, name: Ident, depth: u32) -> LocalVariable {
        debug_assert!(
            depth == 0 || self.kind.is_eval(),
            "non-zero depth local `{name}` requested in {}",
            self.kind.tag()
        );
        let slot = self.static_scope.add_variable(&name);
        let var = LocalVariable::new(name.clone(), depth, slot);
        self.local_vars.insert(name, var.clone());
        var
    }

    // Tree links

    #[inline]
    pub fn nested_closures(&self) -> &[ScopeId] {
        &self.nested_closures
    }

    #[inline]
    pub fn lexical_children(&self) -> &[ScopeId] {
        &self.lexical_children
    }

    pub fn next_closure_id(&mut self) -> u32 {
        let id = self.next_closure_id;
        self.next_closure_id += 1;
        id
    }

    // Flags

    #[inline]
    pub fn flags(&self) -> ScopeFlags {
        self.flags
    }

    #[inline]
    pub fn flags_computed(&self) -> bool {
        self.flags_computed
    }

    #[inline]
    pub fn has_flag(&self, flag: ScopeFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Record a fact the builder knows directly (loops, explicit call
    /// protocol, keyword receipt).
    pub fn set_flag(&mut self, flag: ScopeFlags) {
        self.flags.insert(flag);
    }

    /// Forget computed flags; the next computation rescans.
    pub fn invalidate_flags(&mut self) {
        self.flags_computed = false;
    }

    // Arguments

    #[inline]
    pub fn arg_descriptors(&self) -> &[ArgDescriptor] {
        &self.arg_descriptors
    }

    pub fn add_arg_descriptor(&mut self, descriptor: ArgDescriptor) {
        self.arg_descriptors.push(descriptor);
    }

    /// `BEGIN {}` bodies registered on a script root.
    pub fn begin_blocks(&self) -> &[ScopeId] {
        match &self.kind {
            ScopeKind::Script { begin_blocks } => begin_blocks,
            _ => &[],
        }
    }
}

fn count_thread_polls(instrs: &[Instr]) -> u32 {
    let mut n = 0;
    for instr in instrs {
        if matches!(instr, Instr::ThreadPoll) {
            n += 1;
        }
    }
    n
}

// ── ScopeTree ───────────────────────────────────────────────────────

/// Arena owning every scope of one compilation unit.
#[derive(Clone, Debug, Default)]
pub struct ScopeTree {
    scopes: Vec<IrScope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `scope` and link it under its lexical parent.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "scope counts are bounded far below u32::MAX"
    )]
    pub fn add(&mut self, scope: IrScope) -> ScopeId {
        let id = ScopeId::new(self.scopes.len() as u32);
        let parent = scope.parent;
        let is_closure = scope.kind.is_closure();
        self.scopes.push(scope);
        if let Some(parent) = parent {
            let p = &mut self[parent];
            p.lexical_children.push(id);
            if is_closure {
                p.nested_closures.push(id);
            }
        }
        tracing::trace!(scope = id.raw(), kind = self[id].kind.tag(), "added scope");
        id
    }

    /// Register a `BEGIN {}` body on the script root `script`.
    pub fn add_begin_block(&mut self, script: ScopeId, body: ScopeId) {
        if let ScopeKind::Script { begin_blocks } = &mut self[script].kind {
            begin_blocks.push(body);
        }
    }

    #[inline]
    pub fn get(&self, id: ScopeId) -> Option<&IrScope> {
        self.scopes.get(id.index())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// First scope added; the unit's root.
    #[inline]
    pub fn root(&self) -> Option<ScopeId> {
        if self.scopes.is_empty() {
            None
        } else {
            Some(ScopeId::new(0))
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "scope counts are bounded far below u32::MAX"
    )]
    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, &IrScope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, s)| (ScopeId::new(i as u32), s))
    }

    /// `id` followed by each lexical ancestor, innermost first.
    pub fn ancestors(&self, id: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(id), move |&s| self[s].parent)
    }

    // Nearest-scope lookups

    pub fn nearest_method(&self, id: ScopeId) -> Option<ScopeId> {
        self.ancestors(id).find(|&s| self[s].kind.is_method())
    }

    /// Nearest non-closure; every chain ends in one.
    pub fn nearest_flip_scope(&self, id: ScopeId) -> ScopeId {
        self.ancestors(id)
            .find(|&s| self[s].kind.is_flip_scope())
            .unwrap_or(id)
    }

    pub fn nearest_top_local_variable_scope(&self, id: ScopeId) -> ScopeId {
        self.ancestors(id)
            .find(|&s| self[s].kind.is_top_local_variable_scope())
            .unwrap_or(id)
    }

    /// Frame distance to the nearest scope that statically knows its
    /// module. `None` when an eval intervenes (its module is dynamic).
    pub fn nearest_module_referencing_depth(&self, id: ScopeId) -> Option<u32> {
        let mut depth = 0;
        for s in self.ancestors(id) {
            let kind = &self[s].kind;
            if kind.is_module_referencing() {
                return Some(depth);
            }
            if kind.is_eval() {
                return None;
            }
            if !kind.is_for() {
                depth += 1;
            }
        }
        None
    }

    pub fn top_level_scope(&self, id: ScopeId) -> ScopeId {
        self.ancestors(id).last().unwrap_or(id)
    }

    /// Nearest scope (inclusive) that owns a variable frame.
    pub fn frame_owner(&self, id: ScopeId) -> ScopeId {
        self.ancestors(id)
            .find(|&s| !self[s].kind.is_for())
            .unwrap_or(id)
    }

    /// Frames between `from` and its ancestor `to`.
    pub fn frame_depth(&self, from: ScopeId, to: ScopeId) -> u32 {
        let mut depth = 0;
        for s in self.ancestors(from) {
            if s == to {
                break;
            }
            if !self[s].kind.is_for() {
                depth += 1;
            }
        }
        depth
    }

    // Variables

    /// The local `name` as seen from `id`, `depth` frames up.
    ///
    /// Searches outward from the requesting frame so inner bindings shadow
    /// outer ones, never walking past a non-closure. A variable found
    /// nearer than `depth` is returned re-tagged with its real distance;
    /// an unbound name is created in the outermost frame reached.
    pub fn local_variable(&mut self, id: ScopeId, name: &Ident, depth: u32) -> LocalVariable {
        let mut cur = self.frame_owner(id);
        let mut remaining = depth;
        loop {
            if let Some(v) = self[cur].find_local(name) {
                return v.clone_for_depth(depth - remaining + v.depth);
            }
            if remaining == 0 || !self[cur].kind.is_closure() {
                break;
            }
            match self[cur].parent {
                Some(p) => {
                    cur = self.frame_owner(p);
                    remaining -= 1;
                }
                None => break,
            }
        }
        let created = self[cur].new_local_variable(name.clone(), remaining);
        created.clone_for_depth(depth)
    }

    /// Fresh flip-flop state local, hosted on the nearest flip scope and
    /// viewed from `id`. Also returns the host so the caller can initialise
    /// the state there.
    pub fn new_flip_variable(&mut self, id: ScopeId) -> (ScopeId, LocalVariable) {
        let host = self.nearest_flip_scope(id);
        let n = self[host].next_prefixed_index("%flip");
        let state = self[host].new_local_variable(ident(&format!("%flip_{n}")), 0);
        let depth = self.frame_depth(id, host);
        (host, state.clone_for_depth(depth))
    }

    // Cloning

    /// Deep-copy scope `src` (with its whole subtree) as a new child of
    /// `host`. Counters travel with the copy; closures get a fresh id from
    /// `host` and references between copied scopes are rewired.
    pub fn clone_scope(&mut self, src: ScopeId, host: ScopeId) -> ScopeId {
        let mut copy = self[src].clone();
        copy.parent = Some(host);
        copy.nested_closures.clear();
        copy.lexical_children.clear();
        if let ScopeKind::Closure(info) | ScopeKind::For(info) = &mut copy.kind {
            info.closure_id = self[host].next_closure_id();
        }
        let new_id = self.add(copy);

        let children = self[src].lexical_children.clone();
        let mut renamed = FxHashMap::default();
        for child in children {
            let copied = self.clone_scope(child, new_id);
            renamed.insert(child, copied);
        }
        if !renamed.is_empty() {
            for instr in &mut self[new_id].instrs {
                instr.remap_scopes(&mut |s| renamed.get(&s).copied().unwrap_or(s));
            }
        }
        tracing::debug!(
            from = src.raw(),
            to = new_id.raw(),
            host = host.raw(),
            "cloned scope"
        );
        new_id
    }
}

impl Index<ScopeId> for ScopeTree {
    type Output = IrScope;

    #[inline]
    fn index(&self, id: ScopeId) -> &IrScope {
        &self.scopes[id.index()]
    }
}

impl IndexMut<ScopeId> for ScopeTree {
    #[inline]
    fn index_mut(&mut self, id: ScopeId) -> &mut IrScope {
        &mut self.scopes[id.index()]
    }
}

#[cfg(test)]
mod tests;
