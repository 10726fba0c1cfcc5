#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use pretty_assertions::assert_eq;
use ruir_ast::ident;

use super::*;
use crate::operand::Operand;

fn scope(kind: ScopeKind, name: &str, parent: Option<ScopeId>) -> IrScope {
    IrScope::new(kind, ident(name), ident("t.rb"), 1, parent, StaticScope::new())
}

fn closure(id: u32) -> ScopeKind {
    ScopeKind::Closure(ClosureInfo {
        closure_id: id,
        is_lambda: false,
    })
}

fn for_body(id: u32) -> ScopeKind {
    ScopeKind::For(ClosureInfo {
        closure_id: id,
        is_lambda: false,
    })
}

/// script > method m > block > block
fn nested_tree() -> (ScopeTree, [ScopeId; 4]) {
    let mut tree = ScopeTree::new();
    let script = tree.add(scope(
        ScopeKind::Script {
            begin_blocks: Vec::new(),
        },
        "t.rb",
        None,
    ));
    let method = tree.add(scope(ScopeKind::Method { instance: true }, "m", Some(script)));
    let id = tree[method].next_closure_id();
    let outer = tree.add(scope(closure(id), "m_CLOSURE_1", Some(method)));
    let id = tree[outer].next_closure_id();
    let inner = tree.add(scope(closure(id), "m_CLOSURE_2", Some(outer)));
    (tree, [script, method, outer, inner])
}

#[test]
fn labels_are_numbered_per_prefix() {
    let mut s = scope(ScopeKind::Method { instance: true }, "m", None);
    let a = s.new_label("_LOOP_END");
    let b = s.new_label("_LOOP_END");
    let c = s.new_default_label();
    assert_eq!(a.to_string(), "_LOOP_END_0");
    assert_eq!(b.to_string(), "_LOOP_END_1");
    assert_eq!(c.to_string(), "LBL_0");
}

#[test]
fn general_counter_is_shared_but_unboxed_counters_are_not() {
    let mut s = scope(ScopeKind::Method { instance: true }, "m", None);
    assert_eq!(s.new_temporary(TempKind::Local).index, 0);
    assert_eq!(s.new_temporary(TempKind::Boolean).index, 1);
    assert_eq!(s.new_temporary(TempKind::Float).index, 0);
    assert_eq!(s.new_temporary(TempKind::Fixnum).index, 0);
    let module = s.current_module_variable();
    assert_eq!(module.index, 2);
    assert_eq!(s.current_module_variable(), module);
    assert_eq!(
        s.temp_counts(),
        TempCounts {
            general: 3,
            float: 1,
            fixnum: 1
        }
    );
}

#[test]
fn closures_hand_out_closure_temporaries() {
    let s = scope(closure(4), "b", None);
    assert_eq!(s.general_temp_kind(), TempKind::Closure { closure_id: 4 });
    let m = scope(ScopeKind::Method { instance: true }, "m", None);
    assert_eq!(m.general_temp_kind(), TempKind::Local);
}

#[test]
fn closures_are_registered_as_nested() {
    let (tree, [script, method, outer, inner]) = nested_tree();
    assert_eq!(tree[script].lexical_children(), &[method]);
    assert!(tree[script].nested_closures().is_empty());
    assert_eq!(tree[method].nested_closures(), &[outer]);
    assert_eq!(tree[outer].nested_closures(), &[inner]);
}

#[test]
fn nearest_lookups() {
    let (tree, [script, method, _, inner]) = nested_tree();
    assert_eq!(tree.nearest_method(inner), Some(method));
    assert_eq!(tree.nearest_method(script), None);
    assert_eq!(tree.nearest_flip_scope(inner), method);
    assert_eq!(tree.nearest_top_local_variable_scope(inner), method);
    assert_eq!(tree.top_level_scope(inner), script);
    assert_eq!(tree.nearest_module_referencing_depth(inner), Some(3));
    assert_eq!(tree.frame_depth(inner, method), 2);
}

#[test]
fn module_reference_stops_at_eval() {
    let mut tree = ScopeTree::new();
    let eval = tree.add(scope(ScopeKind::EvalScript, "eval", None));
    let block = tree.add(scope(closure(0), "b", Some(eval)));
    assert_eq!(tree.nearest_module_referencing_depth(block), None);
}

#[test]
fn repeated_lookup_returns_same_slot() {
    let (mut tree, [_, method, _, _]) = nested_tree();
    let a = tree.local_variable(method, &ident("a"), 0);
    let b = tree.local_variable(method, &ident("b"), 0);
    let again = tree.local_variable(method, &ident("a"), 0);
    assert_eq!(a, again);
    assert!(!a.same_slot(&b));
}

#[test]
fn outer_local_is_viewed_at_requested_depth() {
    let (mut tree, [_, method, outer, inner]) = nested_tree();
    let x = tree.local_variable(method, &ident("x"), 0);
    let from_inner = tree.local_variable(inner, &ident("x"), 2);
    assert_eq!(from_inner.depth, 2);
    assert!(from_inner.same_slot(&x));
    let from_outer = tree.local_variable(outer, &ident("x"), 1);
    assert_eq!(from_outer.depth, 1);
}

#[test]
fn inner_binding_shadows_outer() {
    let (mut tree, [_, method, outer, _]) = nested_tree();
    tree.local_variable(method, &ident("x"), 0);
    let own = tree.local_variable(outer, &ident("x"), 0);
    assert_eq!(own.depth, 0);
    assert!(tree[outer].find_local("x").is_some());
}

#[test]
fn unbound_name_is_created_at_outermost_frame_reached() {
    let (mut tree, [_, method, _, inner]) = nested_tree();
    let y = tree.local_variable(inner, &ident("y"), 2);
    assert_eq!(y.depth, 2);
    assert!(tree[method].find_local("y").is_some());
}

#[test]
fn for_bodies_share_the_parent_frame() {
    let mut tree = ScopeTree::new();
    let method = tree.add(scope(ScopeKind::Method { instance: true }, "m", None));
    let body = tree.add(scope(for_body(0), "for", Some(method)));
    let i = tree.local_variable(body, &ident("i"), 0);
    assert_eq!(i.depth, 0);
    assert!(tree[method].find_local("i").is_some());
    assert!(tree[body].find_local("i").is_none());
    assert_eq!(tree.frame_depth(body, method), 0);
}

#[test]
fn flip_state_is_hosted_on_nearest_non_closure() {
    let (mut tree, [_, method, _, inner]) = nested_tree();
    let (host, state) = tree.new_flip_variable(inner);
    assert_eq!(host, method);
    assert_eq!(state.depth, 2);
    assert_eq!(&*state.name, "%flip_0");
    assert!(state.is_flip_state());
    let (_, second) = tree.new_flip_variable(method);
    assert_eq!(&*second.name, "%flip_1");
    assert_eq!(second.depth, 0);
}

#[test]
fn clone_scope_copies_counters_and_rewires_children() {
    let (mut tree, [_, method, outer, inner]) = nested_tree();
    tree[outer].new_temporary(TempKind::Closure { closure_id: 0 });
    tree[outer].add_instr(Instr::Copy {
        result: TemporaryVariable::local(0).into(),
        value: Operand::WrappedClosure {
            self_value: Box::new(Operand::self_value()),
            closure: inner,
        },
    });
    let copy = tree.clone_scope(outer, method);
    assert_ne!(copy, outer);
    assert_eq!(tree[copy].temp_counts().general, 1);
    assert_eq!(tree[copy].kind.closure_id(), Some(1));
    assert_eq!(tree[method].nested_closures(), &[outer, copy]);

    let copied_inner = tree[copy].lexical_children()[0];
    assert_ne!(copied_inner, inner);
    let referenced: Vec<_> = tree[copy].instrs()[0].referenced_scopes().to_vec();
    assert_eq!(referenced, vec![copied_inner]);
}

#[test]
fn add_instr_counts_thread_polls() {
    let mut s = scope(ScopeKind::Method { instance: true }, "m", None);
    s.add_instr(Instr::ThreadPoll);
    s.add_instr(Instr::ExceptionRegionEnd);
    s.add_instr(Instr::ThreadPoll);
    assert_eq!(s.thread_poll_count(), 2);
    assert_eq!(s.instrs().len(), 3);
}

#[test]
fn static_scope_is_tagged_with_kind() {
    let s = scope(ScopeKind::ModuleBody, "M", None);
    assert_eq!(s.static_scope.scope_type(), Some("ModuleBody"));
    assert!(s.kind.is_non_singleton_class_body());
    assert!(!ScopeKind::MetaClassBody.is_non_singleton_class_body());
}

#[test]
fn descriptor_display() {
    assert_eq!(
        ArgDescriptor::named(ArgKind::KeyReq, &ident("k")).to_string(),
        "keyreq:k"
    );
    assert_eq!(ArgDescriptor::new(ArgKind::Rest, None).to_string(), "rest");
}
