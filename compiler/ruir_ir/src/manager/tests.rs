#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use ruir_ast::{ident, StaticScope};

use super::*;
use crate::scope::{ClosureInfo, ScopeKind};

fn scope(kind: ScopeKind) -> IrScope {
    IrScope::new(kind, ident("s"), ident("t.rb"), 1, None, StaticScope::new())
}

#[test]
fn pool_grows_on_demand() {
    let pool = TempPool::new();
    assert!(pool.is_empty());
    assert_eq!(pool.get(3), TemporaryVariable::local(3));
    assert_eq!(pool.len(), 4);
    assert_eq!(pool.get(1), TemporaryVariable::local(1));
    assert_eq!(pool.len(), 4);
}

#[test]
fn concurrent_growth_is_consistent() {
    let pool = Arc::new(TempPool::new());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for i in 0..50 {
                    assert_eq!(pool.get(i * 4 + t).index, i * 4 + t);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(pool.len(), 200);
}

#[test]
fn temporaries_are_monotonic_per_scope() {
    let manager = IrManager::new();
    let mut s = scope(ScopeKind::Method { instance: true });
    let a = manager.new_temporary(&mut s);
    let b = manager.new_temporary(&mut s);
    let f = manager.new_typed_temporary(&mut s, TempKind::Float);
    assert_eq!(a.to_string(), "%v_0");
    assert_eq!(b.to_string(), "%v_1");
    assert_eq!(f.to_string(), "%f_0");
}

#[test]
fn closure_scopes_get_closure_temporaries() {
    let manager = IrManager::new();
    let mut s = scope(ScopeKind::Closure(ClosureInfo {
        closure_id: 3,
        is_lambda: false,
    }));
    assert_eq!(manager.new_temporary(&mut s).to_string(), "%cl_3_0");
}

#[test]
fn singletons() {
    let manager = IrManager::default();
    assert_eq!(manager.nil(), Operand::Nil);
    assert_eq!(manager.boolean(true), manager.true_value());
    assert_eq!(manager.boolean(false), Operand::Boolean(false));
    assert!(manager.listener().is_none());
}

#[test]
fn reset_clears_pool() {
    let manager = IrManager::new();
    manager.temp_pool().get(5);
    manager.reset();
    assert!(manager.temp_pool().is_empty());
}
