//! Per-compilation-run context.
//!
//! An [`IrManager`] is created for one independent compilation run and
//! passed to every builder. It owns the shared literal singletons, the
//! temporary-variable pool and the optional [`BuildListener`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::listener::BuildListener;
use crate::operand::Operand;
use crate::scope::IrScope;
use crate::variable::{TempKind, TemporaryVariable, Variable};

// TempPool

/// Shared `%v_N` temporaries indexed by slot.
///
/// Reads of populated slots take the read lock only; growth is serialised
/// under the write lock.
#[derive(Default)]
pub struct TempPool {
    slots: RwLock<Vec<TemporaryVariable>>,
}

impl TempPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pooled general temporary for `index`, growing the pool if needed.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "pool length never exceeds the largest requested u32 index"
    )]
    pub fn get(&self, index: u32) -> TemporaryVariable {
        let i = index as usize;
        {
            let slots = self.slots.read();
            if let Some(&tv) = slots.get(i) {
                return tv;
            }
        }

        let mut slots = self.slots.write();
        // Double-check after acquiring write lock
        while slots.len() <= i {
            let next = slots.len() as u32;
            slots.push(TemporaryVariable::local(next));
        }
        tracing::trace!(size = slots.len(), "grew temporary pool");
        slots[i]
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    pub fn clear(&self) {
        self.slots.write().clear();
    }
}

// IrManager

pub struct IrManager {
    nil: Operand,
    true_value: Operand,
    false_value: Operand,
    temps: TempPool,
    listener: Option<Arc<dyn BuildListener>>,
}

impl IrManager {
    pub fn new() -> Self {
        IrManager {
            nil: Operand::Nil,
            true_value: Operand::Boolean(true),
            false_value: Operand::Boolean(false),
            temps: TempPool::new(),
            listener: None,
        }
    }

    pub fn with_listener(listener: Arc<dyn BuildListener>) -> Self {
        IrManager {
            listener: Some(listener),
            ..IrManager::new()
        }
    }

    #[inline]
    pub fn nil(&self) -> Operand {
        self.nil.clone()
    }

    #[inline]
    pub fn true_value(&self) -> Operand {
        self.true_value.clone()
    }

    #[inline]
    pub fn false_value(&self) -> Operand {
        self.false_value.clone()
    }

    #[inline]
    pub fn boolean(&self, b: bool) -> Operand {
        if b {
            self.true_value()
        } else {
            self.false_value()
        }
    }

    #[inline]
    pub fn temp_pool(&self) -> &TempPool {
        &self.temps
    }

    #[inline]
    pub fn listener(&self) -> Option<&dyn BuildListener> {
        self.listener.as_deref()
    }

    /// Fresh general temporary of `scope`.
    pub fn new_temporary(&self, scope: &mut IrScope) -> Variable {
        let kind = scope.general_temp_kind();
        self.new_typed_temporary(scope, kind)
    }

    /// Fresh temporary of `kind`. Plain locals come from the pool.
    pub fn new_typed_temporary(&self, scope: &mut IrScope, kind: TempKind) -> Variable {
        let index = scope.new_temp_index(kind);
        let tv = match kind {
            TempKind::Local => self.temps.get(index),
            _ => TemporaryVariable::new(kind, index),
        };
        Variable::Temp(tv)
    }

    /// Drop pooled state before an unrelated compilation run.
    pub fn reset(&self) {
        self.temps.clear();
    }
}

impl Default for IrManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IrManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrManager")
            .field("pooled_temps", &self.temps.len())
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests;
