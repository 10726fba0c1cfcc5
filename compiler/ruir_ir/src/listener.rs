//! Observer hook for tooling.

use ruir_ast::Node;

use crate::instr::Instr;
use crate::operand::Operand;
use crate::scope::IrScope;

/// Notified as the builder works. Purely a side channel: nothing a listener
/// does can change the instructions produced.
pub trait BuildListener: Send + Sync {
    /// Before `node` is built into `scope`.
    fn start_build(&self, _scope: &IrScope, _node: &Node) {}

    /// After `node` has been built; `result` is the value it produced.
    fn end_build(&self, _scope: &IrScope, _node: &Node, _result: &Operand) {}

    /// After `instr` was appended to `scope` at `index`.
    fn added_instr(&self, _scope: &IrScope, _instr: &Instr, _index: usize) {}
}
