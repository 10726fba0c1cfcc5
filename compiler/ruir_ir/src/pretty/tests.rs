use pretty_assertions::assert_eq;
use ruir_ast::{ident, StaticScope};

use crate::instr::Instr;
use crate::operand::Operand;
use crate::scope::{ArgDescriptor, ArgKind, IrScope, ScopeKind, ScopeTree};
use crate::variable::Variable;

#[test]
fn dump_of_small_method() {
    let mut tree = ScopeTree::new();
    let m = tree.add(IrScope::new(
        ScopeKind::Method { instance: true },
        ident("m"),
        ident("t.rb"),
        1,
        None,
        StaticScope::new(),
    ));
    let x = tree.local_variable(m, &ident("x"), 0);
    let scope = &mut tree[m];
    scope.add_arg_descriptor(ArgDescriptor::named(ArgKind::Req, &ident("x")));
    scope.add_instr(Instr::ReceivePreReqdArg {
        result: Variable::from(x.clone()),
        index: 0,
    });
    scope.add_instr(Instr::Return(Operand::from(Variable::from(x))));
    tree.compute_scope_flags(m);

    let expected = "\
InstanceMethod m [t.rb:1]
  flags:
  locals: x
  params: req:x
    0  x = recv_pre_reqd_arg(0)
    1  return(x)
";
    assert_eq!(tree.dump(m).to_string(), expected);
}

#[test]
fn dump_nests_children() {
    let mut tree = ScopeTree::new();
    let script = tree.add(IrScope::new(
        ScopeKind::Script {
            begin_blocks: Vec::new(),
        },
        ident("t.rb"),
        ident("t.rb"),
        0,
        None,
        StaticScope::new(),
    ));
    tree.add(IrScope::new(
        ScopeKind::ModuleBody,
        ident("M"),
        ident("t.rb"),
        2,
        Some(script),
        StaticScope::new(),
    ));
    let text = tree.dump(script).to_string();
    assert!(text.starts_with("ScriptBody t.rb [t.rb:0]\n"));
    assert!(text.contains("\n  ModuleBody M [t.rb:2]\n"));
}
