use pretty_assertions::assert_eq;
use ruir_ast::ident;
use smallvec::smallvec;

use super::*;
use crate::variable::{LocalVariable, TemporaryVariable};

fn temp(i: u32) -> Variable {
    TemporaryVariable::local(i).into()
}

fn label(prefix: &str, id: u32) -> Label {
    Label::new(ident(prefix), id)
}

fn closure_op(id: u32) -> Operand {
    Operand::WrappedClosure {
        self_value: Box::new(Operand::self_value()),
        closure: ScopeId::new(id),
    }
}

fn call_with_block(block: Option<Operand>) -> Instr {
    Instr::Call(Box::new(CallInstr {
        result: temp(0),
        kind: CallKind::Normal,
        name: ident("each"),
        receiver: temp(1).into(),
        args: smallvec![Operand::Fixnum(1)],
        closure: block,
        proc_new: false,
        potentially_refined: false,
    }))
}

#[test]
fn markers_are_book_keeping() {
    for instr in [
        Instr::Label(label("L", 0)),
        Instr::ExceptionRegionStart {
            rescue: label("R", 0),
        },
        Instr::ExceptionRegionEnd,
        Instr::LineNumber(3),
    ] {
        let op = instr.op();
        assert!(op.is_book_keeping(), "{op:?}");
        assert!(!op.has_side_effects(), "{op:?}");
        assert!(!op.transfers_control(), "{op:?}");
    }
}

#[test]
fn control_transfers_are_declared() {
    assert!(Operation::Jump.transfers_control());
    assert!(Operation::Beq.transfers_control());
    assert!(Operation::Return.transfers_control());
    assert!(Operation::ThrowException.can_raise());
    assert!(Operation::Break.transfers_control());
    assert!(!Operation::Copy.transfers_control());
}

#[test]
fn calls_are_calls() {
    let op = call_with_block(None).op();
    assert!(op.is_call());
    assert!(op.can_raise());
    assert!(op.has_side_effects());
    assert!(Operation::Yield.is_call());
    assert!(!Operation::Copy.is_call());
}

#[test]
fn arg_receipt_is_flagged() {
    assert!(Operation::ReceivePreReqdArg.is_arg_receive());
    assert!(Operation::ReceiveRubyException.is_arg_receive());
    assert!(!Operation::CheckArity.is_arg_receive());
}

#[test]
fn result_of_call_and_store() {
    assert_eq!(call_with_block(None).result(), Some(&temp(0)));
    let store = Instr::PutField {
        object: Operand::self_value(),
        name: ident("@a"),
        value: Operand::Nil,
    };
    assert_eq!(store.result(), None);
}

#[test]
fn operands_include_receiver_args_and_closure() {
    let instr = call_with_block(Some(closure_op(2)));
    let mut seen = Vec::new();
    instr.for_each_operand(&mut |op| seen.push(op.to_string()));
    assert_eq!(seen, vec!["%v_1", "Fixnum:1", "%self:closure#2"]);
    assert_eq!(instr.closures().to_vec(), vec![ScopeId::new(2)]);
    assert_eq!(instr.call_closure(), Some(&closure_op(2)));
}

#[test]
fn labels_can_be_renamed() {
    let mut instr = Instr::beq(Operand::Nil, Operand::Boolean(true), label("L", 0));
    for l in instr.labels_mut() {
        *l = label("L", 7);
    }
    assert_eq!(instr.to_string(), "beq(nil, true, L_7)");
}

#[test]
fn remap_scopes_covers_definitions() {
    let mut def = Instr::DefineInstanceMethod(ScopeId::new(1));
    def.remap_scopes(&mut |s| ScopeId::new(s.raw() + 1));
    assert_eq!(def, Instr::DefineInstanceMethod(ScopeId::new(2)));
    assert_eq!(def.referenced_scopes().to_vec(), vec![ScopeId::new(2)]);

    let mut call = call_with_block(Some(closure_op(4)));
    call.remap_scopes(&mut |_| ScopeId::new(9));
    assert_eq!(call.closures().to_vec(), vec![ScopeId::new(9)]);
}

#[test]
fn display_forms() {
    let x: Variable = LocalVariable::new(ident("x"), 0, 0).into();
    assert_eq!(Instr::Label(label("_LOOP_END", 1)).to_string(), "_LOOP_END_1:");
    assert_eq!(
        Instr::copy(x.clone(), Operand::Fixnum(1)).to_string(),
        "x = copy(Fixnum:1)"
    );
    assert_eq!(Instr::Return(x.into()).to_string(), "return(x)");
    assert_eq!(
        call_with_block(None).to_string(),
        "%v_0 = call(NORMAL, each, %v_1, Fixnum:1)"
    );
    assert_eq!(
        Instr::ReceivePreReqdArg {
            result: temp(0),
            index: 0
        }
        .to_string(),
        "%v_0 = recv_pre_reqd_arg(0)"
    );
    assert_eq!(
        Instr::ExceptionRegionStart {
            rescue: label("_RESCUE", 0)
        }
        .to_string(),
        "exc_region_start(_RESCUE_0)"
    );
    assert_eq!(
        Instr::ThrowException(Operand::LocalJumpError(crate::operand::JumpKind::Break))
            .to_string(),
        "throw(LocalJumpError:break)"
    );
}
