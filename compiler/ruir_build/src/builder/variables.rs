//! Variable reads and writes, constants, regexp matches and aliases.

use ruir_ast::{Ident, Node, NodeKind};
use ruir_ir::{Instr, Operand, Variable};

use super::Builder;
use crate::error::BuildResult;

impl Builder<'_> {
    // Locals

    pub(super) fn local_var(&mut self, name: &Ident, depth: u32) -> Variable {
        Variable::Local(self.tree.local_variable(self.scope, name, depth))
    }

    pub(super) fn build_local_var(&mut self, name: &Ident, depth: u32) -> Operand {
        Operand::Variable(self.local_var(name, depth))
    }

    /// The value of a local assignment is the assigned value.
    pub(super) fn build_local_asgn(
        &mut self,
        name: &Ident,
        depth: u32,
        value: &Node,
    ) -> BuildResult<Operand> {
        let var = self.local_var(name, depth);
        let value = self.build(value)?;
        if value.as_variable() != Some(&var) {
            self.add_instr(Instr::copy(var, value.clone()));
        }
        Ok(value)
    }

    // Instance and global variables

    pub(super) fn build_inst_var(&mut self, name: &Ident) -> Operand {
        let name = name.clone();
        Operand::Variable(self.emit_result(|result| Instr::GetField {
            result,
            object: Operand::self_value(),
            name,
        }))
    }

    pub(super) fn build_inst_asgn(&mut self, name: &Ident, value: &Node) -> BuildResult<Operand> {
        let value = self.build(value)?;
        self.add_instr(Instr::PutField {
            object: Operand::self_value(),
            name: name.clone(),
            value: value.clone(),
        });
        Ok(value)
    }

    pub(super) fn build_global_var(&mut self, name: &Ident) -> Operand {
        let name = name.clone();
        Operand::Variable(self.emit_result(|result| Instr::GetGlobalVariable { result, name }))
    }

    pub(super) fn build_global_asgn(&mut self, name: &Ident, value: &Node) -> BuildResult<Operand> {
        let value = self.build(value)?;
        self.add_instr(Instr::PutGlobalVar {
            name: name.clone(),
            value: value.clone(),
        });
        Ok(value)
    }

    // Class variables

    pub(super) fn build_class_var(&mut self, name: &Ident) -> Operand {
        let container = self.class_var_container(false);
        let name = name.clone();
        Operand::Variable(self.emit_result(|result| Instr::GetClassVariable {
            result,
            container,
            name,
        }))
    }

    /// `@@x = v`; a declaration (`decl`) sits directly in a class body.
    pub(super) fn build_class_var_asgn(
        &mut self,
        name: &Ident,
        value: &Node,
        decl: bool,
    ) -> BuildResult<Operand> {
        let value = self.build(value)?;
        let container = self.class_var_container(decl);
        self.add_instr(Instr::PutClassVariable {
            container,
            name: name.clone(),
            value: value.clone(),
        });
        Ok(value)
    }

    /// Module owning the class variables visible here. Known statically
    /// when a class or module body encloses this scope without an
    /// intervening eval; otherwise looked up at runtime, from `self` unless
    /// this is a declaration.
    pub(super) fn class_var_container(&mut self, decl: bool) -> Operand {
        let found = self.tree.ancestors(self.scope).find(|&s| {
            let kind = &self.tree[s].kind;
            kind.is_eval() || kind.is_non_singleton_class_body()
        });
        if let Some(owner) = found.filter(|&s| self.tree[s].kind.is_non_singleton_class_body()) {
            return Operand::ScopeModule(self.tree.frame_depth(self.scope, owner));
        }
        let start_scope = Operand::Variable(self.current_scope_var());
        let object = (!decl).then(Operand::self_value);
        Operand::Variable(self.emit_result(|result| Instr::GetClassVarContainerModule {
            result,
            start_scope,
            object,
        }))
    }

    // Constants

    /// Lexical scope a constant lookup starts from.
    pub(super) fn starting_search_scope(&mut self) -> Operand {
        match self.tree.nearest_module_referencing_depth(self.scope) {
            Some(depth) => Operand::CurrentScope(depth),
            None => Operand::Variable(self.current_scope_var()),
        }
    }

    /// Module that receives constant and method definitions made here.
    pub(super) fn find_container_module(&mut self) -> Operand {
        match self.tree.nearest_module_referencing_depth(self.scope) {
            Some(depth) => Operand::ScopeModule(depth),
            None => Operand::Variable(self.current_module_var()),
        }
    }

    pub(super) fn build_const(&mut self, name: &Ident) -> Operand {
        let start_scope = self.starting_search_scope();
        let name = name.clone();
        Operand::Variable(self.emit_result(|result| Instr::SearchConst {
            result,
            name,
            start_scope,
            no_private: false,
        }))
    }

    /// `A::B`. A path segment with no left side is a lexical lookup.
    pub(super) fn build_colon2(&mut self, left: Option<&Node>, name: &Ident) -> BuildResult<Operand> {
        let Some(left) = left else {
            return Ok(self.build_const(name));
        };
        let module = self.build(left)?;
        Ok(self.search_module_for_const(module, name))
    }

    pub(super) fn build_colon3(&mut self, name: &Ident) -> Operand {
        self.search_module_for_const(Operand::ObjectClass, name)
    }

    /// Inheritance lookup in `module`, falling back to `const_missing`.
    fn search_module_for_const(&mut self, module: Operand, name: &Ident) -> Operand {
        let found = self.new_label();
        let result = self.emit_result(|result| Instr::InheritanceSearchConst {
            result,
            module: module.clone(),
            name: name.clone(),
            no_private: true,
        });
        self.add_instr(Instr::bne(
            Operand::Variable(result.clone()),
            Operand::Undefined,
            found.clone(),
        ));
        self.add_instr(Instr::ConstMissing {
            result: result.clone(),
            module,
            name: name.clone(),
        });
        self.add_instr(Instr::Label(found));
        Operand::Variable(result)
    }

    pub(super) fn build_const_decl(
        &mut self,
        name: &Ident,
        path: Option<&Node>,
        value: &Node,
    ) -> BuildResult<Operand> {
        let value = self.build(value)?;
        self.put_constant(name, path, value.clone())?;
        Ok(value)
    }

    /// Store `value` as constant `name` in the module `path` designates.
    pub(super) fn put_constant(
        &mut self,
        name: &Ident,
        path: Option<&Node>,
        value: Operand,
    ) -> BuildResult<()> {
        let module = match path.map(|p| &p.kind) {
            Some(NodeKind::Colon2 {
                left: Some(left), ..
            }) => self.build(left)?,
            Some(NodeKind::Colon3(_)) => Operand::ObjectClass,
            _ => self.find_container_module(),
        };
        self.add_instr(Instr::PutConst {
            module,
            name: name.clone(),
            value,
        });
        Ok(())
    }

    // Regexp matches

    /// A bare regexp as a condition, matched against `$_`.
    pub(super) fn build_match(&mut self, regexp: &Node) -> BuildResult<Operand> {
        let receiver = self.build(regexp)?;
        Ok(Operand::Variable(
            self.emit_result(|result| Instr::Match { result, receiver }),
        ))
    }

    /// `/(?<x>…)/ =~ v`: named groups are assigned to locals after the match.
    pub(super) fn build_match2(
        &mut self,
        receiver: &Node,
        value: &Node,
        captures: &[Node],
    ) -> BuildResult<Operand> {
        let receiver = self.build(receiver)?;
        let value = self.build(value)?;
        let result = self.emit_result(|result| Instr::Match2 {
            result,
            receiver,
            value,
        });
        for capture in captures {
            let (NodeKind::LocalAsgn { name, depth, .. } | NodeKind::DAsgn { name, depth, .. }) =
                &capture.kind
            else {
                return Err(self.not_compilable(capture, "named capture target is not a local"));
            };
            let var = self.local_var(name, *depth);
            self.add_instr(Instr::SetCapturedVar {
                result: var,
                match_data: Operand::Variable(result.clone()),
                name: name.clone(),
            });
        }
        Ok(Operand::Variable(result))
    }

    pub(super) fn build_match3(&mut self, receiver: &Node, value: &Node) -> BuildResult<Operand> {
        let receiver = self.build(receiver)?;
        let value = self.build(value)?;
        Ok(Operand::Variable(self.emit_result(|result| Instr::Match3 {
            result,
            receiver,
            value,
        })))
    }

    // Aliases

    pub(super) fn build_alias(&mut self, new_name: &Node, old_name: &Node) -> BuildResult<Operand> {
        let new_name = self.build(new_name)?;
        let old_name = self.build(old_name)?;
        self.add_instr(Instr::Alias { new_name, old_name });
        Ok(self.manager.nil())
    }

    pub(super) fn build_valias(&mut self, new_name: &Ident, old_name: &Ident) -> Operand {
        self.add_instr(Instr::GVarAlias {
            new_name: Operand::StringLiteral(new_name.clone()),
            old_name: Operand::StringLiteral(old_name.clone()),
        });
        self.manager.nil()
    }

    pub(super) fn build_undef(&mut self, name: &Node) -> BuildResult<Operand> {
        let name = self.build(name)?;
        Ok(Operand::Variable(
            self.emit_result(|result| Instr::UndefMethod { result, name }),
        ))
    }
}
