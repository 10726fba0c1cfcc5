//! Literal values and value constructors.
//!
//! Mutable literals (strings, arrays, hashes, regexps) are copied into a
//! fresh temporary so each evaluation yields its own object. Immutable ones
//! (numbers, symbols) are returned as operands directly.

use ruir_ast::{HashPair, Ident, Node, NodeKind, RegexpOptions};
use ruir_ir::{Instr, Operand, RuntimeHelper, Variable};
use smallvec::smallvec;

use super::dispatch::contains_variable_assignment;
use super::Builder;
use crate::error::BuildResult;

impl Builder<'_> {
    pub(super) fn build_str(&mut self, text: &Ident) -> Operand {
        self.copy_and_return_value(Operand::StringLiteral(text.clone()))
    }

    pub(super) fn build_regexp(&mut self, source: &Ident, options: RegexpOptions) -> Operand {
        self.copy_and_return_value(Operand::Regexp {
            source: source.clone(),
            options,
        })
    }

    pub(super) fn build_complex(&mut self, inner: &Node) -> BuildResult<Operand> {
        let value = self.build(inner)?;
        Ok(Operand::Complex(Box::new(value)))
    }

    pub(super) fn build_array(&mut self, node: &Node, elements: &[Node]) -> BuildResult<Operand> {
        let ordered = contains_variable_assignment(node);
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.build_with_order(element, ordered)?);
        }
        Ok(self.copy_and_return_value(Operand::Array(values)))
    }

    /// `[*a, b]` / `[*a, *b]`.
    pub(super) fn build_compound_array(
        &mut self,
        first: &Node,
        second: &Node,
        is_push: bool,
    ) -> BuildResult<Operand> {
        let first = self.build(first)?;
        let second = self.build(second)?;
        let result = self.emit_result(|result| Instr::BuildCompoundArray {
            result,
            first,
            second,
            is_push,
        });
        Ok(Operand::Variable(result))
    }

    /// Hash literal. `**splat` entries are merged in order by a runtime
    /// helper; plain pairs between splats are batched into one literal.
    pub(super) fn build_hash(&mut self, node: &Node, pairs: &[HashPair]) -> BuildResult<Operand> {
        let ordered = contains_variable_assignment(node);
        let mut pending: Vec<(Operand, Operand)> = Vec::new();
        let mut hash: Option<Variable> = None;

        for pair in pairs {
            let Some(key) = &pair.key else {
                let target = match hash.take() {
                    None => {
                        let batch = std::mem::take(&mut pending);
                        self.emit_result(|result| Instr::copy(result, Operand::Hash(batch)))
                    }
                    Some(target) => {
                        if !pending.is_empty() {
                            let batch = std::mem::take(&mut pending);
                            self.merge_kwargs(&target, Operand::Hash(batch));
                        }
                        target
                    }
                };
                let splat = self.build_with_order(&pair.value, ordered)?;
                self.merge_kwargs(&target, splat);
                hash = Some(target);
                continue;
            };
            let key = self.build_with_order(key, ordered)?;
            let value = self.build_with_order(&pair.value, ordered)?;
            pending.push((key, value));
        }

        match hash {
            None => Ok(self.copy_and_return_value(Operand::Hash(pending))),
            Some(target) => {
                if !pending.is_empty() {
                    self.merge_kwargs(&target, Operand::Hash(pending));
                }
                Ok(Operand::Variable(target))
            }
        }
    }

    fn merge_kwargs(&mut self, hash: &Variable, other: Operand) {
        self.add_instr(Instr::RuntimeHelperCall {
            result: hash.clone(),
            helper: RuntimeHelper::MergeKwargs,
            args: smallvec![Operand::Variable(hash.clone()), other],
        });
    }

    /// Pieces of an interpolated literal. Static segments stay literal.
    fn build_dynamic_pieces(&mut self, pieces: &[Node]) -> BuildResult<Vec<Operand>> {
        let mut operands = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let operand = match &piece.kind {
                NodeKind::Str(text) => Operand::StringLiteral(text.clone()),
                _ => self.build(piece)?,
            };
            operands.push(operand);
        }
        Ok(operands)
    }

    pub(super) fn build_dstr(&mut self, pieces: &[Node]) -> BuildResult<Operand> {
        let pieces = self.build_dynamic_pieces(pieces)?;
        let result = self.emit_result(|result| Instr::BuildCompoundString { result, pieces });
        Ok(Operand::Variable(result))
    }

    pub(super) fn build_dsymbol(&mut self, pieces: &[Node]) -> BuildResult<Operand> {
        let string = self.build_dstr(pieces)?;
        Ok(self.copy_and_return_value(Operand::DynamicSymbol(Box::new(string))))
    }

    pub(super) fn build_dregexp(
        &mut self,
        pieces: &[Node],
        options: RegexpOptions,
    ) -> BuildResult<Operand> {
        let pieces = self.build_dynamic_pieces(pieces)?;
        let result = self.emit_result(|result| Instr::BuildDynRegExp {
            result,
            pieces,
            options,
        });
        Ok(Operand::Variable(result))
    }

    pub(super) fn build_xstr(&mut self, text: &Ident) -> Operand {
        let pieces = vec![Operand::StringLiteral(text.clone())];
        Operand::Variable(self.emit_result(|result| Instr::Backtick { result, pieces }))
    }

    pub(super) fn build_dxstr(&mut self, pieces: &[Node]) -> BuildResult<Operand> {
        let pieces = self.build_dynamic_pieces(pieces)?;
        Ok(Operand::Variable(
            self.emit_result(|result| Instr::Backtick { result, pieces }),
        ))
    }

    /// `#{…}`
    pub(super) fn build_evstr(&mut self, body: Option<&Node>) -> BuildResult<Operand> {
        let Some(body) = body else {
            return Ok(self.manager.nil());
        };
        let value = self.build(body)?;
        Ok(Operand::Variable(
            self.emit_result(|result| Instr::AsString { result, value }),
        ))
    }

    pub(super) fn build_dot(
        &mut self,
        begin: &Node,
        end: &Node,
        exclusive: bool,
    ) -> BuildResult<Operand> {
        let begin = self.build(begin)?;
        let end = self.build(end)?;
        let result = self.emit_result(|result| Instr::BuildRange {
            result,
            begin,
            end,
            exclusive,
        });
        Ok(Operand::Variable(result))
    }

    pub(super) fn build_splat(&mut self, value: &Node) -> BuildResult<Operand> {
        let array = self.build(value)?;
        Ok(Operand::Variable(
            self.emit_result(|result| Instr::BuildSplat { result, array }),
        ))
    }

    pub(super) fn build_encoding(&mut self, encoding: &Ident) -> Operand {
        let encoding = encoding.clone();
        Operand::Variable(self.emit_result(|result| Instr::GetEncoding { result, encoding }))
    }

    /// Multiple value of `return a, b`.
    pub(super) fn build_svalue(&mut self, inner: &Node) -> BuildResult<Operand> {
        let value = self.build(inner)?;
        Ok(self.copy_and_return_value(Operand::SValue(Box::new(value))))
    }
}
