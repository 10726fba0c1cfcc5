//! Human-readable dump of a scope and everything nested in it.
//!
//! ```text
//! InstanceMethod m [t.rb:1]
//!   flags: HAS_LOOPS
//!   locals: x
//!     0  %self = recv_self()
//!     1  x = recv_pre_reqd_arg(0)
//!     2  return(x)
//! ```

use std::fmt::{self, Write};

use crate::scope::{ScopeId, ScopeTree};

/// Display adapter returned by [`ScopeTree::dump`].
pub struct ScopeDump<'a> {
    tree: &'a ScopeTree,
    id: ScopeId,
}

impl ScopeTree {
    /// Render `id` and, indented below it, its lexical children.
    pub fn dump(&self, id: ScopeId) -> ScopeDump<'_> {
        ScopeDump { tree: self, id }
    }
}

impl fmt::Display for ScopeDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scope(f, self.tree, self.id, 0)
    }
}

fn write_scope(
    f: &mut fmt::Formatter<'_>,
    tree: &ScopeTree,
    id: ScopeId,
    indent: usize,
) -> fmt::Result {
    let scope = &tree[id];
    let pad = "  ".repeat(indent);
    writeln!(
        f,
        "{pad}{} {} [{}:{}]",
        scope.kind.tag(),
        scope.name,
        scope.file,
        scope.line
    )?;

    write!(f, "{pad}  flags:")?;
    for (name, _) in scope.flags().iter_names() {
        write!(f, " {name}")?;
    }
    writeln!(f)?;

    let locals = scope.local_variables();
    if !locals.is_empty() {
        let mut names = String::new();
        for (i, v) in locals.iter().enumerate() {
            if i > 0 {
                names.push_str(", ");
            }
            write!(names, "{v}")?;
        }
        writeln!(f, "{pad}  locals: {names}")?;
    }
    if !scope.arg_descriptors().is_empty() {
        let mut args = String::new();
        for (i, d) in scope.arg_descriptors().iter().enumerate() {
            if i > 0 {
                args.push_str(", ");
            }
            write!(args, "{d}")?;
        }
        writeln!(f, "{pad}  params: {args}")?;
    }

    for (i, instr) in scope.instrs().iter().enumerate() {
        writeln!(f, "{pad}    {i:<3}{instr}")?;
    }

    for &child in scope.lexical_children() {
        writeln!(f)?;
        write_scope(f, tree, child, indent + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
