//! Argument descriptors reported by `Method#parameters`-style reflection.

use std::fmt;

use ruir_ast::Ident;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Req,
    Opt,
    Rest,
    Key,
    KeyReq,
    KeyRest,
    Block,
}

impl ArgKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgKind::Req => "req",
            ArgKind::Opt => "opt",
            ArgKind::Rest => "rest",
            ArgKind::Key => "key",
            ArgKind::KeyReq => "keyreq",
            ArgKind::KeyRest => "keyrest",
            ArgKind::Block => "block",
        }
    }
}

/// One parameter, in declaration order. Anonymous parameters have no name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgDescriptor {
    pub kind: ArgKind,
    pub name: Option<Ident>,
}

impl ArgDescriptor {
    pub fn new(kind: ArgKind, name: Option<Ident>) -> Self {
        ArgDescriptor { kind, name }
    }

    pub fn named(kind: ArgKind, name: &Ident) -> Self {
        ArgDescriptor::new(kind, Some(name.clone()))
    }
}

impl fmt::Display for ArgDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", self.kind.as_str(), name),
            None => f.write_str(self.kind.as_str()),
        }
    }
}
