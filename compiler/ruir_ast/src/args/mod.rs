//! Parameter lists and destructuring patterns.

use crate::node::Node;
use crate::Ident;

/// A positional parameter: a plain name or a nested `(a, b)` pattern.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgItem {
    Named(Ident),
    Destructure(MultipleAsgnPattern),
}

/// `name = default`
#[derive(Clone, Debug, PartialEq)]
pub struct OptArg {
    pub name: Ident,
    pub default: Node,
}

/// `*name`, or an anonymous `*` when `name` is `None`. Also used for `**rest`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestArg {
    pub name: Option<Ident>,
}

/// `name:` (required) or `name: default`.
#[derive(Clone, Debug, PartialEq)]
pub struct KeywordArg {
    pub name: Ident,
    pub default: Option<Node>,
}

impl KeywordArg {
    #[inline]
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Full parameter list of a method, block or lambda.
///
/// Order of receipt: `pre`, `optional`, `rest`, `post`, `keywords`,
/// `keyword_rest`, `block`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ArgsNode {
    pub pre: Vec<ArgItem>,
    pub optional: Vec<OptArg>,
    pub rest: Option<RestArg>,
    pub post: Vec<ArgItem>,
    pub keywords: Vec<KeywordArg>,
    pub keyword_rest: Option<RestArg>,
    pub block: Option<Ident>,
}

impl ArgsNode {
    /// Parameter list with only required positional names.
    pub fn required(names: &[&str]) -> Self {
        ArgsNode {
            pre: names.iter().map(|n| ArgItem::Named(Ident::from(*n))).collect(),
            ..ArgsNode::default()
        }
    }

    #[inline]
    pub fn pre_count(&self) -> usize {
        self.pre.len()
    }

    #[inline]
    pub fn post_count(&self) -> usize {
        self.post.len()
    }

    /// Number of mandatory positional arguments (pre + post).
    #[inline]
    pub fn required_count(&self) -> usize {
        self.pre.len() + self.post.len()
    }

    #[inline]
    pub fn optional_count(&self) -> usize {
        self.optional.len()
    }

    #[inline]
    pub fn has_rest(&self) -> bool {
        self.rest.is_some()
    }

    #[inline]
    pub fn has_keywords(&self) -> bool {
        !self.keywords.is_empty() || self.keyword_rest.is_some()
    }

    /// True when nothing at all is declared.
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty()
            && self.optional.is_empty()
            && self.rest.is_none()
            && self.post.is_empty()
            && !self.has_keywords()
            && self.block.is_none()
    }
}

/// Remainder slot of a destructuring pattern.
#[derive(Clone, Debug, PartialEq)]
pub enum MasgnRest {
    /// Anonymous `*`: the remainder is dropped.
    Star,
    /// `*target`
    Target(Box<Node>),
}

/// Left-hand side of `a, *b, c = …`.
///
/// Targets are value-less assignment nodes (`LocalAsgn`, `DAsgn`,
/// `InstAsgn`, `AttrAssign`, nested `MultipleAsgn`, …).
#[derive(Clone, Debug, PartialEq, Default)]
pub struct MultipleAsgnPattern {
    pub pre: Vec<Node>,
    pub rest: Option<MasgnRest>,
    pub post: Vec<Node>,
}

impl MultipleAsgnPattern {
    #[inline]
    pub fn post_count(&self) -> usize {
        self.post.len()
    }
}
