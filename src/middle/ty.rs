use strum::{EnumString, IntoStaticStr};

use crate::middle::tree::name::Name;

/// Static types as far as this tier cares about them. Type inference happens
/// upstream, this only carries the results along.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Primitive(PrimitiveKind),
    /// A nominal type. May be declared inside the body being processed.
    Named(Name),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, IntoStaticStr)]
pub enum PrimitiveKind {
    /// Expressions evaluated only for their effect
    Void,
    /// Expressions that never complete normally
    Never,
    Bool,
    Int,
    Str,
    /// Any function value
    Fn,
    /// The type of an error node that stands in for some other expression
    Invalid,
}

impl Type {
    pub const VOID: Self = Self::Primitive(PrimitiveKind::Void);
    pub const BOOL: Self = Self::Primitive(PrimitiveKind::Bool);
    pub const INT: Self = Self::Primitive(PrimitiveKind::Int);
    pub const FN: Self = Self::Primitive(PrimitiveKind::Fn);

    pub fn is_void_like(&self) -> bool {
        matches!(self, Self::Primitive(PrimitiveKind::Void))
    }

    pub fn named(&self) -> Option<Name> {
        match self {
            Self::Named(name) => Some(*name),
            Self::Primitive(_) => None,
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Primitive(kind) => {
                let text: &'static str = kind.into();
                f.write_str(text)
            }
            Type::Named(name) => write!(f, "{name}"),
        }
    }
}
