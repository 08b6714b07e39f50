use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    frontend::intern::InternedSymbol,
    middle::ty::{PrimitiveKind, Type},
};

/// A literal value leaf
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    Str(String),
    /// A builtin function. Appears as the callee of calls the passes
    /// understand.
    Fn(Builtin),
    /// A declaration metadata key
    Key(MetadataKey),
    /// A reified type
    Type(Type),
    /// A property or member name, written `.name`
    Symbol(InternedSymbol),
}

impl Value {
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Truthiness known without running anything
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Void => Type::VOID,
            Value::Bool(_) => Type::BOOL,
            Value::Int(_) => Type::INT,
            Value::Str(_) => Type::Primitive(PrimitiveKind::Str),
            Value::Fn(_) => Type::FN,
            Value::Key(_) | Value::Type(_) | Value::Symbol(_) => {
                Type::Primitive(PrimitiveKind::Invalid)
            }
        }
    }
}

/// Functions with meaning to the middle tier. Everything else is an opaque
/// call.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Display,
)]
pub enum Builtin {
    /// `left = right`
    #[strum(serialize = "=")]
    SetLocal,
    /// `hs(failFlag, operation)` runs the operation and records in the flag
    /// whether it failed
    #[strum(serialize = "hs")]
    HandlerScope,
    /// Unconditionally propagates failure out of the enclosing function
    #[strum(serialize = "bubble")]
    Bubble,
    #[strum(serialize = "yield")]
    Yield,
    #[strum(serialize = "await")]
    Await,
    /// `setp(.property, subject, value)`
    #[strum(serialize = "setp")]
    SetProperty,
    /// `getStatic(<Type>, .member)`
    #[strum(serialize = "getStatic")]
    GetStatic,
    /// `bind(subject, .method)`
    #[strum(serialize = "bind")]
    Bind,
    /// Produces a value that fails when evaluated
    #[strum(serialize = "error")]
    Error,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

impl Builtin {
    /// Calls to these write the name at argument one
    pub fn assigns_argument_one(self) -> bool {
        matches!(self, Self::SetLocal | Self::HandlerScope)
    }

    /// Child index of the assigned value within a call, counting the callee
    pub fn assigned_value_index(self) -> Option<usize> {
        match self {
            Self::SetLocal => Some(2),
            Self::SetProperty => Some(3),
            _ => None,
        }
    }

    pub fn is_binary_operator(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Mul
                | Self::Lt
                | Self::Le
                | Self::Gt
                | Self::Ge
                | Self::Eq
                | Self::Ne
        )
    }

    /// Calls that backends only accept as whole statements
    pub fn must_remain_at_statement_level(self) -> bool {
        matches!(
            self,
            Self::Await | Self::HandlerScope | Self::SetLocal | Self::SetProperty
        )
    }
}

/// Keys of declaration metadata
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "camelCase")]
pub enum MetadataKey {
    /// Declared type. The value is a reified type.
    Type,
    /// The name may be assigned more than once
    Var,
    /// Hint that the name is assigned exactly once
    Ssa,
    /// The name is a failure flag written by `hs`
    Fail,
    /// Declared by the compiler, not the user
    Synthetic,
    /// The name stands in for a type not yet inferred
    TypePlaceholder,
    /// The name is a locally declared type
    TypeDecl,
    /// The name was derived from a type definition
    FromType,
    /// The name receives the enclosing function's result
    Return,
}

impl MetadataKey {
    /// A temporary declared with any other key must survive cleanup. A
    /// declared type in particular may matter to later type inference.
    pub fn is_insignificant(self) -> bool {
        matches!(self, Self::Fail | Self::Ssa | Self::Synthetic | Self::Var)
    }
}
