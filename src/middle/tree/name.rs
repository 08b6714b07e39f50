use crate::frontend::intern::InternedSymbol;

/// A resolved name. Names compare by identity: two temporaries with the same
/// hint are still distinct names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Name {
    /// A name the user wrote
    Source(InternedSymbol),
    /// A name synthesized by the compiler. Always eligible for elimination
    /// unless its declaration says otherwise.
    Temporary { hint: InternedSymbol, uid: u32 },
    /// A name exported by another module
    Exported(InternedSymbol),
    /// A name provided by the runtime
    Builtin(InternedSymbol),
}

/// Labels of loops, labeled blocks and or-clauses share the name space of
/// ordinary names
pub type JumpLabel = Name;

impl Name {
    pub fn source(text: &str) -> Self {
        Self::Source(InternedSymbol::new(text))
    }

    /// Internal names are local to the compilation unit
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Temporary { .. })
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary { .. })
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin(_))
    }

    pub fn is_exported(&self) -> bool {
        matches!(self, Self::Exported(_))
    }
}

impl core::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Name::Source(symbol) => write!(f, "{symbol}"),
            Name::Temporary { hint, uid } => write!(f, "{hint}#{uid}"),
            Name::Exported(symbol) => write!(f, "::{symbol}"),
            Name::Builtin(symbol) => write!(f, "%{symbol}"),
        }
    }
}

/// Allocates temporaries. One per compilation unit; passed to every pass that
/// needs fresh names.
#[derive(Debug, Default)]
pub struct NameMaker {
    next_uid: u32,
}

impl NameMaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temporary(&mut self, hint: &str) -> Name {
        let uid = self.next_uid;
        self.next_uid += 1;

        Name::Temporary {
            hint: InternedSymbol::new(hint),
            uid,
        }
    }

    /// Makes sure `name` is never handed out again
    pub fn reserve(&mut self, name: Name) {
        if let Name::Temporary { uid, .. } = name {
            self.next_uid = self.next_uid.max(uid + 1);
        }
    }
}
