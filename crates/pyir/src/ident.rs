//! Qualified-name model.
//!
//! An identifier is a root name plus a dotted attribute path, tagged with how
//! the name entered scope. The path is stored innermost-attribute-first so
//! extension and popping are O(1) at the front of a short vector; printing
//! reverses it to reconstruct the dotted form `root.a.b.c`.

use std::fmt;

/// How a name entered the current scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentKind {
    /// Pre-seeded builtin (`print`, `len`, ...).
    Builtin,
    /// Bound by an import.
    Imported,
    /// Everything else.
    Normal,
}

/// A qualified name: root plus reversed attribute path.
///
/// Identifiers are never empty; the root always exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    root: String,
    /// Attribute path, innermost (most recently appended) first.
    path: Vec<String>,
    kind: IdentKind,
}

impl Ident {
    #[must_use]
    pub fn new(root: impl Into<String>, kind: IdentKind) -> Self {
        Self {
            root: root.into(),
            path: Vec::new(),
            kind,
        }
    }

    /// Builds an identifier from a dotted string like `os.path`.
    #[must_use]
    pub fn from_dotted(dotted: &str, kind: IdentKind) -> Self {
        let mut parts = dotted.split('.');
        // split always yields at least one element
        let mut id = Self::new(parts.next().unwrap_or_default(), kind);
        for part in parts {
            id = id.extend(part);
        }
        id
    }

    /// Returns a new identifier with `attr` appended to the path.
    #[must_use]
    pub fn extend(&self, attr: impl Into<String>) -> Self {
        let mut id = self.clone();
        id.path.insert(0, attr.into());
        id
    }

    /// Strips the innermost attribute, or `None` when only the root is left.
    #[must_use]
    pub fn pop(&self) -> Option<Self> {
        if self.path.is_empty() {
            return None;
        }
        let mut id = self.clone();
        id.path.remove(0);
        Some(id)
    }

    /// The identifier reduced to its root.
    #[must_use]
    pub fn root(&self) -> Self {
        Self {
            root: self.root.clone(),
            path: Vec::new(),
            kind: self.kind,
        }
    }

    #[must_use]
    pub fn kind(&self) -> IdentKind {
        self.kind
    }

    /// Same name, different kind.
    #[must_use]
    pub fn with_kind(mut self, kind: IdentKind) -> Self {
        self.kind = kind;
        self
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for attr in self.path.iter().rev() {
            write!(f, ".{attr}")?;
        }
        Ok(())
    }
}
