//! The translated object tree.
//!
//! One `Object` per code object: the module at the root, one child per
//! embedded code constant (functions, class bodies), recursively.

use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::cfg::Node;
use crate::error::Loc;
use crate::ident::Ident;

/// Translation result for one code object and its nested code constants.
#[derive(Debug)]
pub struct Object {
    /// Qualified name; the root object is named after the source file.
    pub name: Ident,
    /// Basic blocks in the order they were closed.
    pub toplevel: Vec<Node>,
    /// Nested objects, one per embedded code constant.
    pub objects: Vec<(Loc, Object)>,
    /// Short names of classes constructed in this object.
    pub classes: IndexSet<String>,
    /// Functions created in this object, raw qualname to qualified ident.
    pub functions: IndexMap<String, Ident>,
}

impl Object {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        writeln!(f, "{pad}object {}:", self.name)?;
        for class in &self.classes {
            writeln!(f, "{pad}  class {class}")?;
        }
        for (short, qualified) in &self.functions {
            writeln!(f, "{pad}  function {short} -> {qualified}")?;
        }
        for node in &self.toplevel {
            for line in node.to_string().lines() {
                writeln!(f, "{pad}  {line}")?;
            }
        }
        for (_, object) in &self.objects {
            object.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
