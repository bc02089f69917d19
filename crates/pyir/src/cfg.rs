//! Label registry and basic-block types.
//!
//! Labels are keyed by bytecode offset and discovered eagerly: a forward
//! jump registers its target before the target is visited, and a back-edge
//! target is synthesized the moment an `is_jump_target` instruction with no
//! pending label is reached. The registry is ordered by offset so dumps are
//! deterministic.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::Loc;
use crate::expr::Ssa;
use crate::state::State;
use crate::stmt::{Stmt, Terminator};

/// Stack-adjusting hook applied on block entry, after the SSA parameters
/// have been bound. Used where the bytecode leaves residual stack values
/// across a jump (notably `FOR_ITER`).
pub type Prelude = dyn Fn(&mut State);

/// SSA parameters of a block; index i stands for stack slot i from the
/// bottom of the restored stack.
pub type SsaParameters = SmallVec<[Ssa; 4]>;

/// A block label.
pub struct Label {
    /// Fresh name, `b<k>`.
    pub name: String,
    /// One parameter per stack slot live at entry.
    pub ssa_parameters: SsaParameters,
    /// Set once the block at this offset has been entered; prevents the
    /// interpreter from closing a block against its own label.
    pub processed: bool,
    /// Whether this label was synthesized for a not-yet-seen back-edge.
    pub backedge: bool,
    /// Optional stack adjustment run at block entry.
    pub prelude: Option<Rc<Prelude>>,
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Label")
            .field("name", &self.name)
            .field("ssa_parameters", &self.ssa_parameters)
            .field("processed", &self.processed)
            .field("backedge", &self.backedge)
            .field("prelude", &self.prelude.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// The label registry for one code object.
#[derive(Debug, Default)]
pub struct Cfg {
    labels: BTreeMap<u32, Label>,
    fresh_label: u32,
}

impl Cfg {
    /// Mints the next `b<k>` name.
    pub fn fresh_name(&mut self) -> String {
        let name = format!("b{}", self.fresh_label);
        self.fresh_label += 1;
        name
    }

    #[must_use]
    pub fn label_at(&self, offset: u32) -> Option<&Label> {
        self.labels.get(&offset)
    }

    /// Registers a label at `offset`. The caller has checked the offset is
    /// not yet taken; registering twice would disconnect an existing jump.
    pub fn insert(&mut self, offset: u32, label: Label) {
        let previous = self.labels.insert(offset, label);
        debug_assert!(previous.is_none(), "label registered twice at offset {offset}");
    }

    /// Marks the label at `offset` as visited.
    pub fn process_label(&mut self, offset: u32) {
        if let Some(label) = self.labels.get_mut(&offset) {
            label.processed = true;
        }
    }
}

/// A basic block: straight-line statements plus one terminator.
#[derive(Debug)]
pub struct Node {
    /// Label name this block answers to.
    pub label: String,
    /// SSA parameters bound at entry, copied from the label.
    pub ssa_parameters: SsaParameters,
    /// Location of the first instruction of the block.
    pub label_loc: Loc,
    /// Location of the instruction that terminated the block.
    pub last_loc: Loc,
    /// Statements in emission order.
    pub stmts: Vec<(Loc, Stmt)>,
    /// The unique terminator.
    pub last: Terminator,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.label)?;
        let mut iter = self.ssa_parameters.iter();
        if let Some(first) = iter.next() {
            write!(f, "{first}")?;
        }
        for param in iter {
            write!(f, ", {param}")?;
        }
        writeln!(f, "):")?;
        for (_, stmt) in &self.stmts {
            writeln!(f, "  {stmt}")?;
        }
        writeln!(f, "  {}", self.last)
    }
}
