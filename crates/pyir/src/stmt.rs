//! Statement and terminator IR.
//!
//! Statements carry the side effects of a basic block in emission order;
//! that order is load-bearing for imports and stores. A block ends with
//! exactly one terminator.

use std::fmt;

use crate::expr::{BuiltinCaller, Expr, Ssa};
use crate::ident::Ident;

/// One call argument, optionally named.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    pub name: Option<String>,
    pub value: Expr,
}

impl CallArg {
    #[must_use]
    pub fn positional(value: Expr) -> Self {
        Self { name: None, value }
    }
}

impl fmt::Display for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}= {}", self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// A side-effecting operation inside a basic block.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        lhs: Expr,
        rhs: Expr,
    },
    Call {
        lhs: Ssa,
        callee: Expr,
        args: Vec<CallArg>,
    },
    CallMethod {
        lhs: Ssa,
        callee: Expr,
        args: Vec<CallArg>,
    },
    /// Import side-effect marker; always emitted alongside the `ImportName`
    /// expression so the emitter preserves module initialization.
    ImportName {
        id: Ident,
        fromlist: Vec<String>,
    },
    BuiltinCall {
        lhs: Ssa,
        call: BuiltinCaller,
        args: Vec<Expr>,
    },
    /// `SETUP_ANNOTATIONS` marker.
    SetupAnnotations,
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[CallArg]) -> fmt::Result {
    let mut iter = args.iter();
    if let Some(first) = iter.next() {
        write!(f, "{first}")?;
    }
    for arg in iter {
        write!(f, ", {arg}")?;
    }
    Ok(())
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign { lhs, rhs } => write!(f, "{lhs} <- {rhs}"),
            Self::Call { lhs, callee, args } => {
                write!(f, "{lhs} <- {callee}(")?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Self::CallMethod { lhs, callee, args } => {
                write!(f, "{lhs} <- $CallMethod({callee}")?;
                for arg in args {
                    write!(f, ", {arg}")?;
                }
                f.write_str(")")
            }
            Self::ImportName { id, fromlist } => {
                write!(f, "$ImportName({id}, fromlist= [")?;
                let mut iter = fromlist.iter();
                if let Some(first) = iter.next() {
                    write!(f, "{first}")?;
                }
                for name in iter {
                    write!(f, ", {name}")?;
                }
                f.write_str("])")
            }
            Self::BuiltinCall { lhs, call, args } => {
                write!(f, "{lhs} <- {call}(")?;
                let mut iter = args.iter();
                if let Some(first) = iter.next() {
                    write!(f, "{first}")?;
                }
                for arg in iter {
                    write!(f, ", {arg}")?;
                }
                f.write_str(")")
            }
            Self::SetupAnnotations => f.write_str("$SetupAnnotations()"),
        }
    }
}

/// A jump edge: target label plus the SSA arguments restoring its stack.
///
/// `ssa_args[i]` supplies the value for the target's `ssa_parameters[i]`;
/// index 0 is the bottom of the restored stack.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCall {
    pub label: String,
    pub ssa_args: Vec<Expr>,
}

impl fmt::Display for NodeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.label)?;
        let mut iter = self.ssa_args.iter();
        if let Some(first) = iter.next() {
            write!(f, "{first}")?;
        }
        for arg in iter {
            write!(f, ", {arg}")?;
        }
        f.write_str(")")
    }
}

/// How a basic block ends. Exactly one per block.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Return(Expr),
    /// Unconditional transfer; the list is never empty.
    Jump(Vec<NodeCall>),
    If {
        cond: Expr,
        then_: Box<Terminator>,
        else_: Box<Terminator>,
    },
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Return(exp) => write!(f, "return {exp}"),
            Self::Jump(calls) => {
                f.write_str("jmp ")?;
                let mut iter = calls.iter();
                if let Some(first) = iter.next() {
                    write!(f, "{first}")?;
                }
                for call in iter {
                    write!(f, ", {call}")?;
                }
                Ok(())
            }
            Self::If { cond, then_, else_ } => {
                write!(f, "if {cond} then {then_} else {else_}")
            }
        }
    }
}
