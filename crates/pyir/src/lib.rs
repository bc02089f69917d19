//! Translator from CPython 3.8 bytecode into a register-based, SSA-oriented
//! intermediate representation organized as a control-flow graph.
//!
//! The input is a [`CodeObject`] as decoded by the bytecode frontend:
//! constant and name tables plus an ordered instruction stream. The output
//! is an [`Object`] tree whose leaves are basic blocks of typed statements
//! closed by typed terminators, ready for a downstream textual emitter.
//!
//! The translator is a pure function over one code object: it evaluates
//! nothing, folds nothing and recovers no high-level control structure; it
//! only abstracts the evaluation stack across jumps, synthesizing SSA
//! parameters at block joins.

mod cfg;
mod code;
mod constant;
mod error;
mod expr;
mod ident;
mod object;
mod opcode;
mod state;
mod stmt;
mod trace;
mod translate;

pub use crate::{
    cfg::{Node, SsaParameters},
    code::{CodeObject, Instruction, RawConstant},
    constant::Constant,
    error::{Loc, Severity, TranslateError, TranslateErrorKind, TranslateResult},
    expr::{BinaryOp, BuiltinCaller, CollectionKind, CompareOp, ConstMap, Expr, FormatFunction, Ssa, UnaryOp},
    ident::{Ident, IdentKind},
    object::Object,
    stmt::{CallArg, NodeCall, Stmt, Terminator},
    trace::{CollectTrace, NoTrace, StdTrace, TraceWriter},
    translate::{translate, Options, Translator},
};
