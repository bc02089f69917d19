//! Expression IR.
//!
//! A closed sum of syntactic expression forms. All leaves are side-effect
//! free: anything effectful (calls, imports, builtin invocations) was already
//! staged as a statement by the time an expression mentions its result.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use strum::IntoStaticStr;

use crate::code::CodeObject;
use crate::constant::Constant;
use crate::ident::Ident;

/// An SSA temporary, scoped to one object.
///
/// The counter resets for every nested code object; every temporary has at
/// most one defining site within its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ssa(pub u32);

impl fmt::Display for Ssa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Which collection a `BUILD_*` opcode produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum CollectionKind {
    List,
    Set,
    Tuple,
    Slice,
    Map,
    String,
}

/// Binary operators, shared by the `BINARY_*` and `INPLACE_*` families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum BinaryOp {
    Add,
    And,
    FloorDivide,
    LShift,
    MatrixMultiply,
    Modulo,
    Multiply,
    Or,
    Power,
    RShift,
    Subtract,
    TrueDivide,
    Xor,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum UnaryOp {
    Positive,
    Negative,
    Not,
    Invert,
}

/// Comparison operators, in the exact order of the bytecode comparator table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Neq,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOp {
    /// The comparator table indexed by the `COMPARE_OP` operand.
    const TABLE: [CompareOp; 10] = [
        Self::Lt,
        Self::Le,
        Self::Eq,
        Self::Neq,
        Self::Gt,
        Self::Ge,
        Self::In,
        Self::NotIn,
        Self::Is,
        Self::IsNot,
    ];

    /// Looks up a comparator by operand index.
    #[must_use]
    pub fn from_index(n: u32) -> Option<Self> {
        Self::TABLE.get(n as usize).copied()
    }
}

/// String conversion applied by `FORMAT_VALUE` before formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum FormatFunction {
    Str,
    Repr,
    Ascii,
}

/// Marker for a pseudo-function the runtime provides.
///
/// These stand for operations the bytecode expresses as calls or dedicated
/// opcodes; the downstream emitter maps each tag to its runtime helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCaller {
    /// `__build_class__`, pushed by `LOAD_BUILD_CLASS`.
    BuildClass,
    /// F-string formatting of a value against a spec.
    Format,
    /// F-string conversion (`!s`, `!r`, `!a`).
    FormatFn(FormatFunction),
    Binary(BinaryOp),
    Inplace(BinaryOp),
    Unary(UnaryOp),
    Compare(CompareOp),
    GetIter,
    NextIter,
    HasNextIter,
    IterData,
}

impl fmt::Display for BuiltinCaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildClass => f.write_str("$BuildClass"),
            Self::Format => f.write_str("$Format"),
            Self::FormatFn(func) => {
                let name: &'static str = (*func).into();
                write!(f, "$FormatFn.{name}")
            }
            Self::Binary(op) => {
                let name: &'static str = (*op).into();
                write!(f, "$Binary.{name}")
            }
            Self::Inplace(op) => {
                let name: &'static str = (*op).into();
                write!(f, "$Inplace.{name}")
            }
            Self::Unary(op) => {
                let name: &'static str = (*op).into();
                write!(f, "$Unary.{name}")
            }
            Self::Compare(op) => {
                let name: &'static str = (*op).into();
                write!(f, "$Compare.{name}")
            }
            Self::GetIter => f.write_str("$GetIter"),
            Self::NextIter => f.write_str("$NextIter"),
            Self::HasNextIter => f.write_str("$HasNextIter"),
            Self::IterData => f.write_str("$IterData"),
        }
    }
}

/// Keyword-annotation map: constant keys to expression values.
pub type ConstMap = BTreeMap<Constant, Expr>;

/// A symbolic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal constant.
    Const(Constant),
    /// Resolved qualified name.
    Var(Ident),
    /// Unresolved local-slot name.
    LocalVar(String),
    /// SSA temporary.
    Temp(Ssa),
    /// `exp[index]`.
    Subscript { exp: Box<Expr>, index: Box<Expr> },
    /// Result of a `BUILD_*` collection builder.
    Collection { kind: CollectionKind, values: Vec<Expr> },
    /// Constant-keyed map, from `BUILD_CONST_KEY_MAP`.
    ConstMap(ConstMap),
    /// Closure-forming result of `MAKE_FUNCTION`.
    Function {
        qualname: Ident,
        code: Rc<CodeObject>,
        annotations: Option<ConstMap>,
    },
    /// Class-construction placeholder, the result of calling `$BuildClass`.
    Class(Vec<Expr>),
    /// `exp.attr`.
    GetAttr { exp: Box<Expr>, attr: String },
    /// Method-lookup marker, consumed by `CALL_METHOD`.
    LoadMethod { exp: Box<Expr>, name: String },
    /// Result of `IMPORT_NAME`.
    ImportName { id: Ident, fromlist: Vec<String> },
    /// Result of `IMPORT_FROM`; `from` is always an `ImportName`.
    ImportFrom { from: Box<Expr>, name: String },
    /// Closure cell reference.
    LoadClosure(String),
    /// Boolean negation.
    Not(Box<Expr>),
    /// A pseudo-function waiting to be called.
    BuiltinCaller(BuiltinCaller),
}

fn write_list(f: &mut fmt::Formatter<'_>, values: &[Expr]) -> fmt::Result {
    let mut iter = values.iter();
    if let Some(first) = iter.next() {
        write!(f, "{first}")?;
    }
    for value in iter {
        write!(f, ", {value}")?;
    }
    Ok(())
}

fn write_const_map(f: &mut fmt::Formatter<'_>, map: &ConstMap) -> fmt::Result {
    f.write_str("{")?;
    let mut iter = map.iter();
    if let Some((key, value)) = iter.next() {
        write!(f, "{key}: {value}")?;
    }
    for (key, value) in iter {
        write!(f, ", {key}: {value}")?;
    }
    f.write_str("}")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(c) => write!(f, "{c}"),
            Self::Var(id) => write!(f, "{id}"),
            Self::LocalVar(name) => f.write_str(name),
            Self::Temp(ssa) => write!(f, "{ssa}"),
            Self::Subscript { exp, index } => write!(f, "{exp}[{index}]"),
            Self::Collection { kind, values } => {
                let name: &'static str = (*kind).into();
                write!(f, "${name}(")?;
                write_list(f, values)?;
                f.write_str(")")
            }
            Self::ConstMap(map) => write_const_map(f, map),
            Self::Function { qualname, .. } => write!(f, "$FuncObj({qualname})"),
            Self::Class(args) => {
                f.write_str("$ClassObj(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::GetAttr { exp, attr } => write!(f, "{exp}.{attr}"),
            Self::LoadMethod { exp, name } => write!(f, "$LoadMethod({exp}, {name})"),
            Self::ImportName { id, .. } => write!(f, "$ImportName({id})"),
            Self::ImportFrom { from, name } => write!(f, "$ImportFrom({from}, {name})"),
            Self::LoadClosure(name) => write!(f, "$LoadClosure({name})"),
            Self::Not(exp) => write!(f, "not {exp}"),
            Self::BuiltinCaller(caller) => write!(f, "{caller}"),
        }
    }
}
