use std::fmt;

use crate::expr::Expr;
use crate::ident::Ident;

/// Result type for translation operations.
pub type TranslateResult<T> = Result<T, TranslateError>;

/// A source line position inside one code object.
///
/// Bytecode instructions only carry a starting line (`starts_line`), so the
/// translator keeps a line cursor: instructions without a line inherit the
/// last one seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Loc {
    line: Option<u32>,
}

impl Loc {
    /// Location of code with no line information.
    pub const UNKNOWN: Loc = Loc { line: None };

    #[must_use]
    pub fn line(line: u32) -> Self {
        Self { line: Some(line) }
    }

    #[must_use]
    pub fn line_number(self) -> Option<u32> {
        self.line
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}"),
            None => f.write_str("<unknown>"),
        }
    }
}

/// Who is to blame for a translation failure.
///
/// `External` errors are malformed or unexpected input bytecode; `Internal`
/// errors are broken invariants of the translator itself. The distinction
/// only affects how the error is reported, both abort the current code
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    External,
    Internal,
}

/// Error raised while translating one code object.
///
/// The first error short-circuits the translation of the current code object
/// and propagates upward; nothing is retried and no partial object is
/// produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateError {
    severity: Severity,
    loc: Loc,
    kind: TranslateErrorKind,
}

impl TranslateError {
    pub(crate) fn new(loc: Loc, kind: TranslateErrorKind) -> Self {
        Self {
            severity: kind.severity(),
            loc,
            kind,
        }
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn loc(&self) -> Loc {
        self.loc
    }

    #[must_use]
    pub fn kind(&self) -> &TranslateErrorKind {
        &self.kind
    }
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::External => "error",
            Severity::Internal => "internal error",
        };
        write!(f, "{prefix}: {} ({})", self.kind, self.loc)
    }
}

impl std::error::Error for TranslateError {}

/// What went wrong, with enough payload to reconstruct the report.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslateErrorKind {
    /// Pop or peek on an empty symbolic stack; payload is the opcode name.
    EmptyStack(&'static str),
    /// No handler for this opcode name.
    UnsupportedOpcode(String),
    /// A `MAKE_FUNCTION` operand had the wrong shape.
    MakeFunction { what: &'static str, got: Expr },
    /// `BUILD_CONST_KEY_MAP` key-count mismatch.
    BuildConstKeyMapLength { expected: usize, got: usize },
    /// `BUILD_CONST_KEY_MAP` keys operand is not a constant tuple.
    BuildConstKeyMapKeys(Expr),
    /// `__build_class__` called with too few arguments.
    LoadBuildClass(Vec<Expr>),
    /// `__build_class__` called with a non-literal class name.
    LoadBuildClassName(Expr),
    /// `IMPORT_NAME` fromlist operand is not a constant list of names.
    ImportNameFromList(Expr),
    /// `IMPORT_NAME` level operand is not an integer constant.
    ImportNameLevel(Expr),
    /// Relative import walks above the module root.
    ImportNameDepth { id: Ident, depth: i64 },
    /// `IMPORT_FROM` applied to something that is not an import result.
    ImportFrom(Expr),
    /// `COMPARE_OP` comparator index out of range.
    CompareOp(u32),
    /// `UNPACK_SEQUENCE` with a non-positive count.
    UnpackSequence(u32),
    /// `FORMAT_VALUE` format spec is not a string literal.
    FormatValueSpec(Expr),
    /// A jump needs the offset of the following instruction but none exists.
    NextOffsetMissing,
    /// Back-jump to an offset with no registered label.
    MissingBackEdge { from: u32, to: u32 },
    /// Stack arity mismatch on a back-edge.
    InvalidBackEdge {
        label: String,
        expected: usize,
        actual: usize,
    },
}

impl TranslateErrorKind {
    /// Blame assignment: wrong shapes in user bytecode are external, broken
    /// translator invariants are internal.
    fn severity(&self) -> Severity {
        match self {
            Self::EmptyStack(_)
            | Self::UnsupportedOpcode(_)
            | Self::MakeFunction { .. }
            | Self::BuildConstKeyMapLength { .. }
            | Self::BuildConstKeyMapKeys(_)
            | Self::NextOffsetMissing
            | Self::InvalidBackEdge { .. } => Severity::Internal,
            Self::LoadBuildClass(_)
            | Self::LoadBuildClassName(_)
            | Self::ImportNameFromList(_)
            | Self::ImportNameLevel(_)
            | Self::ImportNameDepth { .. }
            | Self::ImportFrom(_)
            | Self::CompareOp(_)
            | Self::UnpackSequence(_)
            | Self::MissingBackEdge { .. }
            | Self::FormatValueSpec(_) => Severity::External,
        }
    }
}

impl fmt::Display for TranslateErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyStack(op) => write!(f, "stack is empty while processing {op}"),
            Self::UnsupportedOpcode(name) => write!(f, "unsupported opcode {name}"),
            Self::MakeFunction { what, got } => {
                write!(f, "MAKE_FUNCTION expected {what} but got {got}")
            }
            Self::BuildConstKeyMapLength { expected, got } => {
                write!(f, "BUILD_CONST_KEY_MAP expected {expected} keys but got {got}")
            }
            Self::BuildConstKeyMapKeys(exp) => {
                write!(f, "BUILD_CONST_KEY_MAP keys are not a constant tuple: {exp}")
            }
            Self::LoadBuildClass(args) => {
                write!(f, "class construction with too few arguments ({})", args.len())
            }
            Self::LoadBuildClassName(exp) => {
                write!(f, "class name is not a string literal: {exp}")
            }
            Self::ImportNameFromList(exp) => {
                write!(f, "IMPORT_NAME fromlist is not a constant list of names: {exp}")
            }
            Self::ImportNameLevel(exp) => {
                write!(f, "IMPORT_NAME level is not an integer constant: {exp}")
            }
            Self::ImportNameDepth { id, depth } => {
                write!(f, "IMPORT_NAME cannot walk {depth} levels up from {id}")
            }
            Self::ImportFrom(exp) => write!(f, "IMPORT_FROM applied to non-import value {exp}"),
            Self::CompareOp(n) => write!(f, "COMPARE_OP comparator index {n} is out of range"),
            Self::UnpackSequence(n) => write!(f, "UNPACK_SEQUENCE with non-positive count {n}"),
            Self::FormatValueSpec(exp) => {
                write!(f, "FORMAT_VALUE format spec is not a string literal: {exp}")
            }
            Self::NextOffsetMissing => {
                f.write_str("jump needs the offset of the next instruction but none exists")
            }
            Self::MissingBackEdge { from, to } => {
                write!(f, "back-jump from offset {from} targets unregistered offset {to}")
            }
            Self::InvalidBackEdge {
                label,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "back-edge into {label} expects {expected} stack values but got {actual}"
                )
            }
        }
    }
}
