//! Mutable translation state for one code object.
//!
//! The state owns the symbolic evaluation stack, the pending statement list,
//! the SSA counter, the label registry and the name tables. One state exists
//! per code object; nested code objects get a fresh state that inherits only
//! the (cloned) name maps.

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::{IndexMap, IndexSet};

use crate::cfg::{Cfg, Label, Prelude, SsaParameters};
use crate::error::{Loc, TranslateError, TranslateErrorKind, TranslateResult};
use crate::expr::{Expr, Ssa};
use crate::ident::{Ident, IdentKind};
use crate::stmt::Stmt;

/// Names visible without any import at module level.
const BUILTIN_GLOBALS: [&str; 14] = [
    "print", "range", "open", "len", "type", "str", "int", "float", "bool", "object", "super", "hasattr", "__name__",
    "__file__",
];

/// Names pre-seeded into every local table.
const BUILTIN_LOCALS: [&str; 2] = ["__name__", "staticmethod"];

/// Translation state for one code object.
pub struct State {
    /// Qualified name of the object being translated.
    pub module_name: Ident,
    /// Source line cursor, advanced by `starts_line`.
    pub loc: Loc,
    /// Label registry.
    pub cfg: Cfg,
    /// Classes constructed in this object, in construction order.
    pub classes: IndexSet<String>,
    /// Functions created in this object: raw qualname to qualified ident.
    pub functions: IndexMap<String, Ident>,
    globals: AHashMap<String, Ident>,
    locals: AHashMap<String, Ident>,
    /// Symbolic evaluation stack; top of stack is the last element.
    stack: Vec<Expr>,
    /// Statements emitted since the last block boundary.
    stmts: Vec<(Loc, Stmt)>,
    fresh_ssa: u32,
    toplevel: bool,
}

impl State {
    /// State for the top-level module object, with the builtin name tables
    /// seeded.
    #[must_use]
    pub fn module(module_name: Ident) -> Self {
        let globals = BUILTIN_GLOBALS
            .iter()
            .map(|name| ((*name).to_owned(), Ident::new(*name, IdentKind::Builtin)))
            .collect();
        let locals = BUILTIN_LOCALS
            .iter()
            .map(|name| ((*name).to_owned(), Ident::new(*name, IdentKind::Builtin)))
            .collect();
        Self::new(module_name, globals, locals, true)
    }

    /// State for a nested code object; inherits only the name maps.
    #[must_use]
    pub fn nested(&self, module_name: Ident) -> Self {
        Self::new(module_name, self.globals.clone(), self.locals.clone(), false)
    }

    fn new(module_name: Ident, globals: AHashMap<String, Ident>, locals: AHashMap<String, Ident>, toplevel: bool) -> Self {
        Self {
            module_name,
            loc: Loc::UNKNOWN,
            cfg: Cfg::default(),
            classes: IndexSet::default(),
            functions: IndexMap::default(),
            globals,
            locals,
            stack: Vec::new(),
            stmts: Vec::new(),
            fresh_ssa: 0,
            toplevel,
        }
    }

    /// Builds an error at the current cursor location.
    #[must_use]
    pub fn err(&self, kind: TranslateErrorKind) -> TranslateError {
        TranslateError::new(self.loc, kind)
    }

    // === SSA ===

    /// Allocates the next SSA temporary.
    pub fn fresh_ssa(&mut self) -> Ssa {
        let ssa = Ssa(self.fresh_ssa);
        self.fresh_ssa += 1;
        ssa
    }

    /// Allocates `arity` fresh SSA names standing for the stack a block
    /// expects at entry.
    pub fn mk_ssa_parameters(&mut self, arity: usize) -> SsaParameters {
        (0..arity).map(|_| self.fresh_ssa()).collect()
    }

    // === Symbolic stack ===

    pub fn push(&mut self, exp: Expr) {
        self.stack.push(exp);
    }

    pub fn pop(&mut self, op: &'static str) -> TranslateResult<Expr> {
        self.stack.pop().ok_or_else(|| self.err(TranslateErrorKind::EmptyStack(op)))
    }

    pub fn peek(&self, op: &'static str) -> TranslateResult<&Expr> {
        self.stack.last().ok_or_else(|| self.err(TranslateErrorKind::EmptyStack(op)))
    }

    /// Pops `n` values; the result is in source order (deepest first).
    pub fn pop_n(&mut self, op: &'static str, n: usize) -> TranslateResult<Vec<Expr>> {
        if self.stack.len() < n {
            return Err(self.err(TranslateErrorKind::EmptyStack(op)));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    #[must_use]
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Drains the stack into SSA arguments for a jump, bottom first, so
    /// `ssa_args[i]` pairs with the target's `ssa_parameters[i]`.
    pub fn to_ssa(&mut self) -> Vec<Expr> {
        std::mem::take(&mut self.stack)
    }

    /// Resets the stack to a block's entry shape and runs its prelude.
    pub fn bind_block(&mut self, params: &SsaParameters, prelude: Option<Rc<Prelude>>) {
        self.stack.clear();
        self.stack.extend(params.iter().map(|param| Expr::Temp(*param)));
        if let Some(prelude) = prelude {
            prelude(self);
        }
    }

    // === Statements ===

    /// Appends a statement at the current cursor location.
    pub fn emit(&mut self, stmt: Stmt) {
        self.stmts.push((self.loc, stmt));
    }

    /// Takes the statements accumulated for the current block.
    pub fn drain_stmts(&mut self) -> Vec<(Loc, Stmt)> {
        std::mem::take(&mut self.stmts)
    }

    // === Name resolution ===

    /// Resolves a name against the local/global tables.
    ///
    /// At module top level every lookup goes to the globals; otherwise
    /// `global` forces the globals and plain lookups check locals first.
    /// Unknown names resolve to `$unknown.<name>` so downstream tooling can
    /// flag them.
    #[must_use]
    pub fn resolve(&self, name: &str, global: bool) -> Ident {
        let found = if self.toplevel || global {
            self.globals.get(name)
        } else {
            self.locals.get(name).or_else(|| self.globals.get(name))
        };
        match found {
            Some(id) => id.clone(),
            None => Ident::new("$unknown", IdentKind::Normal).extend(name),
        }
    }

    /// Binds `name` in the table picked by the same top-level-forces-global
    /// rule as [`State::resolve`].
    pub fn register(&mut self, name: &str, id: Ident, global: bool) {
        if self.toplevel || global {
            self.globals.insert(name.to_owned(), id);
        } else {
            self.locals.insert(name.to_owned(), id);
        }
    }

    // === Labels ===

    /// Returns the label name at `offset`, registering a fresh one if none
    /// exists. Idempotent: an already-registered label keeps its shape and
    /// the arguments are ignored.
    pub fn get_label(&mut self, offset: u32, arity: usize, prelude: Option<Rc<Prelude>>) -> String {
        if let Some(label) = self.cfg.label_at(offset) {
            return label.name.clone();
        }
        let name = self.cfg.fresh_name();
        let ssa_parameters = self.mk_ssa_parameters(arity);
        self.cfg.insert(
            offset,
            Label {
                name: name.clone(),
                ssa_parameters,
                processed: false,
                backedge: false,
                prelude,
            },
        );
        name
    }

    /// Registers a back-edge label at `offset` with the current stack arity.
    ///
    /// Called when an `is_jump_target` instruction is reached before any
    /// jump to it was seen; the join shape must be committed now, the
    /// back-jump will be checked against it.
    pub fn synthesize_backedge_label(&mut self, offset: u32) -> String {
        let name = self.cfg.fresh_name();
        let ssa_parameters = self.mk_ssa_parameters(self.stack.len());
        self.cfg.insert(
            offset,
            Label {
                name: name.clone(),
                ssa_parameters,
                processed: false,
                backedge: true,
                prelude: None,
            },
        );
        name
    }
}
