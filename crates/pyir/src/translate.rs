//! The abstract interpreter: per-opcode translation and block assembly.
//!
//! The interpreter simulates the evaluation stack symbolically, instruction
//! by instruction, emitting statements and terminators. Reaching a jump
//! target (forward or back) materializes the current stack as SSA arguments
//! and the target's expected stack as fresh SSA parameters.
//!
//! Code objects are translated recursively: when a nested code constant is
//! found, a fresh state (inheriting only the name maps) is swapped in, the
//! nested object is built, and the parent state is restored.

use std::rc::Rc;

use crate::cfg::{Node, Prelude, SsaParameters};
use crate::code::{CodeObject, Instruction, RawConstant};
use crate::constant::Constant;
use crate::error::{Loc, TranslateErrorKind, TranslateResult};
use crate::expr::{BuiltinCaller, CollectionKind, CompareOp, ConstMap, Expr, FormatFunction, Ssa};
use crate::ident::{Ident, IdentKind};
use crate::object::Object;
use crate::opcode::Opcode;
use crate::state::State;
use crate::stmt::{CallArg, NodeCall, Stmt, Terminator};
use crate::trace::{NoTrace, TraceWriter};

/// Translator configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Emit a per-instruction trace to the trace sink.
    pub debug: bool,
}

/// Translates a code object with default options and no trace output.
pub fn translate(code: &CodeObject) -> TranslateResult<Object> {
    Translator::translate_module(code, Options::default(), &mut NoTrace)
}

/// Signal produced by an opcode handler that terminates the current block.
enum JumpSignal {
    Return(Expr),
    Absolute(NodeCall),
    TwoWay {
        cond: Expr,
        next: NodeCall,
        other: NodeCall,
    },
}

impl JumpSignal {
    fn into_terminator(self) -> Terminator {
        match self {
            Self::Return(exp) => Terminator::Return(exp),
            Self::Absolute(call) => Terminator::Jump(vec![call]),
            Self::TwoWay { cond, next, other } => Terminator::If {
                cond,
                then_: Box::new(Terminator::Jump(vec![next])),
                else_: Box::new(Terminator::Jump(vec![other])),
            },
        }
    }
}

/// Drives the translation of one code object tree.
pub struct Translator<'w, W: TraceWriter> {
    state: State,
    options: Options,
    trace: &'w mut W,
}

impl<'w, W: TraceWriter> Translator<'w, W> {
    /// Translates a top-level module code object into an object tree.
    ///
    /// The module name is derived from `co_filename`: a leading `./` and the
    /// file extension are stripped and the remainder is split on `/`.
    pub fn translate_module(code: &CodeObject, options: Options, trace: &'w mut W) -> TranslateResult<Object> {
        let module_name = module_name_from_filename(&code.co_filename);
        let mut translator = Translator {
            state: State::module(module_name),
            options,
            trace,
        };
        translator.translate_object(code)
    }

    /// Translates the current state's code object and, recursively, every
    /// code constant embedded in it.
    fn translate_object(&mut self, code: &CodeObject) -> TranslateResult<Object> {
        if self.options.debug {
            self.trace.write_line(format_args!("object {}:", self.state.module_name));
        }

        // entry block
        if let Some(first) = code.instructions.first() {
            self.state.get_label(first.offset, 0, None);
        }
        let toplevel = self.mk_nodes(code)?;

        let mut objects = Vec::new();
        for raw in &code.co_consts {
            let RawConstant::Code(inner) = raw else { continue };
            let child_name = self.state.module_name.extend(&inner.co_name);
            let child_state = self.state.nested(child_name);
            let parent_state = std::mem::replace(&mut self.state, child_state);
            let child = self.translate_object(inner);
            self.state = parent_state;
            let child_loc = inner
                .instructions
                .iter()
                .find_map(|instr| instr.starts_line)
                .map_or(Loc::UNKNOWN, Loc::line);
            objects.push((child_loc, child?));
        }

        Ok(Object {
            name: self.state.module_name.clone(),
            toplevel,
            objects,
            classes: std::mem::take(&mut self.state.classes),
            functions: std::mem::take(&mut self.state.functions),
        })
    }

    // ========================================================================
    // Block Assembly
    // ========================================================================

    /// Drains the instruction stream into basic blocks.
    ///
    /// At each block boundary the next instruction either answers to a
    /// known (or forced back-edge) label, or gets a fresh fall-through
    /// label with no parameters.
    fn mk_nodes(&mut self, code: &CodeObject) -> TranslateResult<Vec<Node>> {
        let instrs = &code.instructions;
        let mut nodes = Vec::new();
        let mut idx = 0;
        while idx < instrs.len() {
            let head = &instrs[idx];
            if let Some(line) = head.starts_line {
                self.state.loc = Loc::line(line);
            }
            let (name, params, prelude) = match self.starts_with_jump_target(head) {
                Some(_) => {
                    self.state.cfg.process_label(head.offset);
                    let label = self.state.cfg.label_at(head.offset).expect("label registered at block head");
                    (label.name.clone(), label.ssa_parameters.clone(), label.prelude.clone())
                }
                None => (self.state.cfg.fresh_name(), SsaParameters::new(), None),
            };
            self.state.bind_block(&params, prelude);
            let label_loc = self.state.loc;
            let last = self.parse_until_terminator(code, &mut idx)?;
            let stmts = self.state.drain_stmts();
            nodes.push(Node {
                label: name,
                ssa_parameters: params,
                label_loc,
                last_loc: self.state.loc,
                stmts,
                last,
            });
        }
        Ok(nodes)
    }

    /// Runs the interpreter until the current block closes: either the next
    /// instruction already answers to a label (fall into it with the drained
    /// stack), or an opcode produced a terminator.
    fn parse_until_terminator(&mut self, code: &CodeObject, idx: &mut usize) -> TranslateResult<Terminator> {
        loop {
            let Some(instr) = code.instructions.get(*idx) else {
                // well-formed bytecode ends every block with a terminator
                return Err(self.state.err(TranslateErrorKind::NextOffsetMissing));
            };
            if let Some(label) = self.starts_with_jump_target(instr) {
                let ssa_args = self.state.to_ssa();
                return Ok(Terminator::Jump(vec![NodeCall { label, ssa_args }]));
            }
            if let Some(line) = instr.starts_line {
                self.state.loc = Loc::line(line);
            }
            *idx += 1;
            let next_offset = code.instructions.get(*idx).map(|next| next.offset);
            if self.options.debug {
                self.trace.write_line(format_args!(
                    "{:>6} {:<20} {:>4} (stack {})",
                    instr.offset,
                    instr.opname,
                    instr.arg,
                    self.state.stack_len()
                ));
            }
            if let Some(signal) = self.run_instruction(code, instr, next_offset)? {
                return Ok(signal.into_terminator());
            }
        }
    }

    /// Decides whether `instr` has a label, registering a back-edge label
    /// when the frontend flagged a jump target we have not seen a jump to.
    ///
    /// The back-edge label commits to the current stack arity: by the time
    /// the back-jump is reached the join shape must already be known.
    fn starts_with_jump_target(&mut self, instr: &Instruction) -> Option<String> {
        if let Some(label) = self.state.cfg.label_at(instr.offset) {
            if label.processed {
                None
            } else {
                Some(label.name.clone())
            }
        } else if instr.is_jump_target {
            Some(self.state.synthesize_backedge_label(instr.offset))
        } else {
            None
        }
    }

    // ========================================================================
    // Instruction Dispatch
    // ========================================================================

    /// Interprets one instruction. Returns a signal when the instruction
    /// terminates the current block.
    fn run_instruction(
        &mut self,
        code: &CodeObject,
        instr: &Instruction,
        next_offset: Option<u32>,
    ) -> TranslateResult<Option<JumpSignal>> {
        let Some(op) = Opcode::parse(&instr.opname) else {
            return Err(self.state.err(TranslateErrorKind::UnsupportedOpcode(instr.opname.clone())));
        };
        let opname: &'static str = op.into();
        let arg = instr.arg;

        if let Some(binary) = op.binary_op() {
            return self.binary_builtin(opname, BuiltinCaller::Binary(binary)).map(|()| None);
        }
        if let Some(inplace) = op.inplace_op() {
            return self.binary_builtin(opname, BuiltinCaller::Inplace(inplace)).map(|()| None);
        }
        if let Some(unary) = op.unary_op() {
            let operand = self.state.pop(opname)?;
            let ssa = self.builtin_call(BuiltinCaller::Unary(unary), vec![operand]);
            self.state.push(Expr::Temp(ssa));
            return Ok(None);
        }

        match op {
            // === Loads ===
            Opcode::LoadConst => {
                let constant = Constant::normalize(&code.co_consts[arg as usize]);
                self.state.push(Expr::Const(constant));
            }
            Opcode::LoadName => {
                let id = self.state.resolve(&code.co_names[arg as usize], false);
                self.state.push(Expr::Var(id));
            }
            Opcode::LoadGlobal => {
                let id = self.state.resolve(&code.co_names[arg as usize], true);
                self.state.push(Expr::Var(id));
            }
            Opcode::LoadFast => {
                self.state.push(Expr::LocalVar(code.co_varnames[arg as usize].clone()));
            }
            Opcode::LoadAttr => {
                let exp = self.state.pop(opname)?;
                self.state.push(Expr::GetAttr {
                    exp: Box::new(exp),
                    attr: code.co_names[arg as usize].clone(),
                });
            }
            Opcode::LoadClosure => {
                let k = arg as usize;
                let name = if k < code.co_cellvars.len() {
                    code.co_cellvars[k].clone()
                } else {
                    code.co_freevars[k - code.co_cellvars.len()].clone()
                };
                self.state.push(Expr::LoadClosure(name));
            }
            Opcode::LoadBuildClass => {
                self.state.push(Expr::BuiltinCaller(BuiltinCaller::BuildClass));
            }
            Opcode::LoadMethod => {
                let exp = self.state.pop(opname)?;
                self.state.push(Expr::LoadMethod {
                    exp: Box::new(exp),
                    name: code.co_names[arg as usize].clone(),
                });
            }

            // === Stores ===
            Opcode::StoreName => self.store_name(code, arg, opname, false)?,
            Opcode::StoreGlobal => self.store_name(code, arg, opname, true)?,
            Opcode::StoreFast => {
                let rhs = self.state.pop(opname)?;
                self.state.emit(Stmt::Assign {
                    lhs: Expr::LocalVar(code.co_varnames[arg as usize].clone()),
                    rhs,
                });
            }
            Opcode::StoreAttr => {
                let obj = self.state.pop(opname)?;
                let rhs = self.state.pop(opname)?;
                self.state.emit(Stmt::Assign {
                    lhs: Expr::GetAttr {
                        exp: Box::new(obj),
                        attr: code.co_names[arg as usize].clone(),
                    },
                    rhs,
                });
            }
            Opcode::StoreSubscr => {
                let index = self.state.pop(opname)?;
                let obj = self.state.pop(opname)?;
                let rhs = self.state.pop(opname)?;
                self.state.emit(Stmt::Assign {
                    lhs: Expr::Subscript {
                        exp: Box::new(obj),
                        index: Box::new(index),
                    },
                    rhs,
                });
            }

            // === Stack Manipulation ===
            Opcode::PopTop => {
                let exp = self.state.pop(opname)?;
                match exp {
                    // the side effect was already staged as a statement
                    Expr::ImportName { .. } | Expr::Temp(_) => {}
                    exp => {
                        let lhs = self.state.fresh_ssa();
                        self.state.emit(Stmt::Assign {
                            lhs: Expr::Temp(lhs),
                            rhs: exp,
                        });
                    }
                }
            }
            Opcode::DupTop => {
                let top = self.state.peek(opname)?.clone();
                self.state.push(top);
            }
            Opcode::UnpackSequence => {
                if arg == 0 {
                    return Err(self.state.err(TranslateErrorKind::UnpackSequence(arg)));
                }
                let tos = self.state.pop(opname)?;
                // pushed deepest-index first so index 0 ends on top
                for i in (0..arg).rev() {
                    self.state.push(Expr::Subscript {
                        exp: Box::new(tos.clone()),
                        index: Box::new(Expr::Const(Constant::Int(i64::from(i)))),
                    });
                }
            }

            // === Subscript & Comparison ===
            Opcode::BinarySubscr => {
                let index = self.state.pop(opname)?;
                let exp = self.state.pop(opname)?;
                self.state.push(Expr::Subscript {
                    exp: Box::new(exp),
                    index: Box::new(index),
                });
            }
            Opcode::CompareOp => {
                let Some(cmp) = CompareOp::from_index(arg) else {
                    return Err(self.state.err(TranslateErrorKind::CompareOp(arg)));
                };
                self.binary_builtin(opname, BuiltinCaller::Compare(cmp))?;
            }

            // === Collection Building ===
            Opcode::BuildList | Opcode::BuildSet | Opcode::BuildTuple | Opcode::BuildSlice | Opcode::BuildString
            | Opcode::BuildMap => {
                let (kind, count) = match op {
                    Opcode::BuildList => (CollectionKind::List, arg),
                    Opcode::BuildSet => (CollectionKind::Set, arg),
                    Opcode::BuildTuple => (CollectionKind::Tuple, arg),
                    Opcode::BuildSlice => (CollectionKind::Slice, arg),
                    Opcode::BuildString => (CollectionKind::String, arg),
                    // maps interleave keys and values on the stack
                    _ => (CollectionKind::Map, 2 * arg),
                };
                let values = self.state.pop_n(opname, count as usize)?;
                self.state.push(Expr::Collection { kind, values });
            }
            Opcode::BuildConstKeyMap => self.build_const_key_map(opname, arg)?,

            // === Functions & Classes ===
            Opcode::MakeFunction => self.make_function(opname, arg)?,
            Opcode::CallFunction => self.call_function(opname, arg)?,
            Opcode::CallMethod => {
                let args = self.state.pop_n(opname, arg as usize)?;
                let callee = self.state.pop(opname)?;
                let lhs = self.state.fresh_ssa();
                self.state.emit(Stmt::CallMethod {
                    lhs,
                    callee,
                    args: args.into_iter().map(CallArg::positional).collect(),
                });
                self.state.push(Expr::Temp(lhs));
            }

            // === Imports & Annotations ===
            Opcode::SetupAnnotations => {
                let id = self.state.module_name.extend("__annotations__");
                self.state.register("__annotations__", id, false);
                self.state.emit(Stmt::SetupAnnotations);
            }
            Opcode::ImportName => self.import_name(code, arg, opname)?,
            Opcode::ImportFrom => self.import_from(code, arg, opname)?,

            // === F-strings ===
            Opcode::FormatValue => self.format_value(opname, arg)?,

            // === Iteration ===
            Opcode::GetIter => {
                let iterable = self.state.pop(opname)?;
                let ssa = self.builtin_call(BuiltinCaller::GetIter, vec![iterable]);
                self.state.push(Expr::Temp(ssa));
            }

            // === Control Flow ===
            Opcode::ReturnValue => {
                let ret = self.state.pop(opname)?;
                return Ok(Some(JumpSignal::Return(ret)));
            }
            Opcode::PopJumpIfTrue => return self.pop_jump(opname, arg, next_offset, false).map(Some),
            Opcode::PopJumpIfFalse => return self.pop_jump(opname, arg, next_offset, true).map(Some),
            Opcode::JumpIfTrueOrPop => return self.jump_or_pop(opname, arg, next_offset, false).map(Some),
            Opcode::JumpIfFalseOrPop => return self.jump_or_pop(opname, arg, next_offset, true).map(Some),
            Opcode::JumpForward => {
                let next_offset = self.require_next_offset(next_offset)?;
                let ssa_args = self.state.to_ssa();
                let label = self.state.get_label(next_offset + arg, ssa_args.len(), None);
                return Ok(Some(JumpSignal::Absolute(NodeCall { label, ssa_args })));
            }
            Opcode::JumpAbsolute => return self.jump_absolute(arg, instr.offset).map(Some),
            Opcode::ForIter => return self.for_iter(opname, arg, next_offset).map(Some),

            // operator families were dispatched above
            _ => unreachable!("operator opcode {opname} not handled by its family"),
        }
        Ok(None)
    }

    // ========================================================================
    // Opcode Handlers
    // ========================================================================

    /// Emits a builtin call statement and returns the result temporary.
    fn builtin_call(&mut self, call: BuiltinCaller, args: Vec<Expr>) -> Ssa {
        let lhs = self.state.fresh_ssa();
        self.state.emit(Stmt::BuiltinCall { lhs, call, args });
        lhs
    }

    /// Shared shape of binary, in-place and comparison opcodes: pop two
    /// operands, stage the builtin call, push the temporary.
    fn binary_builtin(&mut self, opname: &'static str, call: BuiltinCaller) -> TranslateResult<()> {
        let rhs = self.state.pop(opname)?;
        let lhs = self.state.pop(opname)?;
        let ssa = self.builtin_call(call, vec![lhs, rhs]);
        self.state.push(Expr::Temp(ssa));
        Ok(())
    }

    /// `STORE_NAME` / `STORE_GLOBAL`: assign into the module namespace and
    /// keep the name tables in sync. Assigning an import result rebinds the
    /// name to the imported entity so later lookups see it.
    fn store_name(&mut self, code: &CodeObject, arg: u32, opname: &'static str, global: bool) -> TranslateResult<()> {
        let name = &code.co_names[arg as usize];
        let rhs = self.state.pop(opname)?;
        let target = if global {
            self.state.module_name.root().extend(name)
        } else {
            self.state.module_name.extend(name)
        };
        let bound = match &rhs {
            Expr::ImportName { id, .. } => id.clone(),
            Expr::ImportFrom { from, name: attr } => match from.as_ref() {
                Expr::ImportName { id, .. } => id.extend(attr),
                _ => target.clone(),
            },
            _ => target.clone(),
        };
        self.state.register(name, bound, global);
        self.state.emit(Stmt::Assign {
            lhs: Expr::Var(target),
            rhs,
        });
        Ok(())
    }

    /// `CALL_FUNCTION`: dispatch on the callee shape.
    fn call_function(&mut self, opname: &'static str, count: u32) -> TranslateResult<()> {
        let args = self.state.pop_n(opname, count as usize)?;
        let callee = self.state.pop(opname)?;
        match callee {
            Expr::BuiltinCaller(BuiltinCaller::BuildClass) => {
                if args.len() < 2 {
                    return Err(self.state.err(TranslateErrorKind::LoadBuildClass(args)));
                }
                let Expr::Const(Constant::String(class_name)) = &args[1] else {
                    return Err(self.state.err(TranslateErrorKind::LoadBuildClassName(args[1].clone())));
                };
                self.state.classes.insert(class_name.clone());
                self.state.push(Expr::Class(args));
            }
            Expr::BuiltinCaller(call) => {
                let ssa = self.builtin_call(call, args);
                self.state.push(Expr::Temp(ssa));
            }
            callee => {
                let lhs = self.state.fresh_ssa();
                self.state.emit(Stmt::Call {
                    lhs,
                    callee,
                    args: args.into_iter().map(CallArg::positional).collect(),
                });
                self.state.push(Expr::Temp(lhs));
            }
        }
        Ok(())
    }

    /// `MAKE_FUNCTION`: pop qualname and code, then conditionally pop the
    /// flag-driven operands in bytecode order. Closure cells and defaults
    /// are popped and dropped; only annotations survive into the IR.
    fn make_function(&mut self, opname: &'static str, flags: u32) -> TranslateResult<()> {
        let raw_qualname = match self.state.pop(opname)? {
            Expr::Const(Constant::String(s)) => s,
            got => {
                return Err(self.state.err(TranslateErrorKind::MakeFunction {
                    what: "a string literal qualified name",
                    got,
                }))
            }
        };
        let code = match self.state.pop(opname)? {
            Expr::Const(Constant::Code(code)) => code,
            got => {
                return Err(self.state.err(TranslateErrorKind::MakeFunction {
                    what: "a code object",
                    got,
                }))
            }
        };
        if flags & 0x08 != 0 {
            self.state.pop(opname)?;
        }
        let annotations = if flags & 0x04 != 0 {
            match self.state.pop(opname)? {
                Expr::ConstMap(map) => Some(map),
                got => {
                    return Err(self.state.err(TranslateErrorKind::MakeFunction {
                        what: "an annotations map",
                        got,
                    }))
                }
            }
        } else {
            None
        };
        if flags & 0x02 != 0 {
            self.state.pop(opname)?;
        }
        if flags & 0x01 != 0 {
            self.state.pop(opname)?;
        }
        let mut qualname = self.state.module_name.root();
        for part in raw_qualname.split('.') {
            qualname = qualname.extend(part);
        }
        self.state.functions.insert(raw_qualname, qualname.clone());
        self.state.push(Expr::Function {
            qualname,
            code,
            annotations,
        });
        Ok(())
    }

    /// `BUILD_CONST_KEY_MAP`: the keys must be a constant tuple whose length
    /// matches the operand; values pair up positionally.
    fn build_const_key_map(&mut self, opname: &'static str, count: u32) -> TranslateResult<()> {
        let keys = match self.state.pop(opname)? {
            Expr::Const(Constant::Tuple(keys)) => keys,
            got => return Err(self.state.err(TranslateErrorKind::BuildConstKeyMapKeys(got))),
        };
        if keys.len() != count as usize {
            return Err(self.state.err(TranslateErrorKind::BuildConstKeyMapLength {
                expected: count as usize,
                got: keys.len(),
            }));
        }
        let values = self.state.pop_n(opname, count as usize)?;
        let map: ConstMap = keys.into_iter().zip(values).collect();
        self.state.push(Expr::ConstMap(map));
        Ok(())
    }

    /// `IMPORT_NAME`: build the imported identifier from the name operand
    /// and the relative-import level, then stage both the expression and the
    /// side-effect statement.
    fn import_name(&mut self, code: &CodeObject, arg: u32, opname: &'static str) -> TranslateResult<()> {
        let name = &code.co_names[arg as usize];
        let fromlist_exp = self.state.pop(opname)?;
        let fromlist = self.parse_fromlist(fromlist_exp)?;
        let level = match self.state.pop(opname)? {
            Expr::Const(Constant::Int(level)) => level,
            got => return Err(self.state.err(TranslateErrorKind::ImportNameLevel(got))),
        };
        let id = if level == 0 {
            Ident::from_dotted(name, IdentKind::Imported)
        } else {
            let mut base = self.state.module_name.clone();
            for _ in 0..level {
                base = base.pop().ok_or_else(|| {
                    self.state.err(TranslateErrorKind::ImportNameDepth {
                        id: self.state.module_name.clone(),
                        depth: level,
                    })
                })?;
            }
            let mut base = base.with_kind(IdentKind::Imported);
            if !name.is_empty() {
                for part in name.split('.') {
                    base = base.extend(part);
                }
            }
            base
        };
        self.state.emit(Stmt::ImportName {
            id: id.clone(),
            fromlist: fromlist.clone(),
        });
        self.state.push(Expr::ImportName { id, fromlist });
        Ok(())
    }

    /// Decodes the fromlist constant: a string means one name, `None` means
    /// no names, a tuple of strings means those names.
    fn parse_fromlist(&self, exp: Expr) -> TranslateResult<Vec<String>> {
        match &exp {
            Expr::Const(Constant::String(s)) => Ok(vec![s.clone()]),
            Expr::Const(Constant::Null) => Ok(Vec::new()),
            Expr::Const(Constant::Tuple(items)) => {
                let mut names = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Constant::String(s) => names.push(s.clone()),
                        _ => return Err(self.state.err(TranslateErrorKind::ImportNameFromList(exp.clone()))),
                    }
                }
                Ok(names)
            }
            _ => Err(self.state.err(TranslateErrorKind::ImportNameFromList(exp))),
        }
    }

    /// `IMPORT_FROM`: peeks (does not pop) the import below and projects one
    /// name out of it. A name missing from the declared fromlist is only a
    /// warning; the projection still flows downstream.
    fn import_from(&mut self, code: &CodeObject, arg: u32, opname: &'static str) -> TranslateResult<()> {
        let name = &code.co_names[arg as usize];
        let top = self.state.peek(opname)?.clone();
        match &top {
            Expr::ImportName { id, fromlist } => {
                if !fromlist.iter().any(|candidate| candidate == name) {
                    self.trace.write_line(format_args!(
                        "warning: IMPORT_FROM: name {name} is not part of the fromlist of {id}"
                    ));
                }
            }
            _ => return Err(self.state.err(TranslateErrorKind::ImportFrom(top))),
        }
        self.state.push(Expr::ImportFrom {
            from: Box::new(top),
            name: name.clone(),
        });
        Ok(())
    }

    /// `FORMAT_VALUE`: optional conversion selected by the low flag bits,
    /// optional format spec popped when bit 2 is set.
    fn format_value(&mut self, opname: &'static str, flags: u32) -> TranslateResult<()> {
        let spec = if flags & 0x04 != 0 {
            match self.state.pop(opname)? {
                spec @ Expr::Const(Constant::String(_)) => Some(spec),
                got => return Err(self.state.err(TranslateErrorKind::FormatValueSpec(got))),
            }
        } else {
            None
        };
        let value = self.state.pop(opname)?;
        let conversion = match flags & 0x03 {
            1 => Some(FormatFunction::Str),
            2 => Some(FormatFunction::Repr),
            3 => Some(FormatFunction::Ascii),
            _ => None,
        };
        let value = match conversion {
            Some(func) => {
                let ssa = self.builtin_call(BuiltinCaller::FormatFn(func), vec![value]);
                Expr::Temp(ssa)
            }
            None => value,
        };
        let spec = spec.unwrap_or(Expr::Const(Constant::Null));
        let ssa = self.builtin_call(BuiltinCaller::Format, vec![value, spec]);
        self.state.push(Expr::Temp(ssa));
        Ok(())
    }

    // ========================================================================
    // Branch Handlers
    // ========================================================================

    fn require_next_offset(&self, next_offset: Option<u32>) -> TranslateResult<u32> {
        next_offset.ok_or_else(|| self.state.err(TranslateErrorKind::NextOffsetMissing))
    }

    /// `POP_JUMP_IF_TRUE` / `POP_JUMP_IF_FALSE`: pop the condition, drain
    /// the stack, and branch. `next_is_true` records which opcode keeps the
    /// fall-through on a true condition.
    fn pop_jump(
        &mut self,
        opname: &'static str,
        target: u32,
        next_offset: Option<u32>,
        next_is_true: bool,
    ) -> TranslateResult<JumpSignal> {
        let cond = self.state.pop(opname)?;
        let next_offset = self.require_next_offset(next_offset)?;
        let ssa_args = self.state.to_ssa();
        let arity = ssa_args.len();
        let next_label = self.state.get_label(next_offset, arity, None);
        let other_label = self.state.get_label(target, arity, None);
        let cond = if next_is_true { cond } else { Expr::Not(Box::new(cond)) };
        Ok(JumpSignal::TwoWay {
            cond,
            next: NodeCall {
                label: next_label,
                ssa_args: ssa_args.clone(),
            },
            other: NodeCall {
                label: other_label,
                ssa_args,
            },
        })
    }

    /// `JUMP_IF_TRUE_OR_POP` / `JUMP_IF_FALSE_OR_POP`: the condition stays
    /// on the stack along the jump edge and is popped along the
    /// fall-through edge, so the fall-through target has one parameter less.
    fn jump_or_pop(
        &mut self,
        opname: &'static str,
        target: u32,
        next_offset: Option<u32>,
        next_is_true: bool,
    ) -> TranslateResult<JumpSignal> {
        let cond = self.state.peek(opname)?.clone();
        let next_offset = self.require_next_offset(next_offset)?;
        let ssa_args = self.state.to_ssa();
        let mut next_args = ssa_args.clone();
        // the fall-through edge pops the condition (top of stack)
        next_args.pop();
        let next_label = self.state.get_label(next_offset, next_args.len(), None);
        let other_label = self.state.get_label(target, ssa_args.len(), None);
        let cond = if next_is_true { cond } else { Expr::Not(Box::new(cond)) };
        Ok(JumpSignal::TwoWay {
            cond,
            next: NodeCall {
                label: next_label,
                ssa_args: next_args,
            },
            other: NodeCall {
                label: other_label,
                ssa_args,
            },
        })
    }

    /// `JUMP_ABSOLUTE`: backward targets must already answer to a
    /// synthesized back-edge label of matching arity; forward targets behave
    /// like `JUMP_FORWARD`.
    fn jump_absolute(&mut self, target: u32, current_offset: u32) -> TranslateResult<JumpSignal> {
        if target < current_offset {
            let arity = self.state.stack_len();
            let Some(label) = self.state.cfg.label_at(target) else {
                return Err(self.state.err(TranslateErrorKind::MissingBackEdge {
                    from: current_offset,
                    to: target,
                }));
            };
            if label.ssa_parameters.len() != arity {
                return Err(self.state.err(TranslateErrorKind::InvalidBackEdge {
                    label: label.name.clone(),
                    expected: label.ssa_parameters.len(),
                    actual: arity,
                }));
            }
            assert!(
                label.backedge,
                "back-jump from offset {current_offset} into {} which was not synthesized as a back-edge target",
                label.name
            );
            let label = label.name.clone();
            let ssa_args = self.state.to_ssa();
            Ok(JumpSignal::Absolute(NodeCall { label, ssa_args }))
        } else {
            let ssa_args = self.state.to_ssa();
            let label = self.state.get_label(target, ssa_args.len(), None);
            Ok(JumpSignal::Absolute(NodeCall { label, ssa_args }))
        }
    }

    /// `FOR_ITER`: advance the iterator and branch on exhaustion. The body
    /// label carries a prelude restoring the iterator and pushing the
    /// current item on top; the exit label resumes with the drained stack
    /// unchanged.
    fn for_iter(&mut self, opname: &'static str, delta: u32, next_offset: Option<u32>) -> TranslateResult<JumpSignal> {
        let iter = self.state.pop(opname)?;
        let next_offset = self.require_next_offset(next_offset)?;
        let id = self.builtin_call(BuiltinCaller::NextIter, vec![iter.clone()]);
        let cond = self.builtin_call(BuiltinCaller::HasNextIter, vec![Expr::Temp(id)]);
        let ssa_args = self.state.to_ssa();
        let arity = ssa_args.len();
        let prelude: Rc<Prelude> = Rc::new(move |st: &mut State| {
            st.push(iter.clone());
            let data = st.fresh_ssa();
            st.emit(Stmt::BuiltinCall {
                lhs: data,
                call: BuiltinCaller::IterData,
                args: vec![Expr::Temp(id)],
            });
            st.push(Expr::Temp(data));
        });
        let next_label = self.state.get_label(next_offset, arity, Some(prelude));
        let other_label = self.state.get_label(next_offset + delta, arity, None);
        Ok(JumpSignal::TwoWay {
            cond: Expr::Temp(cond),
            next: NodeCall {
                label: next_label,
                ssa_args: ssa_args.clone(),
            },
            other: NodeCall {
                label: other_label,
                ssa_args,
            },
        })
    }
}

/// Derives the module identifier from a source path: strip a leading `./`
/// and the file extension, then split on `/`.
fn module_name_from_filename(filename: &str) -> Ident {
    let path = filename.strip_prefix("./").unwrap_or(filename);
    let path = match path.rfind('.') {
        Some(dot) if !path[dot..].contains('/') => &path[..dot],
        _ => path,
    };
    let mut parts = path.split('/').filter(|part| !part.is_empty());
    let mut id = Ident::new(parts.next().unwrap_or("<module>"), IdentKind::Normal);
    for part in parts {
        id = id.extend(part);
    }
    id
}
