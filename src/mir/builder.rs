//! Lowering from the type-checked AST to MIR.
//!
//! The builder keeps a cursor basic block; expressions append
//! non-terminator instructions to it, and control structures create new
//! blocks and set terminators. Top-level statements are lowered into an
//! implicit `script` function (uniquified per submission in interactive
//! mode), and every `func` statement becomes its own MIR function.
//!
//! Named variables stay memory-resident: a `let` allocates a slot and
//! reads go through `Load`. Phi instructions appear only at the merges
//! the builder itself creates: valued conditionals, short-circuit
//! `and`/`or`, and the true/false selection inside `print`.
//!
//! The builder must only run on a context whose statements all checked
//! cleanly; any inconsistency it finds is an invariant violation and
//! panics.

use std::rc::Rc;

use crate::ast::{BlockKind, CallArg, Expr, ExprKind, LoopKind, Stmt};
use crate::context::{FrontendContext, Status};
use crate::scope::{NodeId, NodeKind, Signature, SymbolTree};
use crate::source::Location;
use crate::token::{LiteralValue, Tok};
use crate::types::Type;

use super::{
    BinOp, BlockId, ControlFrame, ControlStack, FrameKind, FuncId, Instr, MirModule, UnOp, Value,
};

pub struct MirBuilder<'a> {
    module: &'a mut MirModule,
    tree: &'a SymbolTree,
    func: FuncId,
    /// The cursor block new instructions append to.
    block: BlockId,
    control: ControlStack,
}

impl<'a> MirBuilder<'a> {
    /// Lowers the context's checked-but-unlowered statements into the MIR
    /// module.
    ///
    /// Panics if the context is in an error state or statements failed to
    /// check; the caller guards on a clean check.
    pub fn build(context: &mut FrontendContext, repl_mode: bool) {
        if context.status == Status::Error {
            panic!("MirBuilder::build: context is already in an error state");
        }
        let FrontendContext {
            stmts,
            stmts_checked,
            stmts_lowered,
            symbol_tree,
            module,
            ..
        } = &mut *context;
        if *stmts_checked < stmts.len() {
            panic!("MirBuilder::build: not all statements have been type-checked");
        }

        let name = if repl_mode {
            let n = module.script_counter;
            module.script_counter += 1;
            format!("script#{}", n)
        } else {
            "script".to_string()
        };
        // The runtime symbols the emitted code may reference.
        module.runtime_function("printf", Type::I32);
        module.runtime_function("fprintf", Type::I32);
        module.runtime_function("abort", Type::Never);
        module.runtime_function("exit", Type::Never);
        module.runtime_function(
            "malloc",
            Type::Pointer {
                base: Box::new(Type::Int {
                    signed: false,
                    width: 8,
                }),
                mutable: true,
            },
        );
        module.runtime_function("free", Type::Unit);

        let func = module.create_function(name, Type::I32);
        let entry = module.function(func).entry;
        let exit = module.function(func).exit;
        let ret_slot = module.temp(pointer_to(Type::I32), Some("$retval"));
        module
            .function_mut(func)
            .add_instr(entry, Instr::Alloca {
                dst: ret_slot.clone(),
                ty: Type::I32,
            });
        module.function_mut(func).return_slot = Some(ret_slot.clone());

        let mut builder = MirBuilder {
            module,
            tree: symbol_tree,
            func,
            block: entry,
            control: ControlStack::new(),
        };
        builder.control.push(ControlFrame {
            kind: FrameKind::Script { exit },
            label: None,
            yield_slot: Some(ret_slot.clone()),
        });

        let new_stmts = &stmts[*stmts_lowered..];
        for stmt in new_stmts {
            builder.declare_function_shells(stmt);
        }
        for stmt in new_stmts {
            builder.lower_stmt(stmt);
        }

        let zero = int_literal(0, Type::I32);
        builder.emit(Instr::Store {
            src: zero,
            dst: ret_slot,
        });
        builder.seal_with_jump(exit);
        builder.control.pop();

        *stmts_lowered = stmts.len();
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn current_fn(&mut self) -> &mut super::Function {
        self.module.function_mut(self.func)
    }

    fn emit(&mut self, instr: Instr) {
        let block = self.block;
        self.current_fn().add_instr(block, instr);
    }

    fn new_block(&mut self, name: &str) -> BlockId {
        self.current_fn().create_block(name)
    }

    /// Terminates the cursor block with a jump unless something already
    /// terminated it.
    fn seal_with_jump(&mut self, to: BlockId) {
        let from = self.block;
        if !self.current_fn().block(from).is_terminated() {
            self.current_fn().set_successor(from, to);
        }
    }

    fn temp(&mut self, ty: Type, stem: Option<&str>) -> Value {
        self.module.temp(ty, stem)
    }

    /// Allocates a pointer-typed slot in the cursor block and returns it.
    fn alloca_slot(&mut self, ty: Type, stem: &str) -> Value {
        let slot = self.temp(pointer_to(ty.clone()), Some(stem));
        self.emit(Instr::Alloca {
            dst: slot.clone(),
            ty,
        });
        slot
    }

    fn variable_value(&self, entry: NodeId) -> Value {
        let field = self
            .tree
            .field(entry)
            .unwrap_or_else(|| panic!("MirBuilder::variable_value: entry is not a field"));
        Value::Variable {
            ty: Type::Pointer {
                base: Box::new(field.ty.clone()),
                mutable: field.mutable,
            },
            name: field.token.lexeme().to_string(),
            entry,
        }
    }

    fn signature_of(&self, decl: NodeId, index: usize) -> Signature {
        match &self.tree.node(decl).kind {
            NodeKind::FunctionDecl { signatures, .. } => signatures[index].clone(),
            _ => panic!("MirBuilder::signature_of: node is not a function declaration"),
        }
    }

    // ------------------------------------------------------------------
    // Function shells
    // ------------------------------------------------------------------

    /// Creates the MIR function for every `func` statement before any body
    /// is lowered, so calls may refer forward within a submission.
    fn declare_function_shells(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Func { name, decl, .. } => {
                let Some((decl, index)) = *decl else { return };
                if self.module.lookup_signature(decl, index).is_some() {
                    return;
                }
                let signature = self.signature_of(decl, index);
                let overloads = match &self.tree.node(decl).kind {
                    NodeKind::FunctionDecl { signatures, .. } => signatures.len(),
                    _ => 1,
                };
                let fn_name = if overloads == 1 {
                    name.lexeme().to_string()
                } else {
                    format!("{}#{}", name.lexeme(), index)
                };
                let func = self.module.create_function(fn_name, signature.ret.clone());
                for param in &signature.params {
                    let formal = self.module.temp(param.ty.clone(), Some(&param.name));
                    self.module.function_mut(func).params.push(formal);
                }
                self.module.bind_signature(decl, index, func);
            }
            Stmt::Namespace { body, .. } => {
                for inner in body {
                    self.declare_function_shells(inner);
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression { expr } => {
                self.lower_expr(expr);
            }
            Stmt::Let {
                initializer, entry, ..
            } => {
                let entry = entry
                    .unwrap_or_else(|| panic!("MirBuilder::lower_stmt: unresolved let binding"));
                let variable = self.variable_value(entry);
                let ty = self
                    .tree
                    .field(entry)
                    .map(|f| f.ty.clone())
                    .unwrap_or(Type::Unknown);
                self.emit(Instr::Alloca {
                    dst: variable.clone(),
                    ty,
                });
                if let Some(initializer) = initializer {
                    if let Some(value) = self.lower_expr(initializer) {
                        self.emit(Instr::Store {
                            src: value,
                            dst: variable,
                        });
                    }
                }
            }
            Stmt::Func { .. } => self.lower_function(stmt),
            Stmt::Struct { .. } => {}
            Stmt::Namespace { body, .. } => {
                for inner in body {
                    self.lower_stmt(inner);
                }
            }
            Stmt::Print { args, .. } => {
                for arg in args {
                    self.lower_print(arg);
                }
            }
            Stmt::Pass { .. } | Stmt::Eof => {}
            Stmt::Yield { label, value, .. } => {
                let value = value.as_ref().and_then(|v| self.lower_expr(v));
                let label = label.as_ref().map(|t| t.lexeme().to_string());
                let frame = self.control.yield_target(label.as_deref());
                // Yields targeting a loop were already diagnosed as
                // warnings; they lower to nothing.
                if matches!(frame.kind, FrameKind::Loop { .. }) {
                    return;
                }
                let slot = frame.yield_slot.clone();
                if let (Some(value), Some(slot)) = (value, slot) {
                    self.emit(Instr::Store {
                        src: value,
                        dst: slot,
                    });
                }
            }
            Stmt::Break { label, value, .. } => {
                let value = value.as_ref().and_then(|v| self.lower_expr(v));
                let label = label.as_ref().map(|t| t.lexeme().to_string());
                let slot = self.control.loop_yield_slot(label.as_deref()).cloned();
                if let (Some(value), Some(slot)) = (value, slot) {
                    self.emit(Instr::Store {
                        src: value,
                        dst: slot,
                    });
                }
                let merge = self.control.loop_merge(label.as_deref());
                self.seal_with_jump(merge);
                self.block = self.new_block("after_break");
            }
            Stmt::Continue { label, .. } => {
                let label = label.as_ref().map(|t| t.lexeme().to_string());
                let target = self.control.loop_continue(label.as_deref());
                self.seal_with_jump(target);
                self.block = self.new_block("after_continue");
            }
            Stmt::Return { value, .. } => {
                let value = value.as_ref().and_then(|v| self.lower_expr(v));
                let slot = self.control.function_yield_slot().cloned();
                if let (Some(value), Some(slot)) = (value, slot) {
                    self.emit(Instr::Store {
                        src: value,
                        dst: slot,
                    });
                }
                let exit = self.control.function_exit();
                self.seal_with_jump(exit);
                self.block = self.new_block("after_return");
            }
            Stmt::Dealloc { operand, .. } => {
                if let Some(pointer) = self.lower_expr(operand) {
                    let free = self.module.runtime_function("free", Type::Unit);
                    self.emit(Instr::Call {
                        target: free,
                        args: vec![pointer],
                        dst: None,
                    });
                }
            }
        }
    }

    fn lower_function(&mut self, stmt: &Stmt) {
        let Stmt::Func {
            name, params, body, decl, ..
        } = stmt
        else {
            unreachable!();
        };
        let Some((decl, index)) = *decl else { return };
        // Functions nested in blocks have no shell yet.
        if self.module.lookup_signature(decl, index).is_none() {
            self.declare_function_shells(stmt);
        }
        let func = self
            .module
            .lookup_signature(decl, index)
            .unwrap_or_else(|| panic!("MirBuilder::lower_function: missing shell for `{}`", name.lexeme()));
        let signature = self.signature_of(decl, index);

        let saved_func = self.func;
        let saved_block = self.block;
        self.func = func;
        self.block = self.module.function(func).entry;
        let exit = self.module.function(func).exit;

        let ret_slot = if signature.ret.is_unit() || signature.ret.is_never() {
            None
        } else {
            let slot = self.alloca_slot(signature.ret.clone(), "$retval");
            self.module.function_mut(func).return_slot = Some(slot.clone());
            Some(slot)
        };

        // Parameters are allocated at entry and initialized from the
        // formal argument temporaries.
        let formals = self.module.function(func).params.clone();
        for (param, formal) in params.iter().zip(formals) {
            let Some(entry) = param.entry else { continue };
            let variable = self.variable_value(entry);
            let ty = formal.ty().clone();
            self.emit(Instr::Alloca {
                dst: variable.clone(),
                ty,
            });
            self.emit(Instr::Store {
                src: formal,
                dst: variable,
            });
        }

        self.control.push(ControlFrame {
            kind: FrameKind::Function {
                exit,
                name: name.lexeme().to_string(),
            },
            label: None,
            yield_slot: ret_slot.clone(),
        });
        let body_value = self.lower_expr(body);
        if let (Some(value), Some(slot)) = (body_value, ret_slot) {
            self.emit(Instr::Store {
                src: value,
                dst: slot,
            });
        }
        self.seal_with_jump(exit);
        self.control.pop();

        self.func = saved_func;
        self.block = saved_block;
    }

    fn lower_print(&mut self, arg: &Expr) {
        let Some(value) = self.lower_expr(arg) else {
            return;
        };
        let printf = self.module.runtime_function("printf", Type::I32);
        match arg.checked_ty() {
            Type::Int { .. } => {
                let fmt = str_literal("%d");
                self.emit(Instr::Call {
                    target: printf,
                    args: vec![fmt, value],
                    dst: None,
                });
            }
            Type::Float { .. } => {
                let fmt = str_literal("%f");
                self.emit(Instr::Call {
                    target: printf,
                    args: vec![fmt, value],
                    dst: None,
                });
            }
            Type::Str => {
                let fmt = str_literal("%s");
                self.emit(Instr::Call {
                    target: printf,
                    args: vec![fmt, value],
                    dst: None,
                });
            }
            Type::Bool => {
                // Select "true" or "false" with a phi over the branch.
                let start = self.block;
                let true_block = self.new_block("print_true");
                let false_block = self.new_block("print_false");
                let merge = self.new_block("print_merge");
                self.current_fn()
                    .set_successors(start, value, true_block, false_block);
                self.current_fn().set_successor(true_block, merge);
                self.current_fn().set_successor(false_block, merge);
                self.block = merge;
                let text = self.temp(Type::Str, Some("bool_text"));
                self.emit(Instr::Phi {
                    dst: text.clone(),
                    incoming: vec![
                        (true_block, str_literal("true")),
                        (false_block, str_literal("false")),
                    ],
                });
                let fmt = str_literal("%s");
                self.emit(Instr::Call {
                    target: printf,
                    args: vec![fmt, text],
                    dst: None,
                });
            }
            other => panic!("MirBuilder::lower_print: unprintable type `{}`", other),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Lowers an expression for its value. Returns `None` for unit-typed
    /// (and diverging) expressions, which produce no value.
    fn lower_expr(&mut self, expr: &Expr) -> Option<Value> {
        match &expr.kind {
            ExprKind::Literal { token, negative } => {
                let lit = token
                    .literal
                    .clone()
                    .unwrap_or_else(|| panic!("MirBuilder::lower_expr: literal without a value"));
                Some(Value::Literal {
                    ty: expr.checked_ty().clone(),
                    lit,
                    negative: *negative,
                    token: Some(Rc::clone(token)),
                })
            }
            ExprKind::NameRef { entry, .. } => {
                let entry = entry
                    .unwrap_or_else(|| panic!("MirBuilder::lower_expr: unresolved name reference"));
                let ty = expr.checked_ty().clone();
                if ty.is_unit() {
                    return None;
                }
                let variable = self.variable_value(entry);
                let dst = self.temp(ty, None);
                self.emit(Instr::Load {
                    src: variable,
                    dst: dst.clone(),
                });
                Some(dst)
            }
            ExprKind::Assign { op, target, value } => {
                let place = self.lower_place(target)?;
                let result = if op.tok.is_compound_operator() {
                    let current = self.temp(target.checked_ty().clone(), None);
                    self.emit(Instr::Load {
                        src: place.clone(),
                        dst: current.clone(),
                    });
                    let rhs = self.lower_expr(value)?;
                    let bin_op = compound_bin_op(op.tok);
                    if matches!(bin_op, BinOp::Div | BinOp::Rem)
                        && target.checked_ty().is_integer()
                    {
                        self.emit_div_zero_check(&rhs, &op.location);
                    }
                    let dst = self.temp(target.checked_ty().clone(), None);
                    self.emit(Instr::Binary {
                        op: bin_op,
                        left: current,
                        right: rhs,
                        dst: dst.clone(),
                    });
                    dst
                } else {
                    self.lower_expr(value)?
                };
                self.emit(Instr::Store {
                    src: result.clone(),
                    dst: place,
                });
                Some(result)
            }
            ExprKind::Logical { op, left, right } => {
                let lhs = self.lower_expr(left)?;
                let is_and = op.tok == Tok::KwAnd;
                let start = self.block;
                let rhs_block = self.new_block(if is_and { "and_rhs" } else { "or_rhs" });
                let merge = self.new_block(if is_and { "and_merge" } else { "or_merge" });
                if is_and {
                    self.current_fn().set_successors(start, lhs, rhs_block, merge);
                } else {
                    self.current_fn().set_successors(start, lhs, merge, rhs_block);
                }
                self.block = rhs_block;
                let rhs = self.lower_expr(right)?;
                let rhs_end = self.block;
                self.seal_with_jump(merge);
                self.block = merge;
                let dst = self.temp(Type::Bool, None);
                self.emit(Instr::Phi {
                    dst: dst.clone(),
                    incoming: vec![(start, bool_literal(!is_and)), (rhs_end, rhs)],
                });
                Some(dst)
            }
            ExprKind::Binary { op, left, right } => {
                let lhs = self.lower_expr(left)?;
                let rhs = self.lower_expr(right)?;
                let bin_op = arith_bin_op(op.tok);
                if matches!(bin_op, BinOp::Div | BinOp::Rem) && left.checked_ty().is_integer() {
                    self.emit_div_zero_check(&rhs, &op.location);
                }
                let dst = self.temp(expr.checked_ty().clone(), None);
                self.emit(Instr::Binary {
                    op: bin_op,
                    left: lhs,
                    right: rhs,
                    dst: dst.clone(),
                });
                Some(dst)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.lower_expr(operand)?;
                let un_op = match op.tok {
                    Tok::Minus => UnOp::Neg,
                    Tok::Bang | Tok::KwNot => UnOp::Not,
                    _ => panic!("MirBuilder::lower_expr: unknown unary operator"),
                };
                let dst = self.temp(expr.checked_ty().clone(), None);
                self.emit(Instr::Unary {
                    op: un_op,
                    operand: value,
                    dst: dst.clone(),
                });
                Some(dst)
            }
            ExprKind::Address { operand, .. } => {
                let place = self.lower_place(operand)?;
                let dst = self.temp(expr.checked_ty().clone(), None);
                self.emit(Instr::Unary {
                    op: UnOp::Cast,
                    operand: place,
                    dst: dst.clone(),
                });
                Some(dst)
            }
            ExprKind::Deref { operand, .. } => {
                let pointer = self.lower_expr(operand)?;
                let ty = expr.checked_ty().clone();
                if ty.is_unit() {
                    return None;
                }
                let dst = self.temp(ty, None);
                self.emit(Instr::Load {
                    src: pointer,
                    dst: dst.clone(),
                });
                Some(dst)
            }
            ExprKind::Cast { operand, .. } => {
                let value = self.lower_expr(operand)?;
                let dst = self.temp(expr.checked_ty().clone(), None);
                self.emit(Instr::Unary {
                    op: UnOp::Cast,
                    operand: value,
                    dst: dst.clone(),
                });
                Some(dst)
            }
            ExprKind::Access { .. } | ExprKind::Subscript { .. } => {
                let place = self.lower_place(expr)?;
                let ty = expr.checked_ty().clone();
                if ty.is_unit() {
                    return None;
                }
                let dst = self.temp(ty, None);
                self.emit(Instr::Load {
                    src: place,
                    dst: dst.clone(),
                });
                Some(dst)
            }
            ExprKind::Call { args, resolved, .. } => {
                let target = resolved
                    .unwrap_or_else(|| panic!("MirBuilder::lower_expr: unresolved call"));
                self.lower_call(target.decl, target.signature, args, expr.checked_ty())
            }
            ExprKind::SizeOf { .. } => Some(int_literal(
                self.sizeof_value(expr) as u64,
                expr.checked_ty().clone(),
            )),
            ExprKind::Alloc { count, .. } => {
                let pointee = match expr.checked_ty() {
                    Type::Pointer { base, .. } => (**base).clone(),
                    _ => Type::Unknown,
                };
                let elem_size = pointee.byte_size(self.tree);
                let u64_ty = Type::Int {
                    signed: false,
                    width: 64,
                };
                let size_value = match count {
                    Some(count) => {
                        let count_value = self.lower_expr(count)?;
                        let widened = self.temp(u64_ty.clone(), None);
                        self.emit(Instr::Unary {
                            op: UnOp::Cast,
                            operand: count_value,
                            dst: widened.clone(),
                        });
                        let total = self.temp(u64_ty.clone(), None);
                        self.emit(Instr::Binary {
                            op: BinOp::Mul,
                            left: widened,
                            right: int_literal(elem_size as u64, u64_ty.clone()),
                            dst: total.clone(),
                        });
                        total
                    }
                    None => int_literal(elem_size as u64, u64_ty),
                };
                let malloc = self.module.runtime_function(
                    "malloc",
                    pointer_to(Type::Int {
                        signed: false,
                        width: 8,
                    }),
                );
                let raw = self.temp(
                    pointer_to(Type::Int {
                        signed: false,
                        width: 8,
                    }),
                    None,
                );
                self.emit(Instr::Call {
                    target: malloc,
                    args: vec![size_value],
                    dst: Some(raw.clone()),
                });
                let dst = self.temp(expr.checked_ty().clone(), None);
                self.emit(Instr::Unary {
                    op: UnOp::Cast,
                    operand: raw,
                    dst: dst.clone(),
                });
                Some(dst)
            }
            ExprKind::Tuple { elements } | ExprKind::Array { elements } => {
                let ty = expr.checked_ty().clone();
                if ty.is_unit() {
                    return None;
                }
                let slot = self.alloca_slot(ty.clone(), "agg");
                let mut offset = 0usize;
                for element in elements {
                    let element_ty = element.checked_ty().clone();
                    let value = self.lower_expr(element);
                    if let Some(value) = value {
                        let addr = self.offset_pointer(slot.clone(), offset, element_ty.clone());
                        self.emit(Instr::Store {
                            src: value,
                            dst: addr,
                        });
                    }
                    offset += element_ty.byte_size(self.tree);
                }
                let dst = self.temp(ty, None);
                self.emit(Instr::Load {
                    src: slot,
                    dst: dst.clone(),
                });
                Some(dst)
            }
            ExprKind::Block(block) => {
                match block.kind {
                    BlockKind::Function => {
                        // The function frame's yield slot receives the
                        // value; the statements are all there is to lower.
                        for stmt in &block.stmts {
                            self.lower_stmt(stmt);
                        }
                        None
                    }
                    BlockKind::Loop => {
                        // Reached only through Loop lowering.
                        for stmt in &block.stmts {
                            self.lower_stmt(stmt);
                        }
                        None
                    }
                    BlockKind::Plain => {
                        let ty = expr.checked_ty().clone();
                        let slot = if ty.is_unit() || ty.is_never() || ty.is_unknown() {
                            None
                        } else {
                            Some(self.alloca_slot(ty.clone(), "blk"))
                        };
                        self.control.push(ControlFrame {
                            kind: FrameKind::Plain,
                            label: block.label.clone(),
                            yield_slot: slot.clone(),
                        });
                        for stmt in &block.stmts {
                            self.lower_stmt(stmt);
                        }
                        self.control.pop();
                        slot.map(|slot| {
                            let dst = self.temp(ty, None);
                            self.emit(Instr::Load {
                                src: slot,
                                dst: dst.clone(),
                            });
                            dst
                        })
                    }
                }
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.lower_expr(condition)?;
                let start = self.block;
                let then_block = self.new_block("if_then");
                let merge = self.new_block("if_merge");
                let else_block = else_branch.as_ref().map(|_| self.new_block("if_else"));
                self.current_fn().set_successors(
                    start,
                    cond,
                    then_block,
                    else_block.unwrap_or(merge),
                );

                self.block = then_block;
                let then_value = self.lower_expr(then_branch);
                let then_end = self.block;
                self.seal_with_jump(merge);

                let mut else_value = None;
                let mut else_end = None;
                if let (Some(else_branch), Some(else_block)) = (else_branch, else_block) {
                    self.block = else_block;
                    else_value = self.lower_expr(else_branch);
                    else_end = Some(self.block);
                    self.seal_with_jump(merge);
                }

                self.block = merge;
                let ty = expr.checked_ty().clone();
                match (then_value, else_value, else_end) {
                    (Some(then_value), Some(else_value), Some(else_end))
                        if !ty.is_unit() && !ty.is_never() =>
                    {
                        let dst = self.temp(ty, None);
                        self.emit(Instr::Phi {
                            dst: dst.clone(),
                            incoming: vec![(then_end, then_value), (else_end, else_value)],
                        });
                        Some(dst)
                    }
                    (Some(value), None, _) | (None, Some(value), _)
                        if !ty.is_unit() && !ty.is_never() =>
                    {
                        // The valueless side diverged; only one path can
                        // reach the merge with a value.
                        Some(value)
                    }
                    _ => None,
                }
            }
            ExprKind::Loop {
                kind,
                condition,
                body,
                label,
            } => self.lower_loop(expr, *kind, condition.as_deref(), body, label.as_deref()),
        }
    }

    fn lower_loop(
        &mut self,
        expr: &Expr,
        kind: LoopKind,
        condition: Option<&Expr>,
        body: &Expr,
        label: Option<&str>,
    ) -> Option<Value> {
        let ty = expr.checked_ty().clone();
        let slot = if ty.is_unit() || ty.is_never() || ty.is_unknown() {
            None
        } else {
            Some(self.alloca_slot(ty.clone(), "loop"))
        };

        let header = self.new_block("loop_header");
        let body_block = self.new_block("loop_body");
        let continue_block = self.new_block("loop_continue");
        let merge = self.new_block("loop_merge");
        self.seal_with_jump(header);

        match kind {
            LoopKind::While => {
                self.block = header;
                let cond = condition.and_then(|c| self.lower_expr(c));
                let cond_end = self.block;
                match cond {
                    Some(cond) => {
                        self.current_fn()
                            .set_successors(cond_end, cond, body_block, merge)
                    }
                    None => self.current_fn().set_successor(cond_end, body_block),
                }
            }
            LoopKind::DoWhile | LoopKind::Infinite => {
                self.current_fn().set_successor(header, body_block);
            }
        }

        self.control.push(ControlFrame {
            kind: FrameKind::Loop {
                merge,
                continue_block,
            },
            label: label.map(|l| l.to_string()),
            yield_slot: slot.clone(),
        });
        self.block = body_block;
        if let ExprKind::Block(block) = &body.kind {
            for stmt in &block.stmts {
                self.lower_stmt(stmt);
            }
        }
        self.seal_with_jump(continue_block);
        self.control.pop();

        match kind {
            LoopKind::While | LoopKind::Infinite => {
                self.current_fn().set_successor(continue_block, header);
            }
            LoopKind::DoWhile => {
                self.block = continue_block;
                let cond = condition.and_then(|c| self.lower_expr(c));
                let cond_end = self.block;
                match cond {
                    Some(cond) => {
                        self.current_fn()
                            .set_successors(cond_end, cond, body_block, merge)
                    }
                    None => self.current_fn().set_successor(cond_end, body_block),
                }
            }
        }

        self.block = merge;
        slot.map(|slot| {
            let dst = self.temp(ty, None);
            self.emit(Instr::Load {
                src: slot,
                dst: dst.clone(),
            });
            dst
        })
    }

    /// Lowers a call after overload resolution: arguments are evaluated in
    /// source order, mapped to parameter slots, and missing slots are
    /// filled from the signature's checked default expressions.
    fn lower_call(
        &mut self,
        decl: NodeId,
        index: usize,
        args: &[CallArg],
        ret_ty: &Type,
    ) -> Option<Value> {
        let signature = self.signature_of(decl, index);
        let func = self
            .module
            .lookup_signature(decl, index)
            .unwrap_or_else(|| panic!("MirBuilder::lower_call: callee has no MIR function"));

        let mut slots: Vec<Option<Value>> = vec![None; signature.params.len()];
        let mut positional = 0usize;
        for arg in args {
            let value = self
                .lower_expr(&arg.value)
                .unwrap_or_else(|| unit_placeholder());
            match &arg.name {
                None => {
                    slots[positional] = Some(value);
                    positional += 1;
                }
                Some(name) => {
                    let slot = signature
                        .params
                        .iter()
                        .position(|p| p.name == name.lexeme())
                        .unwrap_or_else(|| {
                            panic!("MirBuilder::lower_call: named argument missed resolution")
                        });
                    slots[slot] = Some(value);
                }
            }
        }
        for (slot, param) in slots.iter_mut().zip(&signature.params) {
            if slot.is_none() {
                let default = param.default.as_ref().unwrap_or_else(|| {
                    panic!("MirBuilder::lower_call: missing argument without a default")
                });
                *slot = Some(
                    self.lower_expr(default)
                        .unwrap_or_else(|| unit_placeholder()),
                );
            }
        }
        let arg_values: Vec<Value> = slots.into_iter().map(|v| v.unwrap()).collect();

        let dst = if ret_ty.is_unit() || ret_ty.is_never() {
            None
        } else {
            Some(self.temp(ret_ty.clone(), None))
        };
        self.emit(Instr::Call {
            target: func,
            args: arg_values,
            dst: dst.clone(),
        });
        dst
    }

    /// Lowers a place expression to a pointer-typed value naming its
    /// storage.
    fn lower_place(&mut self, expr: &Expr) -> Option<Value> {
        match &expr.kind {
            ExprKind::NameRef { entry, .. } => {
                let entry = entry
                    .unwrap_or_else(|| panic!("MirBuilder::lower_place: unresolved name reference"));
                Some(self.variable_value(entry))
            }
            ExprKind::Deref { operand, .. } => self.lower_expr(operand),
            ExprKind::Access { object, member } => {
                let object_ty = object.checked_ty().clone();
                match &object_ty {
                    Type::Named { node, .. } => {
                        let base = self.lower_place(object)?;
                        let (offset, field_ty) = self
                            .tree
                            .struct_field_offset(*node, member.lexeme())
                            .unwrap_or_else(|| {
                                panic!("MirBuilder::lower_place: unknown struct field")
                            });
                        Some(self.offset_pointer(base, offset, field_ty))
                    }
                    Type::Tuple(elements) => {
                        let base = self.lower_place(object)?;
                        let index = match &member.literal {
                            Some(LiteralValue::TupleIndex(index)) => *index as usize,
                            _ => panic!("MirBuilder::lower_place: malformed tuple access"),
                        };
                        let offset: usize = elements[..index]
                            .iter()
                            .map(|t| t.byte_size(self.tree))
                            .sum();
                        Some(self.offset_pointer(base, offset, elements[index].clone()))
                    }
                    _ => panic!("MirBuilder::lower_place: access on a field-less type"),
                }
            }
            ExprKind::Subscript { object, index } => {
                let object_ty = object.checked_ty().clone();
                let (base, element_ty) = match &object_ty {
                    Type::Array { base, .. } => {
                        (self.lower_place(object)?, (**base).clone())
                    }
                    Type::Pointer { base, .. } => {
                        (self.lower_expr(object)?, (**base).clone())
                    }
                    _ => panic!("MirBuilder::lower_place: subscript on a non-indexable type"),
                };
                let index_value = self.lower_expr(index)?;
                let u64_ty = Type::Int {
                    signed: false,
                    width: 64,
                };
                let widened = self.temp(u64_ty.clone(), None);
                self.emit(Instr::Unary {
                    op: UnOp::Cast,
                    operand: index_value,
                    dst: widened.clone(),
                });
                let scaled = self.temp(u64_ty.clone(), None);
                self.emit(Instr::Binary {
                    op: BinOp::Mul,
                    left: widened,
                    right: int_literal(element_ty.byte_size(self.tree) as u64, u64_ty.clone()),
                    dst: scaled.clone(),
                });
                let base_int = self.temp(u64_ty.clone(), None);
                self.emit(Instr::Unary {
                    op: UnOp::Cast,
                    operand: base,
                    dst: base_int.clone(),
                });
                let addr_int = self.temp(u64_ty, None);
                self.emit(Instr::Binary {
                    op: BinOp::Add,
                    left: base_int,
                    right: scaled,
                    dst: addr_int.clone(),
                });
                let addr = self.temp(pointer_to(element_ty), None);
                self.emit(Instr::Unary {
                    op: UnOp::Cast,
                    operand: addr_int,
                    dst: addr.clone(),
                });
                Some(addr)
            }
            _ => panic!("MirBuilder::lower_place: not a place expression"),
        }
    }

    /// `base + offset`, retyped as a pointer to `ty`, via integer
    /// arithmetic.
    fn offset_pointer(&mut self, base: Value, offset: usize, ty: Type) -> Value {
        if offset == 0 {
            let addr = self.temp(pointer_to(ty), None);
            self.emit(Instr::Unary {
                op: UnOp::Cast,
                operand: base,
                dst: addr.clone(),
            });
            return addr;
        }
        let u64_ty = Type::Int {
            signed: false,
            width: 64,
        };
        let base_int = self.temp(u64_ty.clone(), None);
        self.emit(Instr::Unary {
            op: UnOp::Cast,
            operand: base,
            dst: base_int.clone(),
        });
        let addr_int = self.temp(u64_ty.clone(), None);
        self.emit(Instr::Binary {
            op: BinOp::Add,
            left: base_int,
            right: int_literal(offset as u64, u64_ty),
            dst: addr_int.clone(),
        });
        let addr = self.temp(pointer_to(ty), None);
        self.emit(Instr::Unary {
            op: UnOp::Cast,
            operand: addr_int,
            dst: addr.clone(),
        });
        addr
    }

    /// The byte size a `sizeof` expression folds to. The measured type is
    /// the annotation's, resolved again against the symbol tree.
    fn sizeof_value(&self, expr: &Expr) -> usize {
        match &expr.kind {
            ExprKind::SizeOf { annotation } => annotation_size(annotation, self.tree),
            _ => 0,
        }
    }

    /// Emits the runtime division-by-zero guard: compare the divisor
    /// against zero, print the panic message, and divert to the function
    /// exit.
    fn emit_div_zero_check(&mut self, divisor: &Value, location: &Location) {
        let is_zero = self.temp(Type::Bool, Some("is_zero"));
        self.emit(Instr::Binary {
            op: BinOp::Eq,
            left: divisor.clone(),
            right: int_literal(0, divisor.ty().clone()),
            dst: is_zero.clone(),
        });
        let start = self.block;
        let panic_block = self.new_block("div_by_zero");
        let ok_block = self.new_block("div_ok");
        self.current_fn()
            .set_successors(start, is_zero, panic_block, ok_block);

        self.block = panic_block;
        let (path, line, col) = location.path_line_col();
        let message = format!(
            "Panic: {}: Division by zero.\n{}:{}:{}\n",
            self.control.current_function_name(),
            path,
            line,
            col
        );
        let printf = self.module.runtime_function("printf", Type::I32);
        self.emit(Instr::Call {
            target: printf,
            args: vec![str_literal(&message)],
            dst: None,
        });
        let abort = self.module.runtime_function("abort", Type::Never);
        self.emit(Instr::Call {
            target: abort,
            args: Vec::new(),
            dst: None,
        });
        // abort does not return; the jump only closes the block formally.
        let exit = self.control.function_exit();
        self.seal_with_jump(exit);

        self.block = ok_block;
    }
}

// ----------------------------------------------------------------------
// Synthetic values
// ----------------------------------------------------------------------

fn pointer_to(ty: Type) -> Type {
    Type::Pointer {
        base: Box::new(ty),
        mutable: true,
    }
}

fn int_literal(value: u64, ty: Type) -> Value {
    Value::Literal {
        ty,
        lit: LiteralValue::Int(value),
        negative: false,
        token: None,
    }
}

fn bool_literal(value: bool) -> Value {
    Value::Literal {
        ty: Type::Bool,
        lit: LiteralValue::Bool(value),
        negative: false,
        token: None,
    }
}

fn str_literal(text: &str) -> Value {
    Value::Literal {
        ty: Type::Str,
        lit: LiteralValue::Str(text.to_string()),
        negative: false,
        token: None,
    }
}

fn unit_placeholder() -> Value {
    Value::Literal {
        ty: Type::Unit,
        lit: LiteralValue::Int(0),
        negative: false,
        token: None,
    }
}

fn compound_bin_op(tok: Tok) -> BinOp {
    match tok {
        Tok::PlusEq => BinOp::Add,
        Tok::MinusEq => BinOp::Sub,
        Tok::StarEq => BinOp::Mul,
        Tok::SlashEq => BinOp::Div,
        Tok::PercentEq => BinOp::Rem,
        Tok::BarEq => BinOp::BitOr,
        _ => panic!("MirBuilder: not a compound operator"),
    }
}

fn arith_bin_op(tok: Tok) -> BinOp {
    match tok {
        Tok::Plus => BinOp::Add,
        Tok::Minus => BinOp::Sub,
        Tok::Star => BinOp::Mul,
        Tok::Slash => BinOp::Div,
        Tok::Percent => BinOp::Rem,
        Tok::EqEq => BinOp::Eq,
        Tok::BangEq => BinOp::Ne,
        Tok::Lt => BinOp::Lt,
        Tok::LtEq => BinOp::Le,
        Tok::Gt => BinOp::Gt,
        Tok::GtEq => BinOp::Ge,
        Tok::Bar => BinOp::BitOr,
        Tok::Amp => BinOp::BitAnd,
        Tok::Caret => BinOp::BitXor,
        _ => panic!("MirBuilder: not a binary operator"),
    }
}

/// Byte size of an annotation's resolved type, for `sizeof` lowering. The
/// checker already validated the annotation; unresolvable pieces size to
/// zero.
fn annotation_size(annotation: &crate::ast::Annotation, tree: &SymbolTree) -> usize {
    use crate::ast::Annotation;
    match annotation {
        Annotation::Name(name) => match tree.search_name(name) {
            Some(id) => match &tree.node(id).kind {
                NodeKind::PrimitiveType { ty, .. } => ty.byte_size(tree),
                NodeKind::StructDef { .. } => tree.struct_byte_size(id),
                _ => 0,
            },
            None => 0,
        },
        Annotation::Pointer { .. } | Annotation::Reference { .. } | Annotation::Nullptr => 8,
        Annotation::Array { base, size } => {
            annotation_size(base, tree) * size.unwrap_or(0)
        }
        Annotation::Object(properties) => properties
            .iter()
            .map(|(_, a)| annotation_size(a, tree))
            .sum(),
        Annotation::Tuple(elements) => elements.iter().map(|a| annotation_size(a, tree)).sum(),
        Annotation::Typeof(expr) => expr
            .ty
            .as_ref()
            .map(|t| t.byte_size(tree))
            .unwrap_or(0),
    }
}
