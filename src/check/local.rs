//! The local checker.
//!
//! Visits each unchecked statement in order, type-checking expressions and
//! annotating every expression node with its resolved type. Name
//! references are linked to their symbol-tree entries, local scopes are
//! opened and closed as blocks are traversed, and the mutability, lvalue,
//! and unsafe disciplines are enforced here.
//!
//! On a type error the offending expression's type is left as
//! `Type::Unknown` and checking continues with its siblings, so one
//! mistake produces one diagnostic rather than a cascade. The statement
//! cursor stops advancing at the first failed statement; the MIR builder
//! is only entered when no errors were logged at all.

use crate::ast::{
    Annotation, Block, BlockKind, CallArg, CallTarget, Expr, ExprKind, LoopKind, Stmt,
};
use crate::context::{FrontendContext, Status};
use crate::error::{ErrorCode, Logger};
use crate::scope::{Field, NodeId, NodeKind, SigParam, Signature, SymbolTree};
use crate::source::Location;
use crate::token::{LiteralValue, Tok};
use crate::types::Type;

/// One enclosing context frame while walking: the script, a function body,
/// a plain block, or a loop. `yield`, `break`, `continue`, and `return`
/// resolve their targets against this stack.
#[derive(Debug)]
enum Frame {
    Script,
    Function {
        ret: Type,
        yield_ty: Option<Type>,
    },
    Plain {
        label: Option<String>,
        yield_ty: Option<Type>,
    },
    Loop {
        label: Option<String>,
        kind: LoopKind,
        break_ty: Option<Type>,
        has_break: bool,
    },
}

impl Frame {
    fn label(&self) -> Option<&str> {
        match self {
            Frame::Plain { label, .. } | Frame::Loop { label, .. } => label.as_deref(),
            _ => None,
        }
    }
}

pub struct LocalChecker<'a> {
    tree: &'a mut SymbolTree,
    logger: &'a mut Logger,
    frames: Vec<Frame>,
    /// Depth of nested `unsafe` blocks.
    unsafe_depth: u32,
    /// Count of operations that actually required an unsafe block; used to
    /// warn about unsafe blocks that needed none.
    unsafe_ops: u32,
}

impl<'a> LocalChecker<'a> {
    /// Type checks the context's unchecked statements, advancing
    /// `stmts_checked` past each statement that checks cleanly.
    ///
    /// Panics if the context is already in an error state.
    pub fn check(context: &mut FrontendContext, logger: &mut Logger) {
        if context.status == Status::Error {
            panic!("LocalChecker::check: context is already in an error state");
        }
        let errors_before = logger.error_count();
        let FrontendContext {
            stmts,
            stmts_checked,
            symbol_tree,
            ..
        } = &mut *context;
        let mut checker = LocalChecker {
            tree: symbol_tree,
            logger,
            frames: vec![Frame::Script],
            unsafe_depth: 0,
            unsafe_ops: 0,
        };

        // Declarations first, so bodies can refer to later structs and
        // functions in the same submission.
        let start = *stmts_checked;
        for stmt in stmts[start..].iter_mut() {
            checker.resolve_declarations(stmt);
        }

        let mut clean = checker.logger.error_count() == errors_before;
        for (offset, stmt) in stmts[start..].iter_mut().enumerate() {
            let before = checker.logger.error_count();
            checker.visit_stmt(stmt);
            if clean && checker.logger.error_count() == before {
                *stmts_checked = start + offset + 1;
            } else {
                clean = false;
            }
        }

        context.status = if logger.error_count() > errors_before {
            Status::Error
        } else {
            Status::Ok
        };
    }

    fn error(&mut self, code: ErrorCode, location: &Location, message: impl Into<String>) {
        self.logger.log(code, Some(location.clone()), message);
    }

    // ------------------------------------------------------------------
    // Declaration resolution
    // ------------------------------------------------------------------

    /// Resolves the annotation types of struct fields and function
    /// signatures registered by the global checker.
    fn resolve_declarations(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Namespace { body, node, .. } => {
                let Some(node) = *node else { return };
                self.tree.enter(node);
                for inner in body.iter_mut() {
                    self.resolve_declarations(inner);
                }
                self.tree.exit_scope();
            }
            Stmt::Struct { fields, def, .. } => {
                let Some(def) = *def else { return };
                self.tree.enter(def);
                for field in fields.iter_mut() {
                    // Struct fields cannot see local expressions, so
                    // `typeof` is unresolvable here.
                    let ty = self.resolve_annotation(&mut field.annotation, false);
                    if let Some(entry) = self.tree.struct_field(def, field.name.lexeme()) {
                        if let Some(f) = self.tree.field_mut(entry) {
                            f.ty = ty;
                        }
                        self.tree.mark_declared(entry);
                    }
                }
                self.tree.exit_scope();
            }
            Stmt::Func {
                name,
                params,
                return_annotation,
                decl,
                ..
            } => {
                let Some((decl, index)) = *decl else { return };
                self.resolve_signature(decl, index, name.clone(), params, return_annotation.as_mut());
            }
            _ => {}
        }
    }

    fn resolve_signature(
        &mut self,
        decl: NodeId,
        index: usize,
        name: std::rc::Rc<crate::token::Token>,
        params: &mut [crate::ast::Param],
        return_annotation: Option<&mut Annotation>,
    ) {
        let mut param_tys = Vec::with_capacity(params.len());
        for param in params.iter_mut() {
            param_tys.push(self.resolve_annotation(&mut param.annotation, false));
        }
        let ret = match return_annotation {
            Some(annotation) => self.resolve_annotation(annotation, false),
            None => Type::Unit,
        };
        if let NodeKind::FunctionDecl { signatures, .. } = &mut self.tree.node_mut(decl).kind {
            let signature = &mut signatures[index];
            for (sig_param, ty) in signature.params.iter_mut().zip(param_tys) {
                sig_param.ty = ty;
            }
            signature.ret = ret;
            signature.resolved = true;
        }
        if self.tree.signature_conflicts(decl, index) {
            self.logger.log(
                ErrorCode::FunctionOverloadConflict,
                Some(name.location.clone()),
                "this overload has the same parameter types as an earlier one",
            );
        }
    }

    // ------------------------------------------------------------------
    // Annotations
    // ------------------------------------------------------------------

    /// Resolves a type annotation to a semantic type. `allow_typeof` is
    /// false where no expression context exists (struct fields, function
    /// signatures).
    fn resolve_annotation(&mut self, annotation: &mut Annotation, allow_typeof: bool) -> Type {
        match annotation {
            Annotation::Name(name) => {
                let location = name.head_token().location.clone();
                match self.tree.search_name(name) {
                    Some(id) => match &self.tree.node(id).kind {
                        NodeKind::PrimitiveType { ty, .. } => ty.clone(),
                        NodeKind::StructDef { name, .. } => Type::Named {
                            node: id,
                            name: name.clone(),
                        },
                        _ => {
                            self.error(
                                ErrorCode::UnknownAnnotationName,
                                &location,
                                format!("`{}` does not name a type", name),
                            );
                            Type::Unknown
                        }
                    },
                    None => {
                        self.error(
                            ErrorCode::UnknownAnnotationName,
                            &location,
                            format!("unknown type name `{}`", name),
                        );
                        Type::Unknown
                    }
                }
            }
            Annotation::Pointer { base, mutable } => Type::Pointer {
                base: Box::new(self.resolve_annotation(base, allow_typeof)),
                mutable: *mutable,
            },
            Annotation::Reference { base, mutable } => Type::Reference {
                base: Box::new(self.resolve_annotation(base, allow_typeof)),
                mutable: *mutable,
            },
            Annotation::Nullptr => Type::Nullptr,
            Annotation::Array { base, size } => {
                let base_ty = self.resolve_annotation(base, allow_typeof);
                match size {
                    Some(size) => Type::Array {
                        base: Box::new(base_ty),
                        size: *size,
                    },
                    None => Type::Pointer {
                        base: Box::new(base_ty),
                        mutable: false,
                    },
                }
            }
            Annotation::Object(_) => {
                // Inline object types have no semantic counterpart; only
                // named structs carry fields.
                self.logger.log(
                    ErrorCode::UnknownAnnotationName,
                    None,
                    "inline object types cannot be used here; declare a struct",
                );
                Type::Unknown
            }
            Annotation::Tuple(elements) => Type::Tuple(
                elements
                    .iter_mut()
                    .map(|e| self.resolve_annotation(e, allow_typeof))
                    .collect(),
            ),
            Annotation::Typeof(expr) => {
                if allow_typeof {
                    self.expr_check(expr, false)
                } else {
                    let location = expr.location.clone();
                    self.error(
                        ErrorCode::UncheckableTypeofAnnotation,
                        &location,
                        "`typeof` cannot be used where its expression cannot be checked",
                    );
                    Type::Unknown
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Visits a statement; returns true when the statement diverges
    /// (control cannot fall through to the next one).
    fn visit_stmt(&mut self, stmt: &mut Stmt) -> bool {
        match stmt {
            Stmt::Expression { expr } => {
                let ty = self.expr_check(expr, false);
                ty.is_never()
            }
            Stmt::Let {
                name,
                mutable,
                annotation,
                initializer,
                entry,
                ..
            } => {
                let init_ty = initializer.as_mut().map(|e| self.expr_check(e, false));
                let ann_ty = annotation.as_mut().map(|a| self.resolve_annotation(a, true));
                let ty = match (ann_ty, init_ty) {
                    (Some(ann), Some(init)) => {
                        if !init.is_unknown() && !init.fits(&ann) {
                            self.error(
                                ErrorCode::LetTypeMismatch,
                                &name.location,
                                format!(
                                    "`{}` is declared as `{}` but initialized with `{}`",
                                    name.lexeme(),
                                    ann,
                                    init
                                ),
                            );
                        }
                        ann
                    }
                    (Some(ann), None) => ann,
                    (None, Some(init)) => init,
                    (None, None) => unreachable!("parser requires a type or a value"),
                };
                match self.tree.add_field_entry(Field {
                    token: name.clone(),
                    ty,
                    mutable: *mutable,
                }) {
                    Ok(id) => {
                        *entry = Some(id);
                        self.tree.mark_declared(id);
                    }
                    Err(code) => {
                        let message = match code {
                            ErrorCode::NameIsReserved => {
                                format!("`{}` is a reserved name", name.lexeme())
                            }
                            _ => format!(
                                "the name `{}` already exists in this scope",
                                name.lexeme()
                            ),
                        };
                        self.error(code, &name.location.clone(), message);
                    }
                }
                false
            }
            Stmt::Func { .. } => {
                self.visit_func(stmt);
                false
            }
            Stmt::Struct { .. } => false,
            Stmt::Namespace { body, node, .. } => {
                if let Some(node) = *node {
                    self.tree.enter(node);
                    for inner in body.iter_mut() {
                        self.visit_stmt(inner);
                    }
                    self.tree.exit_scope();
                }
                false
            }
            Stmt::Print { args, .. } => {
                for arg in args.iter_mut() {
                    let ty = self.expr_check(arg, false);
                    let printable = matches!(
                        ty,
                        Type::Int { .. } | Type::Float { .. } | Type::Bool | Type::Str
                    );
                    if !printable && !ty.is_unknown() {
                        let location = arg.location.clone();
                        self.error(
                            ErrorCode::OperatorNotValidForExpr,
                            &location,
                            format!("cannot print a value of type `{}`", ty),
                        );
                    }
                }
                false
            }
            Stmt::Pass { .. } | Stmt::Eof => false,
            Stmt::Yield { .. } => {
                self.visit_yield(stmt);
                false
            }
            Stmt::Break { .. } => {
                self.visit_break(stmt);
                true
            }
            Stmt::Continue { keyword, label } => {
                let label_text = label.as_ref().map(|t| t.lexeme().to_string());
                if !self.find_loop_frame(label_text.as_deref()) {
                    let location = keyword.location.clone();
                    self.error(
                        ErrorCode::ContinueOutsideLoop,
                        &location,
                        "`continue` is only valid inside a loop",
                    );
                }
                true
            }
            Stmt::Return { keyword, value } => {
                let value_ty = match value.as_mut() {
                    Some(v) => self.expr_check(v, false),
                    None => Type::Unit,
                };
                let location = keyword.location.clone();
                match self.function_return_type() {
                    Some(ret) => {
                        if !value_ty.is_unknown() && !value_ty.fits(&ret) {
                            self.error(
                                ErrorCode::FunctionReturnTypeMismatch,
                                &location,
                                format!(
                                    "`return` value has type `{}` but the function returns `{}`",
                                    value_ty, ret
                                ),
                            );
                        }
                    }
                    None => {
                        self.error(
                            ErrorCode::ReturnOutsideFunction,
                            &location,
                            "`return` is only valid inside a function",
                        );
                    }
                }
                true
            }
            Stmt::Dealloc { keyword, operand } => {
                let ty = self.expr_check(operand, false);
                if !ty.is_pointer() && !ty.is_unknown() {
                    let location = keyword.location.clone();
                    self.error(
                        ErrorCode::OperatorNotValidForExpr,
                        &location,
                        format!("`dealloc` needs a pointer, found `{}`", ty),
                    );
                }
                false
            }
        }
    }

    fn visit_func(&mut self, stmt: &mut Stmt) {
        let Stmt::Func {
            name,
            params,
            return_annotation,
            body,
            decl,
            ..
        } = stmt
        else {
            unreachable!();
        };

        // Functions nested in local scopes were not seen by the global
        // checker; register and resolve them now.
        if decl.is_none() {
            let signature = Signature {
                params: params
                    .iter()
                    .map(|p| SigParam {
                        name: p.name.lexeme().to_string(),
                        ty: Type::Unknown,
                        mutable: p.mutable,
                        default: None,
                    })
                    .collect(),
                ret: Type::Unknown,
                resolved: false,
            };
            match self.tree.add_function_signature(name, signature) {
                Ok(target) => *decl = Some(target),
                Err(code) => {
                    let location = name.location.clone();
                    self.error(
                        code,
                        &location,
                        format!("cannot declare function `{}` here", name.lexeme()),
                    );
                    return;
                }
            }
            let (decl_id, index) = decl.unwrap();
            self.resolve_signature(decl_id, index, name.clone(), params, return_annotation.as_mut());
        }
        let (decl_id, index) = decl.unwrap();

        let signature = match &self.tree.node(decl_id).kind {
            NodeKind::FunctionDecl { signatures, .. } => signatures[index].clone(),
            _ => return,
        };

        self.tree.add_local_scope(BlockKind::Function);
        for (param, sig_param) in params.iter_mut().zip(signature.params.iter()) {
            match self.tree.add_field_entry(Field {
                token: param.name.clone(),
                ty: sig_param.ty.clone(),
                mutable: param.mutable,
            }) {
                Ok(id) => {
                    param.entry = Some(id);
                    self.tree.mark_declared(id);
                }
                Err(code) => {
                    let location = param.name.location.clone();
                    self.error(
                        code,
                        &location,
                        format!("parameter `{}` conflicts with another name", param.name.lexeme()),
                    );
                }
            }
            if let Some(default) = param.default.as_mut() {
                let default_ty = self.expr_check(default, false);
                if !default_ty.is_unknown() && !default_ty.fits(&sig_param.ty) {
                    let location = default.location.clone();
                    self.error(
                        ErrorCode::DefaultArgTypeMismatch,
                        &location,
                        format!(
                            "default value has type `{}` but the parameter is `{}`",
                            default_ty, sig_param.ty
                        ),
                    );
                }
            }
        }
        // Persist the checked defaults on the signature for call sites in
        // later statements and submissions.
        let checked_defaults: Vec<Option<Expr>> =
            params.iter().map(|p| p.default.clone()).collect();
        if let NodeKind::FunctionDecl { signatures, .. } = &mut self.tree.node_mut(decl_id).kind {
            for (sig_param, default) in signatures[index].params.iter_mut().zip(checked_defaults) {
                sig_param.default = default;
            }
        }

        self.frames.push(Frame::Function {
            ret: signature.ret.clone(),
            yield_ty: None,
        });
        let body_ty = self.expr_check(body, false);
        self.frames.pop();
        self.tree.exit_scope();

        if !body_ty.is_unknown() && !body_ty.fits(&signature.ret) {
            let location = name.location.clone();
            self.error(
                ErrorCode::FunctionReturnTypeMismatch,
                &location,
                format!(
                    "function body has type `{}` but `{}` returns `{}`",
                    body_ty,
                    name.lexeme(),
                    signature.ret
                ),
            );
        }
    }

    fn visit_yield(&mut self, stmt: &mut Stmt) {
        let Stmt::Yield {
            keyword,
            label,
            value,
        } = stmt
        else {
            unreachable!();
        };
        self.canonicalize_label(label, value, false);
        let value_ty = match value.as_mut() {
            Some(v) => self.expr_check(v, false),
            None => Type::Unit,
        };
        let label_text = label.as_ref().map(|t| t.lexeme().to_string());
        let location = keyword.location.clone();

        let target = self.frames.iter_mut().rev().find(|frame| match &label_text {
            Some(wanted) => frame.label() == Some(wanted.as_str()),
            None => !matches!(frame, Frame::Script),
        });
        match target {
            Some(Frame::Loop { has_break, .. }) => {
                // The yielded value is dropped, but the loop is no longer
                // treated as running forever.
                *has_break = true;
                self.logger.log(
                    ErrorCode::YieldTargetingLoop,
                    Some(location),
                    "`yield` targets the enclosing loop; use `break` to yield a value from a loop",
                );
            }
            Some(Frame::Plain { yield_ty, .. }) | Some(Frame::Function { yield_ty, .. }) => {
                match yield_ty {
                    None => *yield_ty = Some(value_ty),
                    Some(existing) => {
                        if value_ty.is_never() || value_ty.is_unknown() {
                            // Keep the established type.
                        } else if existing.is_never() {
                            *existing = value_ty;
                        } else if !value_ty.same(existing) {
                            let expected = existing.clone();
                            self.logger.log(
                                ErrorCode::YieldTypeMismatch,
                                Some(location),
                                format!(
                                    "`yield` value has type `{}` but the block yields `{}`",
                                    value_ty, expected
                                ),
                            );
                        }
                    }
                }
            }
            _ => {
                self.logger.log(
                    ErrorCode::YieldOutsideLocalScope,
                    Some(location),
                    "`yield` is only valid inside a block",
                );
            }
        }
    }

    fn visit_break(&mut self, stmt: &mut Stmt) {
        let Stmt::Break {
            keyword,
            label,
            value,
        } = stmt
        else {
            unreachable!();
        };
        self.canonicalize_label(label, value, true);
        let value_ty = match value.as_mut() {
            Some(v) => self.expr_check(v, false),
            None => Type::Unit,
        };
        let label_text = label.as_ref().map(|t| t.lexeme().to_string());
        let location = keyword.location.clone();

        let mut found = false;
        for frame in self.frames.iter_mut().rev() {
            match frame {
                Frame::Loop {
                    label: frame_label,
                    break_ty,
                    has_break,
                    ..
                } => {
                    let matches_label = match &label_text {
                        Some(wanted) => frame_label.as_deref() == Some(wanted.as_str()),
                        None => true,
                    };
                    if !matches_label {
                        continue;
                    }
                    *has_break = true;
                    match break_ty {
                        None => *break_ty = Some(value_ty.clone()),
                        Some(existing) => {
                            if value_ty.is_unknown() || value_ty.is_never() {
                                // Keep the established type.
                            } else if existing.is_never() {
                                *existing = value_ty.clone();
                            } else if !value_ty.same(existing) {
                                let expected = existing.clone();
                                self.logger.log(
                                    ErrorCode::YieldTypeMismatch,
                                    Some(location.clone()),
                                    format!(
                                        "`break` value has type `{}` but the loop yields `{}`",
                                        value_ty, expected
                                    ),
                                );
                            }
                        }
                    }
                    found = true;
                    break;
                }
                Frame::Function { .. } | Frame::Script => break,
                Frame::Plain { .. } => {}
            }
        }
        if !found {
            self.error(
                ErrorCode::BreakOutsideLoop,
                &location,
                "`break` is only valid inside a loop",
            );
        }
    }

    /// Resolves the parsed-but-ambiguous `break name` / `yield name` form:
    /// a bare name that matches an enclosing label is the label, not the
    /// value.
    fn canonicalize_label(
        &mut self,
        label: &mut Option<std::rc::Rc<crate::token::Token>>,
        value: &mut Option<Expr>,
        loops_only: bool,
    ) {
        if label.is_some() {
            return;
        }
        let Some(expr) = value else { return };
        let ExprKind::NameRef { name, .. } = &expr.kind else {
            return;
        };
        if !name.is_simple() {
            return;
        }
        let lexeme = name.head_token().lexeme();
        let is_enclosing_label = self.frames.iter().rev().any(|frame| {
            frame.label() == Some(lexeme)
                && (!loops_only || matches!(frame, Frame::Loop { .. }))
        });
        if is_enclosing_label {
            *label = Some(name.head_token().clone());
            *value = None;
        }
    }

    fn find_loop_frame(&self, label: Option<&str>) -> bool {
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Loop {
                    label: frame_label, ..
                } => match label {
                    None => return true,
                    Some(wanted) if frame_label.as_deref() == Some(wanted) => return true,
                    Some(_) => {}
                },
                Frame::Function { .. } | Frame::Script => return false,
                Frame::Plain { .. } => {}
            }
        }
        false
    }

    fn function_return_type(&self) -> Option<Type> {
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Function { ret, .. } => return Some(ret.clone()),
                Frame::Script => return None,
                _ => {}
            }
        }
        None
    }

    /// Visits a block's statements, warning once about statements that
    /// follow a diverging one. Returns whether the list diverges, i.e.
    /// control cannot reach its end.
    fn visit_block_stmts(&mut self, stmts: &mut [Stmt]) -> bool {
        let mut diverged = false;
        let mut warned = false;
        for stmt in stmts.iter_mut() {
            if diverged && !warned {
                if let Some(location) = stmt_location(stmt) {
                    self.logger.log(
                        ErrorCode::UnreachableStatement,
                        Some(location),
                        "this statement is unreachable",
                    );
                }
                warned = true;
            }
            diverged |= self.visit_stmt(stmt);
        }
        diverged
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Checks an expression, stores its type on the node, and returns it.
    /// `as_lvalue` marks assignment-target position, which demands a
    /// mutable place expression.
    fn expr_check(&mut self, expr: &mut Expr, as_lvalue: bool) -> Type {
        if as_lvalue
            && !matches!(
                expr.kind,
                ExprKind::NameRef { .. }
                    | ExprKind::Deref { .. }
                    | ExprKind::Access { .. }
                    | ExprKind::Subscript { .. }
            )
        {
            let location = expr.location.clone();
            self.error(
                ErrorCode::NotAPossibleLValue,
                &location,
                "this expression cannot be assigned to",
            );
        }
        let ty = self.expr_check_inner(expr, as_lvalue);
        expr.ty = Some(ty.clone());
        ty
    }

    fn expr_check_inner(&mut self, expr: &mut Expr, as_lvalue: bool) -> Type {
        let location = expr.location.clone();
        match &mut expr.kind {
            ExprKind::Literal { token, .. } => match token.tok {
                Tok::IntDefault | Tok::Int32 => Type::I32,
                Tok::Int8 => Type::Int { signed: true, width: 8 },
                Tok::Int16 => Type::Int { signed: true, width: 16 },
                Tok::Int64 => Type::Int { signed: true, width: 64 },
                Tok::UInt8 => Type::Int { signed: false, width: 8 },
                Tok::UInt16 => Type::Int { signed: false, width: 16 },
                Tok::UInt32 => Type::Int { signed: false, width: 32 },
                Tok::UInt64 => Type::Int { signed: false, width: 64 },
                Tok::FloatDefault | Tok::Float64 => Type::F64,
                Tok::Float32 => Type::Float { width: 32 },
                Tok::Bool => Type::Bool,
                Tok::Str => Type::Str,
                Tok::Nullptr => Type::Nullptr,
                _ => Type::Unknown,
            },
            ExprKind::NameRef { name, entry } => {
                let head = name.head_token().location.clone();
                let text = name.to_string();
                let Some(id) = self.tree.search_name(name) else {
                    self.error(
                        ErrorCode::UndeclaredName,
                        &head,
                        format!("name `{}` is not declared", text),
                    );
                    return Type::Unknown;
                };
                // Pull the entry's data out before logging anything.
                let resolved = match &self.tree.node(id).kind {
                    NodeKind::FieldEntry { field, declared } => {
                        Some((field.ty.clone(), field.mutable, *declared))
                    }
                    _ => None,
                };
                match resolved {
                    Some((_, _, false)) => {
                        self.error(
                            ErrorCode::UndeclaredName,
                            &head,
                            format!("name `{}` is used before its declaration", text),
                        );
                        Type::Unknown
                    }
                    Some((ty, mutable, true)) => {
                        if as_lvalue && !mutable {
                            self.error(
                                ErrorCode::AssignToImmutable,
                                &head,
                                format!(
                                    "cannot assign to `{}`: it was not declared with `var`",
                                    text
                                ),
                            );
                        }
                        *entry = Some(id);
                        ty
                    }
                    None => {
                        let message =
                            if matches!(self.tree.node(id).kind, NodeKind::FunctionDecl { .. }) {
                                format!("`{}` is a function, not a variable", text)
                            } else {
                                format!("`{}` is not a variable", text)
                            };
                        self.error(ErrorCode::NotAVariable, &head, message);
                        Type::Unknown
                    }
                }
            }
            ExprKind::Assign { op, target, value } => {
                let target_ty = self.expr_check(target, true);
                let value_ty = self.expr_check(value, false);
                if op.tok.is_compound_operator() && !target_ty.is_unknown() {
                    let valid = match op.tok {
                        Tok::BarEq => target_ty.is_integer(),
                        _ => target_ty.is_numeric(),
                    };
                    if !valid {
                        let op_lexeme = op.lexeme().to_string();
                        self.error(
                            ErrorCode::OperatorNotValidForExpr,
                            &location,
                            format!("`{}` cannot be applied to `{}`", op_lexeme, target_ty),
                        );
                    }
                }
                if !target_ty.is_unknown()
                    && !value_ty.is_unknown()
                    && !value_ty.fits(&target_ty)
                {
                    self.error(
                        ErrorCode::AssignmentTypeMismatch,
                        &location,
                        format!(
                            "cannot assign a `{}` value to a `{}` target",
                            value_ty, target_ty
                        ),
                    );
                }
                target_ty
            }
            ExprKind::Logical { left, right, .. } => {
                let left_ty = self.expr_check(left, false);
                let right_ty = self.expr_check(right, false);
                if !left_ty.is_bool() && !left_ty.is_unknown() {
                    let left_location = left.location.clone();
                    self.error(
                        ErrorCode::OperatorNotValidForExpr,
                        &left_location,
                        format!("logical operands must be `bool`, found `{}`", left_ty),
                    );
                }
                if !right_ty.is_bool() && !right_ty.is_unknown() {
                    let right_location = right.location.clone();
                    self.error(
                        ErrorCode::OperatorNotValidForExpr,
                        &right_location,
                        format!("logical operands must be `bool`, found `{}`", right_ty),
                    );
                }
                Type::Bool
            }
            ExprKind::Binary { op, left, right } => {
                let left_ty = self.expr_check(left, false);
                let right_ty = self.expr_check(right, false);
                if left_ty.is_unknown() || right_ty.is_unknown() {
                    return Type::Unknown;
                }
                let op_tok = op.tok;
                let op_lexeme = op.lexeme().to_string();
                match op_tok {
                    Tok::Plus | Tok::Minus | Tok::Star | Tok::Slash | Tok::Percent => {
                        if !left_ty.is_numeric() {
                            self.error(
                                ErrorCode::OperatorNotValidForExpr,
                                &location,
                                format!("`{}` cannot be applied to `{}`", op_lexeme, left_ty),
                            );
                            Type::Unknown
                        } else if !right_ty.same(&left_ty) {
                            self.error(
                                ErrorCode::NoOperatorOverload,
                                &location,
                                format!(
                                    "no `{}` operator for `{}` and `{}`",
                                    op_lexeme, left_ty, right_ty
                                ),
                            );
                            Type::Unknown
                        } else {
                            left_ty
                        }
                    }
                    Tok::EqEq | Tok::BangEq => {
                        let comparable = right_ty.same(&left_ty)
                            || (left_ty.is_pointer() && matches!(right_ty, Type::Nullptr))
                            || (matches!(left_ty, Type::Nullptr) && right_ty.is_pointer());
                        if !comparable {
                            self.error(
                                ErrorCode::NoOperatorOverload,
                                &location,
                                format!(
                                    "cannot compare `{}` with `{}`",
                                    left_ty, right_ty
                                ),
                            );
                        }
                        Type::Bool
                    }
                    Tok::Gt | Tok::GtEq | Tok::Lt | Tok::LtEq => {
                        if !left_ty.is_numeric() || !right_ty.same(&left_ty) {
                            self.error(
                                ErrorCode::NoOperatorOverload,
                                &location,
                                format!(
                                    "no `{}` operator for `{}` and `{}`",
                                    op_lexeme, left_ty, right_ty
                                ),
                            );
                        }
                        Type::Bool
                    }
                    Tok::Bar | Tok::Amp | Tok::Caret => {
                        if !left_ty.is_integer() || !right_ty.same(&left_ty) {
                            self.error(
                                ErrorCode::NoOperatorOverload,
                                &location,
                                format!(
                                    "no `{}` operator for `{}` and `{}`",
                                    op_lexeme, left_ty, right_ty
                                ),
                            );
                            Type::Unknown
                        } else {
                            left_ty
                        }
                    }
                    _ => Type::Unknown,
                }
            }
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.expr_check(operand, false);
                if operand_ty.is_unknown() {
                    return Type::Unknown;
                }
                match op.tok {
                    Tok::Minus => {
                        if !operand_ty.is_signed_numeric() {
                            let op_location = op.location.clone();
                            self.error(
                                ErrorCode::OperatorNotValidForExpr,
                                &op_location,
                                format!("cannot negate a value of type `{}`", operand_ty),
                            );
                            Type::Unknown
                        } else {
                            operand_ty
                        }
                    }
                    Tok::Bang | Tok::KwNot => {
                        if !operand_ty.is_bool() {
                            let op_location = op.location.clone();
                            self.error(
                                ErrorCode::OperatorNotValidForExpr,
                                &op_location,
                                format!("`{}` needs a `bool`, found `{}`", op.lexeme(), operand_ty),
                            );
                        }
                        Type::Bool
                    }
                    _ => Type::Unknown,
                }
            }
            ExprKind::Address {
                mutable, operand, ..
            } => {
                let is_place = matches!(
                    operand.kind,
                    ExprKind::NameRef { .. }
                        | ExprKind::Deref { .. }
                        | ExprKind::Access { .. }
                        | ExprKind::Subscript { .. }
                );
                let operand_ty = self.expr_check(operand, false);
                if !is_place {
                    self.error(
                        ErrorCode::NotAPossibleLValue,
                        &location,
                        "can only take the address of a place expression",
                    );
                    return Type::Unknown;
                }
                if *mutable && !self.place_is_mutable(operand) {
                    self.error(
                        ErrorCode::AddressOfImmutable,
                        &location,
                        "cannot take a mutable reference to an immutable value",
                    );
                }
                Type::Reference {
                    base: Box::new(operand_ty),
                    mutable: *mutable,
                }
            }
            ExprKind::Deref { op, operand } => {
                let operand_ty = self.expr_check(operand, false);
                match &operand_ty {
                    Type::Pointer { base, mutable } => {
                        if matches!(**base, Type::Nullptr) {
                            let op_location = op.location.clone();
                            self.error(
                                ErrorCode::DereferenceNullptr,
                                &op_location,
                                "cannot dereference a `nullptr` pointer",
                            );
                            return Type::Unknown;
                        }
                        if self.unsafe_depth == 0 {
                            let op_location = op.location.clone();
                            self.error(
                                ErrorCode::PtrDerefOutsideUnsafeBlock,
                                &op_location,
                                "raw pointer dereference requires an `unsafe block`",
                            );
                        } else {
                            self.unsafe_ops += 1;
                        }
                        if as_lvalue && !mutable {
                            let op_location = op.location.clone();
                            self.error(
                                ErrorCode::AssignToImmutable,
                                &op_location,
                                "cannot assign through a pointer to an immutable value",
                            );
                        }
                        (**base).clone()
                    }
                    Type::Reference { base, mutable } => {
                        if as_lvalue && !mutable {
                            let op_location = op.location.clone();
                            self.error(
                                ErrorCode::AssignToImmutable,
                                &op_location,
                                "cannot assign through a reference to an immutable value",
                            );
                        }
                        (**base).clone()
                    }
                    Type::Unknown => Type::Unknown,
                    other => {
                        let op_location = op.location.clone();
                        self.error(
                            ErrorCode::DereferenceNonPointer,
                            &op_location,
                            format!("cannot dereference a value of type `{}`", other),
                        );
                        Type::Unknown
                    }
                }
            }
            ExprKind::Cast {
                operand,
                annotation,
                reinterpret,
            } => {
                let source_ty = self.expr_check(operand, false);
                let target_ty = self.resolve_annotation(annotation, true);
                if source_ty.is_unknown() || target_ty.is_unknown() {
                    return target_ty;
                }
                if *reinterpret {
                    if self.unsafe_depth == 0 {
                        self.error(
                            ErrorCode::OperatorNotValidForExpr,
                            &location,
                            "`transmute` requires an `unsafe block`",
                        );
                    } else {
                        self.unsafe_ops += 1;
                    }
                } else {
                    let pointerish = |t: &Type| {
                        t.is_pointer() || t.is_reference() || matches!(t, Type::Nullptr)
                    };
                    let ok = (source_ty.is_numeric() && target_ty.is_numeric())
                        || (pointerish(&source_ty) && pointerish(&target_ty));
                    if !ok {
                        self.error(
                            ErrorCode::OperatorNotValidForExpr,
                            &location,
                            format!("cannot cast `{}` to `{}`", source_ty, target_ty),
                        );
                        return Type::Unknown;
                    }
                }
                target_ty
            }
            ExprKind::Access { object, member } => {
                let object_ty = self.expr_check(object, as_lvalue);
                let member = member.clone();
                match &object_ty {
                    Type::Named { node, name } => {
                        match self.tree.struct_field(*node, member.lexeme()) {
                            Some(field_id) => self
                                .tree
                                .field(field_id)
                                .map(|f| f.ty.clone())
                                .unwrap_or(Type::Unknown),
                            None => {
                                let member_location = member.location.clone();
                                let struct_name = name.clone();
                                self.error(
                                    ErrorCode::UndeclaredName,
                                    &member_location,
                                    format!(
                                        "`{}` has no field named `{}`",
                                        struct_name,
                                        member.lexeme()
                                    ),
                                );
                                Type::Unknown
                            }
                        }
                    }
                    Type::Tuple(elements) => {
                        let index = match (member.tok, &member.literal) {
                            (Tok::TupleIndex, Some(LiteralValue::TupleIndex(index))) => {
                                *index as usize
                            }
                            _ => {
                                let member_location = member.location.clone();
                                self.error(
                                    ErrorCode::InvalidTupleAccess,
                                    &member_location,
                                    "tuples are accessed with integer indexes such as `.0`",
                                );
                                return Type::Unknown;
                            }
                        };
                        if index >= elements.len() {
                            let member_location = member.location.clone();
                            let len = elements.len();
                            self.error(
                                ErrorCode::TupleIndexOutOfBounds,
                                &member_location,
                                format!(
                                    "tuple index `{}` is out of bounds for a {}-element tuple",
                                    index, len
                                ),
                            );
                            Type::Unknown
                        } else {
                            elements[index].clone()
                        }
                    }
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.error(
                            ErrorCode::OperatorNotValidForExpr,
                            &location,
                            format!("type `{}` has no fields", other),
                        );
                        Type::Unknown
                    }
                }
            }
            ExprKind::Subscript { object, index } => {
                let object_ty = self.expr_check(object, as_lvalue);
                let index_ty = self.expr_check(index, false);
                if !index_ty.is_integer() && !index_ty.is_unknown() {
                    let index_location = index.location.clone();
                    self.error(
                        ErrorCode::OperatorNotValidForExpr,
                        &index_location,
                        format!("subscript index must be an integer, found `{}`", index_ty),
                    );
                }
                match &object_ty {
                    Type::Array { base, .. } => (**base).clone(),
                    Type::Pointer { base, .. } => {
                        if self.unsafe_depth == 0 {
                            self.error(
                                ErrorCode::PtrDerefOutsideUnsafeBlock,
                                &location,
                                "indexing a raw pointer requires an `unsafe block`",
                            );
                        } else {
                            self.unsafe_ops += 1;
                        }
                        (**base).clone()
                    }
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.error(
                            ErrorCode::OperatorNotValidForExpr,
                            &location,
                            format!("type `{}` cannot be subscripted", other),
                        );
                        Type::Unknown
                    }
                }
            }
            ExprKind::Call {
                callee,
                args,
                resolved,
            } => {
                let kind_result = self.check_call(callee, args, &location);
                match kind_result {
                    Some((target, ret)) => {
                        *resolved = Some(target);
                        ret
                    }
                    None => Type::Unknown,
                }
            }
            ExprKind::SizeOf { annotation } => {
                self.resolve_annotation(annotation, true);
                Type::Int {
                    signed: false,
                    width: 64,
                }
            }
            ExprKind::Alloc { annotation, count } => {
                let base = self.resolve_annotation(annotation, true);
                if let Some(count) = count.as_mut() {
                    let count_ty = self.expr_check(count, false);
                    if !count_ty.is_integer() && !count_ty.is_unknown() {
                        let count_location = count.location.clone();
                        self.error(
                            ErrorCode::OperatorNotValidForExpr,
                            &count_location,
                            format!("allocation count must be an integer, found `{}`", count_ty),
                        );
                    }
                }
                Type::Pointer {
                    base: Box::new(base),
                    mutable: true,
                }
            }
            ExprKind::Tuple { elements } => {
                if elements.is_empty() {
                    Type::Unit
                } else {
                    let tys = elements
                        .iter_mut()
                        .map(|e| self.expr_check(e, false))
                        .collect();
                    Type::Tuple(tys)
                }
            }
            ExprKind::Array { elements } => {
                let mut base = Type::Unknown;
                for element in elements.iter_mut() {
                    let element_ty = self.expr_check(element, false);
                    if base.is_unknown() {
                        base = element_ty;
                    } else if !element_ty.is_unknown() && !element_ty.same(&base) {
                        let element_location = element.location.clone();
                        let expected = base.clone();
                        self.error(
                            ErrorCode::YieldTypeMismatch,
                            &element_location,
                            format!(
                                "array element has type `{}` but earlier elements are `{}`",
                                element_ty, expected
                            ),
                        );
                    }
                }
                let size = elements.len();
                Type::Array {
                    base: Box::new(base),
                    size,
                }
            }
            ExprKind::Block(_) => self.check_block(expr),
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition_ty = self.expr_check(condition, false);
                if !condition_ty.is_bool() && !condition_ty.is_unknown() {
                    let condition_location = condition.location.clone();
                    self.error(
                        ErrorCode::ConditionNotBool,
                        &condition_location,
                        format!("condition must be `bool`, found `{}`", condition_ty),
                    );
                }
                let then_ty = self.expr_check(then_branch, false);
                match else_branch.as_mut() {
                    Some(else_branch) => {
                        let else_ty = self.expr_check(else_branch, false);
                        if then_ty.is_never() || then_ty.is_unknown() {
                            else_ty
                        } else if else_ty.is_never() || else_ty.is_unknown() {
                            then_ty
                        } else if then_ty.same(&else_ty) {
                            then_ty
                        } else {
                            self.error(
                                ErrorCode::ConditionalBranchTypeMismatch,
                                &location,
                                format!(
                                    "`if` branches have mismatched types `{}` and `{}`",
                                    then_ty, else_ty
                                ),
                            );
                            Type::Unknown
                        }
                    }
                    None => Type::Unit,
                }
            }
            ExprKind::Loop { .. } => self.check_loop(expr),
        }
    }

    fn check_block(&mut self, expr: &mut Expr) -> Type {
        let ExprKind::Block(block) = &mut expr.kind else {
            unreachable!();
        };
        match block.kind {
            BlockKind::Function => {
                // The function visit already pushed the frame and opened
                // the parameter scope; the body shares both.
                block.scope = Some(self.tree.current());
                let Block { stmts, .. } = block;
                let diverged = self.visit_block_stmts(stmts);
                match self.frames.last_mut() {
                    Some(Frame::Function { yield_ty, .. }) => match yield_ty.take() {
                        Some(ty) => ty,
                        None if diverged => Type::Never,
                        None => Type::Unit,
                    },
                    _ => Type::Unit,
                }
            }
            BlockKind::Loop => {
                // The loop visit pushed the loop frame; open only the
                // body's scope here.
                let scope = self.tree.add_local_scope(BlockKind::Loop);
                block.scope = Some(scope);
                let is_unsafe = block.is_unsafe;
                let ops_before = self.enter_unsafe(is_unsafe);
                self.visit_block_stmts(&mut block.stmts);
                self.exit_unsafe(is_unsafe, ops_before, &expr.location);
                self.tree.exit_scope();
                Type::Unit
            }
            BlockKind::Plain => {
                let scope = self.tree.add_local_scope(BlockKind::Plain);
                block.scope = Some(scope);
                self.frames.push(Frame::Plain {
                    label: block.label.clone(),
                    yield_ty: None,
                });
                let is_unsafe = block.is_unsafe;
                let ops_before = self.enter_unsafe(is_unsafe);
                let diverged = self.visit_block_stmts(&mut block.stmts);
                self.exit_unsafe(is_unsafe, ops_before, &expr.location);
                let frame = self.frames.pop();
                self.tree.exit_scope();
                match frame {
                    Some(Frame::Plain { yield_ty, .. }) => match yield_ty {
                        Some(ty) => ty,
                        None if diverged => Type::Never,
                        None => Type::Unit,
                    },
                    _ => Type::Unit,
                }
            }
        }
    }

    fn enter_unsafe(&mut self, is_unsafe: bool) -> u32 {
        if is_unsafe {
            self.unsafe_depth += 1;
        }
        self.unsafe_ops
    }

    fn exit_unsafe(&mut self, is_unsafe: bool, ops_before: u32, location: &Location) {
        if !is_unsafe {
            return;
        }
        self.unsafe_depth -= 1;
        if self.unsafe_ops == ops_before {
            self.logger.log(
                ErrorCode::UnsafeBlockWithoutUnsafeStmt,
                Some(location.clone()),
                "this `unsafe block` contains no operations that need it",
            );
        }
    }

    fn check_loop(&mut self, expr: &mut Expr) -> Type {
        let ExprKind::Loop {
            kind,
            condition,
            body,
            label,
        } = &mut expr.kind
        else {
            unreachable!();
        };
        let kind = *kind;
        if let Some(condition) = condition.as_mut() {
            let condition_ty = self.expr_check(condition, false);
            if !condition_ty.is_bool() && !condition_ty.is_unknown() {
                let condition_location = condition.location.clone();
                self.error(
                    ErrorCode::ConditionNotBool,
                    &condition_location,
                    format!("loop condition must be `bool`, found `{}`", condition_ty),
                );
            }
        }
        let always_runs = match (kind, condition.as_deref()) {
            (LoopKind::Infinite, _) => true,
            (_, Some(cond)) => matches!(
                &cond.kind,
                ExprKind::Literal { token, .. }
                    if token.literal == Some(LiteralValue::Bool(true))
            ),
            _ => false,
        };

        self.frames.push(Frame::Loop {
            label: label.clone(),
            kind,
            break_ty: None,
            has_break: false,
        });
        self.expr_check(body, false);
        let frame = self.frames.pop();
        let Some(Frame::Loop {
            break_ty,
            has_break,
            ..
        }) = frame
        else {
            return Type::Unknown;
        };

        match kind {
            LoopKind::Infinite => {
                if has_break {
                    break_ty.unwrap_or(Type::Unit)
                } else {
                    Type::Never
                }
            }
            LoopKind::While | LoopKind::DoWhile => {
                let yielded = break_ty.unwrap_or(Type::Unit);
                if has_break && !yielded.is_unit() && !yielded.is_unknown() {
                    if always_runs {
                        // A `while true` loop can only leave through its
                        // breaks, so a yielded value is sound.
                        return yielded;
                    }
                    let location = expr.location.clone();
                    self.error(
                        ErrorCode::WhileLoopYieldingNonUnit,
                        &location,
                        format!(
                            "a `while` loop may exit without running `break`, so it cannot yield `{}`",
                            yielded
                        ),
                    );
                    return Type::Unknown;
                }
                if !has_break && always_runs {
                    Type::Never
                } else {
                    Type::Unit
                }
            }
        }
    }

    /// Whether an already-checked place expression denotes mutable memory.
    fn place_is_mutable(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::NameRef { entry, .. } => entry
                .and_then(|id| self.tree.field(id))
                .map(|f| f.mutable)
                .unwrap_or(false),
            ExprKind::Deref { operand, .. } => operand
                .ty
                .as_ref()
                .and_then(|t| t.pointee())
                .map(|(_, mutable)| mutable)
                .unwrap_or(false),
            ExprKind::Access { object, .. } => self.place_is_mutable(object),
            ExprKind::Subscript { object, .. } => match object.ty.as_ref() {
                Some(Type::Pointer { mutable, .. }) => *mutable,
                _ => self.place_is_mutable(object),
            },
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Calls and overload resolution
    // ------------------------------------------------------------------

    /// Checks a call expression: resolves the callee to a function
    /// declaration, then selects exactly one overload by arity (after
    /// defaults) and argument types, preferring exact matches over
    /// implicit numeric widening.
    fn check_call(
        &mut self,
        callee: &mut Expr,
        args: &mut [CallArg],
        location: &Location,
    ) -> Option<(CallTarget, Type)> {
        let mut arg_tys = Vec::with_capacity(args.len());
        for arg in args.iter_mut() {
            arg_tys.push(self.expr_check(&mut arg.value, false));
        }

        let ExprKind::NameRef { name, .. } = &callee.kind else {
            self.expr_check(callee, false);
            self.error(
                ErrorCode::NotACallable,
                location,
                "only named functions can be called",
            );
            return None;
        };
        let decl = match self.tree.search_name(name) {
            Some(id) if matches!(self.tree.node(id).kind, NodeKind::FunctionDecl { .. }) => id,
            Some(_) => {
                let head = name.head_token().location.clone();
                let text = name.to_string();
                self.error(
                    ErrorCode::NotACallable,
                    &head,
                    format!("`{}` is not a function", text),
                );
                return None;
            }
            None => {
                let head = name.head_token().location.clone();
                let text = name.to_string();
                self.error(
                    ErrorCode::UndeclaredName,
                    &head,
                    format!("name `{}` is not declared", text),
                );
                return None;
            }
        };

        let NodeKind::FunctionDecl { signatures, name: fn_name } = &self.tree.node(decl).kind
        else {
            return None;
        };
        let fn_name = fn_name.clone();

        // For each signature, decide whether the arguments fit and whether
        // every fit is exact.
        #[derive(Clone, Copy, PartialEq)]
        enum Fit {
            Exact,
            Widened,
            No,
        }
        let mut candidates: Vec<(usize, Fit)> = Vec::new();
        'sigs: for (index, signature) in signatures.iter().enumerate() {
            if !signature.resolved {
                continue;
            }
            // Map each argument to a parameter slot.
            let mut assigned: Vec<Option<&Type>> = vec![None; signature.params.len()];
            let mut positional = 0usize;
            for (arg, arg_ty) in args.iter().zip(&arg_tys) {
                match &arg.name {
                    None => {
                        if positional >= signature.params.len() {
                            continue 'sigs;
                        }
                        assigned[positional] = Some(arg_ty);
                        positional += 1;
                    }
                    Some(name_token) => {
                        let Some(slot) = signature
                            .params
                            .iter()
                            .position(|p| p.name == name_token.lexeme())
                        else {
                            continue 'sigs;
                        };
                        if assigned[slot].is_some() {
                            continue 'sigs;
                        }
                        assigned[slot] = Some(arg_ty);
                    }
                }
            }
            let mut fit = Fit::Exact;
            for (slot, param) in signature.params.iter().enumerate() {
                match assigned[slot] {
                    None => {
                        if param.default.is_none() {
                            continue 'sigs;
                        }
                    }
                    Some(arg_ty) => {
                        if arg_ty.is_unknown() || arg_ty.same(&param.ty) {
                            // Exact (unknowns never disqualify a call that
                            // already produced a diagnostic).
                        } else if arg_ty.widens_to(&param.ty) {
                            fit = Fit::Widened;
                        } else {
                            continue 'sigs;
                        }
                    }
                }
            }
            candidates.push((index, fit));
        }

        let exact: Vec<&(usize, Fit)> =
            candidates.iter().filter(|(_, f)| *f == Fit::Exact).collect();
        let pool: Vec<usize> = if exact.is_empty() {
            candidates.iter().map(|(i, _)| *i).collect()
        } else {
            exact.iter().map(|(i, _)| *i).collect()
        };

        match pool.len() {
            0 => {
                self.error(
                    ErrorCode::NoMatchingFunctionOverload,
                    location,
                    format!("no overload of `{}` matches these arguments", fn_name),
                );
                None
            }
            1 => {
                let index = pool[0];
                let ret = match &self.tree.node(decl).kind {
                    NodeKind::FunctionDecl { signatures, .. } => signatures[index].ret.clone(),
                    _ => Type::Unknown,
                };
                callee.ty = Some(Type::Function {
                    params: match &self.tree.node(decl).kind {
                        NodeKind::FunctionDecl { signatures, .. } => signatures[index]
                            .params
                            .iter()
                            .map(|p| p.ty.clone())
                            .collect(),
                        _ => Vec::new(),
                    },
                    ret: Box::new(ret.clone()),
                });
                Some((
                    CallTarget {
                        decl,
                        signature: index,
                    },
                    ret,
                ))
            }
            _ => {
                self.error(
                    ErrorCode::MultipleMatchingFunctionOverloads,
                    location,
                    format!(
                        "{} overloads of `{}` match these arguments",
                        pool.len(),
                        fn_name
                    ),
                );
                None
            }
        }
    }
}

fn stmt_location(stmt: &Stmt) -> Option<Location> {
    match stmt {
        Stmt::Expression { expr } => Some(expr.location.clone()),
        Stmt::Let { keyword, .. }
        | Stmt::Func { keyword, .. }
        | Stmt::Struct { keyword, .. }
        | Stmt::Namespace { keyword, .. }
        | Stmt::Print { keyword, .. }
        | Stmt::Pass { keyword }
        | Stmt::Yield { keyword, .. }
        | Stmt::Break { keyword, .. }
        | Stmt::Continue { keyword, .. }
        | Stmt::Return { keyword, .. }
        | Stmt::Dealloc { keyword, .. } => Some(keyword.location.clone()),
        Stmt::Eof => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::GlobalChecker;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::source::CodeFile;

    fn check_src(src: &str) -> (FrontendContext, Logger) {
        let mut context = FrontendContext::new();
        let mut logger = Logger::quiet();
        let file = CodeFile::new(src, "test.nico");
        Lexer::scan(&mut context, &file, &mut logger, false);
        assert_eq!(context.status, Status::Ok, "lexer failed on {:?}", src);
        Parser::parse(&mut context, &mut logger, false);
        assert_eq!(
            context.status,
            Status::Ok,
            "parser failed on {:?}: {:?}",
            src,
            logger.diagnostics()
        );
        GlobalChecker::check(&mut context, &mut logger);
        if context.status == Status::Ok {
            LocalChecker::check(&mut context, &mut logger);
        }
        (context, logger)
    }

    fn codes(logger: &Logger) -> Vec<ErrorCode> {
        logger.diagnostics().iter().map(|d| d.code).collect()
    }

    fn init_ty(context: &FrontendContext, index: usize) -> Type {
        match &context.stmts[index] {
            Stmt::Let { initializer, .. } => {
                initializer.as_ref().unwrap().ty.clone().expect("untyped init")
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn let_with_matching_annotation_checks() {
        let (context, logger) = check_src("let x: i32 = 1 + 2\n");
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
        assert!(init_ty(&context, 0).same(&Type::I32));
        let entry = match &context.stmts[0] {
            Stmt::Let { entry, .. } => entry.unwrap(),
            _ => unreachable!(),
        };
        let field = context.symbol_tree.field(entry).unwrap();
        assert!(field.ty.same(&Type::I32));
        assert!(!field.mutable);
    }

    #[test]
    fn every_surviving_expression_is_typed() {
        let (context, logger) = check_src("let a = 1\nlet b = a + 2 * a\n");
        assert!(!logger.has_errors());
        for index in 0..2 {
            assert!(!init_ty(&context, index).is_unknown());
        }
    }

    #[test]
    fn assign_to_immutable_reports_exactly_once() {
        let (_, logger) = check_src("let y = 1\ny = 2\n");
        let hits = codes(&logger)
            .iter()
            .filter(|c| **c == ErrorCode::AssignToImmutable)
            .count();
        assert_eq!(hits, 1);
    }

    #[test]
    fn var_binding_can_be_assigned() {
        let (_, logger) = check_src("let var y = 1\ny = 2\n");
        assert!(!logger.has_errors());
    }

    #[test]
    fn assignment_type_mismatch() {
        let (_, logger) = check_src("let var y = 1\ny = 1.5\n");
        assert!(codes(&logger).contains(&ErrorCode::AssignmentTypeMismatch));
    }

    #[test]
    fn undeclared_name() {
        let (_, logger) = check_src("print missing\n");
        assert!(codes(&logger).contains(&ErrorCode::UndeclaredName));
    }

    #[test]
    fn use_before_declaration() {
        let (_, logger) = check_src("print later\nlet later = 1\n");
        assert!(codes(&logger).contains(&ErrorCode::UndeclaredName));
    }

    #[test]
    fn let_annotation_mismatch() {
        let (_, logger) = check_src("let x: bool = 1\n");
        assert!(codes(&logger).contains(&ErrorCode::LetTypeMismatch));
    }

    #[test]
    fn binary_needs_same_numeric_types() {
        let (_, logger) = check_src("let x = 1 + 1.5\n");
        assert!(codes(&logger).contains(&ErrorCode::NoOperatorOverload));
    }

    #[test]
    fn logical_needs_bools() {
        let (_, logger) = check_src("let x = 1 and true\n");
        assert!(codes(&logger).contains(&ErrorCode::OperatorNotValidForExpr));
    }

    #[test]
    fn unary_minus_needs_signed_numeric() {
        let (_, logger) = check_src("let a = 1u8\nlet b = -a\n");
        assert!(codes(&logger).contains(&ErrorCode::OperatorNotValidForExpr));
    }

    #[test]
    fn condition_must_be_bool() {
        let (_, logger) = check_src("let x = if 1 then 2 else 3\n");
        assert!(codes(&logger).contains(&ErrorCode::ConditionNotBool));
    }

    #[test]
    fn conditional_branches_must_agree() {
        let (_, logger) = check_src("let x = if true then 1 else 1.5\n");
        assert!(codes(&logger).contains(&ErrorCode::ConditionalBranchTypeMismatch));
    }

    #[test]
    fn conditional_without_else_is_unit() {
        let (context, logger) = check_src("let x = if true then 1\n");
        assert!(!logger.has_errors());
        assert!(init_ty(&context, 0).is_unit());
    }

    #[test]
    fn yield_outside_block() {
        let (_, logger) = check_src("yield 1\n");
        assert!(codes(&logger).contains(&ErrorCode::YieldOutsideLocalScope));
    }

    #[test]
    fn yield_targeting_loop_is_a_warning_and_loop_is_unit() {
        let (context, logger) = check_src("loop:\n    yield 5\n");
        assert!(codes(&logger).contains(&ErrorCode::YieldTargetingLoop));
        assert_eq!(logger.error_count(), 0);
        match &context.stmts[0] {
            Stmt::Expression { expr } => {
                assert!(expr.ty.as_ref().unwrap().is_unit());
            }
            _ => panic!("expected an expression statement"),
        }
    }

    #[test]
    fn block_yield_gives_the_block_a_type() {
        let (context, logger) = check_src("let x = block:\n    yield 7\n");
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
        assert!(init_ty(&context, 0).same(&Type::I32));
    }

    #[test]
    fn mismatched_yields_in_one_block() {
        let (_, logger) = check_src("let x = block {\n yield 1; yield 1.5 }\n");
        assert!(codes(&logger).contains(&ErrorCode::YieldTypeMismatch));
    }

    #[test]
    fn break_outside_loop() {
        let (_, logger) = check_src("break\n");
        assert!(codes(&logger).contains(&ErrorCode::BreakOutsideLoop));
    }

    #[test]
    fn continue_outside_loop() {
        let (_, logger) = check_src("continue\n");
        assert!(codes(&logger).contains(&ErrorCode::ContinueOutsideLoop));
    }

    #[test]
    fn return_at_top_level_is_outside_a_function() {
        let (_, logger) = check_src("return 1\n");
        assert!(codes(&logger).contains(&ErrorCode::ReturnOutsideFunction));
    }

    #[test]
    fn function_bodies_allow_return() {
        let (_, logger) = check_src("func f() -> i32:\n    return 4\n");
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
    }

    #[test]
    fn return_type_mismatch() {
        let (_, logger) = check_src("func f() -> i32:\n    return 1.5\n");
        assert!(codes(&logger).contains(&ErrorCode::FunctionReturnTypeMismatch));
    }

    #[test]
    fn body_type_must_match_declared_return() {
        let (_, logger) = check_src("func f() -> i32 => 1.5\n");
        assert!(codes(&logger).contains(&ErrorCode::FunctionReturnTypeMismatch));
    }

    #[test]
    fn infinite_loop_without_break_is_never() {
        let (context, logger) = check_src("let x: i32 = loop:\n    pass\n");
        // Never fits any annotation, including i32.
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
        assert!(init_ty(&context, 0).is_never());
    }

    #[test]
    fn infinite_loop_with_break_value() {
        let (context, logger) = check_src("let x = loop:\n    break 9\n");
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
        assert!(init_ty(&context, 0).same(&Type::I32));
    }

    #[test]
    fn while_loop_cannot_yield_a_value() {
        let (_, logger) = check_src("let var c = true\nlet x = while c: break 5\n");
        assert!(codes(&logger).contains(&ErrorCode::WhileLoopYieldingNonUnit));
    }

    #[test]
    fn while_true_with_break_value_is_sound() {
        let (context, logger) = check_src("let x = while true: break 5\n");
        assert_eq!(logger.error_count(), 0, "{:?}", logger.diagnostics());
        assert!(init_ty(&context, 0).same(&Type::I32));
    }

    #[test]
    fn labelled_break_crosses_an_inner_loop() {
        let (_, logger) = check_src(
            "outer: loop:\n    loop:\n        break outer 1\n",
        );
        assert_eq!(logger.error_count(), 0, "{:?}", logger.diagnostics());
    }

    #[test]
    fn deref_of_non_pointer() {
        let (_, logger) = check_src("let a = 1\nlet b = *a\n");
        assert!(codes(&logger).contains(&ErrorCode::DereferenceNonPointer));
    }

    #[test]
    fn raw_pointer_deref_requires_unsafe() {
        let (_, logger) = check_src("let p = alloc i32\nlet v = *p\n");
        assert!(codes(&logger).contains(&ErrorCode::PtrDerefOutsideUnsafeBlock));
    }

    #[test]
    fn unsafe_block_permits_pointer_deref() {
        let (_, logger) = check_src(
            "let p = alloc i32\nlet v = unsafe block:\n    yield *p\n",
        );
        assert_eq!(logger.error_count(), 0, "{:?}", logger.diagnostics());
    }

    #[test]
    fn unsafe_block_without_unsafe_work_warns() {
        let (_, logger) = check_src("let v = unsafe block:\n    yield 1\n");
        assert!(codes(&logger).contains(&ErrorCode::UnsafeBlockWithoutUnsafeStmt));
        assert_eq!(logger.error_count(), 0);
    }

    #[test]
    fn reference_deref_needs_no_unsafe() {
        let (_, logger) = check_src("let a = 1\nlet r = &a\nlet v = *r\n");
        assert_eq!(logger.error_count(), 0, "{:?}", logger.diagnostics());
    }

    #[test]
    fn mutable_reference_to_immutable_value() {
        let (_, logger) = check_src("let a = 1\nlet r = &var a\n");
        assert!(codes(&logger).contains(&ErrorCode::AddressOfImmutable));
    }

    #[test]
    fn address_of_non_place() {
        let (_, logger) = check_src("let r = &(1 + 2)\n");
        assert!(codes(&logger).contains(&ErrorCode::NotAPossibleLValue));
    }

    #[test]
    fn cast_numeric_to_numeric() {
        let (context, logger) = check_src("let a = 1\nlet b = a as f64\n");
        assert!(!logger.has_errors());
        assert!(init_ty(&context, 1).same(&Type::F64));
    }

    #[test]
    fn cast_numeric_to_pointer_is_rejected() {
        let (_, logger) = check_src("let a = 1\nlet b = a as *i32\n");
        assert!(codes(&logger).contains(&ErrorCode::OperatorNotValidForExpr));
    }

    #[test]
    fn transmute_requires_unsafe() {
        let (_, logger) = check_src("let a = 1\nlet b = a transmute f32\n");
        assert!(codes(&logger).contains(&ErrorCode::OperatorNotValidForExpr));
    }

    #[test]
    fn tuple_access_in_and_out_of_bounds() {
        let (context, logger) = check_src("let t = (1, true)\nlet a = t.0\n");
        assert!(!logger.has_errors());
        assert!(init_ty(&context, 1).same(&Type::I32));
        let (_, logger) = check_src("let t = (1, true)\nlet a = t.2\n");
        assert!(codes(&logger).contains(&ErrorCode::TupleIndexOutOfBounds));
    }

    #[test]
    fn struct_field_access_resolves_field_types() {
        let (context, logger) = check_src(
            "struct point:\n    x: i32\n    y: f64\nlet p: point = make()\nlet a = p.y\n",
        );
        // The call to make() fails, but field resolution on the annotated
        // type still checks.
        let _ = context;
        assert!(logger
            .diagnostics()
            .iter()
            .all(|d| d.code != ErrorCode::UnknownAnnotationName));
    }

    #[test]
    fn unknown_struct_field() {
        let (_, logger) = check_src(
            "struct point:\n    x: i32\nlet p: point = q\nlet a = p.z\n",
        );
        assert!(codes(&logger).contains(&ErrorCode::UndeclaredName));
    }

    #[test]
    fn call_binds_the_single_matching_overload() {
        let (context, logger) = check_src(
            "func f(a: i32) -> i32 => a\nfunc f(a: f64) -> f64 => a\nlet x = f(1)\n",
        );
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
        assert!(init_ty(&context, 2).same(&Type::I32));
    }

    #[test]
    fn exact_match_beats_widening() {
        let (context, logger) = check_src(
            "func g(a: i64) -> bool => true\nfunc g(a: i32) -> i32 => a\nlet x = g(1)\n",
        );
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
        assert!(init_ty(&context, 2).same(&Type::I32));
    }

    #[test]
    fn widening_applies_when_no_exact_match() {
        let (context, logger) = check_src(
            "func h(a: i64) -> i64 => a\nlet x = h(1)\n",
        );
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
        assert!(init_ty(&context, 1).same(&Type::Int { signed: true, width: 64 }));
    }

    #[test]
    fn no_matching_overload() {
        let (_, logger) = check_src("func f(a: i32) -> i32 => a\nlet x = f(true)\n");
        assert!(codes(&logger).contains(&ErrorCode::NoMatchingFunctionOverload));
    }

    #[test]
    fn ambiguous_overloads() {
        let (_, logger) = check_src(
            "func f(a: i16) -> i32 => 1\nfunc f(a: i32) -> i32 => 2\nlet x = f(1u8)\n",
        );
        assert!(codes(&logger).contains(&ErrorCode::MultipleMatchingFunctionOverloads));
    }

    #[test]
    fn defaults_fill_missing_arguments() {
        let (_, logger) = check_src(
            "func scale(a: i32, by: i32 = 2) -> i32 => a * by\nlet x = scale(3)\n",
        );
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
    }

    #[test]
    fn named_arguments_map_to_parameters() {
        let (_, logger) = check_src(
            "func scale(a: i32, by: i32 = 2) -> i32 => a * by\nlet x = scale(3, by = 4)\n",
        );
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
    }

    #[test]
    fn calling_a_variable_is_not_callable() {
        let (_, logger) = check_src("let a = 1\nlet x = a(2)\n");
        assert!(codes(&logger).contains(&ErrorCode::NotACallable));
    }

    #[test]
    fn default_type_mismatch() {
        let (_, logger) = check_src("func f(a: i32 = 1.5) -> i32 => a\n");
        assert!(codes(&logger).contains(&ErrorCode::DefaultArgTypeMismatch));
    }

    #[test]
    fn duplicate_overload_conflicts() {
        let (_, logger) = check_src(
            "func f(a: i32) -> i32 => a\nfunc f(b: i32) -> bool => true\n",
        );
        assert!(codes(&logger).contains(&ErrorCode::FunctionOverloadConflict));
    }

    #[test]
    fn unreachable_statement_warns() {
        let (_, logger) = check_src("let x = block {\n yield 1; pass }\n");
        // yield does not divert control; no warning expected.
        assert!(!codes(&logger).contains(&ErrorCode::UnreachableStatement));
        let (_, logger) = check_src("loop:\n    break\n    pass\n");
        assert!(codes(&logger).contains(&ErrorCode::UnreachableStatement));
        assert_eq!(logger.error_count(), 0);
    }

    #[test]
    fn cursor_stops_at_the_first_failed_statement() {
        let (context, logger) = check_src("let a = 1\nlet b = missing\nlet c = 2\n");
        assert!(logger.has_errors());
        assert_eq!(context.stmts_checked, 1);
    }

    #[test]
    fn sizeof_is_u64() {
        let (context, logger) = check_src("let s = sizeof(i32)\n");
        assert!(!logger.has_errors());
        assert!(init_ty(&context, 0).same(&Type::Int { signed: false, width: 64 }));
    }

    #[test]
    fn alloc_yields_a_mutable_pointer() {
        let (context, logger) = check_src("let p = alloc f64\n");
        assert!(!logger.has_errors());
        let expected = Type::Pointer {
            base: Box::new(Type::F64),
            mutable: true,
        };
        assert!(init_ty(&context, 0).same(&expected));
    }

    #[test]
    fn dealloc_needs_a_pointer() {
        let (_, logger) = check_src("let a = 1\ndealloc a\n");
        assert!(codes(&logger).contains(&ErrorCode::OperatorNotValidForExpr));
    }

    #[test]
    fn array_literal_elements_must_agree() {
        let (_, logger) = check_src("let a = [1, 2.5]\n");
        assert!(codes(&logger).contains(&ErrorCode::YieldTypeMismatch));
    }

    #[test]
    fn array_subscript_element_type() {
        let (context, logger) = check_src("let a = [1, 2, 3]\nlet b = a[0]\n");
        assert!(!logger.has_errors(), "{:?}", logger.diagnostics());
        assert!(init_ty(&context, 1).same(&Type::I32));
    }

    #[test]
    fn nullptr_compares_with_pointers() {
        let (_, logger) = check_src("let p = alloc i32\nlet q = p == nullptr\n");
        assert_eq!(logger.error_count(), 0, "{:?}", logger.diagnostics());
    }
}
