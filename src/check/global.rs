//! The global checker.
//!
//! Walks the top-level declarations of newly parsed statements into the
//! symbol tree. Types are not resolved here: struct fields are installed
//! with placeholder types and function signatures unresolved, so that
//! declarations may refer to each other regardless of order. The local
//! checker resolves them before it starts type checking.

use std::collections::HashSet;

use crate::ast::Stmt;
use crate::context::{FrontendContext, Status};
use crate::error::{ErrorCode, Logger};
use crate::scope::{Field, SigParam, Signature, SymbolTree};
use crate::types::Type;

pub struct GlobalChecker;

impl GlobalChecker {
    /// Walks declarations of unchecked statements into the symbol tree.
    ///
    /// Panics if the context is already in an error state.
    pub fn check(context: &mut FrontendContext, logger: &mut Logger) {
        if context.status == Status::Error {
            panic!("GlobalChecker::check: context is already in an error state");
        }
        let errors_before = logger.error_count();
        let FrontendContext {
            stmts,
            stmts_checked,
            symbol_tree,
            ..
        } = &mut *context;
        for stmt in stmts[*stmts_checked..].iter_mut() {
            declare(stmt, symbol_tree, logger);
        }
        context.status = if logger.error_count() > errors_before {
            Status::Error
        } else {
            Status::Ok
        };
    }
}

fn declare(stmt: &mut Stmt, tree: &mut SymbolTree, logger: &mut Logger) {
    match stmt {
        Stmt::Namespace {
            name, body, node, ..
        } => match tree.add_namespace(name) {
            Ok(id) => {
                *node = Some(id);
                for inner in body.iter_mut() {
                    declare(inner, tree, logger);
                }
                tree.exit_scope();
            }
            Err(code) => log_name_error(logger, code, name, "namespace"),
        },
        Stmt::Struct {
            name,
            is_class,
            fields,
            def,
            ..
        } => match tree.add_struct_def(name, *is_class) {
            Ok(id) => {
                *def = Some(id);
                for field in fields {
                    // Placeholder type; the local checker resolves the
                    // annotation once every declaration shell exists.
                    let entry = tree.add_field_entry(Field {
                        token: field.name.clone(),
                        ty: Type::Unknown,
                        mutable: true,
                    });
                    if let Err(code) = entry {
                        log_name_error(logger, code, &field.name, "field");
                    }
                }
                tree.exit_scope();
            }
            Err(code) => log_name_error(logger, code, name, "struct"),
        },
        Stmt::Func {
            name, params, decl, ..
        } => {
            let mut seen = HashSet::new();
            for param in params.iter() {
                if !seen.insert(param.name.lexeme().to_string()) {
                    logger.log(
                        ErrorCode::DuplicateFunctionParameterName,
                        Some(param.name.location.clone()),
                        format!("duplicate parameter name `{}`", param.name.lexeme()),
                    );
                }
            }
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
            match tree.add_function_signature(name, signature) {
                Ok(target) => *decl = Some(target),
                Err(code) => log_name_error(logger, code, name, "function"),
            }
        }
        _ => {}
    }
}

fn log_name_error(
    logger: &mut Logger,
    code: ErrorCode,
    name: &std::rc::Rc<crate::token::Token>,
    what: &str,
) {
    let message = match code {
        ErrorCode::NameAlreadyExists => {
            format!("the name `{}` already exists in this scope", name.lexeme())
        }
        ErrorCode::NameIsReserved => {
            format!("`{}` is a reserved name", name.lexeme())
        }
        ErrorCode::NamespaceInLocalScope => {
            "namespaces cannot be declared in a local scope".to_string()
        }
        ErrorCode::NamespaceInStructDef => {
            "namespaces cannot be declared inside a struct".to_string()
        }
        ErrorCode::StructInLocalScope => {
            "structs cannot be declared in a local scope".to_string()
        }
        _ => format!("cannot declare {} `{}`", what, name.lexeme()),
    };
    logger.log(code, Some(name.location.clone()), message);
}
