//! The frontend of the nico compiler.
//!
//! nico is a small statically-typed imperative language with
//! indentation-based block structure, an ownership and mutability
//! discipline for pointers and references, function overloading, and
//! labelled control flow. This crate takes source text through the whole
//! frontend:
//!
//! ```text
//! source text → tokens → AST + symbol tree → typed AST → MIR
//! ```
//!
//! The stages are the [`lexer::Lexer`], the [`parser::Parser`], the
//! [`check::GlobalChecker`] and [`check::LocalChecker`], and the
//! [`mir::MirBuilder`]. A persistent [`context::FrontendContext`] carries
//! state between them and across interactive submissions; [`compile`]
//! drives the stages in order and [`repl`] wraps the pipeline in an
//! interactive session.

pub mod ast;
pub mod check;
pub mod cli;
pub mod compile;
pub mod context;
pub mod debug;
pub mod error;
pub mod lexer;
pub mod mir;
pub mod parser;
pub mod repl;
pub mod scope;
pub mod source;
pub mod style;
pub mod token;
pub mod types;

pub use ast::{Annotation, Block, BlockKind, Expr, ExprKind, LoopKind, Name, Stmt};
pub use check::{GlobalChecker, LocalChecker};
pub use context::{FrontendContext, Status};
pub use debug::{expr_eq, stmt_eq, AstPrinter};
pub use error::{Diagnostic, ErrorCode, Logger};
pub use lexer::Lexer;
pub use mir::{MirBuilder, MirModule};
pub use parser::Parser;
pub use repl::Repl;
pub use scope::{NodeId, NodeKind, SymbolTree};
pub use source::{CodeFile, Location};
pub use token::{LiteralValue, Tok, Token};
pub use types::Type;
