//! The abstract syntax tree.
//!
//! The AST splits into three sum types: [`Stmt`] for statements, [`Expr`]
//! for expressions, and [`Annotation`] for type annotations. Expressions
//! carry a mutable type slot that the local checker fills in; the parser
//! leaves it empty.

mod annotation;
mod expr;
mod stmt;

pub use annotation::{Annotation, Name, NamePart};
pub use expr::{Block, BlockKind, CallArg, CallTarget, Expr, ExprKind, LoopKind};
pub use stmt::{Param, Stmt, StructField};
