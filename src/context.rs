//! The persistent frontend context.
//!
//! One [`FrontendContext`] carries all mutable state through the pipeline:
//! the tokens of the latest submission, the accumulated statements, the
//! cursors marking how far checking and lowering have progressed, the
//! symbol tree, and the output MIR module. In interactive mode the same
//! context is reused across submissions; each one appends statements and
//! advances the cursors.

use std::rc::Rc;

use crate::ast::Stmt;
use crate::mir::MirModule;
use crate::scope::SymbolTree;
use crate::token::Token;

/// The status of the frontend after a stage has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Ready to accept input.
    #[default]
    Ok,
    /// Processing could not complete, but can resume after more input.
    /// Issued only in interactive mode.
    Pause,
    /// An unrecoverable error was found; the submission cannot continue.
    Error,
}

/// Mutable state shared by every stage of the pipeline.
#[derive(Debug, Default)]
pub struct FrontendContext {
    pub status: Status,
    /// Tokens scanned from the last submission.
    pub tokens: Vec<Rc<Token>>,
    /// How many of `tokens` the parser has consumed.
    pub tokens_parsed: usize,
    /// All statements processed so far, across submissions.
    pub stmts: Vec<Stmt>,
    /// The number of leading statements that have been type-checked.
    pub stmts_checked: usize,
    /// The number of leading statements lowered into the MIR module.
    pub stmts_lowered: usize,
    pub symbol_tree: SymbolTree,
    pub module: MirModule,
}

impl FrontendContext {
    pub fn new() -> Self {
        FrontendContext {
            symbol_tree: SymbolTree::new(),
            ..Default::default()
        }
    }

    /// Resets the context to its initial state.
    pub fn reset(&mut self) {
        self.status = Status::Ok;
        self.tokens.clear();
        self.tokens_parsed = 0;
        self.stmts.clear();
        self.stmts_checked = 0;
        self.stmts_lowered = 0;
        self.symbol_tree.reset();
        self.module.reset();
    }

    /// Discards statements that were parsed but failed to check, restoring
    /// the invariant that every retained statement is checked. Used by the
    /// interactive driver to recover after an errored submission.
    pub fn discard_unchecked(&mut self) {
        self.stmts.truncate(self.stmts_checked);
        self.status = Status::Ok;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_initial_state() {
        let mut context = FrontendContext::new();
        context.status = Status::Error;
        context.stmts_checked = 3;
        context.reset();
        assert_eq!(context.status, Status::Ok);
        assert_eq!(context.stmts_checked, 0);
        assert!(context.stmts.is_empty());
    }

    #[test]
    fn discard_unchecked_truncates_to_cursor() {
        let mut context = FrontendContext::new();
        context.stmts.push(Stmt::Eof);
        context.stmts.push(Stmt::Eof);
        context.stmts_checked = 1;
        context.status = Status::Error;
        context.discard_unchecked();
        assert_eq!(context.stmts.len(), 1);
        assert_eq!(context.status, Status::Ok);
    }
}
