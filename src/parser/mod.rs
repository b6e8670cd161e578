//! The parser.
//!
//! Recursive descent over the token stream, with precedence-climbing
//! expression parsing split into [`expr`] and annotation parsing in
//! [`annotation`]. The parser appends statements to the frontend context
//! and never re-parses tokens consumed by an earlier submission.
//!
//! Statements end at a statement terminator: a `;`, a `Dedent`, the end of
//! input, or a line break outside any grouping. Inside `(`, `[`, and `{`
//! line breaks are insignificant, which the parser tracks with a grouping
//! depth counter.
//!
//! Two failure paths exist. A parse error logs a diagnostic and skips to
//! the next statement boundary so later statements still produce
//! diagnostics. Running out of tokens mid-construct in interactive mode is
//! not an error: the submission's statements are discarded and the context
//! status is set to `Pause` so the driver can request more input.

mod annotation;
mod expr;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use crate::ast::Stmt;
use crate::context::{FrontendContext, Status};
use crate::error::{ErrorCode, Logger};
use crate::token::{Tok, Token};

/// Why a parse function bailed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseFlow {
    /// Interactive input ran out mid-construct; ask for more.
    Pause,
    /// An error was logged; skip to the next statement boundary.
    Recover,
}

pub(crate) type PResult<T> = Result<T, ParseFlow>;

pub struct Parser<'a> {
    tokens: &'a [Rc<Token>],
    current: usize,
    /// Open `(`/`[`/`{` while parsing; line breaks are insignificant when
    /// this is non-zero.
    grouping_depth: usize,
    repl_mode: bool,
    logger: &'a mut Logger,
}

impl<'a> Parser<'a> {
    /// Parses the context's unconsumed tokens into statements.
    ///
    /// Panics if the context is already in an error state.
    pub fn parse(context: &mut FrontendContext, logger: &mut Logger, repl_mode: bool) {
        if context.status == Status::Error {
            panic!("Parser::parse: context is already in an error state");
        }
        let errors_before = logger.error_count();
        let tokens = context.tokens.clone();
        let mut parser = Parser {
            tokens: &tokens,
            current: context.tokens_parsed,
            grouping_depth: 0,
            repl_mode,
            logger,
        };

        let mut new_stmts: Vec<Stmt> = Vec::new();
        let mut paused = false;
        loop {
            // Stray structure tokens can be left behind by error recovery.
            while matches!(parser.tok(), Tok::Dedent | Tok::Indent | Tok::Semicolon) {
                parser.advance();
            }
            if parser.tok() == Tok::Eof {
                parser.advance();
                if !repl_mode {
                    new_stmts.push(Stmt::Eof);
                }
                break;
            }
            match parser.statement() {
                Ok(stmt) => new_stmts.push(stmt),
                Err(ParseFlow::Recover) => parser.synchronize(),
                Err(ParseFlow::Pause) => {
                    paused = true;
                    break;
                }
            }
        }

        if paused {
            // Nothing is committed; the driver resubmits a longer buffer.
            context.status = Status::Pause;
            return;
        }
        context.tokens_parsed = parser.current;
        context.stmts.append(&mut new_stmts);
        context.status = if parser.logger.error_count() > errors_before {
            Status::Error
        } else {
            Status::Ok
        };
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    pub(crate) fn peek(&self) -> &Rc<Token> {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_at(&self, lookahead: usize) -> &Rc<Token> {
        &self.tokens[(self.current + lookahead).min(self.tokens.len() - 1)]
    }

    pub(crate) fn tok(&self) -> Tok {
        self.peek().tok
    }

    pub(crate) fn prev(&self) -> &Rc<Token> {
        &self.tokens[self.current.saturating_sub(1)]
    }

    pub(crate) fn check(&self, tok: Tok) -> bool {
        self.tok() == tok
    }

    pub(crate) fn advance(&mut self) -> Rc<Token> {
        let token = Rc::clone(self.peek());
        // Never walk past the trailing Eof.
        if self.current + 1 < self.tokens.len() {
            self.current += 1;
        }
        token
    }

    pub(crate) fn match_tok(&mut self, tok: Tok) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// True when the current token begins a new source line relative to the
    /// previous one. Synthetic `Indent`/`Dedent` tokens sit at the start of
    /// the new line, so crossing one always counts as a line break.
    pub(crate) fn line_changed(&self) -> bool {
        if self.current == 0 {
            return false;
        }
        let prev = self.prev();
        if matches!(prev.tok, Tok::Indent | Tok::Dedent) {
            return true;
        }
        self.peek().location.line != prev.location.line
    }

    /// The parser hit the end of the token list. In interactive mode this
    /// asks the driver for more input; otherwise it logs `code`.
    pub(crate) fn pause_or_error(&mut self, code: ErrorCode, message: impl Into<String>) -> ParseFlow {
        if self.repl_mode && self.tok() == Tok::Eof {
            return ParseFlow::Pause;
        }
        let location = self.peek().location.clone();
        self.logger.log(code, Some(location), message);
        ParseFlow::Recover
    }

    pub(crate) fn error_at_current(&mut self, code: ErrorCode, message: impl Into<String>) -> ParseFlow {
        let location = self.peek().location.clone();
        self.logger.log(code, Some(location), message);
        ParseFlow::Recover
    }

    pub(crate) fn expect(
        &mut self,
        tok: Tok,
        code: ErrorCode,
        message: &str,
    ) -> PResult<Rc<Token>> {
        if self.check(tok) {
            Ok(self.advance())
        } else {
            Err(self.pause_or_error(code, message))
        }
    }

    pub(crate) fn enter_grouping(&mut self) {
        self.grouping_depth += 1;
    }

    pub(crate) fn exit_grouping(&mut self) {
        self.grouping_depth = self.grouping_depth.saturating_sub(1);
    }

    pub(crate) fn in_grouping(&self) -> bool {
        self.grouping_depth > 0
    }

    /// Whether the current token terminates a statement without being
    /// consumed.
    pub(crate) fn at_stmt_boundary(&self) -> bool {
        match self.tok() {
            Tok::Semicolon | Tok::Dedent | Tok::Eof | Tok::RBrace | Tok::KwElse | Tok::KwElif => {
                true
            }
            _ => !self.in_grouping() && self.line_changed(),
        }
    }

    /// Consumes a statement terminator, or reports `UnexpectedToken`.
    fn expect_statement_end(&mut self) -> PResult<()> {
        if self.check(Tok::Semicolon) {
            self.advance();
            return Ok(());
        }
        if self.at_stmt_boundary() {
            return Ok(());
        }
        let lexeme = self.peek().lexeme().to_string();
        Err(self.pause_or_error(
            ErrorCode::UnexpectedToken,
            format!("expected end of statement, found `{}`", lexeme),
        ))
    }

    /// Skips tokens until the next statement boundary.
    fn synchronize(&mut self) {
        loop {
            match self.tok() {
                Tok::Eof | Tok::Dedent | Tok::RBrace => return,
                Tok::Semicolon => {
                    self.advance();
                    return;
                }
                _ => {
                    if !self.in_grouping() && self.line_changed() {
                        return;
                    }
                    self.advance();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Parses one statement including its terminator.
    pub(crate) fn statement(&mut self) -> PResult<Stmt> {
        let stmt = self.statement_core()?;
        self.expect_statement_end()?;
        Ok(stmt)
    }

    /// Parses one statement without consuming its terminator. Used directly
    /// for inline colon bodies, where the terminator belongs to the
    /// enclosing construct.
    pub(crate) fn statement_core(&mut self) -> PResult<Stmt> {
        match self.tok() {
            Tok::KwLet => self.let_statement(),
            Tok::KwFunc => self.func_statement(),
            Tok::KwStruct | Tok::KwClass => self.struct_statement(),
            Tok::KwNamespace => self.namespace_statement(),
            Tok::KwEnum => {
                Err(self.error_at_current(
                    ErrorCode::UnexpectedToken,
                    "`enum` declarations are not supported",
                ))
            }
            Tok::KwConst | Tok::KwGlobal => {
                let lexeme = self.peek().lexeme().to_string();
                Err(self.error_at_current(
                    ErrorCode::UnexpectedToken,
                    format!("`{}` declarations are not supported", lexeme),
                ))
            }
            Tok::KwPrint => self.print_statement(),
            Tok::KwPass => {
                let keyword = self.advance();
                Ok(Stmt::Pass { keyword })
            }
            Tok::KwYield => self.yield_statement(),
            Tok::KwBreak => self.break_statement(),
            Tok::KwContinue => self.continue_statement(),
            Tok::KwReturn => self.return_statement(),
            Tok::KwDealloc => self.dealloc_statement(),
            _ => {
                let expr = self.expression()?;
                Ok(Stmt::Expression { expr })
            }
        }
    }

    fn let_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let mutable = self.match_tok(Tok::KwVar);
        let name = self.expect(
            Tok::Identifier,
            ErrorCode::NotAnIdentifier,
            "expected a variable name after `let`",
        )?;
        let annotation = if self.match_tok(Tok::Colon) {
            Some(self.parse_annotation()?)
        } else {
            None
        };
        let initializer = if self.match_tok(Tok::Eq) {
            Some(self.expression()?)
        } else {
            None
        };
        if annotation.is_none() && initializer.is_none() {
            return Err(self.error_at_current(
                ErrorCode::LetWithoutTypeOrValue,
                "a `let` statement needs a type annotation, an initializer, or both",
            ));
        }
        Ok(Stmt::Let {
            keyword,
            name,
            mutable,
            annotation,
            initializer,
            entry: None,
        })
    }

    fn func_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let name = self.expect(
            Tok::Identifier,
            ErrorCode::NotAnIdentifier,
            "expected a function name after `func`",
        )?;
        self.expect(
            Tok::LParen,
            ErrorCode::FuncWithoutOpeningParen,
            "expected `(` after the function name",
        )?;
        self.enter_grouping();
        let mut params = Vec::new();
        if !self.check(Tok::RParen) {
            loop {
                let mutable = self.match_tok(Tok::KwVar);
                let param_name = self.expect(
                    Tok::Identifier,
                    ErrorCode::NotAnIdentifier,
                    "expected a parameter name",
                )?;
                self.expect(
                    Tok::Colon,
                    ErrorCode::UnexpectedToken,
                    "expected `:` and a type after the parameter name",
                )?;
                let annotation = self.parse_annotation()?;
                let default = if self.match_tok(Tok::Eq) {
                    Some(self.expression()?)
                } else {
                    None
                };
                params.push(crate::ast::Param {
                    name: param_name,
                    mutable,
                    annotation,
                    default,
                    entry: None,
                });
                if !self.match_tok(Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(
            Tok::RParen,
            ErrorCode::UnexpectedToken,
            "expected `)` after the parameter list",
        )?;
        self.exit_grouping();

        let return_annotation = if self.match_tok(Tok::Arrow) {
            Some(self.parse_annotation()?)
        } else {
            None
        };

        let body = if self.match_tok(Tok::DoubleArrow) {
            self.expression()?
        } else if matches!(self.tok(), Tok::Indent | Tok::Colon | Tok::LBrace) {
            self.parse_block(crate::ast::BlockKind::Function, None, false)?
        } else {
            return Err(self.pause_or_error(
                ErrorCode::FuncWithoutArrowOrBlock,
                "expected `=>`, a block, or `:` after the function signature",
            ));
        };

        Ok(Stmt::Func {
            keyword,
            name,
            params,
            return_annotation,
            body,
            decl: None,
        })
    }

    fn struct_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let is_class = keyword.tok == Tok::KwClass;
        let name = self.expect(
            Tok::Identifier,
            ErrorCode::NotAnIdentifier,
            "expected a name after the struct keyword",
        )?;
        self.expect(
            Tok::Indent,
            ErrorCode::NotABlock,
            "expected `:` and an indented field list",
        )?;
        let mut fields = Vec::new();
        while !self.check(Tok::Dedent) && !self.check(Tok::Eof) {
            if self.match_tok(Tok::Semicolon) {
                continue;
            }
            if self.match_tok(Tok::KwPass) {
                self.expect_statement_end()?;
                continue;
            }
            let field_name = self.expect(
                Tok::Identifier,
                ErrorCode::NotAnIdentifier,
                "expected a field name",
            )?;
            self.expect(
                Tok::Colon,
                ErrorCode::UnexpectedToken,
                "expected `:` and a type after the field name",
            )?;
            let annotation = self.parse_annotation()?;
            fields.push(crate::ast::StructField {
                name: field_name,
                annotation,
            });
            self.expect_statement_end()?;
        }
        self.expect(
            Tok::Dedent,
            ErrorCode::UnexpectedToken,
            "expected the end of the struct body",
        )?;
        Ok(Stmt::Struct {
            keyword,
            name,
            is_class,
            fields,
            def: None,
        })
    }

    fn namespace_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let name = self.expect(
            Tok::Identifier,
            ErrorCode::NotAnIdentifier,
            "expected a name after `namespace`",
        )?;
        self.expect(
            Tok::Indent,
            ErrorCode::NotABlock,
            "expected `:` and an indented namespace body",
        )?;
        let mut body = Vec::new();
        while !self.check(Tok::Dedent) && !self.check(Tok::Eof) {
            if self.match_tok(Tok::Semicolon) {
                continue;
            }
            match self.statement() {
                Ok(stmt) => body.push(stmt),
                Err(ParseFlow::Recover) => self.synchronize(),
                Err(ParseFlow::Pause) => return Err(ParseFlow::Pause),
            }
        }
        self.expect(
            Tok::Dedent,
            ErrorCode::UnexpectedToken,
            "expected the end of the namespace body",
        )?;
        Ok(Stmt::Namespace {
            keyword,
            name,
            body,
            node: None,
        })
    }

    fn print_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let mut args = vec![self.expression()?];
        while self.match_tok(Tok::Comma) {
            args.push(self.expression()?);
        }
        Ok(Stmt::Print { keyword, args })
    }

    /// Whether an identifier at the cursor reads as a label: the token
    /// after it unambiguously starts a new expression on the same line.
    /// Tokens that could instead continue an expression built from the
    /// identifier (`(`, `[`, `.`, binary operators) do not count, so
    /// `yield f(x)` stays a call and `break a - 1` stays a subtraction.
    fn identifier_reads_as_label(&self) -> bool {
        if self.tok() != Tok::Identifier {
            return false;
        }
        let next = self.peek_at(1);
        if next.location.line != self.peek().location.line {
            return false;
        }
        matches!(
            next.tok,
            Tok::Identifier
                | Tok::LBrace
                | Tok::Bang
                | Tok::KwNot
                | Tok::KwIf
                | Tok::KwAlloc
                | Tok::KwSizeof
                | Tok::KwBlock
                | Tok::KwUnsafe
                | Tok::KwLoop
                | Tok::KwWhile
                | Tok::KwDo
        ) || next.tok.is_literal()
    }

    fn yield_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let mut label = None;
        let mut value = None;
        if !self.at_stmt_boundary() {
            if self.identifier_reads_as_label() {
                label = Some(self.advance());
            }
            value = Some(self.expression()?);
        }
        Ok(Stmt::Yield {
            keyword,
            label,
            value,
        })
    }

    fn break_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let mut label = None;
        let mut value = None;
        if !self.at_stmt_boundary() {
            if self.identifier_reads_as_label() {
                label = Some(self.advance());
            }
            value = Some(self.expression()?);
        }
        Ok(Stmt::Break {
            keyword,
            label,
            value,
        })
    }

    fn continue_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let label = if !self.at_stmt_boundary() && self.check(Tok::Identifier) {
            Some(self.advance())
        } else {
            None
        };
        Ok(Stmt::Continue { keyword, label })
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let value = if self.at_stmt_boundary() {
            None
        } else {
            Some(self.expression()?)
        };
        Ok(Stmt::Return { keyword, value })
    }

    fn dealloc_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.advance();
        let operand = self.expression()?;
        Ok(Stmt::Dealloc { keyword, operand })
    }
}
