//! Expression parsing.
//!
//! Precedence climbing from lowest to highest: assignment (right
//! associative, including compound forms) → `or` → `and` → `not` →
//! equality → comparison → `|` → `&` → `^` → additive → multiplicative →
//! unary and casts → postfix (`.` access, `[]` subscript, `()` call) →
//! primary. Blocks, conditionals, and loops are primaries: every control
//! structure is an expression.
//!
//! Outside groupings, an operator at the start of a new line does not
//! continue the previous expression; the statement ended at the line
//! break.

use crate::ast::{
    Block, BlockKind, CallArg, Expr, ExprKind, LoopKind, Name, NamePart, Stmt,
};
use crate::error::ErrorCode;
use crate::token::{LiteralValue, Tok};

use super::{ParseFlow, PResult, Parser};

impl<'a> Parser<'a> {
    pub(crate) fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    /// True when the upcoming token may extend the current expression; an
    /// operator on a fresh line outside groupings may not.
    fn can_continue(&self) -> bool {
        self.in_grouping() || !self.line_changed()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let target = self.logic_or()?;
        if self.can_continue() && (self.check(Tok::Eq) || self.tok().is_compound_operator()) {
            let op = self.advance();
            let value = self.assignment()?;
            let location = target.location.clone();
            return Ok(Expr::new(
                ExprKind::Assign {
                    op,
                    target: Box::new(target),
                    value: Box::new(value),
                },
                location,
            ));
        }
        Ok(target)
    }

    fn logic_or(&mut self) -> PResult<Expr> {
        let mut left = self.logic_and()?;
        while self.can_continue() && self.check(Tok::KwOr) {
            let op = self.advance();
            let right = self.logic_and()?;
            let location = left.location.clone();
            left = Expr::new(
                ExprKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                location,
            );
        }
        Ok(left)
    }

    fn logic_and(&mut self) -> PResult<Expr> {
        let mut left = self.logic_not()?;
        while self.can_continue() && self.check(Tok::KwAnd) {
            let op = self.advance();
            let right = self.logic_not()?;
            let location = left.location.clone();
            left = Expr::new(
                ExprKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                location,
            );
        }
        Ok(left)
    }

    fn logic_not(&mut self) -> PResult<Expr> {
        if self.check(Tok::KwNot) {
            let op = self.advance();
            let operand = self.logic_not()?;
            let location = op.location.clone();
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                location,
            ));
        }
        self.equality()
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut left = self.comparison()?;
        while self.can_continue() && matches!(self.tok(), Tok::EqEq | Tok::BangEq) {
            let op = self.advance();
            let right = self.comparison()?;
            let location = left.location.clone();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                location,
            );
        }
        Ok(left)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut left = self.bit_or()?;
        while self.can_continue() && self.tok().is_comparison_operator() {
            let op = self.advance();
            let right = self.bit_or()?;
            let location = left.location.clone();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                location,
            );
        }
        Ok(left)
    }

    fn bit_or(&mut self) -> PResult<Expr> {
        self.binary_level(Parser::bit_and, &[Tok::Bar])
    }

    fn bit_and(&mut self) -> PResult<Expr> {
        self.binary_level(Parser::bit_xor, &[Tok::Amp])
    }

    fn bit_xor(&mut self) -> PResult<Expr> {
        self.binary_level(Parser::term, &[Tok::Caret])
    }

    fn term(&mut self) -> PResult<Expr> {
        self.binary_level(Parser::factor, &[Tok::Plus, Tok::Minus])
    }

    fn factor(&mut self) -> PResult<Expr> {
        self.binary_level(Parser::unary, &[Tok::Star, Tok::Slash, Tok::Percent])
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Parser<'a>) -> PResult<Expr>,
        ops: &[Tok],
    ) -> PResult<Expr> {
        let mut left = next(self)?;
        while self.can_continue() && ops.contains(&self.tok()) {
            let op = self.advance();
            let right = next(self)?;
            let location = left.location.clone();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                location,
            );
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        match self.tok() {
            Tok::Minus => {
                let op = self.advance();
                // Fold the sign into a directly following numeric literal so
                // the whole literal can be range-checked.
                if self.tok().is_number() {
                    let token = self.advance();
                    if token.tok.is_unsigned_integer() {
                        return Err(self.error_at_current(
                            ErrorCode::NegativeOnUnsignedInteger,
                            "cannot negate an unsigned integer literal",
                        ));
                    }
                    let location = op.location.clone();
                    let expr = Expr::new(
                        ExprKind::Literal {
                            token,
                            negative: true,
                        },
                        location,
                    );
                    self.check_literal_range(&expr)?;
                    return Ok(expr);
                }
                let operand = self.unary()?;
                let location = op.location.clone();
                Ok(Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    location,
                ))
            }
            Tok::Bang | Tok::KwNot => {
                let op = self.advance();
                let operand = self.unary()?;
                let location = op.location.clone();
                Ok(Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    location,
                ))
            }
            Tok::Star => {
                let op = self.advance();
                let operand = self.unary()?;
                let location = op.location.clone();
                Ok(Expr::new(
                    ExprKind::Deref {
                        op,
                        operand: Box::new(operand),
                    },
                    location,
                ))
            }
            Tok::Amp => {
                let op = self.advance();
                let mutable = self.match_tok(Tok::KwVar);
                let operand = self.unary()?;
                let location = op.location.clone();
                Ok(Expr::new(
                    ExprKind::Address {
                        op,
                        mutable,
                        operand: Box::new(operand),
                    },
                    location,
                ))
            }
            Tok::KwSizeof => {
                let keyword = self.advance();
                self.expect(
                    Tok::LParen,
                    ErrorCode::UnexpectedToken,
                    "expected `(` after `sizeof`",
                )?;
                self.enter_grouping();
                let annotation = self.parse_annotation()?;
                self.expect(
                    Tok::RParen,
                    ErrorCode::UnexpectedToken,
                    "expected `)` after the `sizeof` type",
                )?;
                self.exit_grouping();
                Ok(Expr::new(
                    ExprKind::SizeOf { annotation },
                    keyword.location.clone(),
                ))
            }
            _ => self.cast(),
        }
    }

    fn cast(&mut self) -> PResult<Expr> {
        let mut expr = self.postfix()?;
        while self.can_continue() && matches!(self.tok(), Tok::KwAs | Tok::KwTransmute) {
            let op = self.advance();
            let annotation = self.parse_annotation()?;
            let location = expr.location.clone();
            expr = Expr::new(
                ExprKind::Cast {
                    operand: Box::new(expr),
                    annotation,
                    reinterpret: op.tok == Tok::KwTransmute,
                },
                location,
            );
        }
        Ok(expr)
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if !self.can_continue() {
                break;
            }
            match self.tok() {
                Tok::Dot => {
                    self.advance();
                    if !matches!(self.tok(), Tok::Identifier | Tok::TupleIndex) {
                        return Err(self.pause_or_error(
                            ErrorCode::UnexpectedTokenAfterDot,
                            "expected a field name or tuple index after `.`",
                        ));
                    }
                    let member = self.advance();
                    let location = expr.location.clone();
                    expr = Expr::new(
                        ExprKind::Access {
                            object: Box::new(expr),
                            member,
                        },
                        location,
                    );
                }
                Tok::LSquare => {
                    self.advance();
                    self.enter_grouping();
                    let index = self.expression()?;
                    self.expect(
                        Tok::RSquare,
                        ErrorCode::UnexpectedToken,
                        "expected `]` after the subscript index",
                    )?;
                    self.exit_grouping();
                    let location = expr.location.clone();
                    expr = Expr::new(
                        ExprKind::Subscript {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        location,
                    );
                }
                Tok::LParen => {
                    self.advance();
                    self.enter_grouping();
                    let args = self.call_arguments()?;
                    self.exit_grouping();
                    let location = expr.location.clone();
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            resolved: None,
                        },
                        location,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parses call arguments up to and including the closing `)`.
    /// Positional arguments first, then named `name = expr` arguments.
    fn call_arguments(&mut self) -> PResult<Vec<CallArg>> {
        let mut args = Vec::new();
        let mut seen_named = false;
        if !self.check(Tok::RParen) {
            loop {
                if self.check(Tok::Identifier) && self.peek_at(1).tok == Tok::Eq {
                    let name = self.advance();
                    self.advance();
                    let value = self.expression()?;
                    args.push(CallArg {
                        name: Some(name),
                        value,
                    });
                    seen_named = true;
                } else {
                    if seen_named {
                        self.error_at_current(
                            ErrorCode::PosArgumentAfterNamedArgument,
                            "positional arguments cannot follow named arguments",
                        );
                    }
                    let value = self.expression()?;
                    args.push(CallArg { name: None, value });
                }
                if !self.match_tok(Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(
            Tok::RParen,
            ErrorCode::UnexpectedToken,
            "expected `)` after the call arguments",
        )?;
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        match self.tok() {
            tok if tok.is_literal() => {
                let token = self.advance();
                let location = token.location.clone();
                let expr = Expr::new(
                    ExprKind::Literal {
                        token,
                        negative: false,
                    },
                    location,
                );
                self.check_literal_range(&expr)?;
                Ok(expr)
            }
            Tok::Identifier => {
                // A label immediately before a loop or block names it.
                if self.peek_at(1).tok == Tok::Colon
                    && matches!(
                        self.peek_at(2).tok,
                        Tok::KwLoop | Tok::KwWhile | Tok::KwDo | Tok::KwBlock | Tok::KwUnsafe
                    )
                {
                    let label = self.advance();
                    self.advance();
                    return self.labelled_construct(Some(label.lexeme().to_string()));
                }
                if self.peek_at(1).tok == Tok::Indent {
                    let label = self.advance();
                    return self.parse_block(
                        BlockKind::Plain,
                        Some(label.lexeme().to_string()),
                        false,
                    );
                }
                let name = self.expression_name()?;
                let location = name.head_token().location.clone();
                Ok(Expr::new(ExprKind::NameRef { name, entry: None }, location))
            }
            Tok::LParen => {
                let open = self.advance();
                self.enter_grouping();
                if self.match_tok(Tok::RParen) {
                    self.exit_grouping();
                    return Ok(Expr::new(
                        ExprKind::Tuple {
                            elements: Vec::new(),
                        },
                        open.location.clone(),
                    ));
                }
                let first = self.expression()?;
                if self.check(Tok::Comma) {
                    let mut elements = vec![first];
                    while self.match_tok(Tok::Comma) {
                        if self.check(Tok::RParen) {
                            break;
                        }
                        elements.push(self.expression()?);
                    }
                    self.expect(
                        Tok::RParen,
                        ErrorCode::UnexpectedToken,
                        "expected `)` after the tuple elements",
                    )?;
                    self.exit_grouping();
                    return Ok(Expr::new(
                        ExprKind::Tuple { elements },
                        open.location.clone(),
                    ));
                }
                self.expect(
                    Tok::RParen,
                    ErrorCode::UnexpectedToken,
                    "expected `)` after the grouped expression",
                )?;
                self.exit_grouping();
                Ok(first)
            }
            Tok::LSquare => {
                let open = self.advance();
                self.enter_grouping();
                let mut elements = Vec::new();
                if !self.check(Tok::RSquare) {
                    loop {
                        elements.push(self.expression()?);
                        if !self.match_tok(Tok::Comma) {
                            break;
                        }
                        if self.check(Tok::RSquare) {
                            break;
                        }
                    }
                }
                self.expect(
                    Tok::RSquare,
                    ErrorCode::UnexpectedToken,
                    "expected `]` after the array elements",
                )?;
                self.exit_grouping();
                Ok(Expr::new(
                    ExprKind::Array { elements },
                    open.location.clone(),
                ))
            }
            Tok::KwAlloc => {
                let keyword = self.advance();
                let annotation = self.parse_annotation()?;
                let count = if self.can_continue() && self.match_tok(Tok::LSquare) {
                    self.enter_grouping();
                    let count = self.expression()?;
                    self.expect(
                        Tok::RSquare,
                        ErrorCode::UnexpectedToken,
                        "expected `]` after the allocation count",
                    )?;
                    self.exit_grouping();
                    Some(Box::new(count))
                } else {
                    None
                };
                Ok(Expr::new(
                    ExprKind::Alloc { annotation, count },
                    keyword.location.clone(),
                ))
            }
            Tok::KwBlock | Tok::KwUnsafe | Tok::LBrace => self.labelled_construct(None),
            Tok::KwIf => {
                self.advance();
                self.conditional()
            }
            Tok::KwLoop | Tok::KwWhile | Tok::KwDo => self.labelled_construct(None),
            Tok::KwVar => Err(self.error_at_current(
                ErrorCode::UnexpectedVarInExpression,
                "`var` is only valid after `&` or in declarations",
            )),
            Tok::RParen => Err(self.error_at_current(
                ErrorCode::UnexpectedClosingParen,
                "`)` without a matching `(`",
            )),
            _ => {
                let lexeme = self.peek().lexeme().to_string();
                Err(self.pause_or_error(
                    ErrorCode::NotAnExpression,
                    format!("expected an expression, found `{}`", lexeme),
                ))
            }
        }
    }

    /// Parses the construct at the cursor that may carry a label: a loop,
    /// a `do` loop, a `while` loop, or a block form.
    fn labelled_construct(&mut self, label: Option<String>) -> PResult<Expr> {
        match self.tok() {
            Tok::KwLoop => {
                self.advance();
                self.loop_infinite(label)
            }
            Tok::KwWhile => {
                self.advance();
                self.loop_while(label)
            }
            Tok::KwDo => {
                self.advance();
                self.loop_do_while(label)
            }
            Tok::KwBlock => {
                self.advance();
                self.parse_block(BlockKind::Plain, label, false)
            }
            Tok::KwUnsafe => {
                self.advance();
                self.expect(
                    Tok::KwBlock,
                    ErrorCode::NotABlock,
                    "expected `block` after `unsafe`",
                )?;
                self.parse_block(BlockKind::Plain, label, true)
            }
            Tok::LBrace => self.parse_block(BlockKind::Plain, label, false),
            _ => {
                let lexeme = self.peek().lexeme().to_string();
                Err(self.pause_or_error(
                    ErrorCode::NotABlock,
                    format!("expected a block or loop, found `{}`", lexeme),
                ))
            }
        }
    }

    /// Parses a block body in any of its three forms: an `Indent`-delimited
    /// region, an inline `:` statement, or a braced `{ ... }` group.
    pub(crate) fn parse_block(
        &mut self,
        kind: BlockKind,
        label: Option<String>,
        is_unsafe: bool,
    ) -> PResult<Expr> {
        let location = self.peek().location.clone();
        let stmts = match self.tok() {
            Tok::Indent => {
                self.advance();
                let mut stmts = Vec::new();
                while !self.check(Tok::Dedent) && !self.check(Tok::Eof) {
                    if self.match_tok(Tok::Semicolon) {
                        continue;
                    }
                    match self.statement() {
                        Ok(stmt) => stmts.push(stmt),
                        Err(ParseFlow::Recover) => self.synchronize(),
                        Err(ParseFlow::Pause) => return Err(ParseFlow::Pause),
                    }
                }
                self.expect(
                    Tok::Dedent,
                    ErrorCode::UnexpectedToken,
                    "expected the end of the block",
                )?;
                stmts
            }
            Tok::LBrace => {
                self.advance();
                self.enter_grouping();
                let mut stmts = Vec::new();
                while !self.check(Tok::RBrace) && !self.check(Tok::Eof) {
                    if self.match_tok(Tok::Semicolon) {
                        continue;
                    }
                    match self.statement() {
                        Ok(stmt) => stmts.push(stmt),
                        Err(ParseFlow::Recover) => self.synchronize(),
                        Err(ParseFlow::Pause) => return Err(ParseFlow::Pause),
                    }
                }
                self.expect(
                    Tok::RBrace,
                    ErrorCode::UnexpectedToken,
                    "expected `}` at the end of the block",
                )?;
                self.exit_grouping();
                stmts
            }
            Tok::Colon => {
                self.advance();
                vec![self.statement_core()?]
            }
            _ => {
                let lexeme = self.peek().lexeme().to_string();
                return Err(self.pause_or_error(
                    ErrorCode::NotABlock,
                    format!("expected a block, found `{}`", lexeme),
                ));
            }
        };
        Ok(Expr::new(
            ExprKind::Block(Block {
                kind,
                label,
                stmts,
                is_unsafe,
                scope: None,
            }),
            location,
        ))
    }

    /// Parses a conditional; the `if` (or `elif`) keyword has been
    /// consumed.
    fn conditional(&mut self) -> PResult<Expr> {
        let location = self.prev().location.clone();
        let condition = self.expression()?;
        let then_branch = if self.match_tok(Tok::KwThen) {
            self.expression()?
        } else if matches!(self.tok(), Tok::Indent | Tok::Colon | Tok::LBrace) {
            self.parse_block(BlockKind::Plain, None, false)?
        } else {
            return Err(self.pause_or_error(
                ErrorCode::ConditionalWithoutThenOrBlock,
                "expected `then` or a block after the condition",
            ));
        };
        let else_branch = if self.check(Tok::KwElif) {
            self.advance();
            Some(Box::new(self.conditional()?))
        } else if self.match_tok(Tok::KwElse) {
            let branch = if matches!(self.tok(), Tok::Indent | Tok::Colon | Tok::LBrace) {
                self.parse_block(BlockKind::Plain, None, false)?
            } else {
                self.expression()?
            };
            Some(Box::new(branch))
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            location,
        ))
    }

    /// `while c do e` or `while c:`-block; the `while` has been consumed.
    fn loop_while(&mut self, label: Option<String>) -> PResult<Expr> {
        let location = self.prev().location.clone();
        let condition = self.expression()?;
        self.warn_on_true_condition(&condition);
        let body = if self.match_tok(Tok::KwDo) {
            if self.check(Tok::LBrace) {
                self.parse_block(BlockKind::Loop, None, false)?
            } else {
                let expr = self.expression()?;
                self.wrap_loop_body(expr)
            }
        } else if matches!(self.tok(), Tok::Indent | Tok::Colon | Tok::LBrace) {
            self.parse_block(BlockKind::Loop, None, false)?
        } else {
            return Err(self.pause_or_error(
                ErrorCode::WhileLoopWithoutDoOrBlock,
                "expected `do` or a block after the loop condition",
            ));
        };
        Ok(Expr::new(
            ExprKind::Loop {
                kind: LoopKind::While,
                condition: Some(Box::new(condition)),
                body: Box::new(body),
                label,
            },
            location,
        ))
    }

    /// `loop:`-block; the `loop` keyword has been consumed.
    fn loop_infinite(&mut self, label: Option<String>) -> PResult<Expr> {
        let location = self.prev().location.clone();
        if !matches!(self.tok(), Tok::Indent | Tok::Colon | Tok::LBrace) {
            return Err(self.pause_or_error(
                ErrorCode::NotABlock,
                "expected a block after `loop`",
            ));
        }
        let body = self.parse_block(BlockKind::Loop, None, false)?;
        Ok(Expr::new(
            ExprKind::Loop {
                kind: LoopKind::Infinite,
                condition: None,
                body: Box::new(body),
                label,
            },
            location,
        ))
    }

    /// `do e while c`; the `do` keyword has been consumed.
    fn loop_do_while(&mut self, label: Option<String>) -> PResult<Expr> {
        let location = self.prev().location.clone();
        let body = if matches!(self.tok(), Tok::Indent | Tok::Colon | Tok::LBrace) {
            self.parse_block(BlockKind::Loop, None, false)?
        } else {
            let expr = self.expression()?;
            self.wrap_loop_body(expr)
        };
        self.expect(
            Tok::KwWhile,
            ErrorCode::DoWhileLoopWithoutWhile,
            "expected `while` after the `do` loop body",
        )?;
        let condition = self.expression()?;
        self.warn_on_true_condition(&condition);
        Ok(Expr::new(
            ExprKind::Loop {
                kind: LoopKind::DoWhile,
                condition: Some(Box::new(condition)),
                body: Box::new(body),
                label,
            },
            location,
        ))
    }

    /// Loop bodies are uniformly block expressions; a bare `do e` body is
    /// wrapped into a single-statement loop block.
    fn wrap_loop_body(&mut self, expr: Expr) -> Expr {
        let location = expr.location.clone();
        Expr::new(
            ExprKind::Block(Block {
                kind: BlockKind::Loop,
                label: None,
                stmts: vec![Stmt::Expression { expr }],
                is_unsafe: false,
                scope: None,
            }),
            location,
        )
    }

    fn warn_on_true_condition(&mut self, condition: &Expr) {
        if let ExprKind::Literal { token, .. } = &condition.kind {
            if token.literal == Some(LiteralValue::Bool(true)) {
                let location = condition.location.clone();
                self.logger.log(
                    ErrorCode::LoopWithTrueCondition,
                    Some(location),
                    "loop condition is always true; consider `loop:` instead",
                );
            }
        }
    }

    /// An expression-position name: `::`-joined identifier parts without
    /// type arguments (those belong to annotations, where `<` cannot be a
    /// comparison).
    fn expression_name(&mut self) -> PResult<Name> {
        let mut parts = vec![NamePart {
            token: self.advance(),
            args: Vec::new(),
        }];
        while self.check(Tok::ColonColon) {
            self.advance();
            let token = self.expect(
                Tok::Identifier,
                ErrorCode::NotAnIdentifier,
                "expected an identifier after `::`",
            )?;
            parts.push(NamePart {
                token,
                args: Vec::new(),
            });
        }
        Ok(Name { parts })
    }

    /// Range-checks an integer literal expression against the width its
    /// token declares; the parser is where the folded sign is known.
    fn check_literal_range(&mut self, expr: &Expr) -> PResult<()> {
        let ExprKind::Literal { token, negative } = &expr.kind else {
            return Ok(());
        };
        let Some(LiteralValue::Int(magnitude)) = &token.literal else {
            return Ok(());
        };
        let max_positive: u64 = match token.tok {
            Tok::Int8 => i8::MAX as u64,
            Tok::Int16 => i16::MAX as u64,
            Tok::Int32 | Tok::IntDefault => i32::MAX as u64,
            Tok::Int64 => i64::MAX as u64,
            Tok::UInt8 => u8::MAX as u64,
            Tok::UInt16 => u16::MAX as u64,
            Tok::UInt32 => u32::MAX as u64,
            Tok::UInt64 => u64::MAX,
            _ => return Ok(()),
        };
        let limit = if *negative && token.tok.is_signed_integer() {
            max_positive + 1
        } else {
            max_positive
        };
        if *magnitude > limit {
            let location = expr.location.clone();
            let lexeme = token.lexeme().to_string();
            self.logger.log(
                ErrorCode::NumberOutOfRange,
                Some(location),
                format!("literal `{}` is out of range for its type", lexeme),
            );
            return Err(ParseFlow::Recover);
        }
        Ok(())
    }
}
