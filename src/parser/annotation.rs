//! Type annotation parsing.
//!
//! Annotations appear after `:` in declarations, after `->` in function
//! signatures, and after `as`, `sizeof`, `alloc`, and `transmute`. Unlike
//! expression-position names, annotation names may carry type argument
//! lists, since `<` cannot be a comparison here.

use crate::ast::{Annotation, Name, NamePart};
use crate::error::ErrorCode;
use crate::token::Tok;

use super::{PResult, Parser};

impl<'a> Parser<'a> {
    pub(crate) fn parse_annotation(&mut self) -> PResult<Annotation> {
        match self.tok() {
            Tok::KwVar => {
                self.advance();
                if self.match_tok(Tok::Star) {
                    let base = self.parse_annotation()?;
                    Ok(Annotation::Pointer {
                        base: Box::new(base),
                        mutable: true,
                    })
                } else if self.match_tok(Tok::Amp) {
                    let base = self.parse_annotation()?;
                    Ok(Annotation::Reference {
                        base: Box::new(base),
                        mutable: true,
                    })
                } else {
                    Err(self.error_at_current(
                        ErrorCode::UnexpectedVarInAnnotation,
                        "`var` in a type must be followed by `*` or `&`",
                    ))
                }
            }
            Tok::Star => {
                self.advance();
                let base = self.parse_annotation()?;
                Ok(Annotation::Pointer {
                    base: Box::new(base),
                    mutable: false,
                })
            }
            Tok::Amp => {
                self.advance();
                let base = self.parse_annotation()?;
                Ok(Annotation::Reference {
                    base: Box::new(base),
                    mutable: false,
                })
            }
            Tok::Nullptr => {
                self.advance();
                Ok(Annotation::Nullptr)
            }
            Tok::LSquare => {
                self.advance();
                self.enter_grouping();
                let base = self.parse_annotation()?;
                let size = if self.match_tok(Tok::Semicolon) {
                    let token = self.expect(
                        Tok::IntDefault,
                        ErrorCode::UnexpectedToken,
                        "expected an integer array size after `;`",
                    )?;
                    match &token.literal {
                        Some(crate::token::LiteralValue::Int(size)) => Some(*size as usize),
                        _ => None,
                    }
                } else {
                    None
                };
                self.expect(
                    Tok::RSquare,
                    ErrorCode::UnexpectedToken,
                    "expected `]` to close the array type",
                )?;
                self.exit_grouping();
                Ok(Annotation::Array {
                    base: Box::new(base),
                    size,
                })
            }
            Tok::LParen => {
                self.advance();
                self.enter_grouping();
                let mut elements = Vec::new();
                if !self.check(Tok::RParen) {
                    loop {
                        elements.push(self.parse_annotation()?);
                        if !self.match_tok(Tok::Comma) {
                            break;
                        }
                        if self.check(Tok::RParen) {
                            break;
                        }
                    }
                }
                self.expect(
                    Tok::RParen,
                    ErrorCode::UnexpectedToken,
                    "expected `)` to close the tuple type",
                )?;
                self.exit_grouping();
                Ok(Annotation::Tuple(elements))
            }
            Tok::LBrace => {
                self.advance();
                self.enter_grouping();
                let mut properties = Vec::new();
                if !self.check(Tok::RBrace) {
                    loop {
                        let name = self.expect(
                            Tok::Identifier,
                            ErrorCode::NotAnIdentifier,
                            "expected a property name",
                        )?;
                        self.expect(
                            Tok::Colon,
                            ErrorCode::UnexpectedToken,
                            "expected `:` after the property name",
                        )?;
                        let annotation = self.parse_annotation()?;
                        properties.push((name.lexeme().to_string(), annotation));
                        if !self.match_tok(Tok::Comma) {
                            break;
                        }
                        if self.check(Tok::RBrace) {
                            break;
                        }
                    }
                }
                self.expect(
                    Tok::RBrace,
                    ErrorCode::UnexpectedToken,
                    "expected `}` to close the object type",
                )?;
                self.exit_grouping();
                Ok(Annotation::Object(properties))
            }
            Tok::KwTypeof => {
                self.advance();
                self.expect(
                    Tok::LParen,
                    ErrorCode::TypeofWithoutOpeningParen,
                    "expected `(` after `typeof`",
                )?;
                self.enter_grouping();
                let expr = self.expression()?;
                self.expect(
                    Tok::RParen,
                    ErrorCode::UnexpectedToken,
                    "expected `)` after the `typeof` expression",
                )?;
                self.exit_grouping();
                Ok(Annotation::Typeof(Box::new(expr)))
            }
            Tok::Identifier => Ok(Annotation::Name(self.annotation_name()?)),
            _ => {
                let lexeme = self.peek().lexeme().to_string();
                Err(self.pause_or_error(
                    ErrorCode::NotAType,
                    format!("expected a type, found `{}`", lexeme),
                ))
            }
        }
    }

    /// An annotation-position name: `::`-joined parts, each with an
    /// optional `<...>` type argument list.
    fn annotation_name(&mut self) -> PResult<Name> {
        let mut parts = Vec::new();
        loop {
            let token = self.expect(
                Tok::Identifier,
                ErrorCode::NotAnIdentifier,
                "expected an identifier in the type name",
            )?;
            let mut args = Vec::new();
            if self.match_tok(Tok::Lt) {
                loop {
                    args.push(self.annotation_name()?);
                    if !self.match_tok(Tok::Comma) {
                        break;
                    }
                }
                self.expect(
                    Tok::Gt,
                    ErrorCode::UnexpectedToken,
                    "expected `>` to close the type arguments",
                )?;
            }
            parts.push(NamePart { token, args });
            if !self.match_tok(Tok::ColonColon) {
                break;
            }
        }
        Ok(Name { parts })
    }
}
