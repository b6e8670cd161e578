//! The lexer.
//!
//! Scans a [`CodeFile`] into the token list of a [`FrontendContext`] with
//! one character of lookahead (plus at most one extra peek). The two
//! structural concerns that make this more than a token matcher:
//!
//! - **Grouping**: while any `(`, `[`, or `{` is open, whitespace and
//!   newlines are insignificant and indentation handling is suspended.
//! - **Indentation**: outside groupings, the leading whitespace of each
//!   line is measured against a stack of open levels. An increase directly
//!   after a `:` replaces that colon with a synthetic [`Tok::Indent`]; a
//!   decrease emits one [`Tok::Dedent`] per level popped, and end of input
//!   closes every level still open.
//!
//! In interactive mode, input that merely ran out (an open grouping or an
//! unfinished string) sets the context status to [`Status::Pause`] instead
//! of reporting an error, so the driver can ask for more lines.

use std::rc::Rc;

use crate::context::{FrontendContext, Status};
use crate::error::{ErrorCode, Logger};
use crate::source::{CodeFile, Location};
use crate::token::{LiteralValue, Tok, Token};

pub struct Lexer<'a> {
    file: Rc<CodeFile>,
    repl_mode: bool,
    logger: &'a mut Logger,

    tokens: Vec<Rc<Token>>,
    /// Index of the first character of the token being scanned.
    start: usize,
    /// Index of the character currently being considered.
    current: usize,
    /// Line number of the current position.
    line: usize,
    /// Line number the current token started on.
    token_line: usize,
    /// Open grouping tokens.
    grouping_stack: Vec<char>,
    /// Widths of enclosing indentation levels; the active level is
    /// `current_left_spacing`.
    left_spacing_stack: Vec<u32>,
    current_left_spacing: u32,
    /// `' '` or `'\t'` once established, `'\0'` before.
    left_spacing_type: char,
    /// Width of the first indent; all levels must be multiples of it.
    spacing_unit: u32,
    /// Set when the REPL should ask for more input.
    pause: bool,
    had_error: bool,
}

impl<'a> Lexer<'a> {
    /// Scans `file`, appending tokens to the context and setting its
    /// status.
    ///
    /// Panics if the context is already in an error state.
    pub fn scan(
        context: &mut FrontendContext,
        file: &Rc<CodeFile>,
        logger: &mut Logger,
        repl_mode: bool,
    ) {
        if context.status == Status::Error {
            panic!("Lexer::scan: context is already in an error state");
        }
        let mut lexer = Lexer {
            file: Rc::clone(file),
            repl_mode,
            logger,
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            token_line: 1,
            grouping_stack: Vec::new(),
            left_spacing_stack: Vec::new(),
            current_left_spacing: 0,
            left_spacing_type: '\0',
            spacing_unit: 0,
            pause: false,
            had_error: false,
        };
        lexer.run_scan();

        if lexer.pause && repl_mode {
            context.status = Status::Pause;
            return;
        }
        context.status = if lexer.had_error || (lexer.pause && !repl_mode) {
            Status::Error
        } else {
            Status::Ok
        };
        context.tokens = lexer.tokens;
        context.tokens_parsed = 0;
    }

    fn run_scan(&mut self) {
        while !self.is_at_end() {
            self.start = self.current;
            self.token_line = self.line;
            self.scan_token();
            if self.pause {
                return;
            }
        }

        if !self.grouping_stack.is_empty() {
            if self.repl_mode {
                self.pause = true;
                return;
            }
            self.error_here(
                ErrorCode::UnclosedGrouping,
                "grouping token was never closed before the end of the file",
            );
        }

        // Close every indentation level still open.
        self.start = self.current;
        while self.current_left_spacing > 0 {
            self.add_synthetic(Tok::Dedent);
            self.current_left_spacing = self.left_spacing_stack.pop().unwrap_or(0);
        }
        self.add_synthetic(Tok::Eof);
    }

    // ------------------------------------------------------------------
    // Character helpers
    // ------------------------------------------------------------------

    fn is_at_end(&self) -> bool {
        self.current >= self.file.src.len()
    }

    /// The character at the current position plus `lookahead`, or `'\0'`
    /// past the end.
    fn peek(&self, lookahead: usize) -> char {
        self.file
            .src
            .as_bytes()
            .get(self.current + lookahead)
            .map(|&b| b as char)
            .unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.peek(0);
        if c != '\0' {
            self.current += 1;
        }
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek(0) == expected {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn is_whitespace(c: char) -> bool {
        matches!(c, ' ' | '\t' | '\r' | '\n')
    }

    /// Whether `c` is a digit in `base`; underscores count when allowed.
    fn is_digit(c: char, base: u32, allow_underscore: bool) -> bool {
        if c == '_' {
            return allow_underscore;
        }
        match base {
            2 => matches!(c, '0'..='1'),
            8 => matches!(c, '0'..='7'),
            10 => c.is_ascii_digit(),
            16 => c.is_ascii_hexdigit(),
            _ => panic!("Lexer::is_digit: invalid base {}", base),
        }
    }

    fn is_alpha(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_'
    }

    fn is_alpha_numeric(c: char) -> bool {
        Self::is_alpha(c) || c.is_ascii_digit()
    }

    // ------------------------------------------------------------------
    // Token construction
    // ------------------------------------------------------------------

    fn location_here(&self) -> Location {
        Location::new(
            Rc::clone(&self.file),
            self.start,
            (self.current - self.start).max(1).min(self.file.src.len().saturating_sub(self.start)),
            self.token_line,
        )
    }

    fn add_token(&mut self, tok: Tok, literal: Option<LiteralValue>) {
        let location = Location::new(
            Rc::clone(&self.file),
            self.start,
            self.current - self.start,
            self.token_line,
        );
        self.tokens.push(Rc::new(Token::new(tok, location, literal)));
    }

    /// Adds a zero-length token at the current position.
    fn add_synthetic(&mut self, tok: Tok) {
        let location = Location::new(Rc::clone(&self.file), self.current.min(self.file.src.len()), 0, self.line);
        self.tokens.push(Rc::new(Token::new(tok, location, None)));
    }

    fn error_here(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.had_error = true;
        let location = self.location_here();
        self.logger.log(code, Some(location), message);
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    fn scan_token(&mut self) {
        let c = self.advance();
        match c {
            ' ' | '\t' | '\r' | '\n' => self.consume_whitespace(c),
            '(' => {
                self.grouping_stack.push('(');
                self.add_token(Tok::LParen, None);
            }
            '[' => {
                self.grouping_stack.push('[');
                self.add_token(Tok::LSquare, None);
            }
            '{' => {
                self.grouping_stack.push('{');
                self.add_token(Tok::LBrace, None);
            }
            ')' => self.close_grouping('(', Tok::RParen),
            ']' => self.close_grouping('[', Tok::RSquare),
            '}' => self.close_grouping('{', Tok::RBrace),
            ',' => self.add_token(Tok::Comma, None),
            ';' => self.add_token(Tok::Semicolon, None),
            '+' => {
                let tok = if self.match_char('=') { Tok::PlusEq } else { Tok::Plus };
                self.add_token(tok, None);
            }
            '-' => {
                let tok = if self.match_char('=') {
                    Tok::MinusEq
                } else if self.match_char('>') {
                    Tok::Arrow
                } else {
                    Tok::Minus
                };
                self.add_token(tok, None);
            }
            '*' => {
                if self.match_char('/') {
                    self.error_here(
                        ErrorCode::ClosingUnopenedComment,
                        "`*/` found without a matching `/*`",
                    );
                } else {
                    let tok = if self.match_char('=') { Tok::StarEq } else { Tok::Star };
                    self.add_token(tok, None);
                }
            }
            '/' => {
                if self.match_char('/') {
                    // Line comment; the newline is handled by the next token.
                    while self.peek(0) != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.match_char('*') {
                    self.multi_line_comment();
                } else {
                    let tok = if self.match_char('=') { Tok::SlashEq } else { Tok::Slash };
                    self.add_token(tok, None);
                }
            }
            '%' => {
                let tok = if self.match_char('=') { Tok::PercentEq } else { Tok::Percent };
                self.add_token(tok, None);
            }
            '|' => {
                let tok = if self.match_char('=') { Tok::BarEq } else { Tok::Bar };
                self.add_token(tok, None);
            }
            '&' => self.add_token(Tok::Amp, None),
            '^' => self.add_token(Tok::Caret, None),
            '!' => {
                let tok = if self.match_char('=') { Tok::BangEq } else { Tok::Bang };
                self.add_token(tok, None);
            }
            '=' => {
                let tok = if self.match_char('=') {
                    Tok::EqEq
                } else if self.match_char('>') {
                    Tok::DoubleArrow
                } else {
                    Tok::Eq
                };
                self.add_token(tok, None);
            }
            '>' => {
                let tok = if self.match_char('=') { Tok::GtEq } else { Tok::Gt };
                self.add_token(tok, None);
            }
            '<' => {
                let tok = if self.match_char('=') { Tok::LtEq } else { Tok::Lt };
                self.add_token(tok, None);
            }
            ':' => {
                let tok = if self.match_char(':') { Tok::ColonColon } else { Tok::Colon };
                self.add_token(tok, None);
            }
            '@' => self.add_token(Tok::At, None),
            '.' => {
                self.add_token(Tok::Dot, None);
                if self.peek(0).is_ascii_digit() {
                    self.start = self.current;
                    self.tuple_index();
                }
            }
            '"' => self.str_literal(),
            '0'..='9' => self.numeric_literal(),
            c if Self::is_alpha(c) => self.identifier(),
            _ => {
                self.error_here(
                    ErrorCode::UnexpectedChar,
                    format!("unexpected character `{}`", c),
                );
            }
        }
    }

    fn close_grouping(&mut self, opener: char, tok: Tok) {
        if self.grouping_stack.last() == Some(&opener) {
            self.grouping_stack.pop();
            self.add_token(tok, None);
        } else {
            self.error_here(
                ErrorCode::UnclosedGrouping,
                format!("closing `{}` without a matching `{}`", self.file.src[self.start..self.current].to_string(), opener),
            );
        }
    }

    // ------------------------------------------------------------------
    // Whitespace and indentation
    // ------------------------------------------------------------------

    /// Consumes a run of whitespace. Inside groupings all whitespace is
    /// insignificant; outside, crossing a newline hands off to the
    /// line-start handler.
    fn consume_whitespace(&mut self, first: char) {
        let mut crossed_newline = first == '\n';
        if crossed_newline {
            self.line += 1;
        }

        if !self.grouping_stack.is_empty() {
            while Self::is_whitespace(self.peek(0)) {
                if self.peek(0) == '\n' {
                    self.line += 1;
                }
                self.advance();
            }
            return;
        }

        if !crossed_newline {
            while matches!(self.peek(0), ' ' | '\t' | '\r') {
                self.advance();
            }
            if self.peek(0) != '\n' {
                return;
            }
            self.advance();
            self.line += 1;
            crossed_newline = true;
        }

        if crossed_newline {
            self.handle_line_start();
        }
    }

    /// Measures the indentation of the line now beginning, skipping blank
    /// and comment-only lines, and applies the indentation rules.
    fn handle_line_start(&mut self) {
        loop {
            let ws_start = self.current;
            let mut spacing: u32 = 0;
            let mut seen_space = false;
            let mut seen_tab = false;
            loop {
                match self.peek(0) {
                    ' ' => {
                        seen_space = true;
                        spacing += 1;
                        self.advance();
                    }
                    '\t' => {
                        seen_tab = true;
                        spacing += 1;
                        self.advance();
                    }
                    '\r' => {
                        self.advance();
                    }
                    _ => break,
                }
            }

            match self.peek(0) {
                // Blank line: no indentation significance.
                '\n' => {
                    self.advance();
                    self.line += 1;
                    continue;
                }
                '\0' => return,
                // Comment-only line.
                '/' if self.peek(1) == '/' => {
                    while self.peek(0) != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                    continue;
                }
                _ => {}
            }

            if seen_space && seen_tab {
                self.start = ws_start;
                self.error_here(
                    ErrorCode::MixedLeftSpacing,
                    "line is indented with both tabs and spaces",
                );
                return;
            }
            if spacing > 0 {
                let ty = if seen_tab { '\t' } else { ' ' };
                if self.left_spacing_type == '\0' {
                    self.left_spacing_type = ty;
                } else if ty != self.left_spacing_type {
                    self.start = ws_start;
                    self.error_here(
                        ErrorCode::InconsistentLeftSpacing,
                        "line is indented with a different character than earlier lines",
                    );
                    return;
                }
            }

            self.start = ws_start;
            self.apply_indentation(spacing);
            return;
        }
    }

    fn apply_indentation(&mut self, spacing: u32) {
        if spacing > self.current_left_spacing {
            // An increase opens a block only when it follows a colon;
            // otherwise the line is a continuation.
            if self.tokens.last().map(|t| t.tok) == Some(Tok::Colon) {
                if self.spacing_unit == 0 {
                    self.spacing_unit = spacing;
                } else if spacing % self.spacing_unit != 0 {
                    self.error_here(
                        ErrorCode::MalformedIndent,
                        format!(
                            "indent of {} is not a multiple of the established unit of {}",
                            spacing, self.spacing_unit
                        ),
                    );
                }
                let colon = self.tokens.pop().unwrap();
                self.tokens.push(Rc::new(Token::new(
                    Tok::Indent,
                    colon.location.clone(),
                    None,
                )));
                self.left_spacing_stack.push(self.current_left_spacing);
                self.current_left_spacing = spacing;
            }
        } else if spacing < self.current_left_spacing {
            if self.spacing_unit != 0 && spacing % self.spacing_unit != 0 {
                self.error_here(
                    ErrorCode::MalformedIndent,
                    format!(
                        "indent of {} is not a multiple of the established unit of {}",
                        spacing, self.spacing_unit
                    ),
                );
            }
            while spacing < self.current_left_spacing {
                self.add_synthetic(Tok::Dedent);
                self.current_left_spacing = self.left_spacing_stack.pop().unwrap_or(0);
            }
            if spacing != self.current_left_spacing {
                self.error_here(
                    ErrorCode::MalformedIndent,
                    "dedent does not return to an enclosing indentation level",
                );
                self.current_left_spacing = spacing;
            }
        }
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    /// Consumes a `/* ... */` comment with nesting. The lexer is just past
    /// the opening `/*`.
    fn multi_line_comment(&mut self) {
        let mut depth = 1u32;
        while depth > 0 {
            if self.is_at_end() {
                self.error_here(
                    ErrorCode::UnclosedComment,
                    "multi-line comment was never closed",
                );
                return;
            }
            let c = self.advance();
            match c {
                '\n' => self.line += 1,
                '/' if self.peek(0) == '*' => {
                    self.advance();
                    depth += 1;
                }
                '*' if self.peek(0) == '/' => {
                    self.advance();
                    depth -= 1;
                }
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Literals and identifiers
    // ------------------------------------------------------------------

    /// Scans an identifier and classifies it: `true`/`false` lex as `Bool`,
    /// `inf`/`NaN` as floats, `nullptr` as the null pointer literal, and
    /// keyword lexemes as their keyword.
    fn identifier(&mut self) {
        while Self::is_alpha_numeric(self.peek(0)) {
            self.advance();
        }
        let lexeme = &self.file.src[self.start..self.current];
        match lexeme {
            "true" => self.add_token(Tok::Bool, Some(LiteralValue::Bool(true))),
            "false" => self.add_token(Tok::Bool, Some(LiteralValue::Bool(false))),
            "inf" => self.add_token(Tok::FloatDefault, Some(LiteralValue::Float(f64::INFINITY))),
            "NaN" => self.add_token(Tok::FloatDefault, Some(LiteralValue::Float(f64::NAN))),
            "nullptr" => self.add_token(Tok::Nullptr, Some(LiteralValue::Nullptr)),
            _ => match Tok::keyword(lexeme) {
                Some(tok) => self.add_token(tok, None),
                None => self.add_token(Tok::Identifier, None),
            },
        }
    }

    /// Scans the integer part of a tuple index such as the `0` in `x.0`.
    fn tuple_index(&mut self) {
        while self.peek(0).is_ascii_digit() {
            self.advance();
        }
        let digits = &self.file.src[self.start..self.current];
        match digits.parse::<u32>() {
            Ok(index) => self.add_token(Tok::TupleIndex, Some(LiteralValue::TupleIndex(index))),
            Err(_) => self.error_here(
                ErrorCode::TupleIndexOutOfRange,
                format!("tuple index `{}` is out of range", digits),
            ),
        }
    }

    /// Scans a numeric literal: optional `0x`/`0o`/`0b` prefix, `_`
    /// separators after a first digit, a fraction and exponent in base 10,
    /// and an optional width suffix. A trailing `f` (not base 16) marks a
    /// float.
    fn numeric_literal(&mut self) {
        let mut base: u32 = 10;
        let mut digits_start = self.start;
        if self.file.src.as_bytes()[self.start] == b'0' {
            match self.peek(0) {
                'x' => base = 16,
                'o' => base = 8,
                'b' => base = 2,
                _ => {}
            }
            if base != 10 {
                self.advance();
                digits_start = self.current;
                if !Self::is_digit(self.peek(0), base, false) {
                    self.error_here(
                        ErrorCode::UnexpectedEndOfNumber,
                        "expected digits after the base prefix",
                    );
                    return;
                }
            }
        }

        while Self::is_digit(self.peek(0), base, true) {
            self.advance();
        }

        let mut is_float = false;
        if base == 10 {
            if self.peek(0) == '.' && Self::is_digit(self.peek(1), 10, false) {
                is_float = true;
                self.advance();
                while Self::is_digit(self.peek(0), 10, true) {
                    self.advance();
                }
            }
            if matches!(self.peek(0), 'e' | 'E')
                && (Self::is_digit(self.peek(1), 10, false)
                    || (matches!(self.peek(1), '+' | '-')
                        && self.current + 2 <= self.file.src.len()
                        && Self::is_digit(self.peek(2), 10, false)))
            {
                is_float = true;
                self.advance();
                if matches!(self.peek(0), '+' | '-') {
                    self.advance();
                }
                while Self::is_digit(self.peek(0), 10, true) {
                    self.advance();
                }
            }
        } else {
            if self.peek(0) == '.' && Self::is_digit(self.peek(1), 10, false) {
                self.error_here(
                    ErrorCode::UnexpectedDotInNumber,
                    "numbers with a base prefix cannot have a fractional part",
                );
                return;
            }
            if base != 16 && matches!(self.peek(0), 'e' | 'E') {
                self.error_here(
                    ErrorCode::UnexpectedExpInNumber,
                    "numbers with a base prefix cannot have an exponent",
                );
                return;
            }
            if base < 10 && self.peek(0).is_ascii_digit() {
                self.error_here(
                    ErrorCode::DigitInWrongBase,
                    format!("digit `{}` is not valid in base {}", self.peek(0), base),
                );
                return;
            }
        }
        let digits_end = self.current;

        // Optional suffix.
        let mut tok = if is_float { Tok::FloatDefault } else { Tok::IntDefault };
        if Self::is_alpha(self.peek(0)) {
            let suffix_start = self.current;
            while Self::is_alpha_numeric(self.peek(0)) {
                self.advance();
            }
            let suffix = &self.file.src[suffix_start..self.current];
            tok = match suffix {
                "i8" => Tok::Int8,
                "i16" => Tok::Int16,
                "i32" => Tok::Int32,
                "i64" => Tok::Int64,
                "u8" => Tok::UInt8,
                "u16" => Tok::UInt16,
                "u32" => Tok::UInt32,
                "u64" => Tok::UInt64,
                "f32" => Tok::Float32,
                "f64" => Tok::Float64,
                "f" if base != 16 => Tok::FloatDefault,
                _ => {
                    self.error_here(
                        ErrorCode::InvalidCharAfterNumber,
                        format!("`{}` is not a valid numeric suffix", suffix),
                    );
                    return;
                }
            };
            let suffix_is_float = matches!(tok, Tok::FloatDefault | Tok::Float32 | Tok::Float64);
            if is_float && !suffix_is_float {
                self.error_here(
                    ErrorCode::InvalidCharAfterNumber,
                    format!("integer suffix `{}` on a floating-point literal", suffix),
                );
                return;
            }
            if suffix_is_float && base != 10 {
                self.error_here(
                    ErrorCode::InvalidCharAfterNumber,
                    "float suffix on a number with a base prefix",
                );
                return;
            }
            is_float = suffix_is_float;
        }

        if Self::is_alpha_numeric(self.peek(0)) {
            self.error_here(
                ErrorCode::InvalidCharAfterNumber,
                format!("unexpected `{}` after number", self.peek(0)),
            );
            return;
        }

        let digits: String = self.file.src[digits_start..digits_end]
            .chars()
            .filter(|&c| c != '_')
            .collect();
        if is_float {
            match digits.parse::<f64>() {
                Ok(value) => self.add_token(tok, Some(LiteralValue::Float(value))),
                Err(_) => self.error_here(
                    ErrorCode::NumberOutOfRange,
                    "floating-point literal cannot be represented",
                ),
            }
        } else {
            match u64::from_str_radix(&digits, base) {
                Ok(value) => self.add_token(tok, Some(LiteralValue::Int(value))),
                Err(_) => self.error_here(
                    ErrorCode::NumberOutOfRange,
                    "integer literal is too large to be represented",
                ),
            }
        }
    }

    /// Scans a string literal; the opening `"` has been consumed. Strings
    /// may span lines. Escapes: `\n \t \r \\ \" \0 \xHH`.
    fn str_literal(&mut self) {
        let mut value: Vec<u8> = Vec::new();
        loop {
            if self.is_at_end() {
                if self.repl_mode {
                    self.pause = true;
                } else {
                    self.error_here(ErrorCode::UnterminatedStr, "string literal was never closed");
                }
                return;
            }
            let c = self.advance();
            match c {
                '"' => break,
                '\\' => {
                    let escape = self.advance();
                    match escape {
                        'n' => value.push(b'\n'),
                        't' => value.push(b'\t'),
                        'r' => value.push(b'\r'),
                        '\\' => value.push(b'\\'),
                        '"' => value.push(b'"'),
                        '0' => value.push(0),
                        'x' => {
                            let hi = self.advance();
                            let lo = self.advance();
                            match (hi.to_digit(16), lo.to_digit(16)) {
                                (Some(hi), Some(lo)) => value.push((hi * 16 + lo) as u8),
                                _ => self.error_here(
                                    ErrorCode::InvalidEscSeq,
                                    "`\\x` escape requires two hexadecimal digits",
                                ),
                            }
                        }
                        '\0' => {
                            if self.repl_mode {
                                self.pause = true;
                            } else {
                                self.error_here(
                                    ErrorCode::UnterminatedStr,
                                    "string literal was never closed",
                                );
                            }
                            return;
                        }
                        other => self.error_here(
                            ErrorCode::InvalidEscSeq,
                            format!("unrecognized escape sequence `\\{}`", other),
                        ),
                    }
                }
                '\n' => {
                    self.line += 1;
                    value.push(b'\n');
                }
                _ => {
                    let len = c.len_utf8();
                    if len == 1 {
                        value.push(c as u8);
                    } else {
                        // Multi-byte source characters: copy them verbatim.
                        let end = (self.current - 1) + utf8_len(self.file.src.as_bytes()[self.current - 1]);
                        value.extend_from_slice(&self.file.src.as_bytes()[self.current - 1..end]);
                        self.current = end;
                    }
                }
            }
        }
        let text = String::from_utf8_lossy(&value).into_owned();
        self.add_token(Tok::Str, Some(LiteralValue::Str(text)));
    }
}

/// Length in bytes of the UTF-8 sequence beginning with `byte`.
fn utf8_len(byte: u8) -> usize {
    match byte {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(src: &str) -> (Vec<Rc<Token>>, Logger, Status) {
        let mut context = FrontendContext::new();
        let mut logger = Logger::quiet();
        let file = CodeFile::new(src, "test.nico");
        Lexer::scan(&mut context, &file, &mut logger, false);
        (context.tokens, logger, context.status)
    }

    fn scan_repl(src: &str) -> Status {
        let mut context = FrontendContext::new();
        let mut logger = Logger::quiet();
        let file = CodeFile::new(src, "<repl>");
        Lexer::scan(&mut context, &file, &mut logger, true);
        context.status
    }

    fn kinds(tokens: &[Rc<Token>]) -> Vec<Tok> {
        tokens.iter().map(|t| t.tok).collect()
    }

    fn first_code(logger: &Logger) -> Option<ErrorCode> {
        logger.diagnostics().first().map(|d| d.code)
    }

    #[test]
    fn scans_a_let_statement() {
        let (tokens, logger, status) = scan("let x = 1");
        assert_eq!(status, Status::Ok);
        assert!(!logger.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![Tok::KwLet, Tok::Identifier, Tok::Eq, Tok::IntDefault, Tok::Eof]
        );
    }

    #[test]
    fn every_lexeme_matches_its_source_span() {
        let src = "let var total = (12 + alpha) * 3.5 / items[0]\n";
        let (tokens, _, _) = scan(src);
        for token in &tokens {
            let start = token.location.start;
            let end = start + token.location.length;
            assert_eq!(&src[start..end], token.lexeme());
        }
    }

    #[test]
    fn indents_pair_with_dedents() {
        let src = "if a:\n    b\n    if c:\n        d\ne\n";
        let (tokens, logger, _) = scan(src);
        assert!(!logger.has_errors());
        let indents = tokens.iter().filter(|t| t.tok == Tok::Indent).count();
        let dedents = tokens.iter().filter(|t| t.tok == Tok::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(indents, dedents);
    }

    #[test]
    fn eof_closes_open_indentation_levels() {
        let (tokens, _, _) = scan("if a:\n    if b:\n        c");
        let dedents = tokens.iter().filter(|t| t.tok == Tok::Dedent).count();
        assert_eq!(dedents, 2);
    }

    #[test]
    fn colon_is_replaced_by_indent() {
        let (tokens, _, _) = scan("if a:\n    b\n");
        assert!(!kinds(&tokens).contains(&Tok::Colon));
        assert!(kinds(&tokens).contains(&Tok::Indent));
    }

    #[test]
    fn inline_colon_is_kept() {
        let (tokens, _, _) = scan("if a: b\n");
        assert!(kinds(&tokens).contains(&Tok::Colon));
        assert!(!kinds(&tokens).contains(&Tok::Indent));
    }

    #[test]
    fn mixed_tabs_and_spaces_error() {
        let (_, logger, status) = scan("if a:\n \tb\n");
        assert_eq!(first_code(&logger), Some(ErrorCode::MixedLeftSpacing));
        assert_eq!(status, Status::Error);
    }

    #[test]
    fn inconsistent_spacing_character_error() {
        let (_, logger, _) = scan("if a:\n    b\nif c:\n\td\n");
        assert!(logger
            .diagnostics()
            .iter()
            .any(|d| d.code == ErrorCode::InconsistentLeftSpacing));
    }

    #[test]
    fn indent_must_be_a_multiple_of_the_unit() {
        let (_, logger, _) = scan("if a:\n    b\n   c\n");
        assert!(logger
            .diagnostics()
            .iter()
            .any(|d| d.code == ErrorCode::MalformedIndent));
    }

    #[test]
    fn whitespace_is_insignificant_inside_groupings() {
        let (tokens, logger, _) = scan("let a = (1 +\n    2)\n");
        assert!(!logger.has_errors());
        assert!(!kinds(&tokens).contains(&Tok::Indent));
        assert!(!kinds(&tokens).contains(&Tok::Dedent));
    }

    #[test]
    fn blank_and_comment_lines_do_not_affect_indentation() {
        let src = "if a:\n    b\n\n    // note\n    c\n";
        let (tokens, logger, _) = scan(src);
        assert!(!logger.has_errors());
        let dedents = tokens.iter().filter(|t| t.tok == Tok::Dedent).count();
        assert_eq!(dedents, 1);
    }

    #[test]
    fn numeric_literal_bases_and_values() {
        let (tokens, logger, _) = scan("255 0xff 0o17 0b1010 1_000_000");
        assert!(!logger.has_errors());
        let values: Vec<u64> = tokens
            .iter()
            .filter_map(|t| match &t.literal {
                Some(LiteralValue::Int(v)) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![255, 255, 15, 10, 1_000_000]);
    }

    #[test]
    fn numeric_suffixes_set_the_token_kind() {
        let (tokens, logger, _) = scan("1i8 2u16 3i64 4f32 5f64 6f");
        assert!(!logger.has_errors());
        assert_eq!(
            kinds(&tokens)[..6],
            [
                Tok::Int8,
                Tok::UInt16,
                Tok::Int64,
                Tok::Float32,
                Tok::Float64,
                Tok::FloatDefault
            ]
        );
    }

    #[test]
    fn float_forms() {
        let (tokens, logger, _) = scan("3.25 1e6 2.5e-3");
        assert!(!logger.has_errors());
        let values: Vec<f64> = tokens
            .iter()
            .filter_map(|t| match &t.literal {
                Some(LiteralValue::Float(v)) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![3.25, 1e6, 2.5e-3]);
    }

    #[test]
    fn inf_and_nan_lex_as_floats() {
        let (tokens, _, _) = scan("inf NaN");
        assert_eq!(tokens[0].tok, Tok::FloatDefault);
        assert_eq!(tokens[1].tok, Tok::FloatDefault);
        assert!(matches!(
            tokens[1].literal,
            Some(LiteralValue::Float(v)) if v.is_nan()
        ));
    }

    #[test]
    fn digit_outside_base_is_an_error() {
        let (_, logger, _) = scan("0b12");
        assert_eq!(first_code(&logger), Some(ErrorCode::DigitInWrongBase));
    }

    #[test]
    fn base_prefix_needs_digits() {
        let (_, logger, _) = scan("0x");
        assert_eq!(first_code(&logger), Some(ErrorCode::UnexpectedEndOfNumber));
    }

    #[test]
    fn dot_after_prefixed_number_is_an_error() {
        let (_, logger, _) = scan("0x1.5");
        assert_eq!(first_code(&logger), Some(ErrorCode::UnexpectedDotInNumber));
    }

    #[test]
    fn unknown_suffix_is_an_error() {
        let (_, logger, _) = scan("12abc");
        assert_eq!(first_code(&logger), Some(ErrorCode::InvalidCharAfterNumber));
    }

    #[test]
    fn huge_literal_is_out_of_range() {
        let (_, logger, _) = scan("99999999999999999999999999");
        assert_eq!(first_code(&logger), Some(ErrorCode::NumberOutOfRange));
    }

    #[test]
    fn tuple_index_after_dot() {
        let (tokens, logger, _) = scan("x.0.12");
        assert!(!logger.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![
                Tok::Identifier,
                Tok::Dot,
                Tok::TupleIndex,
                Tok::Dot,
                Tok::TupleIndex,
                Tok::Eof
            ]
        );
        assert_eq!(tokens[4].literal, Some(LiteralValue::TupleIndex(12)));
    }

    #[test]
    fn string_escapes() {
        let (tokens, logger, _) = scan(r#""a\tb\n\x41\"q\"""#);
        assert!(!logger.has_errors());
        assert_eq!(
            tokens[0].literal,
            Some(LiteralValue::Str("a\tb\nA\"q\"".to_string()))
        );
    }

    #[test]
    fn strings_may_span_lines() {
        let (tokens, logger, _) = scan("\"two\nlines\"");
        assert!(!logger.has_errors());
        assert_eq!(
            tokens[0].literal,
            Some(LiteralValue::Str("two\nlines".to_string()))
        );
    }

    #[test]
    fn invalid_escape_is_an_error() {
        let (_, logger, _) = scan(r#""bad \q escape""#);
        assert_eq!(first_code(&logger), Some(ErrorCode::InvalidEscSeq));
    }

    #[test]
    fn unterminated_string_is_an_error_outside_repl() {
        let (_, logger, status) = scan("\"open");
        assert_eq!(first_code(&logger), Some(ErrorCode::UnterminatedStr));
        assert_eq!(status, Status::Error);
    }

    #[test]
    fn unterminated_string_pauses_in_repl() {
        assert_eq!(scan_repl("\"open"), Status::Pause);
    }

    #[test]
    fn open_grouping_pauses_in_repl() {
        assert_eq!(scan_repl("let a = (1 +"), Status::Pause);
    }

    #[test]
    fn open_grouping_is_an_error_outside_repl() {
        let (_, logger, status) = scan("let a = (1 +");
        assert_eq!(status, Status::Error);
        assert!(logger
            .diagnostics()
            .iter()
            .any(|d| d.code == ErrorCode::UnclosedGrouping));
    }

    #[test]
    fn nested_comments() {
        let (tokens, logger, _) = scan("1 /* outer /* inner */ still */ 2");
        assert!(!logger.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![Tok::IntDefault, Tok::IntDefault, Tok::Eof]
        );
    }

    #[test]
    fn unclosed_comment_is_an_error() {
        let (_, logger, _) = scan("1 /* open");
        assert_eq!(first_code(&logger), Some(ErrorCode::UnclosedComment));
    }

    #[test]
    fn closing_unopened_comment_is_an_error() {
        let (_, logger, _) = scan("1 */ 2");
        assert_eq!(first_code(&logger), Some(ErrorCode::ClosingUnopenedComment));
    }

    #[test]
    fn unexpected_character_is_an_error() {
        let (_, logger, _) = scan("let $ = 1");
        assert_eq!(first_code(&logger), Some(ErrorCode::UnexpectedChar));
    }

    #[test]
    fn compound_operators_lex_as_single_tokens() {
        let (tokens, _, _) = scan("a += 1; b -> c => d :: e");
        let kinds = kinds(&tokens);
        assert!(kinds.contains(&Tok::PlusEq));
        assert!(kinds.contains(&Tok::Arrow));
        assert!(kinds.contains(&Tok::DoubleArrow));
        assert!(kinds.contains(&Tok::ColonColon));
    }

    #[test]
    fn keywords_and_literals_classify() {
        let (tokens, _, _) = scan("unsafe true nullptr yield");
        assert_eq!(
            kinds(&tokens)[..4],
            [Tok::KwUnsafe, Tok::Bool, Tok::Nullptr, Tok::KwYield]
        );
    }
}
