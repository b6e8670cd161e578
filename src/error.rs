//! Error codes and the diagnostics sink.
//!
//! Error codes are named after what the compiler *observes*, not what is
//! disallowed, and are grouped into families by their leading digit:
//!
//! | Family | Range |
//! |--------|-------|
//! | Configuration | 1000 |
//! | Lexer | 2000 |
//! | Parser | 3000 (warnings at 3500) |
//! | Global type check | 4000 |
//! | Local type check | 5000 (warnings at 5500) |
//! | Backend | 7000 (reserved; never issued here) |
//! | Post-processing | 8000 (warnings at 8500) |
//! | Malfunction | 9000 |
//!
//! The [`Logger`] is an explicit diagnostics sink threaded through every
//! stage; there is no global logging state. Warnings accumulate alongside
//! errors but never flip a context into the error state.

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::source::Location;
use crate::style::Style;

/// An error code that can be issued by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    // Configuration error
    ConfigError = 1000,

    // Lexer errors
    UnexpectedChar = 2001,
    UnclosedGrouping,
    UnclosedComment,
    ClosingUnopenedComment,
    MixedLeftSpacing,
    InconsistentLeftSpacing,
    MalformedIndent,
    TupleIndexOutOfRange,
    UnexpectedDotInNumber,
    UnexpectedExpInNumber,
    DigitInWrongBase,
    UnexpectedEndOfNumber,
    InvalidCharAfterNumber,
    UnterminatedStr,
    InvalidEscSeq,
    WordIsReserved,

    // Parser errors
    NotAnExpression = 3001,
    NotAnIdentifier,
    NumberOutOfRange,
    NegativeOnUnsignedInteger,
    NotAType,
    UnexpectedToken,
    LetWithoutTypeOrValue,
    TypeofWithoutOpeningParen,
    FuncWithoutOpeningParen,
    UnexpectedClosingParen,
    NotABlock,
    UnexpectedTokenAfterDot,
    ConditionalWithoutThenOrBlock,
    WhileLoopWithoutDoOrBlock,
    DoWhileLoopWithoutWhile,
    FuncWithoutArrowOrBlock,
    UnexpectedVarInExpression,
    UnexpectedVarInAnnotation,
    PosArgumentAfterNamedArgument,

    // Parser warnings
    LoopWithTrueCondition = 3501,

    // Global type check errors
    NamespaceInLocalScope = 4001,
    NamespaceInStructDef,
    StructInLocalScope,
    NameAlreadyExists,
    NameIsReserved,
    UnknownAnnotationName,
    UncheckableTypeofAnnotation,
    DuplicateFunctionParameterName,
    FunctionOverloadConflict,

    // Local type check errors
    NotAPossibleLValue = 5001,
    YieldTypeMismatch,
    LetTypeMismatch,
    AssignmentTypeMismatch,
    DefaultArgTypeMismatch,
    FunctionReturnTypeMismatch,
    UndeclaredName,
    NotAVariable,
    NotACallable,
    AssignToImmutable,
    AddressOfImmutable,
    OperatorNotValidForExpr,
    NoOperatorOverload,
    DereferenceNonPointer,
    DereferenceNullptr,
    TupleIndexOutOfBounds,
    InvalidTupleAccess,
    ConditionNotBool,
    WhileLoopYieldingNonUnit,
    ConditionalBranchTypeMismatch,
    YieldOutsideLocalScope,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    ReturnOutsideFunction,
    PtrDerefOutsideUnsafeBlock,
    NoMatchingFunctionOverload,
    MultipleMatchingFunctionOverloads,

    // Local type check warnings
    UnreachableStatement = 5501,
    YieldTargetingLoop,
    UnsafeBlockWithoutUnsafeStmt,

    // Backend errors (declared for the interface; this crate never issues
    // them)
    FileIO = 7001,

    // Post-processing warnings
    SymbolTreeInInconsistentState = 8501,

    // Compiler malfunction
    UnknownError = 9001,
}

impl ErrorCode {
    /// The numeric code, e.g. `5010` for [`ErrorCode::AssignToImmutable`].
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Warnings are reported but never set the error status.
    pub fn is_warning(self) -> bool {
        matches!(self.code(), 3500..=3999 | 5500..=5999 | 8500..=8999)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// A single reported diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub location: Option<Location>,
    pub message: String,
}

impl Diagnostic {
    /// Renders the diagnostic with the source line and a caret underline:
    ///
    /// ```text
    /// error[E5010]: cannot assign to `y`: not declared with `var`
    ///    2 | y = 2
    ///      | ^
    /// ```
    pub fn render(&self) -> String {
        let label = if self.code.is_warning() {
            Style::bold_yellow(&format!("warning[{}]", self.code))
        } else {
            Style::bold_red(&format!("error[{}]", self.code))
        };
        let mut out = format!("{}: {}", label, self.message);

        if let Some(location) = &self.location {
            let (_, line_num, col) = location.path_line_col();
            let src = &location.file.src;
            let line_start = src[..location.start].rfind('\n').map(|i| i + 1).unwrap_or(0);
            let line_end = src[line_start..]
                .find('\n')
                .map(|off| line_start + off)
                .unwrap_or(src.len());
            let line_text = &src[line_start..line_end];

            let caret_pad = " ".repeat(col.saturating_sub(1));
            let carets = "^".repeat(underline_width(location, line_end));
            let underline = if self.code.is_warning() {
                Style::yellow(&format!("{}{}", caret_pad, carets))
            } else {
                Style::red(&format!("{}{}", caret_pad, carets))
            };
            let gutter = Style::blue(&format!("{:4} |", line_num));
            let empty_gutter = Style::blue("     |");
            out.push_str(&format!(
                "\n  {} {}\n  {} {}\n  {} {}",
                Style::cyan("-->"),
                location,
                gutter,
                line_text,
                empty_gutter,
                underline
            ));
        }
        out
    }
}

/// Caret count for a span, clamped to the first line it touches.
fn underline_width(location: &Location, line_end: usize) -> usize {
    let span_end = (location.start + location.length).min(line_end);
    span_end.saturating_sub(location.start).max(1)
}

impl Serialize for Diagnostic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Diagnostic", 5)?;
        s.serialize_field("code", &self.code)?;
        s.serialize_field("number", &self.code.code())?;
        s.serialize_field("severity", if self.code.is_warning() { "warning" } else { "error" })?;
        match &self.location {
            Some(location) => {
                let (path, line, col) = location.path_line_col();
                s.serialize_field("location", &format!("{}:{}:{}", path, line, col))?;
            }
            None => s.serialize_field("location", &Option::<String>::None)?,
        }
        s.serialize_field("message", &self.message)?;
        s.end()
    }
}

/// The diagnostics sink threaded through every stage of the pipeline.
///
/// When printing is enabled, diagnostics are rendered to stderr as they are
/// logged. Tests and the `--json` output mode disable printing and read the
/// accumulated list instead.
#[derive(Debug, Default)]
pub struct Logger {
    diagnostics: Vec<Diagnostic>,
    printing_enabled: bool,
}

impl Logger {
    pub fn new() -> Self {
        Logger {
            diagnostics: Vec::new(),
            printing_enabled: true,
        }
    }

    /// Creates a logger that only accumulates, without printing.
    pub fn quiet() -> Self {
        Logger {
            diagnostics: Vec::new(),
            printing_enabled: false,
        }
    }

    pub fn set_printing_enabled(&mut self, enabled: bool) {
        self.printing_enabled = enabled;
    }

    /// Logs an error or warning, optionally attached to a location.
    pub fn log(&mut self, code: ErrorCode, location: Option<Location>, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            code,
            location,
            message: message.into(),
        };
        if self.printing_enabled {
            eprintln!("{}", diagnostic.render());
        }
        self.diagnostics.push(diagnostic);
    }

    /// A read-only view of everything logged so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The number of non-warning diagnostics.
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| !d.code.is_warning())
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Clears the accumulated diagnostics and re-enables printing.
    pub fn reset(&mut self) {
        self.diagnostics.clear();
        self.printing_enabled = true;
    }

    /// Drops diagnostics logged after `len`. The interactive driver uses
    /// this to unwind a paused submission that will be re-run in full.
    pub fn truncate(&mut self, len: usize) {
        self.diagnostics.truncate(len);
    }

    /// Serializes the accumulated diagnostics as a JSON array.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.diagnostics).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CodeFile;

    #[test]
    fn warning_ranges() {
        assert!(ErrorCode::LoopWithTrueCondition.is_warning());
        assert!(ErrorCode::UnreachableStatement.is_warning());
        assert!(ErrorCode::YieldTargetingLoop.is_warning());
        assert!(ErrorCode::SymbolTreeInInconsistentState.is_warning());
        assert!(!ErrorCode::AssignToImmutable.is_warning());
        assert!(!ErrorCode::UnexpectedChar.is_warning());
    }

    #[test]
    fn families_have_expected_leading_digits() {
        assert_eq!(ErrorCode::UnexpectedChar.code() / 1000, 2);
        assert_eq!(ErrorCode::NotAnExpression.code() / 1000, 3);
        assert_eq!(ErrorCode::NameAlreadyExists.code() / 1000, 4);
        assert_eq!(ErrorCode::UndeclaredName.code() / 1000, 5);
        assert_eq!(ErrorCode::UnknownError.code() / 1000, 9);
    }

    #[test]
    fn logger_counts_errors_but_not_warnings() {
        let mut logger = Logger::quiet();
        logger.log(ErrorCode::LoopWithTrueCondition, None, "loop condition is always true");
        assert_eq!(logger.error_count(), 0);
        assert!(!logger.has_errors());
        logger.log(ErrorCode::UndeclaredName, None, "name `x` is not declared");
        assert_eq!(logger.error_count(), 1);
        assert_eq!(logger.diagnostics().len(), 2);
    }

    #[test]
    fn render_underlines_the_span() {
        let file = CodeFile::new("y = 2", "t.nico");
        let location = crate::source::Location::new(file, 0, 1, 1);
        let diagnostic = Diagnostic {
            code: ErrorCode::AssignToImmutable,
            location: Some(location),
            message: "cannot assign to `y`".to_string(),
        };
        let rendered = diagnostic.render();
        assert!(rendered.contains("E5010"));
        assert!(rendered.contains("y = 2"));
        assert!(rendered.contains('^'));
    }

    #[test]
    fn diagnostics_serialize_to_json() {
        let mut logger = Logger::quiet();
        logger.log(ErrorCode::UndeclaredName, None, "name `a` is not declared");
        let json = logger.to_json();
        assert!(json.contains("\"UndeclaredName\""));
        assert!(json.contains("5007"));
        assert!(json.contains("\"severity\": \"error\""));
    }
}
