use std::fmt;
use std::rc::Rc;

use crate::token::Token;

use super::Expr;

/// A name with multiple parts, such as `geometry::point<i32>::x`.
///
/// Names should not be compared directly: different names may refer to the
/// same thing and similar names may refer to different things. Resolve them
/// against the symbol tree instead.
#[derive(Debug, Clone)]
pub struct Name {
    pub parts: Vec<NamePart>,
}

/// One part of a [`Name`]: its token plus any type arguments.
///
/// Type arguments are parsed but not instantiated by the frontend.
#[derive(Debug, Clone)]
pub struct NamePart {
    pub token: Rc<Token>,
    pub args: Vec<Name>,
}

impl Name {
    pub fn single(token: Rc<Token>) -> Self {
        Name {
            parts: vec![NamePart {
                token,
                args: Vec::new(),
            }],
        }
    }

    /// The token of the first part; used to anchor diagnostics.
    pub fn head_token(&self) -> &Rc<Token> {
        &self.parts[0].token
    }

    /// True when this name is a bare single identifier with no arguments.
    pub fn is_simple(&self) -> bool {
        self.parts.len() == 1 && self.parts[0].args.is_empty()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "::")?;
            }
            write!(f, "{}", part.token.lexeme())?;
            if !part.args.is_empty() {
                write!(f, "<")?;
                for (j, arg) in part.args.iter().enumerate() {
                    if j > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")?;
            }
        }
        Ok(())
    }
}

/// A type annotation as written in the source.
///
/// Annotations are syntax; the local checker resolves them into semantic
/// [`crate::types::Type`] values.
#[derive(Debug, Clone)]
pub enum Annotation {
    /// A named type: `i32`, `geometry::point`.
    Name(Name),
    /// A raw pointer: `*T` or `var *T`.
    Pointer { base: Box<Annotation>, mutable: bool },
    /// A reference: `&T` or `var &T`.
    Reference { base: Box<Annotation>, mutable: bool },
    /// The `nullptr` type annotation.
    Nullptr,
    /// An array: `[T]` or `[T; 4]`.
    Array {
        base: Box<Annotation>,
        size: Option<usize>,
    },
    /// An inline object type: `{x: i32, y: i32}`.
    Object(Vec<(String, Annotation)>),
    /// A tuple: `(i32, bool)`.
    Tuple(Vec<Annotation>),
    /// `typeof(expr)`: the type of an expression, resolvable only where the
    /// expression itself can be checked.
    Typeof(Box<Expr>),
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Name(name) => write!(f, "{}", name),
            Annotation::Pointer { base, mutable } => {
                write!(f, "{}*{}", if *mutable { "var " } else { "" }, base)
            }
            Annotation::Reference { base, mutable } => {
                write!(f, "{}&{}", if *mutable { "var " } else { "" }, base)
            }
            Annotation::Nullptr => write!(f, "nullptr"),
            Annotation::Array { base, size } => match size {
                Some(size) => write!(f, "[{}; {}]", base, size),
                None => write!(f, "[{}]", base),
            },
            Annotation::Object(properties) => {
                write!(f, "{{")?;
                for (i, (key, value)) in properties.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Annotation::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, ")")
            }
            Annotation::Typeof(_) => write!(f, "typeof(...)"),
        }
    }
}
