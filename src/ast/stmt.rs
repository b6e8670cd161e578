use std::rc::Rc;

use crate::scope::NodeId;
use crate::token::Token;

use super::{Annotation, Expr};

/// A function parameter: `name: T`, `var name: T`, or with a default value
/// `name: T = expr`.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Rc<Token>,
    pub mutable: bool,
    pub annotation: Annotation,
    pub default: Option<Expr>,
    /// The field entry the checker created for this parameter.
    pub entry: Option<NodeId>,
}

/// A field line inside a `struct` or `class` body.
#[derive(Debug, Clone)]
pub struct StructField {
    pub name: Rc<Token>,
    pub annotation: Annotation,
}

/// A statement node.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// An expression evaluated for its effects.
    Expression { expr: Expr },

    /// `let [var] name (: T)? (= expr)?`. At least one of the annotation and
    /// the initializer is present.
    Let {
        keyword: Rc<Token>,
        name: Rc<Token>,
        mutable: bool,
        annotation: Option<Annotation>,
        initializer: Option<Expr>,
        /// The field entry created for this binding.
        entry: Option<NodeId>,
    },

    /// `func name(params) (-> T)? (=> expr | block)`.
    Func {
        keyword: Rc<Token>,
        name: Rc<Token>,
        params: Vec<Param>,
        return_annotation: Option<Annotation>,
        body: Expr,
        /// The declaration node and signature index, once registered.
        decl: Option<(NodeId, usize)>,
    },

    /// `struct name:` / `class name:` with an indented field list.
    Struct {
        keyword: Rc<Token>,
        name: Rc<Token>,
        is_class: bool,
        fields: Vec<StructField>,
        def: Option<NodeId>,
    },

    /// `namespace name:` with an indented body of declarations.
    Namespace {
        keyword: Rc<Token>,
        name: Rc<Token>,
        body: Vec<Stmt>,
        node: Option<NodeId>,
    },

    /// `print expr (, expr)*`. Development only.
    Print { keyword: Rc<Token>, args: Vec<Expr> },

    Pass { keyword: Rc<Token> },

    /// `yield expr?`, optionally targeting a labelled enclosing block.
    Yield {
        keyword: Rc<Token>,
        label: Option<Rc<Token>>,
        value: Option<Expr>,
    },

    /// `break label? expr?`.
    Break {
        keyword: Rc<Token>,
        label: Option<Rc<Token>>,
        value: Option<Expr>,
    },

    /// `continue label?`.
    Continue {
        keyword: Rc<Token>,
        label: Option<Rc<Token>>,
    },

    /// `return expr?`.
    Return {
        keyword: Rc<Token>,
        value: Option<Expr>,
    },

    /// `dealloc expr`; releases memory obtained from `alloc`.
    Dealloc { keyword: Rc<Token>, operand: Expr },

    /// End of input.
    Eof,
}
