//! AST printing and structural comparison.
//!
//! [`AstPrinter`] renders statements and expressions back into parseable
//! source with explicit parentheses, which makes precedence visible in
//! `--emit ast` output and lets tests check the print/re-parse round trip.
//! [`expr_eq`] and [`stmt_eq`] compare trees structurally: operators,
//! operands, and literal values, ignoring locations, types, and resolved
//! symbol links.

use crate::ast::{Annotation, Block, Expr, ExprKind, LoopKind, Stmt};

pub struct AstPrinter;

impl AstPrinter {
    pub fn print_stmt(stmt: &Stmt) -> String {
        match stmt {
            Stmt::Expression { expr } => Self::print_expr(expr),
            Stmt::Let {
                name,
                mutable,
                annotation,
                initializer,
                ..
            } => {
                let mut out = String::from("let ");
                if *mutable {
                    out.push_str("var ");
                }
                out.push_str(name.lexeme());
                if let Some(annotation) = annotation {
                    out.push_str(&format!(": {}", annotation));
                }
                if let Some(initializer) = initializer {
                    out.push_str(&format!(" = {}", Self::print_expr(initializer)));
                }
                out
            }
            Stmt::Func {
                name,
                params,
                return_annotation,
                body,
                ..
            } => {
                let mut out = format!("func {}(", name.lexeme());
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if param.mutable {
                        out.push_str("var ");
                    }
                    out.push_str(&format!("{}: {}", param.name.lexeme(), param.annotation));
                    if let Some(default) = &param.default {
                        out.push_str(&format!(" = {}", Self::print_expr(default)));
                    }
                }
                out.push(')');
                if let Some(annotation) = return_annotation {
                    out.push_str(&format!(" -> {}", annotation));
                }
                match &body.kind {
                    ExprKind::Block(block) => {
                        out.push(' ');
                        out.push_str(&Self::print_braced(block));
                    }
                    _ => out.push_str(&format!(" => {}", Self::print_expr(body))),
                }
                out
            }
            Stmt::Struct {
                name,
                is_class,
                fields,
                ..
            } => {
                let keyword = if *is_class { "class" } else { "struct" };
                let mut out = format!("{} {}:\n", keyword, name.lexeme());
                if fields.is_empty() {
                    out.push_str("    pass\n");
                }
                for field in fields {
                    out.push_str(&format!("    {}: {}\n", field.name.lexeme(), field.annotation));
                }
                out
            }
            Stmt::Namespace { name, body, .. } => {
                let mut out = format!("namespace {}:\n", name.lexeme());
                if body.is_empty() {
                    out.push_str("    pass\n");
                }
                for inner in body {
                    for line in Self::print_stmt(inner).lines() {
                        out.push_str(&format!("    {}\n", line));
                    }
                }
                out
            }
            Stmt::Print { args, .. } => {
                let rendered: Vec<String> = args.iter().map(Self::print_expr).collect();
                format!("print {}", rendered.join(", "))
            }
            Stmt::Pass { .. } => "pass".to_string(),
            Stmt::Yield { label, value, .. } => {
                Self::print_jump("yield", label.as_deref().map(|t| t.lexeme()), value.as_ref())
            }
            Stmt::Break { label, value, .. } => {
                Self::print_jump("break", label.as_deref().map(|t| t.lexeme()), value.as_ref())
            }
            Stmt::Continue { label, .. } => match label {
                Some(label) => format!("continue {}", label.lexeme()),
                None => "continue".to_string(),
            },
            Stmt::Return { value, .. } => match value {
                Some(value) => format!("return {}", Self::print_expr(value)),
                None => "return".to_string(),
            },
            Stmt::Dealloc { operand, .. } => {
                format!("dealloc {}", Self::print_expr(operand))
            }
            Stmt::Eof => String::new(),
        }
    }

    fn print_jump(keyword: &str, label: Option<&str>, value: Option<&Expr>) -> String {
        let mut out = keyword.to_string();
        if let Some(label) = label {
            out.push_str(&format!(" {}", label));
        }
        if let Some(value) = value {
            out.push_str(&format!(" {}", Self::print_expr(value)));
        }
        out
    }

    pub fn print_expr(expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Literal { token, negative } => {
                format!("{}{}", if *negative { "-" } else { "" }, token.lexeme())
            }
            ExprKind::NameRef { name, .. } => name.to_string(),
            ExprKind::Assign { op, target, value } => format!(
                "({} {} {})",
                Self::print_expr(target),
                op.lexeme(),
                Self::print_expr(value)
            ),
            ExprKind::Logical { op, left, right } | ExprKind::Binary { op, left, right } => {
                format!(
                    "({} {} {})",
                    Self::print_expr(left),
                    op.lexeme(),
                    Self::print_expr(right)
                )
            }
            ExprKind::Unary { op, operand } => {
                let spacer = if op.lexeme().chars().all(|c| c.is_alphabetic()) {
                    " "
                } else {
                    ""
                };
                format!("({}{}{})", op.lexeme(), spacer, Self::print_expr(operand))
            }
            ExprKind::Address {
                mutable, operand, ..
            } => format!(
                "(&{}{})",
                if *mutable { "var " } else { "" },
                Self::print_expr(operand)
            ),
            ExprKind::Deref { operand, .. } => format!("(*{})", Self::print_expr(operand)),
            ExprKind::Cast {
                operand,
                annotation,
                reinterpret,
            } => format!(
                "({} {} {})",
                Self::print_expr(operand),
                if *reinterpret { "transmute" } else { "as" },
                annotation
            ),
            ExprKind::Access { object, member } => {
                format!("{}.{}", Self::print_expr(object), member.lexeme())
            }
            ExprKind::Subscript { object, index } => {
                format!("{}[{}]", Self::print_expr(object), Self::print_expr(index))
            }
            ExprKind::Call { callee, args, .. } => {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|arg| match &arg.name {
                        Some(name) => {
                            format!("{} = {}", name.lexeme(), Self::print_expr(&arg.value))
                        }
                        None => Self::print_expr(&arg.value),
                    })
                    .collect();
                format!("{}({})", Self::print_expr(callee), rendered.join(", "))
            }
            ExprKind::SizeOf { annotation } => format!("sizeof({})", annotation),
            ExprKind::Alloc { annotation, count } => match count {
                Some(count) => format!("alloc {}[{}]", annotation, Self::print_expr(count)),
                None => format!("alloc {}", annotation),
            },
            ExprKind::Tuple { elements } => match elements.len() {
                0 => "()".to_string(),
                1 => format!("({}, )", Self::print_expr(&elements[0])),
                _ => {
                    let rendered: Vec<String> = elements.iter().map(Self::print_expr).collect();
                    format!("({})", rendered.join(", "))
                }
            },
            ExprKind::Array { elements } => {
                let rendered: Vec<String> = elements.iter().map(Self::print_expr).collect();
                format!("[{}]", rendered.join(", "))
            }
            ExprKind::Block(block) => {
                let mut out = String::new();
                if let Some(label) = &block.label {
                    out.push_str(&format!("{}: ", label));
                }
                if block.is_unsafe {
                    out.push_str("unsafe ");
                }
                out.push_str("block ");
                out.push_str(&Self::print_braced(block));
                out
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut out = format!(
                    "if {} then {}",
                    Self::print_expr(condition),
                    Self::print_expr(then_branch)
                );
                if let Some(else_branch) = else_branch {
                    out.push_str(&format!(" else {}", Self::print_expr(else_branch)));
                }
                out
            }
            ExprKind::Loop {
                kind,
                condition,
                body,
                label,
            } => {
                let mut out = String::new();
                if let Some(label) = label {
                    out.push_str(&format!("{}: ", label));
                }
                let body_text = match &body.kind {
                    ExprKind::Block(block) => Self::print_braced(block),
                    _ => Self::print_expr(body),
                };
                match kind {
                    LoopKind::While => out.push_str(&format!(
                        "while {} do {}",
                        condition.as_ref().map(|c| Self::print_expr(c)).unwrap_or_default(),
                        body_text
                    )),
                    LoopKind::DoWhile => out.push_str(&format!(
                        "do {} while {}",
                        body_text,
                        condition.as_ref().map(|c| Self::print_expr(c)).unwrap_or_default()
                    )),
                    LoopKind::Infinite => out.push_str(&format!("loop {}", body_text)),
                }
                out
            }
        }
    }

    fn print_braced(block: &Block) -> String {
        let rendered: Vec<String> = block.stmts.iter().map(Self::print_stmt).collect();
        if rendered.is_empty() {
            "{ pass }".to_string()
        } else {
            format!("{{ {} }}", rendered.join("; "))
        }
    }
}

/// Structural expression equality: same operators, operands, and literal
/// values. Locations, checked types, and resolved links are ignored.
pub fn expr_eq(a: &Expr, b: &Expr) -> bool {
    match (&a.kind, &b.kind) {
        (
            ExprKind::Literal { token: t1, negative: n1 },
            ExprKind::Literal { token: t2, negative: n2 },
        ) => n1 == n2 && t1.tok == t2.tok && t1.literal == t2.literal,
        (ExprKind::NameRef { name: n1, .. }, ExprKind::NameRef { name: n2, .. }) => {
            n1.to_string() == n2.to_string()
        }
        (
            ExprKind::Assign { op: o1, target: t1, value: v1 },
            ExprKind::Assign { op: o2, target: t2, value: v2 },
        ) => o1.tok == o2.tok && expr_eq(t1, t2) && expr_eq(v1, v2),
        (
            ExprKind::Logical { op: o1, left: l1, right: r1 },
            ExprKind::Logical { op: o2, left: l2, right: r2 },
        )
        | (
            ExprKind::Binary { op: o1, left: l1, right: r1 },
            ExprKind::Binary { op: o2, left: l2, right: r2 },
        ) => o1.tok == o2.tok && expr_eq(l1, l2) && expr_eq(r1, r2),
        (
            ExprKind::Unary { op: o1, operand: e1 },
            ExprKind::Unary { op: o2, operand: e2 },
        ) => o1.tok == o2.tok && expr_eq(e1, e2),
        (
            ExprKind::Address { mutable: m1, operand: e1, .. },
            ExprKind::Address { mutable: m2, operand: e2, .. },
        ) => m1 == m2 && expr_eq(e1, e2),
        (ExprKind::Deref { operand: e1, .. }, ExprKind::Deref { operand: e2, .. }) => {
            expr_eq(e1, e2)
        }
        (
            ExprKind::Cast { operand: e1, annotation: a1, reinterpret: r1 },
            ExprKind::Cast { operand: e2, annotation: a2, reinterpret: r2 },
        ) => r1 == r2 && expr_eq(e1, e2) && a1.to_string() == a2.to_string(),
        (
            ExprKind::Access { object: o1, member: m1 },
            ExprKind::Access { object: o2, member: m2 },
        ) => m1.lexeme() == m2.lexeme() && expr_eq(o1, o2),
        (
            ExprKind::Subscript { object: o1, index: i1 },
            ExprKind::Subscript { object: o2, index: i2 },
        ) => expr_eq(o1, o2) && expr_eq(i1, i2),
        (
            ExprKind::Call { callee: c1, args: a1, .. },
            ExprKind::Call { callee: c2, args: a2, .. },
        ) => {
            expr_eq(c1, c2)
                && a1.len() == a2.len()
                && a1.iter().zip(a2).all(|(x, y)| {
                    x.name.as_ref().map(|t| t.lexeme()) == y.name.as_ref().map(|t| t.lexeme())
                        && expr_eq(&x.value, &y.value)
                })
        }
        (ExprKind::SizeOf { annotation: a1 }, ExprKind::SizeOf { annotation: a2 }) => {
            a1.to_string() == a2.to_string()
        }
        (
            ExprKind::Alloc { annotation: a1, count: c1 },
            ExprKind::Alloc { annotation: a2, count: c2 },
        ) => {
            a1.to_string() == a2.to_string()
                && match (c1, c2) {
                    (None, None) => true,
                    (Some(c1), Some(c2)) => expr_eq(c1, c2),
                    _ => false,
                }
        }
        (ExprKind::Tuple { elements: e1 }, ExprKind::Tuple { elements: e2 })
        | (ExprKind::Array { elements: e1 }, ExprKind::Array { elements: e2 }) => {
            e1.len() == e2.len() && e1.iter().zip(e2).all(|(x, y)| expr_eq(x, y))
        }
        (ExprKind::Block(b1), ExprKind::Block(b2)) => block_eq(b1, b2),
        (
            ExprKind::Conditional { condition: c1, then_branch: t1, else_branch: e1 },
            ExprKind::Conditional { condition: c2, then_branch: t2, else_branch: e2 },
        ) => {
            expr_eq(c1, c2)
                && expr_eq(t1, t2)
                && match (e1, e2) {
                    (None, None) => true,
                    (Some(e1), Some(e2)) => expr_eq(e1, e2),
                    _ => false,
                }
        }
        (
            ExprKind::Loop { kind: k1, condition: c1, body: b1, label: l1 },
            ExprKind::Loop { kind: k2, condition: c2, body: b2, label: l2 },
        ) => {
            k1 == k2
                && l1 == l2
                && match (c1, c2) {
                    (None, None) => true,
                    (Some(c1), Some(c2)) => expr_eq(c1, c2),
                    _ => false,
                }
                && expr_eq(b1, b2)
        }
        _ => false,
    }
}

fn block_eq(a: &Block, b: &Block) -> bool {
    a.kind == b.kind
        && a.label == b.label
        && a.is_unsafe == b.is_unsafe
        && a.stmts.len() == b.stmts.len()
        && a.stmts.iter().zip(&b.stmts).all(|(x, y)| stmt_eq(x, y))
}

/// Structural statement equality; see [`expr_eq`].
pub fn stmt_eq(a: &Stmt, b: &Stmt) -> bool {
    match (a, b) {
        (Stmt::Expression { expr: e1 }, Stmt::Expression { expr: e2 }) => expr_eq(e1, e2),
        (
            Stmt::Let { name: n1, mutable: m1, annotation: a1, initializer: i1, .. },
            Stmt::Let { name: n2, mutable: m2, annotation: a2, initializer: i2, .. },
        ) => {
            n1.lexeme() == n2.lexeme()
                && m1 == m2
                && annotation_opt_eq(a1, a2)
                && expr_opt_eq(i1, i2)
        }
        (
            Stmt::Func { name: n1, params: p1, return_annotation: r1, body: b1, .. },
            Stmt::Func { name: n2, params: p2, return_annotation: r2, body: b2, .. },
        ) => {
            n1.lexeme() == n2.lexeme()
                && p1.len() == p2.len()
                && p1.iter().zip(p2).all(|(x, y)| {
                    x.name.lexeme() == y.name.lexeme()
                        && x.mutable == y.mutable
                        && x.annotation.to_string() == y.annotation.to_string()
                        && expr_opt_eq(&x.default, &y.default)
                })
                && annotation_opt_eq(r1, r2)
                && expr_eq(b1, b2)
        }
        (
            Stmt::Struct { name: n1, is_class: c1, fields: f1, .. },
            Stmt::Struct { name: n2, is_class: c2, fields: f2, .. },
        ) => {
            n1.lexeme() == n2.lexeme()
                && c1 == c2
                && f1.len() == f2.len()
                && f1.iter().zip(f2).all(|(x, y)| {
                    x.name.lexeme() == y.name.lexeme()
                        && x.annotation.to_string() == y.annotation.to_string()
                })
        }
        (
            Stmt::Namespace { name: n1, body: b1, .. },
            Stmt::Namespace { name: n2, body: b2, .. },
        ) => {
            n1.lexeme() == n2.lexeme()
                && b1.len() == b2.len()
                && b1.iter().zip(b2).all(|(x, y)| stmt_eq(x, y))
        }
        (Stmt::Print { args: a1, .. }, Stmt::Print { args: a2, .. }) => {
            a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| expr_eq(x, y))
        }
        (Stmt::Pass { .. }, Stmt::Pass { .. }) | (Stmt::Eof, Stmt::Eof) => true,
        (
            Stmt::Yield { label: l1, value: v1, .. },
            Stmt::Yield { label: l2, value: v2, .. },
        )
        | (
            Stmt::Break { label: l1, value: v1, .. },
            Stmt::Break { label: l2, value: v2, .. },
        ) => {
            l1.as_ref().map(|t| t.lexeme()) == l2.as_ref().map(|t| t.lexeme())
                && expr_opt_eq(v1, v2)
        }
        (Stmt::Continue { label: l1, .. }, Stmt::Continue { label: l2, .. }) => {
            l1.as_ref().map(|t| t.lexeme()) == l2.as_ref().map(|t| t.lexeme())
        }
        (Stmt::Return { value: v1, .. }, Stmt::Return { value: v2, .. }) => {
            expr_opt_eq(v1, v2)
        }
        (Stmt::Dealloc { operand: o1, .. }, Stmt::Dealloc { operand: o2, .. }) => {
            expr_eq(o1, o2)
        }
        _ => false,
    }
}

fn expr_opt_eq(a: &Option<Expr>, b: &Option<Expr>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => expr_eq(a, b),
        _ => false,
    }
}

fn annotation_opt_eq(a: &Option<Annotation>, b: &Option<Annotation>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.to_string() == b.to_string(),
        _ => false,
    }
}
