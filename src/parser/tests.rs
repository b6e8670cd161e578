use super::*;
use crate::ast::{Annotation, ExprKind, LoopKind};
use crate::debug::{expr_eq, AstPrinter};
use crate::lexer::Lexer;
use crate::source::CodeFile;

fn parse_src(src: &str) -> (FrontendContext, Logger) {
    let mut context = FrontendContext::new();
    let mut logger = Logger::quiet();
    let file = CodeFile::new(src, "test.nico");
    Lexer::scan(&mut context, &file, &mut logger, false);
    assert_eq!(context.status, Status::Ok, "lexer failed on {:?}", src);
    Parser::parse(&mut context, &mut logger, false);
    (context, logger)
}

fn parse_repl(src: &str) -> Status {
    let mut context = FrontendContext::new();
    let mut logger = Logger::quiet();
    let file = CodeFile::new(src, "<repl>");
    Lexer::scan(&mut context, &file, &mut logger, true);
    if context.status != Status::Ok {
        return context.status;
    }
    Parser::parse(&mut context, &mut logger, true);
    context.status
}

/// Parses a single expression statement and renders it with explicit
/// parentheses.
fn printed(src: &str) -> String {
    let (context, logger) = parse_src(src);
    assert!(!logger.has_errors(), "parse errors for {:?}: {:?}", src, logger.diagnostics());
    match &context.stmts[0] {
        Stmt::Expression { expr } => AstPrinter::print_expr(expr),
        other => panic!("expected an expression statement, got {:?}", other),
    }
}

fn first_expr(context: &FrontendContext) -> &crate::ast::Expr {
    match &context.stmts[0] {
        Stmt::Expression { expr } => expr,
        other => panic!("expected an expression statement, got {:?}", other),
    }
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(printed("a + b * c"), "(a + (b * c))");
}

#[test]
fn assignment_is_right_associative() {
    assert_eq!(printed("a = b = c"), "(a = (b = c))");
}

#[test]
fn comparison_binds_tighter_than_logic() {
    assert_eq!(printed("a < b and c > d"), "((a < b) and (c > d))");
}

#[test]
fn bit_operator_precedence_order() {
    // `|` binds loosest, then `&`, then `^`.
    assert_eq!(printed("a | b & c ^ d"), "(a | (b & (c ^ d)))");
}

#[test]
fn not_binds_looser_than_equality() {
    assert_eq!(printed("not a == b"), "(not (a == b))");
}

#[test]
fn unary_minus_folds_into_literals() {
    let (context, logger) = parse_src("-128i8");
    assert!(!logger.has_errors());
    match &first_expr(&context).kind {
        ExprKind::Literal { negative, token } => {
            assert!(*negative);
            assert_eq!(token.tok, crate::token::Tok::Int8);
        }
        other => panic!("expected a folded literal, got {:?}", other),
    }
}

#[test]
fn positive_literal_out_of_range() {
    let (_, logger) = parse_src("128i8");
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == ErrorCode::NumberOutOfRange));
}

#[test]
fn negative_on_unsigned_literal() {
    let (_, logger) = parse_src("-1u8");
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == ErrorCode::NegativeOnUnsignedInteger));
}

#[test]
fn postfix_chain_parses_left_to_right() {
    assert_eq!(printed("a.b[0](c)"), "a.b[0](c)");
}

#[test]
fn cast_applies_after_postfix() {
    assert_eq!(printed("x.y as f64"), "(x.y as f64)");
}

#[test]
fn deref_and_address_of() {
    assert_eq!(printed("*p = *q"), "((*p) = (*q))");
    assert_eq!(printed("&var x"), "(&var x)");
}

#[test]
fn let_requires_type_or_value() {
    let (_, logger) = parse_src("let x\n");
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == ErrorCode::LetWithoutTypeOrValue));
}

#[test]
fn let_with_annotation_and_value() {
    let (context, logger) = parse_src("let var x: i32 = 1 + 2\n");
    assert!(!logger.has_errors());
    match &context.stmts[0] {
        Stmt::Let {
            mutable,
            annotation,
            initializer,
            ..
        } => {
            assert!(*mutable);
            assert!(annotation.is_some());
            assert!(initializer.is_some());
        }
        other => panic!("expected let, got {:?}", other),
    }
}

#[test]
fn func_with_arrow_body_and_defaults() {
    let (context, logger) = parse_src("func add(a: i32, b: i32 = 1) -> i32 => a + b\n");
    assert!(!logger.has_errors());
    match &context.stmts[0] {
        Stmt::Func {
            params,
            return_annotation,
            ..
        } => {
            assert_eq!(params.len(), 2);
            assert!(params[1].default.is_some());
            assert!(return_annotation.is_some());
        }
        other => panic!("expected func, got {:?}", other),
    }
}

#[test]
fn func_with_indented_block_body() {
    let (context, logger) = parse_src("func f() -> i32:\n    yield 1\n");
    assert!(!logger.has_errors());
    match &context.stmts[0] {
        Stmt::Func { body, .. } => {
            assert!(matches!(body.kind, ExprKind::Block(_)));
        }
        other => panic!("expected func, got {:?}", other),
    }
}

#[test]
fn func_without_paren_is_an_error() {
    let (_, logger) = parse_src("func f -> i32 => 1\n");
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == ErrorCode::FuncWithoutOpeningParen));
}

#[test]
fn conditional_with_then_and_else() {
    assert_eq!(printed("if a then 1 else 2"), "if a then 1 else 2");
}

#[test]
fn elif_desugars_to_nested_conditional() {
    let (context, logger) = parse_src("if a then 1 elif b then 2 else 3\n");
    assert!(!logger.has_errors());
    match &first_expr(&context).kind {
        ExprKind::Conditional { else_branch, .. } => {
            let else_branch = else_branch.as_ref().expect("must have an else");
            assert!(matches!(else_branch.kind, ExprKind::Conditional { .. }));
        }
        other => panic!("expected a conditional, got {:?}", other),
    }
}

#[test]
fn conditional_without_then_or_block() {
    let (_, logger) = parse_src("if a 1\n");
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == ErrorCode::ConditionalWithoutThenOrBlock));
}

#[test]
fn inline_colon_conditional_with_yields() {
    let (context, logger) = parse_src("let x = if true: yield 1 else: yield 2\n");
    assert!(!logger.has_errors());
    match &context.stmts[0] {
        Stmt::Let { initializer, .. } => {
            let init = initializer.as_ref().unwrap();
            match &init.kind {
                ExprKind::Conditional {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    assert!(matches!(then_branch.kind, ExprKind::Block(_)));
                    assert!(matches!(
                        else_branch.as_ref().unwrap().kind,
                        ExprKind::Block(_)
                    ));
                }
                other => panic!("expected a conditional initializer, got {:?}", other),
            }
        }
        other => panic!("expected let, got {:?}", other),
    }
}

#[test]
fn while_loop_forms() {
    let (context, logger) = parse_src("while a do b\n");
    assert!(!logger.has_errors());
    match &first_expr(&context).kind {
        ExprKind::Loop { kind, condition, .. } => {
            assert_eq!(*kind, LoopKind::While);
            assert!(condition.is_some());
        }
        other => panic!("expected a loop, got {:?}", other),
    }
}

#[test]
fn do_while_loop() {
    let (context, logger) = parse_src("do a while b\n");
    assert!(!logger.has_errors());
    match &first_expr(&context).kind {
        ExprKind::Loop { kind, .. } => assert_eq!(*kind, LoopKind::DoWhile),
        other => panic!("expected a loop, got {:?}", other),
    }
}

#[test]
fn do_without_while_is_an_error() {
    let (_, logger) = parse_src("do a\n");
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == ErrorCode::DoWhileLoopWithoutWhile));
}

#[test]
fn while_true_warns() {
    let (_, logger) = parse_src("while true do a\n");
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == ErrorCode::LoopWithTrueCondition));
    assert_eq!(logger.error_count(), 0);
}

#[test]
fn labelled_loop_with_break_label_and_value() {
    let (context, logger) = parse_src("outer: loop:\n    break outer 5\n");
    assert!(!logger.has_errors());
    match &first_expr(&context).kind {
        ExprKind::Loop { label, body, .. } => {
            assert_eq!(label.as_deref(), Some("outer"));
            let ExprKind::Block(block) = &body.kind else {
                panic!("loop body must be a block");
            };
            match &block.stmts[0] {
                Stmt::Break { label, value, .. } => {
                    assert_eq!(label.as_ref().unwrap().lexeme(), "outer");
                    assert!(value.is_some());
                }
                other => panic!("expected break, got {:?}", other),
            }
        }
        other => panic!("expected a loop, got {:?}", other),
    }
}

#[test]
fn break_with_call_value_is_not_a_label() {
    let (context, logger) = parse_src("loop:\n    break f(1)\n");
    assert!(!logger.has_errors());
    match &first_expr(&context).kind {
        ExprKind::Loop { body, .. } => {
            let ExprKind::Block(block) = &body.kind else {
                panic!("loop body must be a block");
            };
            match &block.stmts[0] {
                Stmt::Break { label, value, .. } => {
                    assert!(label.is_none());
                    assert!(matches!(
                        value.as_ref().unwrap().kind,
                        ExprKind::Call { .. }
                    ));
                }
                other => panic!("expected break, got {:?}", other),
            }
        }
        other => panic!("expected a loop, got {:?}", other),
    }
}

#[test]
fn named_arguments_after_positional() {
    let (context, logger) = parse_src("f(1, 2, scale = 3)\n");
    assert!(!logger.has_errors());
    match &first_expr(&context).kind {
        ExprKind::Call { args, .. } => {
            assert_eq!(args.len(), 3);
            assert!(args[2].name.is_some());
        }
        other => panic!("expected a call, got {:?}", other),
    }
}

#[test]
fn positional_after_named_is_an_error() {
    let (_, logger) = parse_src("f(scale = 3, 1)\n");
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == ErrorCode::PosArgumentAfterNamedArgument));
}

#[test]
fn annotations_parse_pointer_reference_and_compounds() {
    let (context, logger) =
        parse_src("let p: var *i32 = x\nlet r: &f64 = y\nlet t: (i32, bool) = z\nlet a: [i32; 4] = w\n");
    assert!(!logger.has_errors());
    let annotation = |i: usize| match &context.stmts[i] {
        Stmt::Let { annotation, .. } => annotation.as_ref().unwrap().to_string(),
        _ => panic!("expected let"),
    };
    assert_eq!(annotation(0), "var *i32");
    assert_eq!(annotation(1), "&f64");
    assert_eq!(annotation(2), "(i32, bool)");
    assert_eq!(annotation(3), "[i32; 4]");
}

#[test]
fn object_annotation_parses() {
    let (context, logger) = parse_src("let o: {x: i32, y: f64} = v\n");
    assert!(!logger.has_errors());
    match &context.stmts[0] {
        Stmt::Let { annotation, .. } => {
            assert!(matches!(annotation, Some(Annotation::Object(props)) if props.len() == 2));
        }
        _ => panic!("expected let"),
    }
}

#[test]
fn typeof_requires_parentheses() {
    let (_, logger) = parse_src("let t: typeof x = 1\n");
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == ErrorCode::TypeofWithoutOpeningParen));
}

#[test]
fn struct_declaration_collects_fields() {
    let (context, logger) = parse_src("struct point:\n    x: i32\n    y: i32\n");
    assert!(!logger.has_errors());
    match &context.stmts[0] {
        Stmt::Struct { fields, is_class, .. } => {
            assert!(!is_class);
            assert_eq!(fields.len(), 2);
        }
        other => panic!("expected struct, got {:?}", other),
    }
}

#[test]
fn namespace_declaration_nests_statements() {
    let (context, logger) = parse_src("namespace geo:\n    struct point:\n        x: i32\n");
    assert!(!logger.has_errors());
    match &context.stmts[0] {
        Stmt::Namespace { body, .. } => {
            assert_eq!(body.len(), 1);
            assert!(matches!(body[0], Stmt::Struct { .. }));
        }
        other => panic!("expected namespace, got {:?}", other),
    }
}

#[test]
fn enum_is_reported_as_unsupported() {
    let (_, logger) = parse_src("enum color:\n    pass\n");
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == ErrorCode::UnexpectedToken));
}

#[test]
fn two_statements_on_one_line_need_a_semicolon() {
    let (_, logger) = parse_src("let a = 1 let b = 2\n");
    assert!(logger.has_errors());
    let (context, logger) = parse_src("let a = 1; let b = 2\n");
    assert!(!logger.has_errors());
    assert_eq!(context.stmts.len(), 3); // two lets plus Eof
}

#[test]
fn recovery_continues_after_a_bad_statement() {
    let (context, logger) = parse_src("let = 1\nlet b = 2\n");
    assert!(logger.has_errors());
    assert!(context
        .stmts
        .iter()
        .any(|s| matches!(s, Stmt::Let { name, .. } if name.lexeme() == "b")));
}

#[test]
fn repl_pauses_on_unfinished_conditional() {
    assert_eq!(parse_repl("if x:"), Status::Pause);
}

#[test]
fn repl_pauses_on_missing_func_body() {
    assert_eq!(parse_repl("func f() -> i32"), Status::Pause);
}

#[test]
fn print_reparse_round_trip() {
    let sources = [
        "a + b * c",
        "a = b = c",
        "not a == b and c < d",
        "-x * (y + 1)",
        "f(1, scale = 2).field[3] as f64",
        "if a then 1 else 2",
        "while a do b",
        "do a while b",
        "[1, 2, 3]",
        "(1, true)",
        "alloc i32[10]",
        "sizeof(i32)",
        "&var cell",
    ];
    for src in sources {
        let line = format!("{}\n", src);
        let (context, logger) = parse_src(&line);
        assert!(!logger.has_errors(), "first parse failed for {:?}", src);
        let original = first_expr(&context).clone();
        let reprinted = format!("{}\n", AstPrinter::print_expr(&original));
        let (context2, logger2) = parse_src(&reprinted);
        assert!(
            !logger2.has_errors(),
            "re-parse failed for {:?} (printed {:?})",
            src,
            reprinted
        );
        assert!(
            expr_eq(&original, first_expr(&context2)),
            "round trip changed {:?} (printed {:?})",
            src,
            reprinted
        );
    }
}

#[test]
fn tuple_index_access_parses() {
    assert_eq!(printed("pair.0"), "pair.0");
}

#[test]
fn unsafe_block_parses() {
    let (context, logger) = parse_src("unsafe block:\n    pass\n");
    assert!(!logger.has_errors());
    match &first_expr(&context).kind {
        ExprKind::Block(block) => assert!(block.is_unsafe),
        other => panic!("expected a block, got {:?}", other),
    }
}

#[test]
fn compound_assignment_desugars_to_assign() {
    let (context, logger) = parse_src("a += 1\n");
    assert!(!logger.has_errors());
    match &first_expr(&context).kind {
        ExprKind::Assign { op, .. } => assert!(op.tok.is_compound_operator()),
        other => panic!("expected an assignment, got {:?}", other),
    }
}
