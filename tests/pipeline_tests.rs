//! End-to-end pipeline scenarios: source text in, MIR out.

use std::collections::HashSet;
use std::rc::Rc;

use nico::compile::process;
use nico::mir::{BinOp, Instr, Terminator, Value};
use nico::source::CodeFile;
use nico::{ExprKind, FrontendContext, Logger, Status, Stmt, Type};

fn run(src: &str) -> (FrontendContext, Logger, Status) {
    let mut context = FrontendContext::new();
    let mut logger = Logger::quiet();
    let file = CodeFile::new(src, "script.nico");
    let status = process(&mut context, &file, &mut logger, false);
    (context, logger, status)
}

fn script<'a>(context: &'a FrontendContext) -> &'a nico::mir::Function {
    context
        .module
        .functions
        .iter()
        .find(|f| f.name == "script")
        .expect("script function missing")
}

#[test]
fn let_with_arithmetic_lowers_to_alloca_binary_store() {
    let (context, logger, status) = run("let x: i32 = 1 + 2\n");
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());

    // One Let statement (plus the end-of-file marker).
    assert!(matches!(context.stmts[0], Stmt::Let { .. }));

    let function = script(&context);
    let mut saw_alloca_i32 = false;
    let mut saw_literal_add = false;
    let mut saw_store_to_x = false;
    for (_, block) in function.blocks() {
        for instr in &block.instrs {
            match instr {
                Instr::Alloca { ty, dst } => {
                    if ty.same(&Type::I32) {
                        if let Value::Variable { name, .. } = dst {
                            if name == "x" {
                                saw_alloca_i32 = true;
                            }
                        }
                    }
                }
                Instr::Binary {
                    op: BinOp::Add,
                    left,
                    right,
                    ..
                } => {
                    if matches!(left, Value::Literal { .. })
                        && matches!(right, Value::Literal { .. })
                    {
                        saw_literal_add = true;
                    }
                }
                Instr::Store { dst, .. } => {
                    if let Value::Variable { name, .. } = dst {
                        if name == "x" {
                            saw_store_to_x = true;
                        }
                    }
                }
                _ => {}
            }
        }
    }
    assert!(saw_alloca_i32, "missing `alloca i32` for x");
    assert!(saw_literal_add, "missing literal add");
    assert!(saw_store_to_x, "missing store into x");
}

#[test]
fn assign_to_immutable_stops_before_mir() {
    let (context, logger, status) = run("let y = 1\ny = 2\n");
    assert_eq!(status, Status::Error);
    assert!(logger
        .diagnostics()
        .iter()
        .any(|d| d.code == nico::ErrorCode::AssignToImmutable));
    assert!(context.module.functions.is_empty(), "no MIR may be built");
}

#[test]
fn valued_conditional_merges_at_a_phi_over_literals() {
    let (context, logger, status) = run("let x: i32 = if true then 1 else 2\n");
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    let function = script(&context);

    let branches = function
        .blocks()
        .filter(|(_, b)| matches!(b.terminator(), Some(Terminator::Branch { .. })))
        .count();
    assert!(branches >= 1, "conditional must lower to a branch");

    let mut phi_over_literals = false;
    for (_, block) in function.blocks() {
        for instr in &block.instrs {
            if let Instr::Phi { incoming, .. } = instr {
                if incoming.len() == 2
                    && incoming
                        .iter()
                        .all(|(_, v)| matches!(v, Value::Literal { .. }))
                {
                    phi_over_literals = true;
                }
            }
        }
    }
    assert!(phi_over_literals, "missing phi over the two literal arms");
}

#[test]
fn yielding_conditional_blocks_also_merge_at_a_phi() {
    let (context, logger, status) = run("let x: i32 = if true: yield 1 else: yield 2\n");
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    let function = script(&context);
    let has_phi = function
        .blocks()
        .any(|(_, b)| b.instrs.iter().any(|i| matches!(i, Instr::Phi { .. })));
    assert!(has_phi, "valued conditional must merge at a phi");
}

#[test]
fn division_carries_a_runtime_zero_check() {
    let (context, logger, status) = run("3 /(1-1)\n");
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    let function = script(&context);

    let panic_block = function
        .blocks()
        .find(|(_, b)| b.name == "div_by_zero")
        .expect("missing div_by_zero block");
    let has_panic_message = panic_block.1.instrs.iter().any(|i| match i {
        Instr::Call { args, .. } => args.iter().any(|a| match a {
            Value::Literal {
                lit: nico::LiteralValue::Str(text),
                ..
            } => text.contains("Panic: script: Division by zero.") && text.contains("script.nico:1:3"),
            _ => false,
        }),
        _ => false,
    });
    assert!(has_panic_message, "panic message must name function, file, line, and column");
}

#[test]
fn every_block_has_exactly_one_terminator() {
    let sources = [
        "let x: i32 = 1 + 2\n",
        "let x: i32 = if true then 1 else 2\n",
        "let var i = 0\nwhile i < 10: i += 1\n",
        "loop:\n    break\n",
        "let x = while true: break 5\n",
        "func f(a: i32) -> i32 => a + 1\nlet y = f(1)\n",
        "print 1, 2.5, true, \"text\"\n",
    ];
    for src in sources {
        let (context, logger, status) = run(src);
        assert_eq!(status, Status::Ok, "{:?}: {:?}", src, logger.diagnostics());
        for function in &context.module.functions {
            if function.is_extern {
                continue;
            }
            for (id, block) in function.blocks() {
                assert!(
                    block.terminator().is_some(),
                    "block {:?} ({}) of `{}` lacks a terminator in {:?}",
                    id,
                    block.name,
                    function.name,
                    src
                );
            }
        }
    }
}

#[test]
fn stores_and_loads_keep_the_pointer_discipline() {
    let (context, logger, status) =
        run("let var a = 1\na = a + 2\nlet t = (1, true)\nlet b = t.0\n");
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    for function in &context.module.functions {
        if function.is_extern {
            continue;
        }
        for (_, block) in function.blocks() {
            for instr in &block.instrs {
                match instr {
                    Instr::Store { dst, .. } => {
                        assert!(
                            matches!(dst.ty(), Type::Pointer { .. } | Type::Reference { .. }),
                            "store destination must be pointer-typed"
                        );
                    }
                    Instr::Load { src, .. } => {
                        assert!(
                            matches!(src.ty(), Type::Pointer { .. } | Type::Reference { .. }),
                            "load source must be pointer-typed"
                        );
                    }
                    _ => {}
                }
            }
        }
    }
}

#[test]
fn phi_incoming_blocks_equal_the_predecessor_set() {
    let sources = [
        "let x: i32 = if true then 1 else 2\n",
        "let p = true and false\n",
        "let q = false or true\n",
        "print true\n",
    ];
    for src in sources {
        let (context, logger, status) = run(src);
        assert_eq!(status, Status::Ok, "{:?}: {:?}", src, logger.diagnostics());
        for function in &context.module.functions {
            if function.is_extern {
                continue;
            }
            for (id, block) in function.blocks() {
                for instr in &block.instrs {
                    if let Instr::Phi { incoming, .. } = instr {
                        let incoming_set: HashSet<u32> =
                            incoming.iter().map(|(b, _)| b.0).collect();
                        let pred_set: HashSet<u32> = block.preds.iter().map(|b| b.0).collect();
                        assert_eq!(
                            incoming_set, pred_set,
                            "phi incoming set must equal predecessors of {:?} in {:?}",
                            id, src
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn short_circuit_and_lowers_to_a_phi_with_a_false_arm() {
    let (context, logger, status) = run("let var t = true\nlet r = t and t\n");
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    let function = script(&context);
    let mut found = false;
    for (_, block) in function.blocks() {
        for instr in &block.instrs {
            if let Instr::Phi { incoming, .. } = instr {
                if incoming.iter().any(|(_, v)| {
                    matches!(
                        v,
                        Value::Literal {
                            lit: nico::LiteralValue::Bool(false),
                            ..
                        }
                    )
                }) {
                    found = true;
                }
            }
        }
    }
    assert!(found, "short-circuit `and` must phi in the false literal");
}

#[test]
fn functions_get_entry_exit_and_param_allocas() {
    let (context, logger, status) = run("func add(a: i32, b: i32) -> i32 => a + b\n");
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    let function = context
        .module
        .functions
        .iter()
        .find(|f| f.name == "add")
        .expect("missing function `add`");
    assert_eq!(function.params.len(), 2);
    assert!(matches!(
        function.block(function.exit).terminator(),
        Some(Terminator::Return)
    ));
    let entry = function.block(function.entry);
    let allocas = entry
        .instrs
        .iter()
        .filter(|i| matches!(i, Instr::Alloca { .. }))
        .count();
    // One per parameter plus the return slot.
    assert_eq!(allocas, 3);
}

#[test]
fn dealloc_calls_the_runtime_deallocator() {
    let (context, logger, status) = run("let p = alloc i32\ndealloc p\n");
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    let free_id = context
        .module
        .functions
        .iter()
        .position(|f| f.is_extern && f.name == "free")
        .expect("free must be declared");
    let function = script(&context);
    let calls_free = function.blocks().any(|(_, b)| {
        b.instrs.iter().any(
            |i| matches!(i, Instr::Call { target, .. } if target.0 as usize == free_id),
        )
    });
    assert!(calls_free);
}

#[test]
fn incremental_repl_submissions_share_the_context() {
    let mut context = FrontendContext::new();
    let mut logger = Logger::quiet();

    let first = CodeFile::new("let a = 1\n", "<repl:1>");
    let status = process(&mut context, &first, &mut logger, true);
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    assert_eq!(context.stmts_checked, 1);
    let first_entry = match &context.stmts[0] {
        Stmt::Let { entry, .. } => entry.expect("first let must resolve"),
        _ => panic!("expected let"),
    };

    let second = CodeFile::new("let b = a + 1\n", "<repl:2>");
    let status = process(&mut context, &second, &mut logger, true);
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    assert_eq!(context.stmts_checked, 2);

    // The `a` inside the second submission resolves to the entry the first
    // submission created.
    let Stmt::Let { initializer, .. } = &context.stmts[1] else {
        panic!("expected let");
    };
    let init = initializer.as_ref().unwrap();
    let ExprKind::Binary { left, .. } = &init.kind else {
        panic!("expected a binary initializer");
    };
    let ExprKind::NameRef { entry, .. } = &left.kind else {
        panic!("expected a name reference");
    };
    assert_eq!(entry.unwrap(), first_entry);

    // Each submission lowered into its own script function.
    let scripts: Vec<&str> = context
        .module
        .functions
        .iter()
        .filter(|f| f.name.starts_with("script"))
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(scripts, vec!["script#0", "script#1"]);
}

#[test]
fn paused_submission_commits_nothing() {
    let mut context = FrontendContext::new();
    let mut logger = Logger::quiet();
    let partial = CodeFile::new("let a = (1 +\n", "<repl:1>");
    let status = process(&mut context, &partial, &mut logger, true);
    assert_eq!(status, Status::Pause);
    assert!(context.stmts.is_empty());
    assert_eq!(context.stmts_checked, 0);

    let full = CodeFile::new("let a = (1 +\n2)\n", "<repl:2>");
    let status = process(&mut context, &full, &mut logger, true);
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    assert_eq!(context.stmts_checked, 1);
}

#[test]
fn reset_clears_everything() {
    let (mut context, _, status) = run("let a = 1\n");
    assert_eq!(status, Status::Ok);
    context.reset();
    assert!(context.stmts.is_empty());
    assert!(context.module.functions.is_empty());
    assert_eq!(context.stmts_checked, 0);
    let mut logger = Logger::quiet();
    let again = CodeFile::new("let a = 1\n", "again.nico");
    let status = process(&mut context, &Rc::clone(&again), &mut logger, false);
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
}

#[test]
fn namespaced_declarations_resolve_through_multi_part_names() {
    let (context, logger, status) = run(
        "namespace geo:\n    struct point:\n        x: i32\n        y: i32\nlet p: geo::point = q\n",
    );
    // `q` is undeclared, but the annotation must resolve.
    assert_eq!(status, Status::Error);
    assert!(logger
        .diagnostics()
        .iter()
        .all(|d| d.code != nico::ErrorCode::UnknownAnnotationName));
    let _ = context;
}

#[test]
fn sizeof_folds_to_the_packed_size() {
    let (context, logger, status) = run(
        "struct pair:\n    a: i32\n    b: i32\nlet s = sizeof(pair)\n",
    );
    assert_eq!(status, Status::Ok, "{:?}", logger.diagnostics());
    let function = script(&context);
    let mut folded = None;
    for (_, block) in function.blocks() {
        for instr in &block.instrs {
            if let Instr::Store { src, dst } = instr {
                let to_s = matches!(dst, Value::Variable { name, .. } if name == "s");
                if let (
                    true,
                    Value::Literal {
                        lit: nico::LiteralValue::Int(v),
                        ..
                    },
                ) = (to_s, src)
                {
                    folded = Some(*v);
                }
            }
        }
    }
    assert_eq!(folded, Some(8));
}
