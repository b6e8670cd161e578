//! The stage driver.
//!
//! Runs the pipeline over a frontend context in strict order: Lexer →
//! Parser → GlobalChecker → LocalChecker → MirBuilder. A stage is entered
//! only when the previous one left the context `Ok`; the MIR builder in
//! particular never sees a context with check errors. Each stage panics if
//! handed a context already in the error state, so ordering mistakes fail
//! loudly instead of corrupting output.

use std::rc::Rc;

use crate::check::{GlobalChecker, LocalChecker};
use crate::context::{FrontendContext, Status};
use crate::error::Logger;
use crate::lexer::Lexer;
use crate::mir::MirBuilder;
use crate::parser::Parser;
use crate::source::CodeFile;

/// Processes one source submission through the whole pipeline.
///
/// Returns the resulting status: `Ok` when the submission was lowered into
/// the context's MIR module, `Pause` when interactive input is incomplete,
/// and `Error` when diagnostics were logged.
pub fn process(
    context: &mut FrontendContext,
    file: &Rc<CodeFile>,
    logger: &mut Logger,
    repl_mode: bool,
) -> Status {
    Lexer::scan(context, file, logger, repl_mode);
    if context.status != Status::Ok {
        return context.status;
    }
    Parser::parse(context, logger, repl_mode);
    if context.status != Status::Ok {
        return context.status;
    }
    GlobalChecker::check(context, logger);
    if context.status != Status::Ok {
        return context.status;
    }
    LocalChecker::check(context, logger);
    if context.status != Status::Ok {
        return context.status;
    }
    MirBuilder::build(context, repl_mode);
    context.status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> (FrontendContext, Logger) {
        let mut context = FrontendContext::new();
        let mut logger = Logger::quiet();
        let file = CodeFile::new(src, "test.nico");
        process(&mut context, &file, &mut logger, false);
        (context, logger)
    }

    #[test]
    fn clean_source_reaches_the_builder() {
        let (context, logger) = run("let x: i32 = 1 + 2\n");
        assert_eq!(context.status, Status::Ok);
        assert!(!logger.has_errors());
        assert!(!context.module.functions.is_empty());
    }

    #[test]
    fn check_errors_stop_before_lowering() {
        let (context, logger) = run("let y = 1\ny = 2\n");
        assert_eq!(context.status, Status::Error);
        assert!(logger.has_errors());
        assert!(context.module.functions.is_empty());
    }

    #[test]
    fn parse_errors_stop_before_checking() {
        let (context, logger) = run("let = 3\n");
        assert_eq!(context.status, Status::Error);
        assert!(logger.has_errors());
        assert_eq!(context.stmts_checked, 0);
    }
}
