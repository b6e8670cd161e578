//! The interactive driver.
//!
//! Reads lines, feeds the accumulated submission through the pipeline, and
//! honors the `Pause` status: while input is incomplete (an open grouping,
//! an unfinished string, a construct missing its body) the buffer is kept
//! and the continuation prompt shown, then the whole buffer is resubmitted
//! as one piece. On an errored submission the parsed-but-unchecked
//! statements are discarded and the session continues.
//!
//! Meta commands: `:help`, `:reset`, `:quit`.

use std::io::{BufRead, Write};
use std::rc::Rc;

use crate::compile::process;
use crate::context::{FrontendContext, Status};
use crate::error::{ErrorCode, Logger};
use crate::source::CodeFile;

const PROMPT: &str = ">>> ";
const CONTINUE_PROMPT: &str = "... ";

pub struct Repl;

impl Repl {
    /// Runs the REPL over stdin/stdout.
    pub fn run() {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        Self::run_with(stdin.lock(), stdout.lock());
    }

    /// Runs the REPL over arbitrary streams; tests drive this directly.
    pub fn run_with<R: BufRead, W: Write>(mut input: R, mut output: W) {
        let mut context = FrontendContext::new();
        let mut logger = Logger::new();
        let mut buffer = String::new();
        let mut submission = 0u32;

        let _ = writeln!(output, "nico {} (interactive)", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(output, "Type :help for help, :quit to exit.");

        loop {
            let prompt = if buffer.is_empty() { PROMPT } else { CONTINUE_PROMPT };
            let _ = write!(output, "{}", prompt);
            let _ = output.flush();

            let mut line = String::new();
            match input.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(_) => break,
            }

            if buffer.is_empty() {
                match line.trim() {
                    ":quit" | ":q" => break,
                    ":help" => {
                        let _ = writeln!(output, ":help   show this help");
                        let _ = writeln!(output, ":reset  clear the session state");
                        let _ = writeln!(output, ":quit   exit the REPL");
                        continue;
                    }
                    ":reset" => {
                        context.reset();
                        logger.reset();
                        let _ = writeln!(output, "session reset");
                        continue;
                    }
                    "" => continue,
                    _ => {}
                }
            }

            buffer.push_str(&line);
            submission += 1;
            let file = CodeFile::new(buffer.clone(), format!("<repl:{}>", submission));
            let checked_before = context.stmts_checked;
            let diagnostics_before = logger.diagnostics().len();
            context.symbol_tree.take_modified();
            let status = Self::submit(&mut context, &file, &mut logger);
            match status {
                Status::Pause => {
                    // Keep the buffer; the whole submission is re-run once
                    // more input arrives, so drop its diagnostics too.
                    logger.truncate(diagnostics_before);
                    context.status = Status::Ok;
                }
                Status::Ok => {
                    buffer.clear();
                    if context.stmts_checked > checked_before {
                        let _ = writeln!(output, "ok");
                    }
                }
                Status::Error => {
                    buffer.clear();
                    // Declarations from the failed submission may already
                    // sit in the symbol tree.
                    if context.symbol_tree.take_modified() {
                        logger.log(
                            ErrorCode::SymbolTreeInInconsistentState,
                            None,
                            "the failed submission may have left declarations behind",
                        );
                    }
                    context.discard_unchecked();
                }
            }
        }
    }

    fn submit(
        context: &mut FrontendContext,
        file: &Rc<CodeFile>,
        logger: &mut Logger,
    ) -> Status {
        process(context, file, logger, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn drive(lines: &str) -> String {
        let input = Cursor::new(lines.to_string());
        let mut output: Vec<u8> = Vec::new();
        Repl::run_with(input, &mut output);
        String::from_utf8_lossy(&output).into_owned()
    }

    #[test]
    fn accepts_a_simple_let() {
        let out = drive("let a = 1\n:quit\n");
        assert!(out.contains("ok"));
    }

    #[test]
    fn continues_while_grouping_is_open() {
        let out = drive("let a = (1 +\n2)\n:quit\n");
        assert!(out.contains(CONTINUE_PROMPT));
        assert!(out.contains("ok"));
    }

    #[test]
    fn session_survives_an_error() {
        let out = drive("let y = 1\ny = 2\nlet z = 3\n:quit\n");
        // The failed assignment does not end the session.
        assert!(out.matches("ok").count() >= 2);
    }

    #[test]
    fn reset_clears_state() {
        let out = drive("let a = 1\n:reset\nlet a = 1\n:quit\n");
        assert!(out.contains("session reset"));
        assert_eq!(out.matches("ok").count(), 2);
    }
}
