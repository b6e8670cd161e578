//! Command-line interface for the nico compiler frontend.
//!
//! `nico` with no arguments starts the REPL; `nico <path>` compiles the
//! file. Exit codes follow the frontend contract: 0 on success, 64 for
//! usage errors (more than one source path), 65 when the frontend reported
//! errors. Code 70 is reserved for backend failures and cannot occur here;
//! no backend runs in this binary.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::rc::Rc;

use crate::compile::process;
use crate::context::{FrontendContext, Status};
use crate::debug::AstPrinter;
use crate::error::Logger;
use crate::repl::Repl;
use crate::source::CodeFile;

#[derive(ClapParser)]
#[command(name = "nico")]
#[command(about = "The nico compiler frontend", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Source file to compile; omit it to start the REPL.
    pub paths: Vec<PathBuf>,

    /// Dump an intermediate form after a successful run.
    #[arg(long, value_enum)]
    pub emit: Option<EmitKind>,

    /// Print diagnostics as a JSON array instead of rendering them.
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmitKind {
    Ast,
    Mir,
}

/// Entry point for the CLI; returns the process exit code.
pub fn run_cli() -> i32 {
    let cli = Cli::parse();

    if cli.paths.is_empty() {
        Repl::run();
        return 0;
    }
    if cli.paths.len() > 1 {
        eprintln!("Usage: nico [source_file]");
        return 64;
    }

    let path = &cli.paths[0];
    let src = match std::fs::read_to_string(path) {
        Ok(src) => src,
        Err(err) => {
            eprintln!("nico: cannot read `{}`: {}", path.display(), err);
            return 65;
        }
    };
    let file = CodeFile::new(src, path.display().to_string());
    run_source(&file, cli.emit, cli.json)
}

/// Compiles one source buffer, reporting diagnostics and honoring the
/// `--emit` and `--json` switches.
pub fn run_source(file: &Rc<CodeFile>, emit: Option<EmitKind>, json: bool) -> i32 {
    let mut context = FrontendContext::new();
    let mut logger = if json { Logger::quiet() } else { Logger::new() };

    let status = process(&mut context, file, &mut logger, false);

    if json {
        println!("{}", logger.to_json());
    }
    if status == Status::Error || logger.has_errors() {
        return 65;
    }
    match emit {
        Some(EmitKind::Ast) => {
            for stmt in &context.stmts {
                let rendered = AstPrinter::print_stmt(stmt);
                if !rendered.is_empty() {
                    println!("{}", rendered);
                }
            }
        }
        Some(EmitKind::Mir) => {
            print!("{}", context.module);
        }
        None => {}
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_file_exits_zero() {
        let file = CodeFile::new("let x: i32 = 1 + 2\n", "ok.nico");
        assert_eq!(run_source(&file, None, true), 0);
    }

    #[test]
    fn frontend_errors_exit_65() {
        let file = CodeFile::new("let y = 1\ny = 2\n", "bad.nico");
        assert_eq!(run_source(&file, None, true), 65);
    }
}
