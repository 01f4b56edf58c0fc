//! Command-line front end: run a script file to completion, or drop into an
//! interactive session.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use jestscript::error::ErrorLocation;
use jestscript::ReplSession;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jestscript", about = "Run or explore scripts in the jestscript language", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script file to completion.
    Run {
        path: PathBuf,
    },
    /// Start an interactive session.
    Repl,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Repl) {
        Command::Run { path } => run_file(&path),
        Command::Repl => run_repl(),
    }
}

fn run_file(path: &PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("could not read {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let start = Instant::now();
    match jestscript::run_source(&source) {
        Ok(_) => {
            eprintln!("finished in {:?}", start.elapsed());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error after {:?}: {}", start.elapsed(), ErrorLocation(&e));
            ExitCode::FAILURE
        }
    }
}

fn run_repl() -> ExitCode {
    let mut session = ReplSession::new();
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("could not start line editor: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("jestscript REPL -- Ctrl-D to exit");
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                if line.trim().is_empty() {
                    continue;
                }
                match session.execute(&line) {
                    Ok(progress) => {
                        if let Some(value) = progress.result {
                            println!("{value}");
                        }
                    }
                    Err(e) => eprintln!("{}", ErrorLocation(&e)),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }
    ExitCode::SUCCESS
}
