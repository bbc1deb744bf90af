// Lexa: backtracking pattern language with a transactional heap

use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use ratatui::{backend::CrosstermBackend, Terminal};

use lexa::interpreter::config::EngineConfig;
use lexa::interpreter::constants::{DEFAULT_GC_THRESHOLD, DEFAULT_MAX_FRAMES, DEFAULT_TRACE_LIMIT};
use lexa::interpreter::engine::{Engine, MatchOutcome};
use lexa::ui::App;

/// Exit status of a match that did not match
const NO_MATCH_STATUS: i32 = 2;

#[derive(Parser)]
#[command(name = "lexa")]
#[command(about = "Backtracking pattern language interpreter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program and print its output
    Run {
        /// Program source file
        file: PathBuf,

        #[command(flatten)]
        limits: Limits,
    },

    /// Match a rule of a program against an input and print the capture tree
    Match {
        #[command(flatten)]
        target: MatchTarget,

        #[command(flatten)]
        limits: Limits,
    },

    /// Match like `match`, then step through the lexeme trace in a terminal UI
    Trace {
        #[command(flatten)]
        target: MatchTarget,

        #[command(flatten)]
        limits: Limits,
    },
}

#[derive(Args)]
struct MatchTarget {
    /// Program source file
    file: PathBuf,

    /// Rule to match
    rule: String,

    /// Input text; read from --input when omitted
    text: Option<String>,

    /// Read the input from a file
    #[arg(short, long, conflicts_with = "text")]
    input: Option<PathBuf>,

    /// Match the input as raw bytes rather than text
    #[arg(long)]
    bytes: bool,
}

#[derive(Args)]
struct Limits {
    /// Maximum frame stack depth
    #[arg(long, default_value_t = DEFAULT_MAX_FRAMES)]
    max_frames: usize,

    /// Maximum number of evaluation steps
    #[arg(long)]
    max_steps: Option<u64>,

    /// Allocations between spatial collections
    #[arg(long, default_value_t = DEFAULT_GC_THRESHOLD)]
    gc_threshold: usize,

    /// Maximum number of recorded trace events
    #[arg(long, default_value_t = DEFAULT_TRACE_LIMIT)]
    trace_limit: usize,
}

impl Limits {
    fn config(&self, trace: bool) -> EngineConfig {
        EngineConfig {
            max_frames: self.max_frames,
            max_steps: self.max_steps,
            gc_threshold: self.gc_threshold,
            trace,
            trace_limit: self.trace_limit,
        }
    }
}

/// Input of a match, as read from the command line
enum MatchInput {
    Text(String),
    Bytes(Vec<u8>),
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { file, limits } => cmd_run(&file, &limits),
        Commands::Match { target, limits } => cmd_match(&target, &limits),
        Commands::Trace { target, limits } => cmd_trace(&target, &limits),
    };

    match result {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("no match");
            process::exit(NO_MATCH_STATUS);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn load(file: &Path, config: EngineConfig) -> Result<Engine, Box<dyn Error>> {
    let source = fs::read_to_string(file).map_err(|e| format!("cannot read '{}': {}", file.display(), e))?;
    info!("loaded {} ({} bytes)", file.display(), source.len());
    Ok(Engine::from_source(&source, config)?)
}

fn read_input(target: &MatchTarget) -> Result<MatchInput, Box<dyn Error>> {
    let raw = match (&target.text, &target.input) {
        (Some(text), _) => text.clone().into_bytes(),
        (None, Some(path)) => fs::read(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?,
        (None, None) => return Err("no input: pass the text or --input <file>".into()),
    };
    if target.bytes {
        return Ok(MatchInput::Bytes(raw));
    }
    let text = String::from_utf8(raw).map_err(|_| "input is not valid UTF-8; use --bytes")?;
    Ok(MatchInput::Text(text))
}

fn print_output(engine: &Engine) {
    for line in engine.output() {
        println!("{}", line);
    }
}

fn run_match(engine: &mut Engine, rule: &str, input: &MatchInput) -> Result<MatchOutcome, Box<dyn Error>> {
    let outcome = match input {
        MatchInput::Text(text) => engine.match_text(rule, text)?,
        MatchInput::Bytes(bytes) => engine.match_bytes(rule, bytes)?,
    };
    Ok(outcome)
}

/// Run a whole program
fn cmd_run(file: &Path, limits: &Limits) -> Result<bool, Box<dyn Error>> {
    let mut engine = load(file, limits.config(false))?;
    let result = engine.run();
    print_output(&engine);
    result?;
    Ok(true)
}

fn cmd_match(target: &MatchTarget, limits: &Limits) -> Result<bool, Box<dyn Error>> {
    let input = read_input(target)?;
    let mut engine = load(&target.file, limits.config(false))?;
    let outcome = run_match(&mut engine, &target.rule, &input);
    print_output(&engine);
    match outcome? {
        MatchOutcome::Matched(node) => {
            println!("{}", engine.format_value(&node));
            Ok(true)
        }
        MatchOutcome::NoMatch => Ok(false),
    }
}

fn cmd_trace(target: &MatchTarget, limits: &Limits) -> Result<bool, Box<dyn Error>> {
    let input = read_input(target)?;
    let source = fs::read_to_string(&target.file)?;
    let mut engine = Engine::from_source(&source, limits.config(true))?;
    let matched = run_match(&mut engine, &target.rule, &input)?.is_match();
    info!("recorded {} trace event(s)", engine.trace().len());

    let shown = match input {
        MatchInput::Text(text) => Some(text),
        MatchInput::Bytes(_) => None,
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(engine, source, shown, matched);
    let res = app.run(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(true)
}
