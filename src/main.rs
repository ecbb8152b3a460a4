use std::{
    env,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::bail;
use log::{debug, warn, LevelFilter};
use loot::{EvaluationContext, ExceptionStack, Mode, RuntimeContext, Uncaught};
use simple_logger::SimpleLogger;

const DEFAULT_LIBRARY: &str = "lib.scm";

// The evaluator recurses on the host stack, so it runs on a thread sized
// for the call depth it allows.
const STACK_SIZE: usize = 256 * 1024 * 1024;
const DEFAULT_MAX_DEPTH: usize = 10_000;


fn progname() -> String {
    env::args()
        .next()
        .and_then(|arg0| Path::new(&arg0).file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "loot".to_owned())
}

fn max_depth() -> usize {
    match env::var("LOOT_MAX_DEPTH").map(|value| value.parse::<usize>()) {
        Ok(Ok(depth)) => depth,
        Ok(Err(_)) => {
            warn!("LOOT_MAX_DEPTH is not a number; using {}", DEFAULT_MAX_DEPTH);
            DEFAULT_MAX_DEPTH
        }
        Err(_) => DEFAULT_MAX_DEPTH,
    }
}

/// The first line of `$HOME/.lootrc` names the library to load at startup.
fn library_path() -> PathBuf {
    let Some(home) = env::var_os("HOME") else {
        warn!("HOME is not set; looking for {}", DEFAULT_LIBRARY);
        return PathBuf::from(DEFAULT_LIBRARY);
    };

    let rc = Path::new(&home).join(".lootrc");
    let configured = std::fs::read_to_string(&rc).ok().and_then(|contents| {
        contents.lines().next().map(str::trim).filter(|line| !line.is_empty()).map(PathBuf::from)
    });
    configured.unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY))
}

fn repl(context: &mut EvaluationContext) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut buffer = String::new();
    let mut first_line = 1;

    loop {
        if buffer.trim().is_empty() {
            first_line += buffer.matches('\n').count();
            buffer.clear();
            write!(stdout, "USER> ")?;
            stdout.flush()?;
        }

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 { break; }
        buffer.push_str(&line);

        // Keep reading until the input no longer ends inside a form.
        if !context.is_complete(&buffer) { continue; }
        context.load_source_at("stdin", first_line, &buffer, Mode::Interactive, &mut stdout)?;
        first_line += buffer.matches('\n').count();
        buffer.clear();
    }

    writeln!(stdout)?;
    Ok(())
}

fn run() -> anyhow::Result<()> {
    let progname = progname();
    let runtime = RuntimeContext::with_max_depth(max_depth());
    let mut context = EvaluationContext::with_handlers(runtime, ExceptionStack::new(progname, Uncaught::Abort));
    let mut stdout = io::stdout();

    let library = library_path();
    if library.exists() {
        debug!("bootstrapping from {}", library.display());
        context.load_file(&library, Mode::Batch, &mut stdout)?;
    } else {
        warn!("library {} not found", library.display());
    }

    let files: Vec<String> = env::args().skip(1).collect();
    if files.is_empty() {
        return repl(&mut context);
    }

    for file in files {
        let report = context.load_file(&file, Mode::Batch, &mut stdout)?;
        debug!("{}: {} forms evaluated, {} errors", file, report.evaluated, report.errors.len());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let level = if env::var_os("LOOT_DEBUG").is_some() { LevelFilter::Debug } else { LevelFilter::Warn };
    SimpleLogger::new().with_level(level).init()?;

    let interpreter = std::thread::Builder::new()
        .name("loot".to_owned())
        .stack_size(STACK_SIZE)
        .spawn(run)?;

    match interpreter.join() {
        Ok(result) => result,
        Err(_) => bail!("interpreter thread panicked"),
    }
}
