use std::{cell::Cell, io::Write, path::Path};

use anyhow::Context;
use log::debug;

use crate::{
    analyzer::Keywords,
    builtin::install_primitives,
    control::{ExceptionStack, Handled, Handler, Uncaught},
    environment::Environment,
    error::{ErrorKind, LootError, LootResult},
    expression::{Expr, Symbol, SymbolTable},
    interpreter::eval,
    parser::{parse, Reader},
    MAX_CALL_DEPTH,
};


/// Interpreter state shared by every evaluation: the symbol table, the
/// interned keywords and the procedure call depth.
pub struct RuntimeContext {
    symbols: SymbolTable,
    keywords: Keywords,
    depth: Cell<usize>,
    max_depth: usize,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_CALL_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        let symbols = SymbolTable::new();
        let keywords = Keywords::new(&symbols);
        Self { symbols, keywords, depth: Cell::new(0), max_depth }
    }

    pub fn intern(&self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn keywords(&self) -> &Keywords {
        &self.keywords
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Account for one more nested procedure application. The returned guard
    /// gives the level back when dropped, however the call ends.
    pub(crate) fn enter_call(&self) -> LootResult<CallDepth<'_>> {
        let level = self.depth.get() + 1;
        if level > self.max_depth {
            return Err(LootError::eval("recursion too deep"));
        }
        self.depth.set(level);
        Ok(CallDepth { depth: &self.depth, level })
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct CallDepth<'a> {
    depth: &'a Cell<usize>,
    level: usize,
}

impl<'a> CallDepth<'a> {
    pub fn level(&self) -> usize {
        self.level
    }
}

impl<'a> Drop for CallDepth<'a> {
    fn drop(&mut self) {
        self.depth.set(self.level - 1);
    }
}

/// How a loaded source presents its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print every value as `--> value`.
    Interactive,
    Batch,
}

/// Summary of one [`EvaluationContext::load_source`] run.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub evaluated: usize,
    pub errors: Vec<LootError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

const RECOVERABLE: &[ErrorKind] = &[ErrorKind::Read, ErrorKind::Syntax, ErrorKind::Eval, ErrorKind::Eof];

/// A global environment with the primitives installed, plus the handler
/// stack of the top-level load loop.
pub struct EvaluationContext {
    runtime: RuntimeContext,
    global: Environment,
    handlers: ExceptionStack,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::with_handlers(RuntimeContext::new(), ExceptionStack::new("loot", Uncaught::Propagate))
    }

    pub fn with_handlers(runtime: RuntimeContext, handlers: ExceptionStack) -> Self {
        let global = Environment::new();
        install_primitives(&global, &runtime);
        Self { runtime, global, handlers }
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    pub fn global(&self) -> &Environment {
        &self.global
    }

    pub fn evaluate(&mut self, expr: &Expr) -> LootResult<Option<Expr>> {
        eval(expr, &self.global, &self.runtime)
    }

    /// Evaluate every form of `input` in order and return the last result.
    pub fn evaluate_str(&mut self, input: &str) -> LootResult<Option<Expr>> {
        let forms = parse(input, self.runtime.symbols())?;

        let mut result = None;
        for form in &forms {
            result = self.evaluate(form)?;
        }
        Ok(result)
    }

    /// Whether `input` holds only complete forms, so that reading it cannot
    /// hit the end of input in the middle of one.
    pub fn is_complete(&self, input: &str) -> bool {
        !matches!(parse(input, self.runtime.symbols()), Err(LootError { kind: ErrorKind::Eof, .. }))
    }

    /// Read and evaluate the forms of `source` one at a time. Each form runs
    /// under a warning handler, so a failing form is reported and the next
    /// one still runs. A read failure ends the source.
    pub fn load_source(&mut self, name: &str, source: &str, mode: Mode, out: &mut impl Write) -> anyhow::Result<LoadReport> {
        self.load_source_at(name, 1, source, mode, out)
    }

    /// Like [`EvaluationContext::load_source`], with locations numbered
    /// from `first_line`. The REPL uses this to keep counting lines across
    /// prompts.
    pub fn load_source_at(&mut self, name: &str, first_line: usize, source: &str, mode: Mode, out: &mut impl Write) -> anyhow::Result<LoadReport> {
        debug!("loading {} from line {}", name, first_line);

        let mut report = LoadReport::default();
        let mut reader = Reader::new(name, source).starting_at_line(first_line);
        let (runtime, global) = (&self.runtime, &self.global);

        loop {
            let step = self.handlers.protect(Handler::warn(RECOVERABLE), |_| {
                let Some((form, location)) = reader.next_form(runtime.symbols())? else { return Ok(None) };
                debug!("evaluating form at {}", location);
                eval(&form, global, runtime).map(Some).map_err(|error| error.at(&location))
            })?;

            match step {
                Handled::Completed(None) => break,
                Handled::Completed(Some(value)) => {
                    report.evaluated += 1;
                    if let (Mode::Interactive, Some(value)) = (mode, value) {
                        writeln!(out, "--> {}", value)?;
                    }
                }
                Handled::Recovered(error) => {
                    let fatal = matches!(error.kind, ErrorKind::Read | ErrorKind::Eof);
                    report.errors.push(error);
                    if fatal { break; }
                }
            }
        }

        Ok(report)
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>, mode: Mode, out: &mut impl Write) -> anyhow::Result<LoadReport> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        self.load_source(&path.display().to_string(), &source, mode, out)
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}
