use log::debug;

use crate::error::{ErrorKind, LootError, LootResult};


/// What a handler does once it has intercepted an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Swallow the error silently.
    Catch,
    /// Print a diagnostic, then resume.
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handler {
    kinds: &'static [ErrorKind],
    recovery: Recovery,
}

impl Handler {
    pub const fn catch(kinds: &'static [ErrorKind]) -> Self {
        Self { kinds, recovery: Recovery::Catch }
    }

    pub const fn warn(kinds: &'static [ErrorKind]) -> Self {
        Self { kinds, recovery: Recovery::Warn }
    }

    pub fn handles(&self, kind: ErrorKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn recovery(&self) -> Recovery {
        self.recovery
    }
}

/// How a protected body finished.
#[derive(Debug)]
pub enum Handled<T> {
    Completed(T),
    Recovered(LootError),
}

/// What happens to an error that escapes every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uncaught {
    /// Print the failure and terminate the process.
    Abort,
    /// Hand the error back to the caller.
    Propagate,
}

/// The stack of active handlers. A handler covers exactly the dynamic extent
/// of the body passed to [`ExceptionStack::protect`]; it is popped on every
/// exit path before the outcome is inspected.
#[derive(Debug)]
pub struct ExceptionStack {
    frames: Vec<Handler>,
    progname: String,
    uncaught: Uncaught,
}

impl ExceptionStack {
    pub fn new(progname: impl Into<String>, uncaught: Uncaught) -> Self {
        Self { frames: Vec::new(), progname: progname.into(), uncaught }
    }

    pub fn progname(&self) -> &str {
        &self.progname
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Run `body` with `handler` installed. Errors of a kind the handler
    /// covers are recovered; anything else is raised to the enclosing handler.
    pub fn protect<T>(&mut self, handler: Handler, body: impl FnOnce(&mut Self) -> LootResult<T>) -> LootResult<Handled<T>> {
        let depth = self.frames.len();
        self.frames.push(handler);
        let result = body(self);
        self.frames.truncate(depth);

        match result {
            Ok(value) => Ok(Handled::Completed(value)),
            Err(error) if handler.handles(error.kind) => {
                if handler.recovery == Recovery::Warn {
                    self.report(&error);
                }
                Ok(Handled::Recovered(error))
            }
            Err(error) => self.raise(error),
        }
    }

    /// Signal `error` to the nearest enclosing handler. With no handler
    /// active the failure is fatal, unless this stack propagates.
    pub fn raise<T>(&self, error: LootError) -> LootResult<T> {
        if self.frames.is_empty() && self.uncaught == Uncaught::Abort {
            self.abort(&error);
        }
        Err(error)
    }

    fn report(&self, error: &LootError) {
        debug!("recovered from {} error at handler depth {}", error.kind, self.frames.len() + 1);
        eprintln!("{}", error.diagnostic(&self.progname));
    }

    fn abort(&self, error: &LootError) -> ! {
        match &error.location {
            Some(location) => eprintln!(
                "Uncaught exception {}: {} raised in {} at {}:{}",
                error.kind, error.message, location.file, location.line, location.col,
            ),
            None => eprintln!("Uncaught exception {}: {}", error.kind, error.message),
        }
        eprintln!("aborting...");
        std::process::exit(1)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const EVAL: &[ErrorKind] = &[ErrorKind::Eval];
    const SYNTAX: &[ErrorKind] = &[ErrorKind::Syntax];

    fn stack() -> ExceptionStack {
        ExceptionStack::new("loot", Uncaught::Propagate)
    }

    #[test]
    fn completed_bodies_pass_through() -> anyhow::Result<()> {
        let mut stack = stack();
        let outcome = stack.protect(Handler::catch(EVAL), |_| Ok(7))?;
        assert!(matches!(outcome, Handled::Completed(7)));
        assert_eq!(stack.depth(), 0);
        Ok(())
    }

    #[test]
    fn matching_errors_are_recovered() -> anyhow::Result<()> {
        let mut stack = stack();
        let outcome = stack.protect(Handler::catch(EVAL), |_| -> LootResult<()> {
            Err(LootError::eval("boom"))
        })?;

        match outcome {
            Handled::Recovered(error) => assert_eq!(error.message, "boom"),
            Handled::Completed(_) => panic!("error was not recovered"),
        }
        assert_eq!(stack.depth(), 0);
        Ok(())
    }

    #[test]
    fn other_kinds_reach_the_enclosing_handler() -> anyhow::Result<()> {
        let mut stack = stack();
        let outcome = stack.protect(Handler::catch(SYNTAX), |stack| {
            assert_eq!(stack.depth(), 1);
            let inner = stack.protect(Handler::catch(EVAL), |stack| -> LootResult<()> {
                assert_eq!(stack.depth(), 2);
                Err(LootError::syntax("bad form"))
            });
            assert_eq!(stack.depth(), 1);
            inner.map(|_| ())
        })?;

        assert!(matches!(outcome, Handled::Recovered(LootError { kind: ErrorKind::Syntax, .. })));
        assert_eq!(stack.depth(), 0);
        Ok(())
    }

    #[test]
    fn unhandled_errors_propagate_unchanged() {
        let mut stack = stack();
        let result = stack.protect(Handler::warn(SYNTAX), |_| -> LootResult<()> {
            Err(LootError::read("unexpected )"))
        });

        let error = result.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Read);
        assert_eq!(error.message, "unexpected )");
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn recovery_modes() {
        assert_eq!(Handler::warn(EVAL).recovery(), Recovery::Warn);
        assert_eq!(Handler::catch(EVAL).recovery(), Recovery::Catch);
        assert!(Handler::catch(&[ErrorKind::Eval, ErrorKind::Read]).handles(ErrorKind::Read));
        assert!(!Handler::catch(EVAL).handles(ErrorKind::Eof));
    }
}
