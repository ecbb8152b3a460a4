mod analyzer;
mod builtin;
mod context;
mod control;
mod environment;
mod error;
mod expression;
mod interpreter;
mod number;
mod parser;

#[cfg(test)]
mod test_utils;

/// Deepest nesting of compound procedure applications before evaluation
/// fails with "recursion too deep".
pub const MAX_CALL_DEPTH: usize = 512;

pub use analyzer::{analyze, AnalysisResult, EvalProc, Keyword, Keywords, Parameters};
pub use context::{EvaluationContext, LoadReport, Mode, RuntimeContext};
pub use control::{ExceptionStack, Handled, Handler, Recovery, Uncaught};
pub use environment::{Binding, Environment, Frame};
pub use error::{ErrorKind, Location, LootError, LootResult};
pub use expression::{is_equal, iseq, Expr, Pair, PrimitiveFn, Procedure, Symbol, SymbolTable};
pub use interpreter::{apply, eval, execute, Outcome};
pub use number::{make_rational, Number, Rational};
pub use parser::{parse, Reader};
