use log::trace;

use crate::{
    analyzer::{analyze, Clause, EvalProc, Parameters, Place, Template},
    context::RuntimeContext,
    environment::Environment,
    error::{LootError, LootResult},
    expression::{Expr, Lambda, Procedure, ProcedureKind, Symbol},
};

/// The result of running an [`EvalProc`]. `None` means the form produced no
/// value (a definition, an assignment or a one-armed `if` that was skipped).
pub type Outcome = LootResult<Option<Expr>>;


fn no_value(form: &str) -> LootError {
    LootError::eval(format!("{}: expression returns no value", form))
}

/// Run `proc` and insist that it produces a value.
fn value_of(proc: &EvalProc, environment: &Environment, ctx: &RuntimeContext, form: &str) -> LootResult<Expr> {
    execute(proc, environment, ctx)?.ok_or_else(|| no_value(form))
}

fn unbound(symbol: &Symbol) -> LootError {
    LootError::eval(format!("unbound variable {}", symbol))
}

fn lookup_variable(symbol: &Symbol, environment: &Environment) -> LootResult<Expr> {
    let binding = environment.lookup(symbol).ok_or_else(|| unbound(symbol))?;
    let value = binding.borrow().clone();
    match value {
        Expr::Undefined => Err(unbound(symbol)),
        value => Ok(value),
    }
}

fn execute_define(name: &Symbol, value: &EvalProc, environment: &Environment, ctx: &RuntimeContext) -> Outcome {
    let value = value_of(value, environment, ctx, "define")?;
    if let Expr::Procedure(procedure) = &value {
        procedure.label_if_anonymous(name);
    }
    environment.install(name.clone(), value);
    Ok(None)
}

fn execute_set(name: &Symbol, value: &EvalProc, environment: &Environment, ctx: &RuntimeContext) -> Outcome {
    let value = value_of(value, environment, ctx, "set!")?;
    let binding = environment.lookup(name).ok_or_else(|| unbound(name))?;
    *binding.borrow_mut() = value;
    Ok(None)
}

fn execute_set_pair(place: Place, target: &EvalProc, value: &EvalProc, environment: &Environment, ctx: &RuntimeContext) -> Outcome {
    let target = value_of(target, environment, ctx, place.form_name())?;
    let value = value_of(value, environment, ctx, place.form_name())?;
    let pair = target.as_pair()
        .ok_or_else(|| LootError::eval(format!("{}: should be a pair {}", place.form_name(), target)))?;

    match place {
        Place::Car => pair.set_car(value),
        Place::Cdr => pair.set_cdr(value),
    }
    Ok(None)
}

fn execute_cond(clauses: &[Clause], environment: &Environment, ctx: &RuntimeContext) -> Outcome {
    for clause in clauses {
        match clause {
            Clause::Else(body) => return execute(body, environment, ctx),
            Clause::Test { test, body } => {
                let value = value_of(test, environment, ctx, "cond")?;
                if value.is_true() {
                    return match body {
                        Some(body) => execute(body, environment, ctx),
                        None => Ok(Some(value)),
                    };
                }
            }
            Clause::Arrow { test, receiver } => {
                let value = value_of(test, environment, ctx, "cond")?;
                if value.is_true() {
                    let receiver = value_of(receiver, environment, ctx, "cond")?;
                    return apply(&receiver, Expr::list([value]), ctx);
                }
            }
        }
    }
    Ok(Some(Expr::Null))
}

fn instantiate(template: &Template, environment: &Environment, ctx: &RuntimeContext) -> LootResult<Expr> {
    match template {
        Template::Literal(expr) => Ok(expr.clone()),
        Template::Unquote(proc) => value_of(proc, environment, ctx, "unquote"),
        Template::Pair(car, cdr) => {
            let car = instantiate(car, environment, ctx)?;
            let cdr = instantiate(cdr, environment, ctx)?;
            Ok(Expr::cons(car, cdr))
        }
        Template::Splice { list, rest } => {
            let spliced = value_of(list, environment, ctx, "unquote-splicing")?;
            let items = spliced.to_vec()
                .ok_or_else(|| LootError::eval(format!("unquote-splicing: should be a proper list {}", spliced)))?;
            let rest = instantiate(rest, environment, ctx)?;
            Ok(Expr::list_with_tail(items, rest))
        }
    }
}

/// Run a compiled expression in `environment`.
pub fn execute(proc: &EvalProc, environment: &Environment, ctx: &RuntimeContext) -> Outcome {
    match proc {
        EvalProc::SelfEvaluating(expr) | EvalProc::Quote(expr) => Ok(Some(expr.clone())),
        EvalProc::Variable(symbol) => lookup_variable(symbol, environment).map(Some),
        EvalProc::Define { name, value } => execute_define(name, value, environment, ctx),
        EvalProc::If { test, consequent, alternative } => {
            if value_of(test, environment, ctx, "if")?.is_true() {
                execute(consequent, environment, ctx)
            } else if let Some(alternative) = alternative {
                execute(alternative, environment, ctx)
            } else {
                Ok(None)
            }
        }
        EvalProc::Begin(body) => {
            let mut result = None;
            for proc in body {
                result = execute(proc, environment, ctx)?;
            }
            Ok(result)
        }
        EvalProc::Lambda { parameters, body } => {
            let lambda = Lambda { parameters: parameters.clone(), body: body.clone(), environment: environment.clone() };
            Ok(Some(Expr::procedure(Procedure::compound(lambda))))
        }
        EvalProc::Cond(clauses) => execute_cond(clauses, environment, ctx),
        EvalProc::And(operands) => {
            let mut result = Expr::Boolean(true);
            for operand in operands {
                result = value_of(operand, environment, ctx, "and")?;
                if !result.is_true() { break; }
            }
            Ok(Some(result))
        }
        EvalProc::Or(operands) => {
            let mut result = Expr::Boolean(false);
            for operand in operands {
                result = value_of(operand, environment, ctx, "or")?;
                if result.is_true() { break; }
            }
            Ok(Some(result))
        }
        EvalProc::Set { name, value } => execute_set(name, value, environment, ctx),
        EvalProc::SetPair { place, target, value } => execute_set_pair(*place, target, value, environment, ctx),
        EvalProc::Quasiquote(template) => instantiate(template, environment, ctx).map(Some),
        EvalProc::Application { operator, operands } => {
            let operator = value_of(operator, environment, ctx, "application")?;
            let arguments = operands.iter()
                .map(|operand| value_of(operand, environment, ctx, "application"))
                .collect::<LootResult<Vec<_>>>()?;
            apply(&operator, Expr::list(arguments), ctx)
        }
    }
}

/// Pair each parameter with its argument. The rest parameter receives the
/// unconsumed tail of the argument list itself.
fn bind_arguments(parameters: &Parameters, arguments: Expr, procedure: &Expr) -> LootResult<Vec<(Symbol, Expr)>> {
    let mut bindings = Vec::with_capacity(parameters.fixed.len() + 1);
    let mut remaining = arguments.iter();
    for parameter in &parameters.fixed {
        let argument = remaining.next()
            .ok_or_else(|| LootError::eval(format!("too few arguments provided to {}", procedure)))?;
        bindings.push((parameter.clone(), argument));
    }

    let rest = remaining.rest().clone();
    match &parameters.rest {
        Some(parameter) => bindings.push((parameter.clone(), rest)),
        None if !rest.is_null() => return Err(LootError::eval(format!("too many arguments provided to {}", procedure))),
        None => (),
    }
    Ok(bindings)
}

/// Call `procedure` on the proper list `arguments`.
pub fn apply(procedure: &Expr, arguments: Expr, ctx: &RuntimeContext) -> Outcome {
    let Expr::Procedure(callee) = procedure else {
        return Err(LootError::eval(format!("expression is not a procedure {}", procedure)));
    };

    match &callee.kind {
        ProcedureKind::Primitive(function) => function(arguments, ctx),
        ProcedureKind::Compound(lambda) => {
            let depth = ctx.enter_call()?;
            trace!("applying {} at depth {}", procedure, depth.level());

            let bindings = bind_arguments(&lambda.parameters, arguments, procedure)?;
            let environment = Environment::extend(bindings, &lambda.environment);
            execute(&lambda.body, &environment, ctx)
        }
    }
}

/// Analyze and run a single expression.
pub fn eval(expr: &Expr, environment: &Environment, ctx: &RuntimeContext) -> Outcome {
    let proc = analyze(expr, ctx)?;
    execute(&proc, environment, ctx)
}
