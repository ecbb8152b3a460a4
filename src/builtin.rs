use std::cmp::Ordering;

use itertools::Itertools;

use crate::{
    context::RuntimeContext,
    environment::Environment,
    error::{LootError, LootResult},
    expression::{is_equal, iseq, Expr, PrimitiveFn, Procedure},
    interpreter::{apply, Outcome},
    number::Number,
};


fn wrong_arity(name: &str) -> LootError {
    LootError::eval(format!("{}: wrong number of arguments", name))
}

fn arguments<const N: usize>(name: &str, values: Expr) -> LootResult<[Expr; N]> {
    let values = values.to_vec().unwrap_or_default();
    <[Expr; N]>::try_from(values).map_err(|_| wrong_arity(name))
}

fn number(name: &str, value: &Expr) -> LootResult<Number> {
    Number::from_expr(value).ok_or_else(|| LootError::eval(format!("{}: not a number {}", name, value)))
}

fn numbers(name: &str, values: Expr) -> LootResult<Vec<Number>> {
    values.iter().map(|value| number(name, &value)).collect()
}

fn integer(name: &str, value: &Expr) -> LootResult<i64> {
    match value {
        Expr::Fixnum(value) => Ok(*value),
        other => Err(LootError::eval(format!("{}: not an integer {}", name, other))),
    }
}

fn proper_list(name: &str, value: &Expr) -> LootResult<Vec<Expr>> {
    value.to_vec().ok_or_else(|| LootError::eval(format!("{}: should be a proper list {}", name, value)))
}

fn procedure(name: &str, value: &Expr) -> LootResult<()> {
    if !value.is_procedure() {
        return Err(LootError::eval(format!("{}: not a procedure {}", name, value)));
    }
    Ok(())
}

fn call(name: &str, function: &Expr, values: impl IntoIterator<Item = Expr>, ctx: &RuntimeContext) -> LootResult<Expr> {
    apply(function, Expr::list(values), ctx)?
        .ok_or_else(|| LootError::eval(format!("{}: procedure returns no value", name)))
}

fn boolean(value: bool) -> Outcome {
    Ok(Some(Expr::Boolean(value)))
}

fn builtin_add(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let sum = numbers("+", values)?.into_iter().try_fold(Number::Fixnum(0), Number::add)?;
    Ok(Some(sum.into_expr()))
}

fn builtin_mul(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let product = numbers("*", values)?.into_iter().try_fold(Number::Fixnum(1), Number::mul)?;
    Ok(Some(product.into_expr()))
}

/// `-` and `/` share a shape: with one operand they apply to the identity.
fn builtin_fold_inverse(name: &str, values: Expr, identity: Number, f: fn(Number, Number) -> LootResult<Number>) -> Outcome {
    let values = numbers(name, values)?;
    let result = match values.split_first() {
        None => return Err(wrong_arity(name)),
        Some((single, [])) => f(identity, *single)?,
        Some((first, rest)) => rest.iter().try_fold(*first, |acc, value| f(acc, *value))?,
    };
    Ok(Some(result.into_expr()))
}

fn builtin_sub(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_fold_inverse("-", values, Number::Fixnum(0), Number::sub)
}

fn builtin_div(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_fold_inverse("/", values, Number::Fixnum(1), Number::div)
}

fn builtin_integer_division(name: &str, values: Expr, f: fn(i64, i64) -> Option<i64>) -> Outcome {
    let [a, b] = arguments::<2>(name, values)?;
    let (a, b) = (integer(name, &a)?, integer(name, &b)?);
    if b == 0 { return Err(LootError::eval("division by zero")); }

    let result = f(a, b).ok_or_else(|| LootError::eval("integer overflow"))?;
    Ok(Some(Expr::Fixnum(result)))
}

fn builtin_quotient(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_integer_division("quotient", values, i64::checked_div)
}

fn builtin_remainder(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_integer_division("remainder", values, i64::checked_rem)
}

fn builtin_modulo(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_integer_division("modulo", values, |a, b| {
        let remainder = a.checked_rem(b)?;
        if remainder != 0 && (remainder < 0) != (b < 0) { remainder.checked_add(b) } else { Some(remainder) }
    })
}

fn builtin_abs(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [value] = arguments::<1>("abs", values)?;
    let value = number("abs", &value)?;
    let result = match value.compare(&Number::Fixnum(0)) {
        Some(Ordering::Less) => Number::Fixnum(0).sub(value)?,
        _ => value,
    };
    Ok(Some(result.into_expr()))
}

fn builtin_compare(name: &str, values: Expr, accept: fn(Ordering) -> bool) -> Outcome {
    let values = numbers(name, values)?;
    if values.is_empty() { return Err(wrong_arity(name)); }

    boolean(values.iter().tuple_windows().all(|(a, b)| a.compare(b).map_or(false, accept)))
}

fn builtin_num_eq(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_compare("=", values, Ordering::is_eq)
}

fn builtin_less(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_compare("<", values, Ordering::is_lt)
}

fn builtin_greater(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_compare(">", values, Ordering::is_gt)
}

fn builtin_less_eq(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_compare("<=", values, Ordering::is_le)
}

fn builtin_greater_eq(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_compare(">=", values, Ordering::is_ge)
}

fn builtin_float(name: &str, values: Expr, f: fn(f64) -> f64) -> Outcome {
    let [value] = arguments::<1>(name, values)?;
    Ok(Some(Expr::Float(f(number(name, &value)?.to_f64()))))
}

fn builtin_sqrt(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_float("sqrt", values, f64::sqrt)
}

fn builtin_exp(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_float("exp", values, f64::exp)
}

fn builtin_log(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_float("log", values, f64::ln)
}

fn builtin_sin(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_float("sin", values, f64::sin)
}

fn builtin_cos(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_float("cos", values, f64::cos)
}

fn builtin_tan(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_float("tan", values, f64::tan)
}

fn builtin_atan(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    builtin_float("atan", values, f64::atan)
}

fn exact_parts(name: &str, values: Expr) -> LootResult<(i64, i64)> {
    let [value] = arguments::<1>(name, values)?;
    match number(name, &value)? {
        Number::Fixnum(value) => Ok((value, 1)),
        Number::Rational(value) => Ok((value.numerator(), value.denominator())),
        Number::Float(_) => Err(LootError::eval(format!("{}: not an exact number {}", name, value))),
    }
}

fn builtin_numerator(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    exact_parts("numerator", values).map(|(num, _)| Some(Expr::Fixnum(num)))
}

fn builtin_denominator(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    exact_parts("denominator", values).map(|(_, den)| Some(Expr::Fixnum(den)))
}

fn builtin_cons(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [car, cdr] = arguments::<2>("cons", values)?;
    Ok(Some(Expr::cons(car, cdr)))
}

fn builtin_car(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [pair] = arguments::<1>("car", values)?;
    pair.car().map(Some).ok_or_else(|| LootError::eval(format!("car: should be a pair {}", pair)))
}

fn builtin_cdr(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [pair] = arguments::<1>("cdr", values)?;
    pair.cdr().map(Some).ok_or_else(|| LootError::eval(format!("cdr: should be a pair {}", pair)))
}

fn builtin_list(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    Ok(Some(values))
}

fn builtin_length(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [list] = arguments::<1>("length", values)?;
    let length = proper_list("length", &list)?.len();
    Ok(Some(Expr::Fixnum(length as i64)))
}

fn builtin_append(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let mut lists = values.to_vec().unwrap_or_default();
    let Some(tail) = lists.pop() else { return Ok(Some(Expr::Null)) };

    let mut items = vec![];
    for list in &lists {
        items.extend(proper_list("append", list)?);
    }
    Ok(Some(Expr::list_with_tail(items, tail)))
}

fn builtin_reverse(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [list] = arguments::<1>("reverse", values)?;
    let items = proper_list("reverse", &list)?;
    Ok(Some(Expr::list(items.into_iter().rev())))
}

fn builtin_map(values: Expr, ctx: &RuntimeContext) -> Outcome {
    let [function, list] = arguments::<2>("map", values)?;
    procedure("map", &function)?;

    let mapped = proper_list("map", &list)?.into_iter()
        .map(|item| call("map", &function, [item], ctx))
        .collect::<LootResult<Vec<_>>>()?;
    Ok(Some(Expr::list(mapped)))
}

fn builtin_filter(values: Expr, ctx: &RuntimeContext) -> Outcome {
    let [function, list] = arguments::<2>("filter", values)?;
    procedure("filter", &function)?;

    let mut kept = vec![];
    for item in proper_list("filter", &list)? {
        if call("filter", &function, [item.clone()], ctx)?.is_true() {
            kept.push(item);
        }
    }
    Ok(Some(Expr::list(kept)))
}

fn builtin_reduce(values: Expr, ctx: &RuntimeContext) -> Outcome {
    let [function, list, initial] = arguments::<3>("reduce", values)?;
    procedure("reduce", &function)?;

    proper_list("reduce", &list)?.into_iter()
        .try_fold(initial, |acc, item| call("reduce", &function, [acc, item], ctx))
        .map(Some)
}

fn builtin_apply(values: Expr, ctx: &RuntimeContext) -> Outcome {
    let mut values = values.to_vec().unwrap_or_default();
    if values.len() < 2 { return Err(wrong_arity("apply")); }

    let spread = values.pop().map(|last| proper_list("apply", &last)).transpose()?.unwrap_or_default();
    let function = values.remove(0);
    apply(&function, Expr::list(values.into_iter().chain(spread)), ctx)
}

fn predicate(name: &str, values: Expr, test: impl Fn(&Expr) -> bool) -> Outcome {
    let [value] = arguments::<1>(name, values)?;
    boolean(test(&value))
}

fn builtin_is_null(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("null?", values, Expr::is_null)
}

fn builtin_is_pair(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("pair?", values, Expr::is_pair)
}

fn builtin_is_list(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("list?", values, Expr::is_list)
}

fn builtin_is_number(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("number?", values, Expr::is_number)
}

fn builtin_is_integer(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("integer?", values, |value| match value {
        Expr::Fixnum(_) => true,
        Expr::Float(value) => value.is_finite() && value.fract() == 0.0,
        _ => false,
    })
}

fn builtin_is_rational(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("rational?", values, |value| matches!(value, Expr::Fixnum(_) | Expr::Rational(_)))
}

fn builtin_is_float(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("float?", values, |value| matches!(value, Expr::Float(_)))
}

fn builtin_is_symbol(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("symbol?", values, Expr::is_atom)
}

fn builtin_is_string(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("string?", values, |value| matches!(value, Expr::String(_)))
}

fn builtin_is_char(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("char?", values, |value| matches!(value, Expr::Char(_)))
}

fn builtin_is_boolean(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("boolean?", values, |value| matches!(value, Expr::Boolean(_)))
}

fn builtin_is_procedure(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("procedure?", values, Expr::is_procedure)
}

fn builtin_not(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    predicate("not", values, |value| !value.is_true())
}

fn builtin_eq(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [a, b] = arguments::<2>("eq?", values)?;
    boolean(iseq(&a, &b))
}

fn builtin_equal(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [a, b] = arguments::<2>("equal?", values)?;
    boolean(is_equal(&a, &b))
}

fn builtin_display(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [value] = arguments::<1>("display", values)?;
    print!("{}", value.display());
    Ok(None)
}

fn builtin_write(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [value] = arguments::<1>("write", values)?;
    print!("{}", value);
    Ok(None)
}

fn builtin_newline(values: Expr, _ctx: &RuntimeContext) -> Outcome {
    let [] = arguments::<0>("newline", values)?;
    println!();
    Ok(None)
}

const PRIMITIVES: &[(&str, PrimitiveFn)] = &[
    ("+", builtin_add),
    ("-", builtin_sub),
    ("*", builtin_mul),
    ("/", builtin_div),
    ("quotient", builtin_quotient),
    ("remainder", builtin_remainder),
    ("modulo", builtin_modulo),
    ("abs", builtin_abs),

    ("=", builtin_num_eq),
    ("<", builtin_less),
    (">", builtin_greater),
    ("<=", builtin_less_eq),
    (">=", builtin_greater_eq),

    ("sqrt", builtin_sqrt),
    ("exp", builtin_exp),
    ("log", builtin_log),
    ("sin", builtin_sin),
    ("cos", builtin_cos),
    ("tan", builtin_tan),
    ("atan", builtin_atan),
    ("numerator", builtin_numerator),
    ("denominator", builtin_denominator),

    ("cons", builtin_cons),
    ("car", builtin_car),
    ("cdr", builtin_cdr),
    ("list", builtin_list),
    ("length", builtin_length),
    ("append", builtin_append),
    ("reverse", builtin_reverse),
    ("map", builtin_map),
    ("filter", builtin_filter),
    ("reduce", builtin_reduce),
    ("apply", builtin_apply),

    ("null?", builtin_is_null),
    ("pair?", builtin_is_pair),
    ("list?", builtin_is_list),
    ("number?", builtin_is_number),
    ("integer?", builtin_is_integer),
    ("rational?", builtin_is_rational),
    ("float?", builtin_is_float),
    ("symbol?", builtin_is_symbol),
    ("string?", builtin_is_string),
    ("char?", builtin_is_char),
    ("boolean?", builtin_is_boolean),
    ("procedure?", builtin_is_procedure),
    ("eq?", builtin_eq),
    ("equal?", builtin_equal),
    ("not", builtin_not),

    ("display", builtin_display),
    ("write", builtin_write),
    ("newline", builtin_newline),
];

/// Bind every primitive procedure in `environment`.
pub(crate) fn install_primitives(environment: &Environment, ctx: &RuntimeContext) {
    for (name, function) in PRIMITIVES {
        let symbol = ctx.intern(name);
        environment.install(symbol.clone(), Expr::procedure(Procedure::primitive(symbol, *function)));
    }
}


#[cfg(test)]
mod tests {
    use crate::{context::EvaluationContext, error::ErrorKind};

    fn eval(source: &str) -> anyhow::Result<String> {
        let mut context = EvaluationContext::new();
        let value = context.evaluate_str(source)?;
        Ok(value.map_or_else(String::new, |value| value.to_string()))
    }

    fn eval_error(source: &str) -> String {
        let mut context = EvaluationContext::new();
        match context.evaluate_str(source) {
            Err(error) => {
                assert_eq!(error.kind, ErrorKind::Eval, "{}: {}", source, error);
                error.message
            }
            Ok(value) => panic!("{} evaluated to {:?}", source, value),
        }
    }

    #[test]
    fn exact_arithmetic() -> anyhow::Result<()> {
        assert_eq!(eval("(+)")?, "0");
        assert_eq!(eval("(* 2 3 4)")?, "24");
        assert_eq!(eval("(- 5)")?, "-5");
        assert_eq!(eval("(- 10 1 2)")?, "7");
        assert_eq!(eval("(/ 1 3)")?, "1/3");
        assert_eq!(eval("(/ 2)")?, "1/2");
        assert_eq!(eval("(+ 1/2 1/2)")?, "1");
        assert_eq!(eval("(* 2/3 3/4)")?, "1/2");
        Ok(())
    }

    #[test]
    fn floats_are_contagious() -> anyhow::Result<()> {
        assert_eq!(eval("(+ 1/2 0.5)")?, "1.000000e+00");
        assert_eq!(eval("(sqrt 4)")?, "2.000000e+00");
        assert_eq!(eval("(/ 1.0 0)")?, "inf");
        Ok(())
    }

    #[test]
    fn integer_division() -> anyhow::Result<()> {
        assert_eq!(eval("(quotient 17 5)")?, "3");
        assert_eq!(eval("(remainder -17 5)")?, "-2");
        assert_eq!(eval("(modulo -17 5)")?, "3");
        assert_eq!(eval("(modulo 17 -5)")?, "-3");
        assert_eq!(eval_error("(quotient 1 0)"), "division by zero");
        assert_eq!(eval_error("(/ 1 0)"), "division by zero");
        Ok(())
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(eval_error("(* 9223372036854775807 2)"), "integer overflow");
        assert_eq!(eval_error("(quotient -9223372036854775808 -1)"), "integer overflow");
    }

    #[test]
    fn comparisons_chain() -> anyhow::Result<()> {
        assert_eq!(eval("(< 1 2 3)")?, "#t");
        assert_eq!(eval("(< 1 3 2)")?, "#f");
        assert_eq!(eval("(= 1/2 0.5)")?, "#t");
        assert_eq!(eval("(>= 3 3 1)")?, "#t");
        assert!(eval_error("(< 1 'a)").starts_with("<: not a number"));
        Ok(())
    }

    #[test]
    fn rational_accessors() -> anyhow::Result<()> {
        assert_eq!(eval("(numerator 6/4)")?, "3");
        assert_eq!(eval("(denominator 6/4)")?, "2");
        assert_eq!(eval("(denominator 5)")?, "1");
        assert_eq!(eval("(abs -1/2)")?, "1/2");
        Ok(())
    }

    #[test]
    fn list_operations() -> anyhow::Result<()> {
        assert_eq!(eval("(cons 1 '(2))")?, "(1 2)");
        assert_eq!(eval("(car '(a b))")?, "a");
        assert_eq!(eval("(cdr '(a b))")?, "(b)");
        assert_eq!(eval("(length '(1 2 3))")?, "3");
        assert_eq!(eval("(append '(1) '(2 3) 4)")?, "(1 2 3 . 4)");
        assert_eq!(eval("(append)")?, "()");
        assert_eq!(eval("(reverse '(1 2 3))")?, "(3 2 1)");
        assert!(eval_error("(car '())").starts_with("car: should be a pair"));
        assert!(eval_error("(length '(1 . 2))").starts_with("length: should be a proper list"));
        assert_eq!(eval_error("(cons 1)"), "cons: wrong number of arguments");
        Ok(())
    }

    #[test]
    fn higher_order() -> anyhow::Result<()> {
        assert_eq!(eval("(map (lambda (x) (* x x)) '(1 2 3))")?, "(1 4 9)");
        assert_eq!(eval("(filter (lambda (x) (> x 1)) '(1 2 3))")?, "(2 3)");
        assert_eq!(eval("(reduce + '(1 2 3) 10)")?, "16");
        assert_eq!(eval("(apply + 1 2 '(3 4))")?, "10");
        assert_eq!(eval("(apply list '())")?, "()");
        assert!(eval_error("(apply + 1)").starts_with("apply: should be a proper list"));
        Ok(())
    }

    #[test]
    fn predicates() -> anyhow::Result<()> {
        assert_eq!(eval("(list (null? '()) (pair? '()) (list? '(1)) (symbol? 'a) (string? \"s\"))")?, "(#t #f #t #t #t)");
        assert_eq!(eval("(list (integer? 2) (integer? 2.0) (rational? 1/2) (float? 1/2) (number? 'a))")?, "(#t #t #t #f #f)");
        assert_eq!(eval("(list (char? #\\a) (boolean? #f) (procedure? car) (not 0) (not #f))")?, "(#t #t #t #f #t)");
        assert_eq!(eval("(list (eq? 'a 'a) (eq? '(1) '(1)) (equal? '(1) '(1)))")?, "(#t #f #t)");
        Ok(())
    }
}
