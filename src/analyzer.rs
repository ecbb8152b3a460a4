use std::{collections::HashMap, rc::Rc};

use itertools::Itertools;

use crate::{
    context::RuntimeContext,
    error::{LootError, LootResult},
    expression::{Expr, Symbol, SymbolTable},
};

pub type AnalysisResult = LootResult<EvalProc>;


/// Symbols that introduce special forms or mark clause structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Define,
    Quote,
    If,
    Begin,
    Cond,
    Lambda,
    And,
    Or,
    Let,
    Set,
    SetCar,
    SetCdr,
    Else,
    Arrow,
    Quasiquote,
    Unquote,
    UnquoteSplicing,
}

impl Keyword {
    pub const ALL: [Keyword; 17] = [
        Self::Define, Self::Quote, Self::If, Self::Begin, Self::Cond, Self::Lambda,
        Self::And, Self::Or, Self::Let, Self::Set, Self::SetCar, Self::SetCdr,
        Self::Else, Self::Arrow, Self::Quasiquote, Self::Unquote, Self::UnquoteSplicing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Define => "define",
            Self::Quote => "quote",
            Self::If => "if",
            Self::Begin => "begin",
            Self::Cond => "cond",
            Self::Lambda => "lambda",
            Self::And => "and",
            Self::Or => "or",
            Self::Let => "let",
            Self::Set => "set!",
            Self::SetCar => "set-car!",
            Self::SetCdr => "set-cdr!",
            Self::Else => "else",
            Self::Arrow => "=>",
            Self::Quasiquote => "quasiquote",
            Self::Unquote => "unquote",
            Self::UnquoteSplicing => "unquote-splicing",
        }
    }
}

/// The interned keyword symbols of one runtime.
pub struct Keywords {
    by_symbol: HashMap<Symbol, Keyword>,
    symbols: HashMap<Keyword, Symbol>,
}

impl Keywords {
    pub fn new(table: &SymbolTable) -> Self {
        let symbols: HashMap<Keyword, Symbol> = Keyword::ALL.iter()
            .map(|keyword| (*keyword, table.intern(keyword.name())))
            .collect();
        let by_symbol = symbols.iter()
            .map(|(keyword, symbol)| (symbol.clone(), *keyword))
            .collect();

        Self { by_symbol, symbols }
    }

    pub fn classify(&self, symbol: &Symbol) -> Option<Keyword> {
        self.by_symbol.get(symbol).copied()
    }

    pub fn symbol(&self, keyword: Keyword) -> Symbol {
        self.symbols[&keyword].clone()
    }

    pub fn atom(&self, keyword: Keyword) -> Expr {
        Expr::Atom(self.symbol(keyword))
    }

    fn is(&self, expr: &Expr, keyword: Keyword) -> bool {
        expr.as_symbol().and_then(|symbol| self.classify(symbol)) == Some(keyword)
    }

    /// The operand of a two-element form `(keyword operand)`.
    fn operand(&self, expr: &Expr, keyword: Keyword) -> Option<Expr> {
        let pair = expr.as_pair()?;
        if !self.is(&pair.car(), keyword) { return None; }

        let rest = pair.cdr();
        let rest = rest.as_pair()?;
        if !rest.cdr().is_null() { return None; }
        Some(rest.car())
    }
}

/// Formal parameters of a procedure: fixed names plus an optional rest name.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub fixed: Vec<Symbol>,
    pub rest: Option<Symbol>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    Car,
    Cdr,
}

impl Place {
    pub fn form_name(self) -> &'static str {
        match self {
            Self::Car => "set-car!",
            Self::Cdr => "set-cdr!",
        }
    }
}

#[derive(Debug)]
pub enum Clause {
    Else(EvalProc),
    Test { test: EvalProc, body: Option<EvalProc> },
    Arrow { test: EvalProc, receiver: EvalProc },
}

/// Copy plan for a quasiquote template. Pairs are rebuilt on every
/// evaluation; only the active unquote sites are evaluated.
#[derive(Debug)]
pub enum Template {
    Literal(Expr),
    Unquote(Box<EvalProc>),
    Splice { list: Box<EvalProc>, rest: Box<Template> },
    Pair(Box<Template>, Box<Template>),
}

/// A compiled expression, re-executable against any environment.
#[derive(Debug)]
pub enum EvalProc {
    SelfEvaluating(Expr),
    Quote(Expr),
    Variable(Symbol),
    Define { name: Symbol, value: Box<EvalProc> },
    If { test: Box<EvalProc>, consequent: Box<EvalProc>, alternative: Option<Box<EvalProc>> },
    Begin(Vec<EvalProc>),
    Lambda { parameters: Rc<Parameters>, body: Rc<EvalProc> },
    Cond(Vec<Clause>),
    And(Vec<EvalProc>),
    Or(Vec<EvalProc>),
    Set { name: Symbol, value: Box<EvalProc> },
    SetPair { place: Place, target: Box<EvalProc>, value: Box<EvalProc> },
    Quasiquote(Template),
    Application { operator: Box<EvalProc>, operands: Vec<EvalProc> },
}

fn bad_syntax(form: &Expr) -> LootError {
    LootError::syntax(format!("bad syntax in {}", form))
}

/// Compile `expr` into an [`EvalProc`], checking the syntax of every special form.
pub fn analyze(expr: &Expr, ctx: &RuntimeContext) -> AnalysisResult {
    if expr.is_self_evaluating() {
        return Ok(EvalProc::SelfEvaluating(expr.clone()));
    }
    match expr.as_symbol() {
        Some(symbol) => Ok(EvalProc::Variable(symbol.clone())),
        None => analyze_form(expr, ctx),
    }
}

fn analyze_form(form: &Expr, ctx: &RuntimeContext) -> AnalysisResult {
    let list = form.to_vec().ok_or_else(|| bad_syntax(form))?;
    let keyword = list[0].as_symbol().and_then(|symbol| ctx.keywords().classify(symbol));

    match keyword {
        Some(Keyword::Quote) => analyze_quote(form, &list),
        Some(Keyword::Define) => analyze_define(form, &list, ctx),
        Some(Keyword::If) => analyze_if(form, &list, ctx),
        Some(Keyword::Begin) => analyze_begin(form, &list, ctx),
        Some(Keyword::Lambda) => analyze_lambda(form, &list, ctx),
        Some(Keyword::Cond) => analyze_cond(form, &list, ctx),
        Some(Keyword::And) => analyze_sequence_of(&list[1..], ctx).map(EvalProc::And),
        Some(Keyword::Or) => analyze_sequence_of(&list[1..], ctx).map(EvalProc::Or),
        Some(Keyword::Let) => analyze_let(form, &list, ctx),
        Some(Keyword::Set) => analyze_set(form, &list, ctx),
        Some(Keyword::SetCar) => analyze_set_pair(form, &list, Place::Car, ctx),
        Some(Keyword::SetCdr) => analyze_set_pair(form, &list, Place::Cdr, ctx),
        Some(Keyword::Quasiquote) => analyze_quasiquote(form, &list, ctx),
        Some(keyword @ (Keyword::Unquote | Keyword::UnquoteSplicing))
            => Err(LootError::syntax(format!("{}: not in quasiquote {}", keyword.name(), form))),
        Some(Keyword::Else | Keyword::Arrow) | None => analyze_application(&list, ctx),
    }
}

fn analyze_sequence_of(forms: &[Expr], ctx: &RuntimeContext) -> LootResult<Vec<EvalProc>> {
    forms.iter().map(|form| analyze(form, ctx)).collect()
}

/// A body of one or more forms: a single form stands alone, several become a `begin`.
fn analyze_sequence(forms: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    match forms {
        [single] => analyze(single, ctx),
        forms => analyze_sequence_of(forms, ctx).map(EvalProc::Begin),
    }
}

fn analyze_quote(form: &Expr, list: &[Expr]) -> AnalysisResult {
    if list.len() != 2 { return Err(bad_syntax(form)); }
    Ok(EvalProc::Quote(list[1].clone()))
}

/// Split a `define` form into the defined name and its value expression,
/// rewriting the procedure shortcut `(define (name . params) body...)`.
fn normalize_define(form: &Expr, list: &[Expr], ctx: &RuntimeContext) -> LootResult<(Symbol, Expr)> {
    match list.get(1) {
        Some(Expr::Atom(name)) => {
            if list.len() != 3 { return Err(bad_syntax(form)); }
            Ok((name.clone(), list[2].clone()))
        }
        Some(Expr::Pair(signature)) => {
            let name = signature.car().as_symbol().cloned()
                .ok_or_else(|| LootError::syntax(format!("define: should be a symbol {}", signature.car())))?;
            let lambda = Expr::cons(
                ctx.keywords().atom(Keyword::Lambda),
                Expr::list_with_tail([signature.cdr()], Expr::list(list[2..].iter().cloned())),
            );
            Ok((name, lambda))
        }
        Some(other) => Err(LootError::syntax(format!("define: the expression couldn't be defined {}", other))),
        None => Err(bad_syntax(form)),
    }
}

fn analyze_define(form: &Expr, list: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    let (name, value) = normalize_define(form, list, ctx)?;
    Ok(EvalProc::Define { name, value: Box::new(analyze(&value, ctx)?) })
}

fn analyze_if(form: &Expr, list: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    if list.len() != 3 && list.len() != 4 { return Err(bad_syntax(form)); }

    Ok(EvalProc::If {
        test: Box::new(analyze(&list[1], ctx)?),
        consequent: Box::new(analyze(&list[2], ctx)?),
        alternative: list.get(3).map(|alternative| analyze(alternative, ctx)).transpose()?.map(Box::new),
    })
}

fn analyze_begin(form: &Expr, list: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    if list.len() < 2 { return Err(bad_syntax(form)); }
    analyze_sequence_of(&list[1..], ctx).map(EvalProc::Begin)
}

fn parse_parameters(parameters: &Expr) -> LootResult<Parameters> {
    let mut fixed: Vec<Symbol> = Vec::new();
    let check = |symbol: &Symbol, fixed: &[Symbol]| {
        if fixed.contains(symbol) {
            return Err(LootError::syntax(format!("lambda: duplicate parameter {}", symbol)));
        }
        Ok(())
    };

    let mut items = parameters.iter();
    for item in items.by_ref() {
        let symbol = item.as_symbol()
            .ok_or_else(|| LootError::syntax(format!("lambda: should be a symbol {}", item)))?;
        check(symbol, &fixed)?;
        fixed.push(symbol.clone());
    }

    let rest = match items.rest() {
        Expr::Null => None,
        Expr::Atom(symbol) => {
            check(symbol, &fixed)?;
            Some(symbol.clone())
        }
        other => return Err(LootError::syntax(format!("lambda: should be a symbol {}", other))),
    };

    Ok(Parameters { fixed, rest })
}

fn analyze_lambda(form: &Expr, list: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    if list.len() < 3 { return Err(bad_syntax(form)); }

    let parameters = parse_parameters(&list[1])?;
    let body = analyze_body(&list[2..], ctx)?;
    Ok(EvalProc::Lambda { parameters: Rc::new(parameters), body: Rc::new(body) })
}

/// Analyze a procedure body, turning leading internal definitions into a
/// `let` whose names are all bound (to the undefined placeholder) before
/// any initializer runs.
fn analyze_body(body: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    let keywords = ctx.keywords();
    let is_definition = |form: &Expr| form.car().map_or(false, |head| keywords.is(&head, Keyword::Define));

    let split = body.iter().position(|form| !is_definition(form)).unwrap_or(body.len());
    let (definitions, rest) = body.split_at(split);
    if let Some(misplaced) = rest.iter().find(|form| is_definition(*form)) {
        return Err(LootError::syntax(format!("define: should be at the beginning of the body {}", misplaced)));
    }
    if definitions.is_empty() {
        return analyze_sequence(body, ctx);
    }

    let definitions = definitions.iter()
        .map(|definition| {
            let list = definition.to_vec().ok_or_else(|| bad_syntax(definition))?;
            normalize_define(definition, &list, ctx)
        })
        .collect::<LootResult<Vec<_>>>()?;

    let bindings = definitions.iter()
        .map(|(name, _)| Expr::list([Expr::Atom(name.clone()), Expr::Undefined]))
        .collect_vec();
    let assignments = definitions.into_iter()
        .map(|(name, value)| Expr::list([keywords.atom(Keyword::Set), Expr::Atom(name), value]));

    let rewritten = Expr::list_with_tail(
        [keywords.atom(Keyword::Let), Expr::list(bindings)],
        Expr::list(assignments.chain(rest.iter().cloned())),
    );
    analyze(&rewritten, ctx)
}

fn analyze_cond(form: &Expr, list: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    let keywords = ctx.keywords();
    let clauses = &list[1..];

    clauses.iter().enumerate().map(|(index, clause)| {
        let parts = clause.to_vec()
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| LootError::syntax(format!("cond: should be a list {}", clause)))?;
        let arrow = parts.get(1).map_or(false, |second| keywords.is(second, Keyword::Arrow));

        if keywords.is(&parts[0], Keyword::Else) {
            if index + 1 != clauses.len() {
                return Err(LootError::syntax(format!("cond: else clause must be last {}", form)));
            }
            if arrow {
                return Err(LootError::syntax(format!("cond: illegal use of arrow {}", clause)));
            }
            if parts.len() < 2 {
                return Err(LootError::syntax(format!("cond: bad clause form {}", clause)));
            }
            return Ok(Clause::Else(analyze_sequence(&parts[1..], ctx)?));
        }

        let test = analyze(&parts[0], ctx)?;
        if arrow {
            if parts.len() != 3 {
                return Err(LootError::syntax(format!("cond: bad clause form {}", clause)));
            }
            return Ok(Clause::Arrow { test, receiver: analyze(&parts[2], ctx)? });
        }

        let body = if parts.len() > 1 { Some(analyze_sequence(&parts[1..], ctx)?) } else { None };
        Ok(Clause::Test { test, body })
    }).collect::<LootResult<Vec<_>>>().map(EvalProc::Cond)
}

fn let_binding(form: &Expr, binding: &Expr) -> LootResult<(Expr, Expr)> {
    if binding.is_atom() {
        return Ok((binding.clone(), Expr::Null));
    }

    match binding.to_vec().as_deref() {
        Some([name @ Expr::Atom(_), value]) => Ok((name.clone(), value.clone())),
        _ => Err(LootError::syntax(format!("let: bad binding {} in {}", binding, form))),
    }
}

/// `let` becomes an immediate lambda application; a named `let` first
/// defines its name as the lambda so the body can recurse.
fn analyze_let(form: &Expr, list: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    let keywords = ctx.keywords();
    let (name, bindings, body) = match list.get(1) {
        Some(Expr::Atom(name)) if list.len() >= 4 => (Some(name.clone()), &list[2], &list[3..]),
        Some(Expr::Atom(_)) => return Err(bad_syntax(form)),
        Some(bindings) if list.len() >= 3 => (None, bindings, &list[2..]),
        _ => return Err(bad_syntax(form)),
    };

    let bindings = bindings.to_vec()
        .ok_or_else(|| LootError::syntax(format!("let: should be a list of bindings {}", bindings)))?
        .iter()
        .map(|binding| let_binding(form, binding))
        .collect::<LootResult<Vec<_>>>()?;
    let (parameters, arguments): (Vec<Expr>, Vec<Expr>) = bindings.into_iter().unzip();

    let lambda = Expr::list_with_tail(
        [keywords.atom(Keyword::Lambda), Expr::list(parameters)],
        Expr::list(body.iter().cloned()),
    );

    let rewritten = match name {
        Some(name) => Expr::list([
            keywords.atom(Keyword::Begin),
            Expr::list([keywords.atom(Keyword::Define), Expr::Atom(name.clone()), lambda]),
            Expr::list_with_tail([Expr::Atom(name)], Expr::list(arguments)),
        ]),
        None => Expr::list_with_tail([lambda], Expr::list(arguments)),
    };
    analyze(&rewritten, ctx)
}

fn analyze_set(form: &Expr, list: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    if list.len() != 3 { return Err(bad_syntax(form)); }

    let name = list[1].as_symbol()
        .ok_or_else(|| LootError::syntax(format!("set!: should be a symbol {}", list[1])))?;
    Ok(EvalProc::Set { name: name.clone(), value: Box::new(analyze(&list[2], ctx)?) })
}

fn analyze_set_pair(form: &Expr, list: &[Expr], place: Place, ctx: &RuntimeContext) -> AnalysisResult {
    if list.len() != 3 { return Err(bad_syntax(form)); }

    Ok(EvalProc::SetPair {
        place,
        target: Box::new(analyze(&list[1], ctx)?),
        value: Box::new(analyze(&list[2], ctx)?),
    })
}

fn illegal_splice(template: &Expr) -> LootError {
    LootError::syntax(format!("unquote-splicing: illegal context in {}", template))
}

/// Count the unquote sites that belong to the outermost quasiquote. Sites
/// nested inside inner quasiquotes only count once their depth returns to one.
pub(crate) fn count_active_unquotes(template: &Expr, depth: usize, keywords: &Keywords) -> LootResult<usize> {
    let Some(pair) = template.as_pair() else { return Ok(0) };

    if let Some(inner) = keywords.operand(template, Keyword::Quasiquote) {
        if keywords.operand(&inner, Keyword::UnquoteSplicing).is_some() {
            return Err(illegal_splice(template));
        }
        return count_active_unquotes(&inner, depth + 1, keywords);
    }

    let unquoted = keywords.operand(template, Keyword::Unquote)
        .or_else(|| keywords.operand(template, Keyword::UnquoteSplicing));
    if let Some(inner) = unquoted {
        return if depth == 1 { Ok(1) } else { count_active_unquotes(&inner, depth - 1, keywords) };
    }

    Ok(count_active_unquotes(&pair.car(), depth, keywords)? + count_active_unquotes(&pair.cdr(), depth, keywords)?)
}

fn wrap_template(keyword: Keyword, inner: Template, keywords: &Keywords) -> Template {
    Template::Pair(
        Box::new(Template::Literal(keywords.atom(keyword))),
        Box::new(Template::Pair(Box::new(inner), Box::new(Template::Literal(Expr::Null)))),
    )
}

fn compile_template(template: &Expr, depth: usize, ctx: &RuntimeContext) -> LootResult<Template> {
    let keywords = ctx.keywords();
    let Some(pair) = template.as_pair() else { return Ok(Template::Literal(template.clone())) };

    if let Some(inner) = keywords.operand(template, Keyword::Unquote) {
        if depth == 1 {
            return Ok(Template::Unquote(Box::new(analyze(&inner, ctx)?)));
        }
        return Ok(wrap_template(Keyword::Unquote, compile_template(&inner, depth - 1, ctx)?, keywords));
    }
    if let Some(inner) = keywords.operand(template, Keyword::UnquoteSplicing) {
        if depth == 1 {
            return Err(illegal_splice(template));
        }
        return Ok(wrap_template(Keyword::UnquoteSplicing, compile_template(&inner, depth - 1, ctx)?, keywords));
    }
    if let Some(inner) = keywords.operand(template, Keyword::Quasiquote) {
        return Ok(wrap_template(Keyword::Quasiquote, compile_template(&inner, depth + 1, ctx)?, keywords));
    }

    let car = pair.car();
    if depth == 1 {
        if let Some(inner) = keywords.operand(&car, Keyword::UnquoteSplicing) {
            return Ok(Template::Splice {
                list: Box::new(analyze(&inner, ctx)?),
                rest: Box::new(compile_template(&pair.cdr(), depth, ctx)?),
            });
        }
    }

    Ok(Template::Pair(
        Box::new(compile_template(&car, depth, ctx)?),
        Box::new(compile_template(&pair.cdr(), depth, ctx)?),
    ))
}

fn analyze_quasiquote(form: &Expr, list: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    if list.len() != 2 { return Err(bad_syntax(form)); }

    let template = &list[1];
    if ctx.keywords().operand(template, Keyword::UnquoteSplicing).is_some() {
        return Err(illegal_splice(form));
    }
    if count_active_unquotes(template, 1, ctx.keywords())? == 0 {
        return Ok(EvalProc::Quote(template.clone()));
    }
    compile_template(template, 1, ctx).map(EvalProc::Quasiquote)
}

fn analyze_application(list: &[Expr], ctx: &RuntimeContext) -> AnalysisResult {
    Ok(EvalProc::Application {
        operator: Box::new(analyze(&list[0], ctx)?),
        operands: analyze_sequence_of(&list[1..], ctx)?,
    })
}


#[cfg(test)]
mod tests {
    use crate::{error::ErrorKind, parser::parse};

    use super::*;

    fn analyze_str(ctx: &RuntimeContext, source: &str) -> AnalysisResult {
        let forms = parse(source, ctx.symbols())?;
        analyze(&forms[0], ctx)
    }

    fn syntax_error(ctx: &RuntimeContext, source: &str) -> String {
        match analyze_str(ctx, source) {
            Err(error) => {
                assert_eq!(error.kind, ErrorKind::Syntax, "{}: {}", source, error);
                error.message
            }
            Ok(proc) => panic!("{} analyzed to {:?}", source, proc),
        }
    }

    #[test]
    fn literals_and_variables() -> anyhow::Result<()> {
        let ctx = RuntimeContext::new();
        assert!(matches!(analyze_str(&ctx, "42")?, EvalProc::SelfEvaluating(Expr::Fixnum(42))));
        assert!(matches!(analyze_str(&ctx, "\"s\"")?, EvalProc::SelfEvaluating(Expr::String(_))));
        assert!(matches!(analyze_str(&ctx, "()")?, EvalProc::SelfEvaluating(Expr::Null)));
        assert!(matches!(analyze_str(&ctx, "#f")?, EvalProc::SelfEvaluating(Expr::Boolean(false))));
        assert!(matches!(analyze_str(&ctx, "x")?, EvalProc::Variable(_)));
        assert!(matches!(analyze_str(&ctx, "'(a b)")?, EvalProc::Quote(Expr::Pair(_))));
        Ok(())
    }

    #[test]
    fn define_shortcut_becomes_lambda() -> anyhow::Result<()> {
        let ctx = RuntimeContext::new();
        match analyze_str(&ctx, "(define (square x) (* x x))")? {
            EvalProc::Define { name, value } => {
                assert_eq!(name.as_str(), "square");
                match *value {
                    EvalProc::Lambda { parameters, .. } => assert_eq!(parameters.fixed.len(), 1),
                    other => panic!("expected lambda, got {:?}", other),
                }
            }
            other => panic!("expected define, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn parameter_shapes() -> anyhow::Result<()> {
        let ctx = RuntimeContext::new();
        for (source, fixed, rest) in [
            ("(lambda () 1)", 0, false),
            ("(lambda args 1)", 0, true),
            ("(lambda (a b) 1)", 2, false),
            ("(lambda (a . b) 1)", 1, true),
        ] {
            match analyze_str(&ctx, source)? {
                EvalProc::Lambda { parameters, .. } => {
                    assert_eq!(parameters.fixed.len(), fixed, "{}", source);
                    assert_eq!(parameters.rest.is_some(), rest, "{}", source);
                }
                other => panic!("{} analyzed to {:?}", source, other),
            }
        }
        Ok(())
    }

    #[test]
    fn malformed_special_forms() {
        let ctx = RuntimeContext::new();
        for source in [
            "(quote)", "(quote a b)", "(if)", "(if 1)", "(if 1 2 3 4)", "(begin)",
            "(lambda (x))", "(lambda)", "(define)", "(define x)", "(define x 1 2)",
            "(set! x)", "(set! 1 2)", "(set-car! p)", "(let)", "(let ((x)) x)",
            "(let loop ((i 0)))", "(quasiquote)", "(f . x)",
        ] {
            syntax_error(&ctx, source);
        }
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let ctx = RuntimeContext::new();
        assert!(syntax_error(&ctx, "(lambda (x y x) x)").contains("duplicate parameter x"));
        assert!(syntax_error(&ctx, "(lambda (x . x) x)").contains("duplicate parameter x"));
        assert!(syntax_error(&ctx, "(lambda (x 1) x)").contains("should be a symbol"));
    }

    #[test]
    fn internal_defines_must_lead_the_body() {
        let ctx = RuntimeContext::new();
        let message = syntax_error(&ctx, "(lambda () (display 1) (define x 2) x)");
        assert!(message.contains("should be at the beginning of the body"), "{}", message);
    }

    #[test]
    fn internal_defines_become_let() -> anyhow::Result<()> {
        let ctx = RuntimeContext::new();
        let proc = analyze_str(&ctx, "(lambda () (define (f) (g)) (define (g) 1) (f))")?;
        let EvalProc::Lambda { body, .. } = proc else { panic!("expected lambda") };
        // The hoisted definitions turn the body into an immediate application.
        match body.as_ref() {
            EvalProc::Application { operator, operands } => {
                assert_eq!(operands.len(), 2);
                assert!(operands.iter().all(|operand| matches!(operand, EvalProc::SelfEvaluating(Expr::Undefined))));
                assert!(matches!(operator.as_ref(), EvalProc::Lambda { .. }));
            }
            other => panic!("unexpected body {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn cond_clause_rules() -> anyhow::Result<()> {
        let ctx = RuntimeContext::new();
        assert!(syntax_error(&ctx, "(cond (else 1) (else 2))").contains("else clause must be last"));
        assert!(syntax_error(&ctx, "(cond (else 1) (#t 2))").contains("else clause must be last"));
        assert!(syntax_error(&ctx, "(cond (else => car))").contains("illegal use of arrow"));
        assert!(syntax_error(&ctx, "(cond (1 => car cdr))").contains("bad clause form"));
        assert!(syntax_error(&ctx, "(cond 1)").contains("should be a list"));

        let EvalProc::Cond(clauses) = analyze_str(&ctx, "(cond (x => car) (y) (else 1 2))")? else { panic!("expected cond") };
        assert!(matches!(clauses[0], Clause::Arrow { .. }));
        assert!(matches!(clauses[1], Clause::Test { body: None, .. }));
        assert!(matches!(clauses[2], Clause::Else(EvalProc::Begin(_))));
        Ok(())
    }

    #[test]
    fn unquote_outside_quasiquote() {
        let ctx = RuntimeContext::new();
        assert!(syntax_error(&ctx, ",x").contains("not in quasiquote"));
        assert!(syntax_error(&ctx, ",@x").contains("not in quasiquote"));
    }

    #[test]
    fn active_unquote_counting() -> anyhow::Result<()> {
        let ctx = RuntimeContext::new();
        let count = |source: &str| -> anyhow::Result<usize> {
            let template = parse(source, ctx.symbols())?.remove(0);
            Ok(count_active_unquotes(&template, 1, ctx.keywords())?)
        };

        assert_eq!(count("(a b c)")?, 0);
        assert_eq!(count("(a ,b ,@c)")?, 2);
        assert_eq!(count("(a `(b ,c))")?, 0);
        assert_eq!(count("(a `(b ,,c))")?, 1);
        assert_eq!(count("(a . ,b)")?, 1);
        Ok(())
    }

    #[test]
    fn quasiquote_without_active_sites_is_quote() -> anyhow::Result<()> {
        let ctx = RuntimeContext::new();
        assert!(matches!(analyze_str(&ctx, "`(a `(b ,c))")?, EvalProc::Quote(_)));
        assert!(matches!(analyze_str(&ctx, "`(a ,b)")?, EvalProc::Quasiquote(_)));
        Ok(())
    }

    #[test]
    fn misplaced_splices() {
        let ctx = RuntimeContext::new();
        syntax_error(&ctx, "`,@x");
        syntax_error(&ctx, "`(a . ,@x)");
        syntax_error(&ctx, "`(a `,@b)");
    }
}
