#![no_main]

use core::fmt;

use itertools::Itertools;
use libfuzzer_sys::{arbitrary::Arbitrary, fuzz_target};

// Primitives, literals and variable references
#[derive(Arbitrary, Debug)]
enum LootAtom {
    Add, Sub, Mul, Div,
    Quotient, Modulo,
    True, False, Nil,
    Greater, Less, Eq,

    Cons, List, Car, Cdr, Length,
    Append, Reverse, Map,
    Filter, Reduce, Apply,

    Identifier(String),
    Integer(i64),
    Rational(i64, i64),
    Float(f64),
}

impl fmt::Display for LootAtom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", match self {
            LootAtom::Add => "+",
            LootAtom::Sub => "-",
            LootAtom::Mul => "*",
            LootAtom::Div => "/",
            LootAtom::Quotient => "quotient",
            LootAtom::Modulo => "modulo",
            LootAtom::True => "#t",
            LootAtom::False => "#f",
            LootAtom::Nil => "'()",
            LootAtom::Greater => ">",
            LootAtom::Less => "<",
            LootAtom::Eq => "=",
            LootAtom::Cons => "cons",
            LootAtom::List => "list",
            LootAtom::Car => "car",
            LootAtom::Cdr => "cdr",
            LootAtom::Length => "length",
            LootAtom::Append => "append",
            LootAtom::Reverse => "reverse",
            LootAtom::Map => "map",
            LootAtom::Filter => "filter",
            LootAtom::Reduce => "reduce",
            LootAtom::Apply => "apply",
            LootAtom::Identifier(identifier) => identifier.as_str(),
            LootAtom::Integer(value) => return write!(f, "{}", value),
            LootAtom::Rational(num, den) => return write!(f, "{}/{}", num, den.unsigned_abs()),
            LootAtom::Float(value) => return write!(f, "{:?}", value),
        })
    }
}

#[derive(Arbitrary, Debug)]
enum LootCommand {
    // Special forms
    Lambda(Vec<LootCommand>),
    Define(Vec<LootCommand>),
    If(Vec<LootCommand>),
    Cond(Vec<LootCommand>),
    And(Vec<LootCommand>),
    Or(Vec<LootCommand>),
    Begin(Vec<LootCommand>),
    Let(Vec<LootCommand>),
    Set(Vec<LootCommand>),
    SetCar(Vec<LootCommand>),
    Quote(Vec<LootCommand>),
    Quasiquote(Vec<LootCommand>),
    Unquote(Vec<LootCommand>),
    UnquoteSplicing(Vec<LootCommand>),
    Application(Vec<LootCommand>),

    Atom(LootAtom),
}

fn stringify_arguments(values: &[LootCommand]) -> String {
    values.iter()
        .map(LootCommand::to_string)
        .join(" ")
}

impl fmt::Display for LootCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (keyword, arguments) = match self {
            LootCommand::Atom(atom) => return atom.fmt(f),
            LootCommand::Application(args) => return write!(f, "({})", stringify_arguments(args)),
            LootCommand::Lambda(args) => ("lambda", args),
            LootCommand::Define(args) => ("define", args),
            LootCommand::If(args) => ("if", args),
            LootCommand::Cond(args) => ("cond", args),
            LootCommand::And(args) => ("and", args),
            LootCommand::Or(args) => ("or", args),
            LootCommand::Begin(args) => ("begin", args),
            LootCommand::Let(args) => ("let", args),
            LootCommand::Set(args) => ("set!", args),
            LootCommand::SetCar(args) => ("set-car!", args),
            LootCommand::Quote(args) => ("quote", args),
            LootCommand::Quasiquote(args) => ("quasiquote", args),
            LootCommand::Unquote(args) => ("unquote", args),
            LootCommand::UnquoteSplicing(args) => ("unquote-splicing", args),
        };

        write!(f, "({} {})", keyword, stringify_arguments(arguments))
    }
}

fuzz_target!(|commands: Vec<LootCommand>| {
    {
        // A small depth limit keeps runaway recursion an error rather than a crash.
        let mut context = loot::EvaluationContext::with_handlers(
            loot::RuntimeContext::with_max_depth(64),
            loot::ExceptionStack::new("loot-fuzz", loot::Uncaught::Propagate),
        );

        for command in commands {
            let command = command.to_string();
            let _ = context.evaluate_str(&command);
        }
    }
});
