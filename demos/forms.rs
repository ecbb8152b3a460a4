use loot::{parse, EvaluationContext, Expr, LootError};

fn main() {
    let mut context = EvaluationContext::new();

    let forms = vec![
        "(define (spam) (* eggs 3))",
        "(spam)",
        "(define eggs 20)",
        "(spam)",
    ].into_iter()
        .map(|line| parse(line, context.runtime().symbols()).map(|forms| (line, forms)))
        .collect::<Result<Vec<(&str, Vec<Expr>)>, LootError>>()
        .unwrap();

    for (source, exprs) in &forms {
        for expr in exprs {
            match context.evaluate(expr) {
                Ok(Some(value)) => println!("{}: {}", source, value),
                Ok(None) => println!("{}: no value", source),
                Err(err) => println!("{}: {}", source, err)
            }
        }
    }
}
