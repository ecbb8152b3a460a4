use loot::EvaluationContext;

fn main() {
    let program = vec![
        "(define (spam) (* eggs 3))",
        "(spam)",
        "(define eggs 20)",
        "(spam)",
        "(define (count-to n) (let loop ((i 1) (acc '())) (if (> i n) (reverse acc) (loop (+ i 1) (cons i acc)))))",
        "(count-to 5)",
        "`(1 ,@(count-to 3) ,(/ 6 4))",
    ];

    let mut context = EvaluationContext::new();
    for source in program {
        match context.evaluate_str(source) {
            Ok(Some(value)) => println!("{}: {}", source, value),
            Ok(None) => println!("{}: no value", source),
            Err(err) => println!("{}: {}", source, err)
        }
    }
}
