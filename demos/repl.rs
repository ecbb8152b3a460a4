use loot::{EvaluationContext, Mode};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt};

async fn query(stdout: &mut io::Stdout, lines: &mut io::Lines<io::BufReader<io::Stdin>>, prompt: &str) -> io::Result<Option<String>> {
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;
    lines.next_line().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut context = EvaluationContext::new();
    let mut lines = io::BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    let mut buffer = String::new();
    let mut first_line = 1;

    loop {
        let prompt = if buffer.is_empty() { "USER> " } else { "" };
        let Some(line) = query(&mut stdout, &mut lines, prompt).await? else { break };
        buffer.push_str(&line);
        buffer.push('\n');

        if buffer.trim().is_empty() {
            first_line += 1;
            buffer.clear();
            continue;
        }
        if !context.is_complete(&buffer) { continue; }

        // Evaluation output is synchronous; the async side only drives input.
        context.load_source_at("stdin", first_line, &buffer, Mode::Interactive, &mut std::io::stdout())?;
        first_line += buffer.matches('\n').count();
        buffer.clear();
    }

    Ok(())
}
