//! Terminal front end for the assistant, sharing the web server's session logic.
//!
//! Configuration comes from the environment (`AZURE_OPENAI_*`, `ONCOALLY_*`).
//! Commands: `/samples`, `/ask N`, `/clear`, `/reset`, `/quit`.

use std::sync::Arc;

use oncoally::{config_agent_factory, init_logging, AppConfig, Session};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

enum Command<'a> {
    Samples,
    Ask(&'a str),
    Clear,
    Reset,
    Quit,
    Question(&'a str),
}

fn parse(line: &str) -> Command<'_> {
    let trimmed = line.trim();
    match trimmed.split_once(' ').map_or((trimmed, ""), |(c, rest)| (c, rest.trim())) {
        ("/samples", _) => Command::Samples,
        ("/ask", index) => Command::Ask(index),
        ("/clear", _) => Command::Clear,
        ("/reset", _) => Command::Reset,
        ("/quit", _) | ("/exit", _) => Command::Quit,
        _ => Command::Question(line),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_logging(&config.logging)?;

    let config = Arc::new(config);
    let mut session = Session::from_config(&config, config_agent_factory(Arc::clone(&config)));

    let mut stdout = io::stdout();
    let mut lines = BufReader::new(io::stdin()).lines();

    stdout
        .write_all(
            format!(
                "{} - {}\n{}\n\n",
                config.branding.app_name, config.branding.tagline, config.branding.disclaimer
            )
            .as_bytes(),
        )
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let reply = match parse(&line) {
            Command::Quit => break,
            Command::Samples => {
                let listing: Vec<String> = session
                    .sample_questions()
                    .iter()
                    .enumerate()
                    .map(|(i, q)| format!("  [{i}] {q}"))
                    .collect();
                Some(listing.join("\n"))
            }
            Command::Clear => {
                session.clear_chat();
                Some("Chat cleared.".to_string())
            }
            Command::Reset => {
                session.reset_agent();
                Some("Agent has been reset.".to_string())
            }
            Command::Ask(index) => match index.parse::<usize>() {
                Ok(index) => match session.ask_sample(index).await {
                    Ok(answer) => answer.map(|m| m.content.clone()),
                    Err(err) => Some(err.to_string()),
                },
                Err(_) => Some("usage: /ask <number>".to_string()),
            },
            Command::Question(text) => session.submit(text).await.map(|m| m.content.clone()),
        };

        if let Some(reply) = reply {
            stdout.write_all(format!("{reply}\n\n").as_bytes()).await?;
        }
    }

    tracing::debug!(messages = session.transcript().len(), "console session ended");
    Ok(())
}
