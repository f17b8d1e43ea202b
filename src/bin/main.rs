use crypto_chat_agent::{config::AppConfig, presentation::DisplayUnit, SessionFactory};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with answers
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;
    if config.llm.api_key.is_empty() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
    }

    let factory = SessionFactory::from_config(&config)?;
    let mut orchestrator = factory.create();

    info!("Crypto chat starting");
    println!("Ask about crypto prices. /history shows the conversation, /quit exits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let input = line.trim();
        match input {
            "" => continue,
            "/quit" => break,
            "/history" => {
                println!("{}", orchestrator.history().get_formatted_context());
                continue;
            }
            _ => {}
        }

        let (tx, mut rx) = mpsc::channel::<crypto_chat_agent::TurnUpdate>(32);
        let printer = tokio::spawn(async move {
            let mut printed = 0;
            while let Some(update) = rx.recv().await {
                match &update.display {
                    DisplayUnit::Loading => println!("{}", update.display.to_markdown()),
                    DisplayUnit::Text { content } => {
                        print!("{}", &content[printed..]);
                        let _ = std::io::stdout().flush();
                        printed = content.len();
                    }
                    _ => {}
                }
            }
            printed > 0
        });

        let turn = orchestrator.continue_conversation_streaming(input, tx).await;
        let streamed_text = printer.await?;

        if streamed_text {
            println!();
        }
        if !(streamed_text && matches!(turn.display, DisplayUnit::Text { .. })) {
            println!("{}", turn.display.to_markdown());
        }
        println!();
    }

    Ok(())
}
