use anyhow::Result;
use speedcheck::app::{App, Command};
use speedcheck::config::Config;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// First non-empty locale variable, in POSIX precedence order.
fn system_language() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

fn print_help() {
    println!("Commands: r = run again, m = more/less info, lang <code> = switch language, q = quit");
}

/// Forward parsed stdin lines until `q` or end of input.
async fn read_commands(tx: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Some(command) => {
                let quit = command == Command::Quit;
                if tx.send(command).is_err() || quit {
                    break;
                }
            }
            None => {
                warn!("Unknown command '{}'", line.trim());
                print_help();
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("speedcheck=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting speedcheck");

    let config = Config::from_env()?;
    let mut app = App::from_config(&config)?;

    print_help();
    let (tx, mut commands) = mpsc::unbounded_channel();
    tokio::spawn(read_commands(tx));

    let language = system_language();
    app.interact(language.as_deref(), &mut commands, |page| {
        print!("{}", page.render_text());
    })
    .await;

    let report = app.translator().metrics().report();
    info!(
        "Catalog metrics: {}",
        serde_json::to_string(&report).unwrap_or_default()
    );
    info!("Bye");
    Ok(())
}
