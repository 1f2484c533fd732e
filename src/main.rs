use std::io::Write;

use chatwire::config::{load_config, ClientConfig};
use chatwire::observability::init_tracing;
use chatwire::protocol::canonical::{ChatMessage, SendOptions};
use chatwire::CompletionClient;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: chatwire <config.yaml> <profile> <prompt...>";

fn main() {
    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(profile_name)) = (args.next(), args.next()) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let prompt = args.collect::<Vec<_>>().join(" ");
    if prompt.trim().is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let config = load_config(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.logging.log_level);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    let code = runtime.block_on(run(config, profile_name, prompt));
    std::process::exit(code);
}

async fn run(config: ClientConfig, profile_name: String, prompt: String) -> i32 {
    let Some(profile) = config.profile(&profile_name) else {
        let known: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
        eprintln!("Unknown profile '{profile_name}'. Known profiles: {}", known.join(", "));
        return 2;
    };

    let client = match CompletionClient::http() {
        Ok(client) => client,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling completion");
            on_ctrl_c.cancel();
        }
    });

    let messages = [ChatMessage::user(prompt)];
    let mut stream = match client.send(&messages, &SendOptions::default(), profile, Some(cancel)) {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("[{}] {err}", err.code());
            return 1;
        }
    };

    let mut stdout = std::io::stdout();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                if let Some(delta) = chunk.delta {
                    let _ = stdout.write_all(delta.as_bytes());
                    let _ = stdout.flush();
                }
            }
            Err(err) => {
                let _ = writeln!(stdout);
                eprintln!("[{}] {err}", err.code());
                return 1;
            }
        }
    }
    let _ = writeln!(stdout);

    if let Some(summary) = stream.summary() {
        match serde_json::to_string(summary) {
            Ok(json) => eprintln!("{json}"),
            Err(err) => tracing::debug!(error = %err, "failed to serialize summary"),
        }
    }
    0
}
