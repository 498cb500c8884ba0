//! Streaming chat against the Code Assist gateway (no mock).
//!
//! Prerequisites, one of:
//! - `AI_BRIDGE_ACCESS_TOKEN`: an already valid bearer token
//! - `AI_BRIDGE_OAUTH_CLIENT_ID` / `AI_BRIDGE_OAUTH_CLIENT_SECRET`: runs the browser
//!   authorization once and keeps the token in the OS keyring
//!
//! Optional: `AI_BRIDGE_CONFIG` (YAML config path), `AI_BRIDGE_MODEL`.
//!
//! Run:
//!   AI_BRIDGE_ACCESS_TOKEN=ya29... cargo run --example stream_chat

use ai_lib_bridge::auth::{KeyringSecretStore, SecretRef, TokenManager, KEYRING_SERVICE};
use ai_lib_bridge::types::ThinkingEffort;
use ai_lib_bridge::types::ThinkingRequest;
use ai_lib_bridge::{logging, BridgeConfig, ChatRequest, Message, ProviderClient, ResponsePart};
use futures::StreamExt;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = match std::env::var("AI_BRIDGE_CONFIG") {
        Ok(path) => BridgeConfig::from_path(path).await?,
        Err(_) => BridgeConfig::default(),
    }
    .apply_env();
    let model = std::env::var("AI_BRIDGE_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());

    let builder = ProviderClient::builder(config.clone());
    let builder = match std::env::var("AI_BRIDGE_ACCESS_TOKEN") {
        Ok(token) => builder.with_static_token(token),
        Err(_) => {
            if config.oauth.client_id.is_empty() {
                eprintln!("Error: set AI_BRIDGE_ACCESS_TOKEN or AI_BRIDGE_OAUTH_CLIENT_ID/SECRET.");
                std::process::exit(1);
            }
            let store = Arc::new(KeyringSecretStore::new(KEYRING_SERVICE));
            let manager = TokenManager::from_config(&config, store, SecretRef::new("oauth-demo"))?;
            if manager.current_record().await?.is_none() {
                println!("No stored credential, starting browser authorization...");
                manager.authorize().await?;
            }
            builder.with_token_manager(Arc::new(manager))
        }
    };
    let client = builder.build()?;

    let request = ChatRequest::new(
        model,
        vec![Message::user("Say hello in one short sentence, then list two numbers.")],
    )
    .system("You are a helpful assistant.")
    .thinking(ThinkingRequest::effort(ThinkingEffort::Low))
    .max_output_tokens(512);

    let (mut stream, cancel) = client.chat_stream(request).await?;
    let stats = stream.stats().clone();

    // Ctrl-C cancels the in-flight stream.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    while let Some(chunk) = stream.next().await {
        for part in chunk?.parts {
            match part {
                ResponsePart::Thought { text, .. } => eprint!("\x1b[2m{}\x1b[0m", text),
                ResponsePart::Text { text } => print!("{}", text),
                ResponsePart::FunctionCall { name, args, .. } => {
                    println!("\n[tool call] {} {}", name, args)
                }
                ResponsePart::FunctionResponse { .. } => {}
            }
        }
    }

    println!("\n\n--- Summary ---\n{:#?}", stream.summary());
    println!(
        "\n--- Call ---\nendpoint: {}\nfailed attempts: {}\nconnect: {}ms",
        stats.endpoint,
        stats.failed_attempts(),
        stats.duration_ms
    );
    Ok(())
}
