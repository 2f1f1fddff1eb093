//! Minimal voice session: connect to the realtime backend and drive the
//! playout clock, logging what comes back.
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example voice_agent
//! ```

use std::time::Duration;

use anyhow::Context;
use voicebridge::{ClientOptions, ProtocolClient, SessionConfig, TurnDetection};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicebridge=debug,voice_agent=info".into()),
        )
        .init();

    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
    let model = std::env::var("REALTIME_MODEL")
        .unwrap_or_else(|_| "gpt-4o-realtime-preview-2024-12-17".to_string());

    let client = ProtocolClient::builder()
        .options(ClientOptions::new(api_key, model))
        .config(
            SessionConfig::new()
                .with_instructions("You are a helpful voice assistant.")
                .with_voice("alloy")
                .with_text_and_audio()
                .with_transcription()
                .with_turn_detection(TurnDetection::server_vad()),
        )
        .build()?;

    client.connect().await?;
    tracing::info!("connected; draining playout for 30 seconds");

    // No room attached here, so just pull paced frames the way a media sink
    // would and count the audible ones.
    let pacer = client.pacer();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    let mut audible = 0u64;
    while tokio::time::Instant::now() < deadline {
        let frame = pacer.next_frame().await;
        if frame.data.iter().any(|&s| s != 0) {
            audible += 1;
        }
    }
    tracing::info!(audible, "frames with agent audio played");

    client.close().await?;
    Ok(())
}
