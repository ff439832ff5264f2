//! Sends a single prompt to Gemini and prints what came back.
//!
//! Usage: `cargo run --bin gemini_smoke -- [prompt]`. Reads `GEMINI_API_KEY`
//! (and optionally `GEMINI_MODEL`, `GEMINI_API_BASE`) from the environment
//! or `.env`.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let key = std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY is not set")?;
    let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
    let base = std::env::var("GEMINI_API_BASE")
        .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Reply with {\"ok\": true} as JSON.".to_string());

    println!("🔎 Pinging {} ...", model);
    let started = Instant::now();

    let response = reqwest::Client::new()
        .post(format!(
            "{}/v1beta/models/{}:generateContent",
            base.trim_end_matches('/'),
            model
        ))
        .header("x-goog-api-key", key)
        .json(&json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        }))
        .send()
        .await?;

    let status = response.status();
    let body: Value = response.json().await?;
    println!("⏱️ {} in {:.2}s", status, started.elapsed().as_secs_f64());

    if !status.is_success() {
        bail!("Gemini returned {}: {}", status, body);
    }

    let text: String = body["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();
    println!("--- raw text ---\n{}", text);

    match serde_json::from_str::<Value>(text.trim()) {
        Ok(parsed) => println!("--- parsed ---\n{}", serde_json::to_string_pretty(&parsed)?),
        Err(e) => println!("⚠️ Reply is not bare JSON: {}", e),
    }

    Ok(())
}
