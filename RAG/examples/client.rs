use reqwest::Client;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new();
    let base_url = std::env::var("RAG_API_URL").unwrap_or_else(|_| "http://127.0.0.1:5000".to_string());

    println!("Testing RAG API at {}", base_url);

    println!("\nHealth check:");
    let health_response = client.get(format!("{}/health", base_url)).send().await?;
    println!("Status: {}", health_response.status());
    let health_json: serde_json::Value = health_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&health_json)?);

    println!("\nIngest:");
    let ingest_response = client
        .post(format!("{}/ingest", base_url))
        .json(&json!({
            "document_id": "Q1",
            "text": "ID: Q1\nHow do I reset my password?\n\nGo to settings > security > reset."
        }))
        .send()
        .await?;
    println!("Status: {}", ingest_response.status());
    let ingest_json: serde_json::Value = ingest_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&ingest_json)?);

    println!("\nAsk:");
    let ask_response = client
        .post(format!("{}/ask", base_url))
        .json(&json!({ "question": "How can I reset my password?" }))
        .send()
        .await?;
    println!("Status: {}", ask_response.status());
    let ask_json: serde_json::Value = ask_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&ask_json)?);

    println!("\nDirect answer:");
    let answer_response = client
        .post(format!("{}/get_answer/", base_url))
        .json(&json!({ "prompt": "2+2=", "stream": false }))
        .send()
        .await?;
    println!("Status: {}", answer_response.status());
    let answer_json: serde_json::Value = answer_response.json().await?;
    println!("Response: {}", serde_json::to_string_pretty(&answer_json)?);

    Ok(())
}
