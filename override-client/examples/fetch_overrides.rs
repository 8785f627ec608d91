use override_client::{ClientConfig, OverrideClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    let api_url =
        std::env::var("PREVIEW_OVERRIDE_API").unwrap_or_else(|_| "http://localhost:4200".into());
    let branch_id = std::env::args()
        .nth(1)
        .ok_or("usage: fetch_overrides <override-set-id>")?;

    let client = OverrideClient::new(ClientConfig::new(api_url))?;
    let overrides = client.fetch_overrides(&branch_id).await?;

    println!("Fetched {} unpublished file(s)", overrides.len());
    for file in &overrides {
        println!("  {} ({} bytes)", file.relative_path, file.content.len());
    }

    Ok(())
}
