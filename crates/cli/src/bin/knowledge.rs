use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    knowledge_cli::main_entry().await
}
