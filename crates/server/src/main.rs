use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cadence_server::run().await
}
