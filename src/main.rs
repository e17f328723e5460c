use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    webjob_cli::cli::app::run().await
}
