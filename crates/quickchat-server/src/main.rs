#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quickchat_server::run().await
}
