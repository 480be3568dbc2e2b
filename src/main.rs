#[tokio::main]
async fn main() -> anyhow::Result<()> {
    screenguard_lib::run().await
}
