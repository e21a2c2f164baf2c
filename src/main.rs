#[tokio::main]
async fn main() -> anyhow::Result<()> {
    online_recorder_lib::run().await
}
