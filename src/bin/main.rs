//! Binary entrypoint for the taskforge tool

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    taskforge::cli::run().await
}
