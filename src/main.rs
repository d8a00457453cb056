mod cli;
mod run;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    ferry::observability::init_tracing();

    let cli = Cli::parse();
    run::run(cli).await
}
