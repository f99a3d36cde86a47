use anyhow::Result;
use clap::Parser;

use geoengine_client::{cli, logging};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;
    let args = cli::Cli::parse();
    cli::run(args).await
}
