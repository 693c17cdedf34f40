//! metric-collector entry point.

use metric_collector::cli::{self, Cli};
use metric_collector::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
