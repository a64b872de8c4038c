//! nobg CLI Tool
//!
//! Command-line interface for removing image backgrounds with the nobg library.

#[cfg(feature = "cli")]
use nobg::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
