//! glyphfs console entry point.
//!
//! Launch the console over the default config:
//! ```bash
//! cargo run -p glyphfs-cli
//! ```
//!
//! Or mount a FAT32 image at `/fat`:
//! ```bash
//! cargo run -p glyphfs-cli -- --image disk.img
//! ```

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use glyphfs_cli::Args;

fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("glyphfs=info")))
        .init();

    let args = Args::parse();
    glyphfs_cli::run(&args)
}
