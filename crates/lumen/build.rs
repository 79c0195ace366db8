use std::env;
use std::error::Error;
use std::path::PathBuf;

use clap::CommandFactory;

// cli.rs and assets.rs only need clap and its helpers, all of which are
// build-dependencies.
#[path = "src/cli.rs"]
mod cli;
#[path = "src/assets.rs"]
mod assets;

/// Packagers set this to collect man pages and completions in a stable
/// location; by default they stay in `OUT_DIR`.
const ASSET_DIR_VAR: &str = "LUMEN_ASSET_DIR";

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo::rerun-if-changed=src/cli.rs");
    println!("cargo::rerun-if-changed=src/assets.rs");
    println!("cargo::rerun-if-env-changed={ASSET_DIR_VAR}");

    let root = match env::var_os(ASSET_DIR_VAR) {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(env::var_os("OUT_DIR").ok_or("OUT_DIR not set by Cargo")?),
    };

    let cmd = cli::Cli::command();
    assets::write_manpages(&cmd, &root.join("man"))?;
    assets::write_completions(&cmd, &root.join("completions"))?;
    Ok(())
}
