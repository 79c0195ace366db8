//! Man pages and shell completion scripts rendered from the clap tree.
//!
//! Compiled into `build.rs` as well, so this file may only depend on std,
//! clap, clap_complete and clap_mangen.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap_complete::Shell;

pub const BIN_NAME: &str = "lumen";

/// Shells that get a completion script next to the man pages.
pub const SHELLS: [Shell; 4] = [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::PowerShell];

/// Write `lumen.1` plus one `lumen-<sub>[-<sub>].1` page for every visible
/// subcommand, nested ones included. Returns the written paths.
pub fn write_manpages(cmd: &clap::Command, dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    render_page(cmd.clone().name(BIN_NAME), dir, &mut written)?;
    Ok(written)
}

fn render_page(page: clap::Command, dir: &Path, written: &mut Vec<PathBuf>) -> io::Result<()> {
    let name = page.get_name().to_owned();
    let children: Vec<clap::Command> = page
        .get_subcommands()
        .filter(|s| !s.is_hide_set())
        .map(|s| s.clone().name(format!("{name}-{}", s.get_name())))
        .collect();

    let mut buf = Vec::new();
    clap_mangen::Man::new(page).render(&mut buf)?;
    let path = dir.join(format!("{name}.1"));
    fs::write(&path, buf)?;
    written.push(path);

    for child in children {
        render_page(child, dir, written)?;
    }
    Ok(())
}

/// Write one completion script per entry in [`SHELLS`].
pub fn write_completions(cmd: &clap::Command, dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut cmd = cmd.clone();
    SHELLS
        .into_iter()
        .map(|shell| clap_complete::generate_to(shell, &mut cmd, BIN_NAME, dir))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;
    use crate::cli::Cli;

    #[test]
    fn nested_subcommands_get_prefixed_pages() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_manpages(&Cli::command(), dir.path()).unwrap();

        for page in ["lumen.1", "lumen-shell.1", "lumen-config.1"] {
            assert!(dir.path().join(page).exists(), "{page} missing");
        }
        assert!(pages.iter().all(|p| p.exists()));
        let nested = pages
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .filter(|n| n.starts_with("lumen-config-"))
            .count();
        assert!(nested > 0);

        let root = fs::read_to_string(dir.path().join("lumen.1")).unwrap();
        assert!(root.contains("shell"));
    }

    #[test]
    fn every_shell_gets_a_completion_script() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = write_completions(&Cli::command(), dir.path()).unwrap();

        assert_eq!(scripts.len(), SHELLS.len());
        assert!(scripts.iter().all(|p| p.exists()));
        let bash = fs::read_to_string(dir.path().join("lumen.bash")).unwrap();
        assert!(bash.contains("brightness"));
    }
}
