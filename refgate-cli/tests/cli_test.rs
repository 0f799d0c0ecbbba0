//! Integration tests for the `refgate` binary

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the binary against isolated directories and an empty config file
fn refgate(dir: &Path, args: &[&str]) -> Result<Output> {
    let config = dir.join("config.yml");
    fs::write(&config, "")?;
    let output = Command::new(env!("CARGO_BIN_EXE_refgate"))
        .arg("--config")
        .arg(&config)
        .arg("--source-dir")
        .arg(dir.join("sources"))
        .arg("--output-dir")
        .arg(dir.join("outputs"))
        .arg("--tool-path")
        .arg("echo")
        .args(args)
        .output()?;
    Ok(output)
}

#[test]
fn test_list_creates_roots_and_shows_sources() -> Result<()> {
    let dir = TempDir::new()?;
    let output = refgate(dir.path(), &["list"])?;
    assert!(output.status.success());
    assert!(dir.path().join("sources").is_dir());
    assert!(dir.path().join("outputs").is_dir());
    assert_eq!(String::from_utf8(output.stdout)?, "No registered references\n");

    fs::write(dir.path().join("sources").join("clip.mp4"), b"hello world")?;
    let output = refgate(dir.path(), &["list"])?;
    assert_eq!(
        String::from_utf8(output.stdout)?,
        "{{b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9}}\n"
    );
    Ok(())
}

#[test]
fn test_add_target_prints_placeholder() -> Result<()> {
    let dir = TempDir::new()?;
    let output = refgate(dir.path(), &["add-target", "render", "--extension", "mkv"])?;
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout)?, "{{render}}\n");
    assert_eq!(fs::read_dir(dir.path().join("outputs"))?.count(), 1);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_run_output_is_sanitized() -> Result<()> {
    let dir = TempDir::new()?;
    let output = refgate(dir.path(), &["run", "--target", "out", "{{out}} done"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8(output.stdout)?,
        "{{out}} done\n\n--- STDERR ---\n"
    );
    Ok(())
}

#[test]
fn test_rejected_template_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let output = refgate(dir.path(), &["run", "--", "-i input.mp4"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("Command contains potential direct filename ('input.mp4')"));
    assert!(output.stdout.is_empty());
    Ok(())
}
