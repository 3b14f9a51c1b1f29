//! Workspace automation for ssogate.
//!
//! `cargo xtask <task>`; output goes straight to the terminal, so printing is
//! allowed here.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::env;
use std::process::{Command, ExitCode};

use anyhow::{bail, Context, Result};

mod features;

/// Cargo invocations making up the plain tasks.
const FMT: &[&str] = &["fmt", "--all", "--", "--check"];
const CLIPPY: &[&str] =
    &["clippy", "--workspace", "--all-targets", "--all-features", "--", "-D", "warnings"];
const TEST: &[&str] = &["test", "--workspace", "--all-features"];
const DENY: &[&str] = &["deny", "check"];

const TASKS: &[(&str, &str)] = &[
    ("ci", "fmt, clippy, feature tiers, then tests"),
    ("fmt", "check formatting"),
    ("clippy", "lint every target with warnings denied"),
    ("test", "run unit and integration tests (wiremock, no network)"),
    ("test-features", "check each ssogate-common feature tier on its own"),
    ("deny", "audit dependencies with cargo-deny"),
];

fn main() -> ExitCode {
    let task = env::args().nth(1);

    let result = match task.as_deref() {
        Some("ci") => ci(),
        Some("fmt") => cargo(FMT),
        Some("clippy") => cargo(CLIPPY),
        Some("test") => cargo(TEST),
        Some("test-features") => features::test_feature_matrix(),
        Some("deny") => deny(),
        Some("help") | None => {
            usage();
            Ok(())
        }
        Some(other) => {
            usage();
            Err(anyhow::anyhow!("unknown task `{other}`"))
        }
    };

    if let Err(err) = result {
        eprintln!("xtask failed: {err:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn usage() {
    println!("usage: cargo xtask <task>\n");
    for (name, about) in TASKS {
        println!("  {name:<14} {about}");
    }
}

/// Run `cargo <args>` and fail unless it exits cleanly.
fn cargo(args: &[&str]) -> Result<()> {
    let status = Command::new("cargo")
        .args(args)
        .status()
        .with_context(|| format!("could not spawn `cargo {}`", args.join(" ")))?;

    if !status.success() {
        bail!("`cargo {}` exited with {status}", args.join(" "));
    }
    Ok(())
}

fn ci() -> Result<()> {
    let steps: [(&str, fn() -> Result<()>); 4] = [
        ("format", || cargo(FMT)),
        ("clippy", || cargo(CLIPPY)),
        ("feature tiers", features::test_feature_matrix),
        ("tests", || cargo(TEST)),
    ];

    for (index, (label, step)) in steps.iter().enumerate() {
        println!("==> [{}/{}] {label}", index + 1, steps.len());
        step().with_context(|| format!("ci step `{label}`"))?;
    }

    println!("==> ci passed");
    Ok(())
}

fn deny() -> Result<()> {
    let installed = Command::new("cargo")
        .args(["deny", "--version"])
        .output()
        .is_ok_and(|output| output.status.success());

    if !installed {
        bail!("cargo-deny is not installed (cargo install cargo-deny)");
    }
    cargo(DENY)
}
