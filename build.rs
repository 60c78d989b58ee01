//! Build script for codex
//!
//! Stamps the binary with the git commit and build time, reported by `/health`.

use std::process::Command;

fn git(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!("cargo:rustc-env=CODEX_COMMIT={}", git(&["rev-parse", "--short", "HEAD"]));

    let built_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    println!("cargo:rustc-env=CODEX_BUILT_AT={}", built_at);

    println!("cargo:rerun-if-changed=.git/HEAD");
}
