//! Embeds a one-line build identity (`WAVPLAY_BUILD_INFO`) shown in the
//! startup log, e.g. `v0.1.0-3-gdeadbee-dirty release 2026-10-19 14:02 UTC`.

use std::process::Command;

/// `git describe` of the checkout, if this is one
fn describe_checkout() -> Option<String> {
    let out = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8(out.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    let revision = describe_checkout().unwrap_or_else(|| "no-git".to_string());
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "?".to_string());
    let built_at = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC");

    println!("cargo:rustc-env=WAVPLAY_BUILD_INFO={} {} {}", revision, profile, built_at);
    println!("cargo:rerun-if-changed=build.rs");
}
