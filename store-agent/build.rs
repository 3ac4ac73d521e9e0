use std::process::Command;

/// Capture the toolchain version at build time so heartbeats can report the
/// runtime the agent was built with.
fn main() {
    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".into());
    let version = Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "rustc (version unknown)".into());

    println!("cargo::rustc-env=RUSTC_VERSION={version}");
}
