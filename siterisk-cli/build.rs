// Injects the release version from git tags, falling back to the crate version

use std::process::Command;

fn main() {
    let version = get_git_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=SITERISK_VERSION={}", version);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
    println!("cargo:rerun-if-changed=.git/refs/tags");
}

fn get_git_version() -> Option<String> {
    // "v0.1.0", "v0.1.0-5-gabc123" or "abc123-dirty"
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    if let Some(tag) = described.strip_prefix('v') {
        // Release tag, possibly with commits on top
        let version = tag.split('-').next().unwrap_or(tag);
        Some(version.to_string())
    } else {
        let base_version = env!("CARGO_PKG_VERSION");
        match described.strip_suffix("-dirty") {
            Some(commit) => Some(format!("{}-{}-dirty", base_version, commit)),
            None => Some(format!("{}-{}", base_version, described)),
        }
    }
}
