use std::process::Command;

/// Short commit id of the checkout, if this is a git checkout at all.
fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;
    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_owned())
}

fn main() {
    // Release tarballs carry no .git; the startup log then says "unknown".
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");
    if let Some(hash) = git_short_hash() {
        println!("cargo:rustc-env=AMCP_GIT_HASH={hash}");
    }
}
