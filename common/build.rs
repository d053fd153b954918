// Stamps the crate with `BUILD_VERSION`, the package version plus the short
// commit hash, which clients advertise in their api-client header.

use std::process::Command;

fn main() {
    let commit_hash = match option_env!("STREAMKV_COMMIT_HASH") {
        Some(hash) => hash.get(..7).unwrap_or(hash).to_string(),
        None => match Command::new("git").args(["rev-parse", "--short", "HEAD"]).output() {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            // Not a git checkout, or git is missing
            _ => "unknown".to_string(),
        },
    };

    let build_version = format!("{}-{}", env!("CARGO_PKG_VERSION"), commit_hash);
    println!("cargo:rerun-if-env-changed=STREAMKV_COMMIT_HASH");
    println!("cargo:rustc-env=BUILD_VERSION={build_version}");
}
