//! Print the cached SHA-256 and guessed MIME type of a file.
//!
//! Run:
//! `cargo run --example checksum_file -- <path>`

use std::path::PathBuf;

use nmdc_api::{guess_mime_type, sha256_with_sidecar, sidecar_path};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path: PathBuf = std::env::args()
        .nth(1)
        .ok_or("usage: checksum_file <path>")?
        .into();

    let digest = sha256_with_sidecar(&path)?;
    println!("sha256:  {digest}");
    println!("sidecar: {}", sidecar_path(&path).display());
    println!(
        "mime:    {}",
        guess_mime_type(&path).unwrap_or_else(|| "unknown".to_owned())
    );
    Ok(())
}
