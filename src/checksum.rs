//! SHA-256 digests cached in `<file>.sha256` sidecar files.

use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::ClientError;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Returns the sidecar path for `path` (`data.bin` → `data.bin.sha256`).
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".sha256");
    PathBuf::from(name)
}

/// Returns the lowercase hex SHA-256 of the file at `path`.
///
/// An existing sidecar is trusted as-is and its content returned without
/// reading `path`. Otherwise the file is hashed in 1 MiB chunks and the
/// digest written to the sidecar, followed by a newline.
pub fn sha256_with_sidecar(path: &Path) -> Result<String, ClientError> {
    let sidecar = sidecar_path(path);
    if sidecar.exists() {
        let cached =
            std::fs::read_to_string(&sidecar).map_err(|e| ClientError::io(&sidecar, e))?;
        return Ok(cached.trim_end().to_owned());
    }

    info!(path = %path.display(), "hashing");
    let digest = sha256_file(path)?;
    std::fs::write(&sidecar, format!("{digest}\n")).map_err(|e| ClientError::io(&sidecar, e))?;
    Ok(digest)
}

fn sha256_file(path: &Path) -> Result<String, ClientError> {
    let mut file = File::open(path).map_err(|e| ClientError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer).map_err(|e| ClientError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
