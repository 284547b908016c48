//! Local SSH key pair for a machine.

use crate::error::Result;
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Path of the public half for a private key at `private_key`.
pub fn public_key_path(private_key: &Path) -> PathBuf {
    let mut path = OsString::from(private_key.as_os_str());
    path.push(".pub");
    PathBuf::from(path)
}

/// Make sure a key pair exists at `path` / `path.pub` and return the public
/// key in `authorized_keys` format.
///
/// An existing private key is reused; its public half is rewritten if it
/// went missing. Otherwise a new Ed25519 pair is generated.
///
/// # Errors
/// Returns an error if the key cannot be generated, parsed, or written.
pub fn ensure_key_pair(path: &Path) -> Result<String> {
    let public_path = public_key_path(path);

    if path.exists() {
        if public_path.exists() {
            tracing::debug!(path = %public_path.display(), "Reusing existing SSH key pair");
            return Ok(fs::read_to_string(&public_path)?.trim().to_string());
        }
        tracing::debug!(path = %path.display(), "Restoring public key from private key");
        let private = PrivateKey::read_openssh_file(path)?;
        let public = private.public_key().to_openssh()?;
        fs::write(&public_path, format!("{public}\n"))?;
        return Ok(public);
    }

    tracing::info!(path = %path.display(), "Generating SSH key pair");
    let private = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)?;
    let pem = private.to_openssh(LineEnding::LF)?;
    let public = private.public_key().to_openssh()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_private(path, pem.as_bytes())?;
    fs::write(&public_path, format!("{public}\n"))?;

    Ok(public)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)
}
