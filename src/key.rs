//! Host key loading.
//!
//! Unlike the teacher's generate-on-first-run convenience, the spec treats a
//! missing or malformed host key as a fatal startup error — there is no
//! key material on disk to fall back to generating.

use russh_keys::HashAlg;

use crate::error::TunnelError;

/// Load the server's host key from `path`. The on-disk container format itself
/// is an opaque blob handed straight to `russh_keys`; this function only owns
/// the "missing/malformed is fatal" contract.
pub fn load_host_key(path: &str) -> Result<russh_keys::PrivateKey, TunnelError> {
    let data = std::fs::read_to_string(path).map_err(|e| TunnelError::HostKey {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    let key = russh_keys::PrivateKey::from_openssh(&data).map_err(|e| TunnelError::HostKey {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    log::info!(
        "loaded host key from '{}', fingerprint {}",
        path,
        key.public_key().fingerprint(HashAlg::Sha256)
    );

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_a_host_key_error() {
        let err = load_host_key("/nonexistent/path/to/a/host/key").unwrap_err();
        assert!(matches!(err, TunnelError::HostKey { .. }));
    }

    #[test]
    fn malformed_file_is_a_host_key_error() {
        let dir = std::env::temp_dir().join("tunnelbroker_test_malformed_key");
        std::fs::write(&dir, b"not a real key").unwrap();
        let err = load_host_key(dir.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, TunnelError::HostKey { .. }));
        let _ = std::fs::remove_file(dir);
    }
}
