//! Persist identity keys on disk.
//!
//! A key directory holds the private key (`private.pem`, PKCS#8) and its public half
//! (`public.pem`, SubjectPublicKeyInfo). The public file is what gets distributed out-of-band
//! (e.g. the relay's key handed to clients).

use crate::{pem, Error, PrivateKey, PublicKey};
use rand::{CryptoRng, RngCore};
use std::{fs, path::Path};

/// File name of the private key inside a key directory.
pub const PRIVATE_KEY_FILE: &str = "private.pem";

/// File name of the public key inside a key directory.
pub const PUBLIC_KEY_FILE: &str = "public.pem";

/// Load the identity stored in `dir`, or generate (and persist) a new one if none exists.
///
/// Returns the key and whether it was freshly generated.
pub fn load_or_generate<R: RngCore + CryptoRng>(
    rng: &mut R,
    dir: &Path,
) -> Result<(PrivateKey, bool), Error> {
    let private_path = dir.join(PRIVATE_KEY_FILE);
    if private_path.exists() {
        let key = load_private_key(&private_path)?;
        return Ok((key, false));
    }

    let key = PrivateKey::from_rng(rng);
    fs::create_dir_all(dir)?;
    write_private(&private_path, &key)?;
    save_public_key(&dir.join(PUBLIC_KEY_FILE), &key.public_key())?;
    Ok((key, true))
}

/// Load a PEM private key from `path`.
pub fn load_private_key(path: &Path) -> Result<PrivateKey, Error> {
    let content = zeroize::Zeroizing::new(fs::read_to_string(path)?);
    pem::decode_private_key(&content)
}

/// Load a PEM public key from `path`.
pub fn load_public_key(path: &Path) -> Result<PublicKey, Error> {
    let content = fs::read_to_string(path)?;
    pem::decode_public_key(&content)
}

/// Write `key` to `path` as PEM.
pub fn save_public_key(path: &Path, key: &PublicKey) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, pem::encode_public_key(key))?;
    Ok(())
}

fn write_private(path: &Path, key: &PrivateKey) -> Result<(), Error> {
    let encoded = pem::encode_private_key(key);
    fs::write(path, encoded.as_bytes())?;

    // Restrict the private key to its owner
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use tempfile::tempdir;

    #[test]
    fn test_generate_then_load() {
        let dir = tempdir().unwrap();
        let keys = dir.path().join("keys");

        let (generated, fresh) = load_or_generate(&mut OsRng, &keys).unwrap();
        assert!(fresh);
        assert!(keys.join(PRIVATE_KEY_FILE).exists());
        assert!(keys.join(PUBLIC_KEY_FILE).exists());

        let (loaded, fresh) = load_or_generate(&mut OsRng, &keys).unwrap();
        assert!(!fresh);
        assert_eq!(generated, loaded);

        let public = load_public_key(&keys.join(PUBLIC_KEY_FILE)).unwrap();
        assert_eq!(public, generated.public_key());
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        load_or_generate(&mut OsRng, dir.path()).unwrap();
        let mode = fs::metadata(dir.path().join(PRIVATE_KEY_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_load_missing_public_key() {
        let dir = tempdir().unwrap();
        let result = load_public_key(&dir.path().join("missing.pem"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_load_corrupt_private_key() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PRIVATE_KEY_FILE), "garbage").unwrap();
        let result = load_or_generate(&mut OsRng, dir.path());
        assert!(matches!(result, Err(Error::InvalidPem(_))));
    }
}
