use lprgate_core::storage::Storage;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;

pub(crate) const API_KEY_PREFIX: &str = "lpr_";

pub(crate) fn open_storage(path: &Path) -> Option<Storage> {
    match Storage::open(path) {
        Ok(storage) => Some(storage),
        Err(err) => {
            log::error!("open storage failed: path={}, err={}", path.display(), err);
            None
        }
    }
}

pub(crate) fn initialize_storage(path: &Path) -> Result<(), String> {
    let storage = Storage::open(path).map_err(|err| format!("open {} failed: {err}", path.display()))?;
    storage
        .init()
        .map_err(|err| format!("migrate {} failed: {err}", path.display()))
}

pub(crate) fn hash_api_key(key: &str) -> String {
    Sha256::digest(key.trim().as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub(crate) fn generate_api_key() -> String {
    format!("{API_KEY_PREFIX}{}", random_hex(32))
}

pub(crate) fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub(crate) fn hash_password(password: &str, cost: u32) -> Result<String, String> {
    bcrypt::hash(password, cost).map_err(|err| format!("hash password failed: {err}"))
}

/// A malformed stored hash counts as a mismatch.
pub(crate) fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}
