use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Derive a file key for one owner scope (e.g. `document:<user id>`) from the master key.
pub fn derive_scope_key(master_key: &[u8; 32], scope: &str) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, master_key);
    let info = format!("schoolhub-file-{scope}");
    let mut key = [0u8; 32];
    hk.expand(info.as_bytes(), &mut key)
        .map_err(|_| anyhow::anyhow!("Failed to derive file key"))?;
    Ok(key)
}

/// Encrypt with AES-256-GCM. Output layout: `[12-byte IV][16-byte tag][ciphertext]`.
pub fn seal(plaintext: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).context("Failed to create cipher")?;

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    // aes-gcm appends the tag to the ciphertext
    let sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let mut out = Vec::with_capacity(IV_LEN + TAG_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Reverse of [`seal`]. Fails if the blob was truncated, tampered with or the key is wrong.
pub fn open(blob: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    if blob.len() < IV_LEN + TAG_LEN {
        anyhow::bail!("Encrypted blob is truncated");
    }
    let (iv, rest) = blob.split_at(IV_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let cipher = Aes256Gcm::new_from_slice(key).context("Failed to create cipher")?;

    let mut combined = ciphertext.to_vec();
    combined.extend_from_slice(tag);

    cipher
        .decrypt(Nonce::from_slice(iv), combined.as_ref())
        .map_err(|e| anyhow::anyhow!("Decryption failed (data may be corrupted or tampered): {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_scope_key() {
        let master_key = [0u8; 32];
        let key1 = derive_scope_key(&master_key, "document:a").unwrap();
        let key2 = derive_scope_key(&master_key, "document:b").unwrap();
        let key1_again = derive_scope_key(&master_key, "document:a").unwrap();

        assert_eq!(key1, key1_again);
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_seal_open() {
        let key = [42u8; 32];
        let plaintext = b"Scanned teaching certificate";

        let blob = seal(plaintext, &key).unwrap();
        assert_eq!(blob.len(), IV_LEN + TAG_LEN + plaintext.len());
        assert_ne!(&blob[IV_LEN + TAG_LEN..], &plaintext[..]);

        assert_eq!(open(&blob, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_open_with_wrong_key() {
        let blob = seal(b"Secret", &[42u8; 32]).unwrap();
        assert!(open(&blob, &[99u8; 32]).is_err());
    }

    #[test]
    fn test_open_tampered_or_truncated() {
        let key = [42u8; 32];
        let mut blob = seal(b"Original data", &key).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 1;
        assert!(open(&blob, &key).is_err());
        assert!(open(&blob[..10], &key).is_err());
    }
}
