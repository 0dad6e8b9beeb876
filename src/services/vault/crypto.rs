// AES-256-GCM 字段加密
// 存储格式: base64(nonce(12) ‖ ciphertext ‖ tag)，空串对应空串

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::error::VaultError;

const NONCE_LEN: usize = 12;

/// 从口令派生 256 位密钥
pub fn derive_key(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// 口令哈希（十六进制），用于免密令牌
pub fn hash_key(passphrase: &str) -> String {
    hex::encode(derive_key(passphrase))
}

/// 加密一个字段
pub fn encrypt(plaintext: &str, passphrase: &str) -> Result<String, VaultError> {
    if plaintext.is_empty() {
        return Ok(String::new());
    }

    let cipher = Aes256Gcm::new(&derive_key(passphrase).into());

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend(ciphertext);
    Ok(general_purpose::STANDARD.encode(&combined))
}

/// 解密一个字段
pub fn decrypt(encoded: &str, passphrase: &str) -> Result<String, VaultError> {
    if encoded.is_empty() {
        return Ok(String::new());
    }

    let combined = general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| VaultError::Decryption(format!("invalid base64: {}", e)))?;

    if combined.len() < NONCE_LEN {
        return Err(VaultError::Decryption("ciphertext too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(&derive_key(passphrase).into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| VaultError::Decryption("wrong key or corrupted data".to_string()))?;

    String::from_utf8(plaintext).map_err(|e| VaultError::Decryption(e.to_string()))
}
