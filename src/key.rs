//! Decrypted license keys.
//!
//! Keys are parsed from License key containers and decrypted using AES-128-CBC.

use std::fmt;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use uuid::Uuid;

use crate::error::{Error, Result};
pub use crate::license_protocol::license::key_container::KeyType;
use crate::license_protocol::license::KeyContainer;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// A decrypted key from a license response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Key id. Containers without an id use the key type name instead.
    pub kid: Vec<u8>,
    /// Key type (e.g., CONTENT, SIGNING).
    pub key_type: KeyType,
    /// Decrypted key bytes.
    pub key: Vec<u8>,
    /// Names of the permissions granted to an OPERATOR_SESSION key.
    pub permissions: Vec<String>,
}

impl Key {
    pub fn new(kid: Vec<u8>, key_type: KeyType, key: Vec<u8>, permissions: Vec<String>) -> Self {
        Self {
            kid,
            key_type,
            key,
            permissions,
        }
    }

    /// Load a Key from a KeyContainer, decrypting it with the derived `enc` key.
    pub fn from_key_container(container: &KeyContainer, enc_key: &[u8]) -> Result<Self> {
        let key_type = container
            .r#type
            .and_then(|v| KeyType::try_from(v).ok())
            .ok_or_else(|| Error::MalformedResponse("Missing or unknown key type".to_string()))?;

        let mut permissions = Vec::new();
        if key_type == KeyType::OperatorSession {
            if let Some(ref perms) = container.operator_session_key_permissions {
                for (name, value) in [
                    ("allow_encrypt", perms.allow_encrypt),
                    ("allow_decrypt", perms.allow_decrypt),
                    ("allow_sign", perms.allow_sign),
                    ("allow_signature_verify", perms.allow_signature_verify),
                ] {
                    if value.unwrap_or(false) {
                        permissions.push(name.to_string());
                    }
                }
            }
        }

        let kid = match container.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_vec(),
            _ => key_type.as_str_name().as_bytes().to_vec(),
        };

        let key_bytes = container
            .key
            .as_ref()
            .ok_or_else(|| Error::MalformedResponse("Missing key bytes".to_string()))?;
        let iv_bytes = container
            .iv
            .as_ref()
            .ok_or_else(|| Error::MalformedResponse("Missing IV bytes".to_string()))?;

        let key = Self::decrypt_key(key_bytes, iv_bytes, enc_key)?;

        Ok(Self::new(kid, key_type, key, permissions))
    }

    fn decrypt_key(encrypted_key: &[u8], iv: &[u8], enc_key: &[u8]) -> Result<Vec<u8>> {
        let decryptor = Aes128CbcDec::new_from_slices(enc_key, iv).map_err(|_| {
            Error::MalformedResponse(format!(
                "Invalid key/IV length: {}/{} (expected 16/16)",
                enc_key.len(),
                iv.len()
            ))
        })?;

        decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(encrypted_key)
            .map_err(|_| Error::MalformedResponse("Failed to decrypt key container".to_string()))
    }

    /// The key id rendered as a UUID.
    pub fn kid_uuid(&self) -> Uuid {
        Self::kid_to_uuid(&self.kid)
    }

    /// Convert a key id to a UUID.
    ///
    /// Handles various formats:
    /// - 16 bytes: direct UUID bytes
    /// - 32 bytes: hex-encoded UUID string
    /// - Decimal ASCII bytes: parsed as integer
    /// - Other lengths: zero padded or truncated to 16 bytes
    pub fn kid_to_uuid(kid: &[u8]) -> Uuid {
        if kid.is_empty() {
            return Uuid::nil();
        }

        if let Ok(s) = std::str::from_utf8(kid) {
            if s.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(n) = s.parse::<u128>() {
                    return Uuid::from_u128(n);
                }
            }
            if kid.len() == 32 {
                if let Ok(uuid) = Uuid::parse_str(s) {
                    return uuid;
                }
            }
        }

        let mut buf = [0u8; 16];
        let len = kid.len().min(16);
        buf[..len].copy_from_slice(&kid[..len]);
        Uuid::from_bytes(buf)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}:{}",
            self.key_type.as_str_name(),
            hex::encode(&self.kid),
            hex::encode(&self.key)
        )
    }
}

#[cfg(test)]
mod tests {
    use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
    use uuid::Uuid;

    use super::{Key, KeyType};
    use crate::error::Error;
    use crate::license_protocol::license::key_container::OperatorSessionKeyPermissions;
    use crate::license_protocol::license::KeyContainer;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    const ENC_KEY: [u8; 16] = [7u8; 16];
    const IV: [u8; 16] = [9u8; 16];

    fn container(key_type: KeyType, id: Option<&[u8]>, key: &[u8]) -> KeyContainer {
        let encrypted = Aes128CbcEnc::new(&ENC_KEY.into(), &IV.into())
            .encrypt_padded_vec_mut::<Pkcs7>(key);
        KeyContainer {
            id: id.map(|v| v.to_vec()),
            iv: Some(IV.to_vec()),
            key: Some(encrypted),
            r#type: Some(key_type as i32),
            ..Default::default()
        }
    }

    #[test]
    fn decrypts_content_key() {
        let kid = [0x11u8; 16];
        let key = Key::from_key_container(&container(KeyType::Content, Some(&kid[..]), &[0xAB; 16]), &ENC_KEY)
            .expect("decrypt");
        assert_eq!(key.kid, kid.to_vec());
        assert_eq!(key.key_type, KeyType::Content);
        assert_eq!(key.key, vec![0xAB; 16]);
        assert!(key.permissions.is_empty());
    }

    #[test]
    fn key_without_id_uses_type_name() {
        let key = Key::from_key_container(&container(KeyType::Signing, None, &[1u8; 32]), &ENC_KEY)
            .expect("decrypt");
        assert_eq!(key.kid, b"SIGNING".to_vec());
        assert_eq!(key.key.len(), 32);
    }

    #[test]
    fn operator_session_permissions_are_named() {
        let mut c = container(KeyType::OperatorSession, Some(&b"op"[..]), &[2u8; 16]);
        c.operator_session_key_permissions = Some(OperatorSessionKeyPermissions {
            allow_encrypt: Some(true),
            allow_decrypt: Some(false),
            allow_sign: None,
            allow_signature_verify: Some(true),
        });
        let key = Key::from_key_container(&c, &ENC_KEY).expect("decrypt");
        assert_eq!(key.permissions, vec!["allow_encrypt", "allow_signature_verify"]);
    }

    #[test]
    fn bad_iv_or_missing_type_is_malformed() {
        let mut c = container(KeyType::Content, Some(&b"k"[..]), &[3u8; 16]);
        c.iv = Some(vec![0u8; 8]);
        assert!(matches!(Key::from_key_container(&c, &ENC_KEY), Err(Error::MalformedResponse(_))));

        let mut c = container(KeyType::Content, Some(&b"k"[..]), &[3u8; 16]);
        c.r#type = Some(99);
        assert!(matches!(Key::from_key_container(&c, &ENC_KEY), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn kid_to_uuid_formats() {
        let uuid = Uuid::new_v4();
        assert_eq!(Key::kid_to_uuid(uuid.as_bytes()), uuid);
        assert_eq!(Key::kid_to_uuid(uuid.as_simple().to_string().as_bytes()), uuid);
        assert_eq!(Key::kid_to_uuid(b"42"), Uuid::from_u128(42));
        assert_eq!(Key::kid_to_uuid(b""), Uuid::nil());
    }

    #[test]
    fn display_is_type_kid_key() {
        let key = Key::new(vec![0x01, 0x02], KeyType::Content, vec![0xff], Vec::new());
        assert_eq!(key.to_string(), "[CONTENT] 0102:ff");
    }
}
