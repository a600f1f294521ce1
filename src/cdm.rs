//! Core Widevine CDM implementation.
//!
//! This module implements the license protocol for [`LocalDevice`]: challenge
//! construction, privacy mode, key derivation and license verification. The
//! [`Cdm`] type keeps open sessions for any [`Device`].
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use cmac::Cmac;
use hmac::{Hmac, Mac};
use prost::Message;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::rand_core::{OsRng, RngCore};
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;

use crate::device::{Device, DeviceType, LocalDevice};
use crate::error::{Error, Result};
use crate::key::{Key, KeyType};
use crate::license_protocol::license_request::content_identification::ContentIdVariant;
use crate::license_protocol::license_request::content_identification::WidevinePsshData as WidevinePsshDataRequest;
use crate::license_protocol::license_request::{ContentIdentification, RequestType};
use crate::license_protocol::signed_message::MessageType;
use crate::license_protocol::{
    ClientIdentification, DrmCertificate, EncryptedClientIdentification, License, LicenseRequest,
    LicenseType, ProtocolVersion, SignedDrmCertificate, SignedMessage,
};
use crate::session::{DerivedKeys, ServiceCertificate, Session};

type HmacSha256 = Hmac<Sha256>;
type CmacAes128 = Cmac<Aes128>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;

/// Service certificate challenge payload.
pub const SERVICE_CERTIFICATE_CHALLENGE: &[u8] = b"\x08\x04";

/// Common Widevine service certificate (license.widevine.com).
pub const COMMON_PRIVACY_CERT: &str = concat!(
    "CAUSxwUKwQIIAxIQFwW5F8wSBIaLBjM6L3cqjBiCtIKSBSKOAjCCAQoCggEBAJntWzsy",
    "fateJO/DtiqVtZhSCtW8yzdQPgZFuBTYdrjfQFEEQa2M462xG7iMTnJaXkqeB5Up",
    "HVhYQCOn4a8OOKkSeTkwCGELbxWMh4x+Ib/7/up34QGeHleB6KRfRiY9FOYOgFioY",
    "Hrc4E+shFexN6jWfM3rM3BdmDoh+07svUoQykdJDKR+ql1DghjduvHK3jOS8T1v+",
    "2RC/THhv0CwxgTRxLpMlSCkv5fuvWCSmvzu9Vu69WTi0Ods18Vcc6CCuZYSC4NZ7",
    "c4kcHCCaA1vZ8bYLErF8xNEkKdO7DevSy8BDFnoKEPiWC8La59dsPxebt9k+9MI",
    "tHEbzxJQAZyfWgkCAwEAAToUbGljZW5zZS53aWRldmluZS5jb20SgAOuNHMUtag1",
    "KX8nE4j7e7jLUnfSSYI83dHaMLkzOVEes8y96gS5RLknwSE0bv296snUE5F+bsF2",
    "oQQ4RgpQO8GVK5uk5M4PxL/CCpgIqq9L/NGcHc/N9XTMrCjRtBBBbPneiAQwHL2z",
    "NMr80NQJeEI6ZC5UYT3wr8+WykqSSdhV5Cs6cD7xdn9qm9Nta/gr52u/DLpP3lnS",
    "q8x2/rZCR7hcQx+8pSJmthn8NpeVQ/ypy727+voOGlXnVaPHvOZV+WRvWCq5z3Cq",
    "CLl5+Gf2Ogsrf9s2LFvE7NVV2FvKqcWTw4PIV9Sdqrd+QLeFHd/SSZiAjjWyWOdd",
    "eOrAyhb3BHMEwg2T7eTo/xxvF+YkPj89qPwXCYcOxF+6gjomPwzvofcJOxkJkoMm",
    "MzcFBDopvab5tDQsyN9UPLGhGC98X/8z8QSQ+spbJTYLdgFenFoGq47gLwDS6NWY",
    "YQSqzE3Udf2W7pzk4ybyG4PHBYV3s4cyzdq8amvtE/sNSdOKReuHpfQ="
);

impl Device for LocalDevice {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn security_level(&self) -> u8 {
        self.security_level
    }

    fn system_id(&self) -> Option<u32> {
        self.system_id
    }

    /// Apply a service certificate to the session.
    ///
    /// The certificate must be a serialized `SignedMessage` holding a
    /// `SignedDrmCertificate`; a bare `SignedDrmCertificate` is accepted too.
    /// The certificate signature is not checked against the Widevine root.
    fn set_service_certificate(&self, session: &mut Session, certificate: &[u8]) -> Result<()> {
        let signed = decode_service_certificate(certificate)?;
        let (drm_certificate, _) = service_public_key(&signed)?;
        debug!(
            "Service certificate for {} set on session {}",
            drm_certificate.provider_id.as_deref().unwrap_or("<unknown provider>"),
            hex::encode(session.session_id())
        );
        session.set_service_certificate(ServiceCertificate::Signed(signed));
        Ok(())
    }

    /// Build a signed license request for the session.
    ///
    /// In privacy mode the client id is encrypted to the service certificate
    /// and left out of the request in plaintext.
    fn get_license_challenge(&self, session: &mut Session) -> Result<Vec<u8>> {
        let client_id = self.client_id.as_ref().ok_or(Error::MissingIdentity)?;
        let signer = self.signer()?;

        let pssh_data = session
            .pssh_data()
            .unwrap_or(session.init_data())
            .to_vec();
        let license_type = if session.is_offline() {
            LicenseType::Offline
        } else {
            LicenseType::Streaming
        };

        let encrypted_client_id = match session.service_certificate() {
            Some(ServiceCertificate::Signed(certificate)) => {
                Some(Cdm::encrypt_client_id(client_id, certificate, None, None)?)
            }
            Some(ServiceCertificate::Raw(_)) => {
                return Err(Error::MalformedCertificate(
                    "Service certificate was stored unparsed".to_string(),
                ))
            }
            None => None,
        };

        let content_id = ContentIdentification {
            content_id_variant: Some(ContentIdVariant::WidevinePsshData(
                WidevinePsshDataRequest {
                    pssh_data: vec![pssh_data],
                    license_type: Some(license_type as i32),
                    request_id: Some(session.session_id().to_vec()),
                },
            )),
        };

        let request_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let license_request = LicenseRequest {
            client_id: if encrypted_client_id.is_some() {
                None
            } else {
                Some(client_id.clone())
            },
            content_id: Some(content_id),
            r#type: Some(RequestType::New as i32),
            request_time: Some(request_time),
            key_control_nonce_deprecated: None,
            protocol_version: Some(ProtocolVersion::Version21 as i32),
            key_control_nonce: self
                .flags
                .send_key_control_nonce
                .then(key_control_nonce),
            encrypted_client_id,
        };

        let license_request_bytes = license_request.encode_to_vec();
        let signature = signer.sign(&license_request_bytes)?;

        let signed_message = SignedMessage {
            r#type: Some(MessageType::LicenseRequest as i32),
            msg: Some(license_request_bytes),
            signature: Some(signature),
            ..Default::default()
        };
        let challenge = signed_message.encode_to_vec();

        debug!(
            "Built {} license challenge for session {} ({} bytes, privacy mode: {})",
            license_type.as_str_name(),
            hex::encode(session.session_id()),
            challenge.len(),
            session.privacy_mode()
        );
        session.set_pending_request(signed_message);
        Ok(challenge)
    }

    /// Verify a license response and load its keys into the session.
    ///
    /// The HMAC covers the license message bytes. Nothing is written to the
    /// session unless the signature matches and every key container decrypts.
    fn parse_license(&self, session: &mut Session, license: &[u8]) -> Result<()> {
        let request_msg = session
            .pending_request()
            .and_then(|request| request.msg.clone())
            .ok_or(Error::NoPendingRequest)?;

        let signed_message = SignedMessage::decode(license).map_err(|e| {
            Error::MalformedResponse(format!("Failed to parse SignedMessage: {}", e))
        })?;
        if let Some(message_type) = signed_message.r#type {
            if message_type != MessageType::License as i32 {
                return Err(Error::MalformedResponse(format!(
                    "Expected a LICENSE message, got type {}",
                    message_type
                )));
            }
        }

        let msg_bytes = signed_message
            .msg
            .as_deref()
            .ok_or_else(|| Error::MalformedResponse("Missing license message".to_string()))?;
        let license = License::decode(msg_bytes)
            .map_err(|e| Error::MalformedResponse(format!("Failed to parse License: {}", e)))?;
        let wrapped_session_key = signed_message
            .session_key
            .as_deref()
            .ok_or_else(|| Error::MalformedResponse("Missing session key".to_string()))?;
        let signature = signed_message
            .signature
            .as_deref()
            .ok_or_else(|| Error::MalformedResponse("Missing license signature".to_string()))?;

        let session_key = self
            .signer()?
            .decrypt(wrapped_session_key)
            .map_err(|e| Error::MalformedResponse(format!("Failed to unwrap session key: {}", e)))?;

        let (enc_context, mac_context) = Cdm::derive_context(&request_msg);
        let derived_keys = Cdm::derive_keys(&enc_context, &mac_context, &session_key)?;

        let mut mac = HmacSha256::new_from_slice(&derived_keys.auth_1)
            .map_err(|e| Error::Other(format!("Invalid HMAC key: {}", e)))?;
        mac.update(msg_bytes);
        mac.verify_slice(signature).map_err(|_| {
            Error::SignatureMismatch("License signature does not match the derived MAC key".to_string())
        })?;

        let keys = license
            .key
            .iter()
            .map(|container| Key::from_key_container(container, &derived_keys.enc))
            .collect::<Result<Vec<_>>>()?;

        for key in keys.iter() {
            trace!("Loaded {} key {}", key.key_type.as_str_name(), hex::encode(&key.kid));
        }
        info!(
            "Loaded {} keys into session {}",
            keys.len(),
            hex::encode(session.session_id())
        );
        session.commit_license(session_key, derived_keys, keys);
        Ok(())
    }
}

/// Widevine Content Decryption Module (CDM).
///
/// Keeps the open sessions of one device. Any number of sessions may be open
/// at once.
#[derive(Debug)]
pub struct Cdm {
    device: Arc<dyn Device>,
    sessions: HashMap<Vec<u8>, Session>,
}

impl Cdm {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            sessions: HashMap::new(),
        }
    }

    /// The device backing this CDM.
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Open a session for `init_data` and return its session id.
    pub fn open(&mut self, init_data: &[u8], raw: bool, offline: bool) -> Result<Vec<u8>> {
        let session_id = Self::create_session_id(self.device.device_type());
        let session = Session::new(session_id.clone(), init_data.to_vec(), raw, offline)?;
        debug!("Opened session {}", hex::encode(&session_id));
        self.sessions.insert(session_id.clone(), session);
        Ok(session_id)
    }

    /// Close a session by id.
    pub fn close(&mut self, session_id: &[u8]) -> Result<()> {
        if self.sessions.remove(session_id).is_none() {
            return Err(Error::InvalidSession(session_id.to_vec()));
        }
        debug!("Closed session {}", hex::encode(session_id));
        Ok(())
    }

    pub fn is_session_open(&self, session_id: &[u8]) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session(&self, session_id: &[u8]) -> Result<&Session> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| Error::InvalidSession(session_id.to_vec()))
    }

    fn session_mut(&mut self, session_id: &[u8]) -> Result<&mut Session> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::InvalidSession(session_id.to_vec()))
    }

    /// Set the service certificate for a session, enabling privacy mode.
    pub fn set_service_certificate(&mut self, session_id: &[u8], certificate: &[u8]) -> Result<()> {
        let device = Arc::clone(&self.device);
        device.set_service_certificate(self.session_mut(session_id)?, certificate)
    }

    /// Build a signed license request for a session.
    pub fn get_license_challenge(&mut self, session_id: &[u8]) -> Result<Vec<u8>> {
        let device = Arc::clone(&self.device);
        device.get_license_challenge(self.session_mut(session_id)?)
    }

    /// Parse a license response and load keys into the session.
    pub fn parse_license(&mut self, session_id: &[u8], license: &[u8]) -> Result<()> {
        let device = Arc::clone(&self.device);
        device.parse_license(self.session_mut(session_id)?, license)
    }

    /// Keys loaded into a session, optionally only CONTENT keys.
    pub fn get_keys(&self, session_id: &[u8], content_only: bool) -> Result<Vec<Key>> {
        let session = self.session(session_id)?;
        Ok(session
            .keys()
            .iter()
            .filter(|key| !content_only || key.key_type == KeyType::Content)
            .cloned()
            .collect())
    }

    /// Create a session id in the form the device type uses.
    ///
    /// Android ids are 16 uppercase hex digits, the counter `01`, and `0`
    /// padding up to 32 ASCII bytes. Chrome ids are 16 random bytes.
    pub fn create_session_id(device_type: DeviceType) -> Vec<u8> {
        match device_type {
            DeviceType::Android => {
                let session_id = format!("{:016X}01", OsRng.next_u64());
                format!("{:0<32}", session_id).into_bytes()
            }
            DeviceType::Chrome => {
                let mut session_id = vec![0u8; 16];
                OsRng.fill_bytes(&mut session_id);
                session_id
            }
        }
    }

    /// Encrypt the client id using a service certificate (privacy mode).
    ///
    /// Uses AES-128-CBC with PKCS#5/7 padding and wraps the privacy key using
    /// RSA-OAEP with the service certificate public key. `key` and `iv` are
    /// optional and default to random 16-byte values.
    pub fn encrypt_client_id(
        client_id: &ClientIdentification,
        service_certificate: &SignedDrmCertificate,
        key: Option<&[u8]>,
        iv: Option<&[u8]>,
    ) -> Result<EncryptedClientIdentification> {
        let privacy_key = random_or(key, "Privacy key")?;
        let privacy_iv = random_or(iv, "Privacy IV")?;

        let (drm_certificate, public_key) = service_public_key(service_certificate)?;

        let encrypted_client_id = Aes128CbcEnc::new(&privacy_key.into(), &privacy_iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(&client_id.encode_to_vec());
        let encrypted_privacy_key =
            public_key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), &privacy_key)?;

        Ok(EncryptedClientIdentification {
            provider_id: drm_certificate.provider_id,
            service_certificate_serial_number: drm_certificate.serial_number,
            encrypted_client_id: Some(encrypted_client_id),
            encrypted_client_id_iv: Some(privacy_iv.to_vec()),
            encrypted_privacy_key: Some(encrypted_privacy_key),
        })
    }

    /// Derive encryption and MAC context from a message.
    ///
    /// Context format follows Widevine's ENCRYPTION/AUTHENTICATION labels.
    #[must_use]
    pub fn derive_context(message: &[u8]) -> (Vec<u8>, Vec<u8>) {
        fn enc_context(msg: &[u8]) -> Vec<u8> {
            let mut out = Vec::with_capacity(11 + msg.len() + 4);
            out.extend_from_slice(b"ENCRYPTION");
            out.push(0);
            out.extend_from_slice(msg);
            out.extend_from_slice(&(16u32 * 8).to_be_bytes());
            out
        }

        fn mac_context(msg: &[u8]) -> Vec<u8> {
            let mut out = Vec::with_capacity(15 + msg.len() + 4);
            out.extend_from_slice(b"AUTHENTICATION");
            out.push(0);
            out.extend_from_slice(msg);
            out.extend_from_slice(&(32u32 * 8 * 2).to_be_bytes());
            out
        }

        (enc_context(message), mac_context(message))
    }

    /// Derive the encryption and MAC keys from a session key.
    ///
    /// Each block is AES-CMAC(session_key, counter || context).
    pub fn derive_keys(enc_context: &[u8], mac_context: &[u8], key: &[u8]) -> Result<DerivedKeys> {
        let derive = |context: &[u8], counter: u8| -> Result<Vec<u8>> {
            let mut mac = <CmacAes128 as Mac>::new_from_slice(key).map_err(|_| {
                Error::MalformedResponse(format!("Invalid session key length: {}", key.len()))
            })?;
            mac.update(&[counter]);
            mac.update(context);
            Ok(mac.finalize().into_bytes().to_vec())
        };

        let enc = derive(enc_context, 1)?;
        let mut auth_1 = derive(mac_context, 1)?;
        auth_1.extend_from_slice(&derive(mac_context, 2)?);
        let mut auth_2 = derive(mac_context, 3)?;
        auth_2.extend_from_slice(&derive(mac_context, 4)?);
        Ok(DerivedKeys { enc, auth_1, auth_2 })
    }
}

/// A key control nonce, uniform in `[1, 2^31)`.
fn key_control_nonce() -> u32 {
    loop {
        let nonce = OsRng.next_u32() & 0x7fff_ffff;
        if nonce != 0 {
            return nonce;
        }
    }
}

fn random_or(value: Option<&[u8]>, what: &str) -> Result<[u8; 16]> {
    let mut out = [0u8; 16];
    match value {
        Some(value) if value.len() == 16 => out.copy_from_slice(value),
        Some(value) => {
            return Err(Error::Other(format!(
                "{} must be 16 bytes, got {}",
                what,
                value.len()
            )))
        }
        None => OsRng.fill_bytes(&mut out),
    }
    Ok(out)
}

fn decode_service_certificate(data: &[u8]) -> Result<SignedDrmCertificate> {
    if let Ok(signed_message) = SignedMessage::decode(data) {
        if let Some(msg) = signed_message.msg {
            return SignedDrmCertificate::decode(msg.as_slice()).map_err(|e| {
                Error::MalformedCertificate(format!("Failed to parse SignedDrmCertificate: {}", e))
            });
        }
    }

    SignedDrmCertificate::decode(data).map_err(|e| {
        Error::MalformedCertificate(format!("Failed to parse SignedDrmCertificate: {}", e))
    })
}

fn service_public_key(certificate: &SignedDrmCertificate) -> Result<(DrmCertificate, RsaPublicKey)> {
    let certificate_bytes = certificate
        .drm_certificate
        .as_deref()
        .ok_or_else(|| Error::MalformedCertificate("Missing DRM certificate".to_string()))?;
    let drm_certificate = DrmCertificate::decode(certificate_bytes).map_err(|e| {
        Error::MalformedCertificate(format!("Failed to parse DrmCertificate: {}", e))
    })?;
    let public_key_bytes = drm_certificate
        .public_key
        .as_deref()
        .ok_or_else(|| Error::MalformedCertificate("Missing public key".to_string()))?;
    let public_key = RsaPublicKey::from_pkcs1_der(public_key_bytes).map_err(|e| {
        Error::MalformedCertificate(format!("Failed to parse public key: {}", e))
    })?;
    Ok((drm_certificate, public_key))
}
