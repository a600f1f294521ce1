//! Remote CDM client for CDM API endpoints.
//!
//! A [`RemoteDevice`] holds no key material. Every operation is a JSON POST
//! to the configured host:
//!
//! ```text
//! request:  {"method": "GetChallenge", "params": {...}, "token": "<key>"}
//! response: {"status_code": 200, "message": {...}}
//! ```
//!
//! Any status other than 200 is returned as [`Error::Remote`].
use std::fmt;
use std::time::Duration;

use base64::Engine;
use prost::Message;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::device::{Device, DeviceType};
use crate::error::{Error, Result};
use crate::key::{Key, KeyType};
use crate::license_protocol::signed_message::MessageType;
use crate::license_protocol::SignedMessage;
use crate::session::{ServiceCertificate, Session};

/// Request timeout used when the config does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Remote device settings, as stored in YAML or JSON device configs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDeviceConfig {
    /// `CHROME` or `ANDROID`.
    #[serde(rename = "type")]
    pub device_type: String,
    pub system_id: u32,
    pub security_level: u8,
    pub name: String,
    /// API endpoint every call is posted to.
    pub host: String,
    /// Bearer token sent with every call.
    pub key: String,
    /// Device name the API should use, if it serves several.
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Device whose cryptography runs behind a remote CDM API.
pub struct RemoteDevice {
    pub device_type: DeviceType,
    pub system_id: u32,
    pub security_level: u8,
    pub name: String,
    pub host: String,
    pub device: Option<String>,
    key: String,
    client: Client,
}

impl fmt::Debug for RemoteDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteDevice")
            .field("device_type", &self.device_type)
            .field("system_id", &self.system_id)
            .field("security_level", &self.security_level)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl RemoteDevice {
    /// Create a RemoteDevice from its config.
    pub fn from_config(config: RemoteDeviceConfig) -> Result<Self> {
        let device_type = config.device_type.parse()?;
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = Client::builder()
            .user_agent(concat!("vinecdm/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            device_type,
            system_id: config.system_id,
            security_level: config.security_level,
            name: config.name,
            host: config.host,
            device: config.device,
            key: config.key,
            client,
        })
    }

    /// Exchange a license for the encryption and signing keys named by id.
    ///
    /// Returns `(encryption_key, sign_key)`.
    pub fn exchange(
        &self,
        session: &Session,
        license: &[u8],
        enc_key_id: &[u8],
        hmac_key_id: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let api_session_id = session.api_session_id().ok_or(Error::NoPendingRequest)?;
        let reply: ExchangeReply = self.call(
            "GetKeysX",
            json!({
                "cdmkeyresponse": b64(license),
                "encryptionkeyid": b64(enc_key_id),
                "hmackeyid": b64(hmac_key_id),
                "session_id": api_session_id,
            }),
        )?;
        let engine = base64::engine::general_purpose::STANDARD;
        Ok((engine.decode(reply.encryption_key)?, engine.decode(reply.sign_key)?))
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        debug!("Calling {} on {}", method, self.host);
        let body = self
            .client
            .post(&self.host)
            .json(&json!({
                "method": method,
                "params": params,
                "token": self.key,
            }))
            .send()?
            .bytes()?;

        let response: ApiResponse = serde_json::from_slice(&body)?;
        if response.status_code != Some(200) {
            let message = match response.message {
                Value::String(message) => message,
                other => other.to_string(),
            };
            return Err(Error::Remote {
                status: response.status_code.unwrap_or_default(),
                message,
            });
        }
        Ok(serde_json::from_value(response.message)?)
    }
}

impl Device for RemoteDevice {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn security_level(&self) -> u8 {
        self.security_level
    }

    fn system_id(&self) -> Option<u32> {
        Some(self.system_id)
    }

    /// Store the certificate bytes for the API; nothing is parsed locally.
    fn set_service_certificate(&self, session: &mut Session, certificate: &[u8]) -> Result<()> {
        session.set_service_certificate(ServiceCertificate::Raw(certificate.to_vec()));
        Ok(())
    }

    fn get_license_challenge(&self, session: &mut Session) -> Result<Vec<u8>> {
        let cert = match session.service_certificate() {
            Some(ServiceCertificate::Raw(certificate)) => Some(b64(certificate)),
            Some(ServiceCertificate::Signed(certificate)) => {
                let message = SignedMessage {
                    r#type: Some(MessageType::ServiceCertificate as i32),
                    msg: Some(certificate.encode_to_vec()),
                    ..Default::default()
                };
                Some(b64(&message.encode_to_vec()))
            }
            None => None,
        };

        let reply: ChallengeReply = self.call(
            "GetChallenge",
            json!({
                "init": b64(session.init_data()),
                "cert": cert,
                "raw": session.is_raw(),
                "licensetype": if session.is_offline() { "OFFLINE" } else { "STREAMING" },
                "device": self.device,
            }),
        )?;
        let challenge = base64::engine::general_purpose::STANDARD.decode(reply.challenge)?;

        debug!(
            "Remote challenge for session {} ({} bytes, api session {})",
            hex::encode(session.session_id()),
            challenge.len(),
            reply.session_id
        );
        session.set_api_session_id(reply.session_id);
        Ok(challenge)
    }

    /// Submit a license response and load the keys the API returns.
    fn parse_license(&self, session: &mut Session, license: &[u8]) -> Result<()> {
        let api_session_id = session.api_session_id().ok_or(Error::NoPendingRequest)?;
        let reply: KeysReply = self.call(
            "GetKeys",
            json!({
                "cdmkeyresponse": b64(license),
                "session_id": api_session_id,
            }),
        )?;

        let keys = reply
            .keys
            .into_iter()
            .map(RemoteKey::into_key)
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Loaded {} keys into session {} from {}",
            keys.len(),
            hex::encode(session.session_id()),
            self.name
        );
        session.commit_keys(keys);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    status_code: Option<i64>,
    #[serde(default)]
    message: Value,
}

#[derive(Debug, Deserialize)]
struct ChallengeReply {
    session_id: String,
    challenge: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeReply {
    encryption_key: String,
    sign_key: String,
}

#[derive(Debug, Deserialize)]
struct KeysReply {
    keys: Vec<RemoteKey>,
}

#[derive(Debug, Deserialize)]
struct RemoteKey {
    kid: String,
    key: String,
    #[serde(default, rename = "type")]
    key_type: Option<String>,
}

impl RemoteKey {
    fn into_key(self) -> Result<Key> {
        let key_type = match self.key_type.as_deref() {
            None => KeyType::Content,
            Some(name) => KeyType::from_str_name(name).ok_or_else(|| {
                Error::MalformedResponse(format!("Unknown key type '{}'", name))
            })?,
        };
        let kid = hex::decode(&self.kid)
            .map_err(|e| Error::MalformedResponse(format!("Invalid key id '{}': {}", self.kid, e)))?;
        let key = hex::decode(&self.key)
            .map_err(|e| Error::MalformedResponse(format!("Invalid key for {}: {}", self.kid, e)))?;
        Ok(Key::new(kid, key_type, key, Vec::new()))
    }
}

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}
