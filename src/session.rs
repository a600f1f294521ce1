//! License session state.
//!
//! A session belongs to one piece of content. It keeps the signed request that
//! was sent, the keys derived from the response and the keys extracted from it.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::license_protocol::{SignedDrmCertificate, SignedMessage, WidevinePsshData};
use crate::pssh::Pssh;

/// Service certificate applied to a session (privacy mode).
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCertificate {
    /// Parsed certificate, used locally to encrypt the client id.
    Signed(SignedDrmCertificate),
    /// Certificate bytes as supplied, forwarded to a remote CDM.
    Raw(Vec<u8>),
}

/// Keys derived from the session key.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    /// 16-byte key used to decrypt key containers.
    pub enc: Vec<u8>,
    /// 32-byte server MAC key, verifies license signatures.
    pub auth_1: Vec<u8>,
    /// 32-byte client MAC key, used for renewal requests.
    pub auth_2: Vec<u8>,
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeys")
            .field("enc", &format_args!("<{} bytes>", self.enc.len()))
            .field("auth_1", &format_args!("<{} bytes>", self.auth_1.len()))
            .field("auth_2", &format_args!("<{} bytes>", self.auth_2.len()))
            .finish()
    }
}

/// A CDM license session.
///
/// Fields are written only by the device that serves the session.
#[derive(Debug)]
pub struct Session {
    session_id: Vec<u8>,
    init_data: Vec<u8>,
    raw: bool,
    offline: bool,
    privacy_mode: bool,
    service_certificate: Option<ServiceCertificate>,
    keys: Vec<Key>,
    cenc_header: Option<WidevinePsshData>,
    pssh_data: Option<Vec<u8>>,
    pending_request: Option<SignedMessage>,
    session_key: Option<Vec<u8>>,
    derived_keys: Option<DerivedKeys>,
    api_session_id: Option<String>,
}

impl Session {
    /// Create a session for a piece of content.
    ///
    /// Unless `raw` is set, `init_data` must be a PSSH box (or a bare Widevine
    /// cenc header) and is parsed up front.
    pub fn new(session_id: Vec<u8>, init_data: Vec<u8>, raw: bool, offline: bool) -> Result<Self> {
        if session_id.is_empty() {
            return Err(Error::Other("A session id must be provided".to_string()));
        }
        if init_data.is_empty() {
            return Err(Error::InvalidInitData("A PSSH box must be provided".to_string()));
        }

        let (cenc_header, pssh_data) = if raw {
            (None, None)
        } else {
            let pssh = Pssh::from_bytes(&init_data)?;
            (Some(pssh.cenc_header()?), Some(pssh.init_data))
        };

        Ok(Self {
            session_id,
            init_data,
            raw,
            offline,
            privacy_mode: false,
            service_certificate: None,
            keys: Vec::new(),
            cenc_header,
            pssh_data,
            pending_request: None,
            session_key: None,
            derived_keys: None,
            api_session_id: None,
        })
    }

    /// Request id sent to the license server.
    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// Init data exactly as supplied.
    pub fn init_data(&self) -> &[u8] {
        &self.init_data
    }

    /// Whether `init_data` is sent unparsed.
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Whether an OFFLINE instead of a STREAMING license is requested.
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Set once a service certificate is applied.
    pub fn privacy_mode(&self) -> bool {
        self.privacy_mode
    }

    pub fn service_certificate(&self) -> Option<&ServiceCertificate> {
        self.service_certificate.as_ref()
    }

    /// Decrypted keys, in the order they were loaded.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Parsed cenc header, `None` for raw sessions.
    pub fn cenc_header(&self) -> Option<&WidevinePsshData> {
        self.cenc_header.as_ref()
    }

    /// Cenc header bytes as carried by the PSSH box, `None` for raw sessions.
    pub fn pssh_data(&self) -> Option<&[u8]> {
        self.pssh_data.as_deref()
    }

    /// Build a license challenge on `device` and hold the session until the
    /// response arrives.
    pub fn request_license<'a>(&'a mut self, device: &'a dyn Device) -> Result<PendingLicense<'a>> {
        let challenge = device.get_license_challenge(self)?;
        Ok(PendingLicense {
            device,
            session: self,
            challenge,
        })
    }

    /// The signed license request sent with the last challenge.
    pub fn pending_request(&self) -> Option<&SignedMessage> {
        self.pending_request.as_ref()
    }

    /// Session key unwrapped from the license response.
    pub fn session_key(&self) -> Option<&[u8]> {
        self.session_key.as_deref()
    }

    /// Keys derived from the session key.
    pub fn derived_keys(&self) -> Option<&DerivedKeys> {
        self.derived_keys.as_ref()
    }

    /// Remote CDM correlator returned by the challenge call.
    pub fn api_session_id(&self) -> Option<&str> {
        self.api_session_id.as_deref()
    }

    /// Keys of the CONTENT type.
    pub fn content_keys(&self) -> impl Iterator<Item = &Key> {
        self.keys
            .iter()
            .filter(|k| k.key_type == crate::key::KeyType::Content)
    }

    pub(crate) fn set_service_certificate(&mut self, certificate: ServiceCertificate) {
        self.service_certificate = Some(certificate);
        self.privacy_mode = true;
    }

    pub(crate) fn set_pending_request(&mut self, request: SignedMessage) {
        self.pending_request = Some(request);
    }

    pub(crate) fn set_api_session_id(&mut self, api_session_id: String) {
        self.api_session_id = Some(api_session_id);
    }

    /// Publish the outcome of a verified license in one step.
    pub(crate) fn commit_license(&mut self, session_key: Vec<u8>, derived_keys: DerivedKeys, keys: Vec<Key>) {
        self.session_key = Some(session_key);
        self.derived_keys = Some(derived_keys);
        self.keys.extend(keys);
    }

    pub(crate) fn commit_keys(&mut self, keys: Vec<Key>) {
        self.keys.extend(keys);
    }
}

/// A session that has produced a challenge and awaits the license.
///
/// Obtained from [`Session::request_license`]; a response submitted here
/// always has a pending request to be checked against.
#[derive(Debug)]
pub struct PendingLicense<'a> {
    device: &'a dyn Device,
    session: &'a mut Session,
    challenge: Vec<u8>,
}

impl<'a> PendingLicense<'a> {
    /// Serialized challenge to send to the license server.
    pub fn challenge(&self) -> &[u8] {
        &self.challenge
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    /// Verify the license response and load its keys.
    pub fn parse_license(self, license: &[u8]) -> Result<&'a Session> {
        let PendingLicense {
            device, session, ..
        } = self;
        device.parse_license(session, license)?;
        Ok(&*session)
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::Session;
    use crate::error::Error;
    use crate::license_protocol::WidevinePsshData;
    use crate::pssh::Pssh;

    #[test]
    fn parses_pssh_unless_raw() {
        let header = WidevinePsshData {
            key_ids: vec![vec![1u8; 16]],
            ..Default::default()
        };
        let pssh = Pssh::new(header.encode_to_vec()).to_bytes();

        let session = Session::new(b"sid".to_vec(), pssh.clone(), false, false).expect("session");
        assert_eq!(session.cenc_header(), Some(&header));
        assert_eq!(session.pssh_data(), Some(header.encode_to_vec().as_slice()));
        assert!(session.pending_request().is_none());
        assert!(session.keys().is_empty());

        let raw = Session::new(b"sid".to_vec(), b"opaque".to_vec(), true, true).expect("raw session");
        assert!(raw.cenc_header().is_none());
        assert!(raw.is_offline());
        assert!(raw.is_raw());
        assert!(raw.pssh_data().is_none());
    }

    #[test]
    fn rejects_empty_inputs_and_bad_pssh() {
        assert!(Session::new(Vec::new(), b"x".to_vec(), true, false).is_err());
        assert!(matches!(
            Session::new(b"sid".to_vec(), Vec::new(), true, false),
            Err(Error::InvalidInitData(_))
        ));
        assert!(matches!(
            Session::new(b"sid".to_vec(), vec![0xff, 0x00, 0x01], false, false),
            Err(Error::InvalidInitData(_))
        ));
    }
}
