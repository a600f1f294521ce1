//! Device identities and the Widevine Device (.wvd) file format.
//!
//! A [`Device`] turns sessions into license challenges and license responses
//! into keys. [`LocalDevice`] holds the RSA key and ClientIdentification
//! blob in-process; the remote variant lives in `remotecdm`.
//!
//! WVD v1 layout (all lengths big endian):
//!
//! ```text
//! "WVD" | version u8 | type u8 | security_level u8 | flags u8
//! private_key_len u16 | private_key | client_id_len u16 | client_id
//! [vmp_len u16 | vmp]
//! ```
//!
//! VMP data found in the trailer is merged into the ClientIdentification on
//! load. Saving writes the merged ClientIdentification back, so a round-trip
//! is byte-identical only for devices without VMP data.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use prost::Message;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::license_protocol::{ClientIdentification, DrmCertificate, FileHashes, SignedDrmCertificate};
use crate::session::Session;
use crate::signer::Signer;

/// Magic bytes for WVD files.
pub const WVD_MAGIC: &[u8; 3] = b"WVD";

/// Latest supported WVD version.
pub const WVD_VERSION: u8 = 1;

/// Device types supported by Widevine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceType {
    /// Chrome CDM device.
    Chrome = 1,
    /// Android CDM device.
    Android = 2,
}

impl TryFrom<u8> for DeviceType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(DeviceType::Chrome),
            2 => Ok(DeviceType::Android),
            _ => Err(Error::InvalidDeviceFile(format!(
                "Invalid device type: {}",
                value
            ))),
        }
    }
}

impl From<DeviceType> for u8 {
    fn from(device_type: DeviceType) -> Self {
        device_type as u8
    }
}

impl std::str::FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CHROME" => Ok(DeviceType::Chrome),
            "ANDROID" => Ok(DeviceType::Android),
            _ => Err(Error::Other(format!("Invalid device type '{}'", s))),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceType::Chrome => "CHROME",
            DeviceType::Android => "ANDROID",
        })
    }
}

/// Device behaviour flags, stored as a bit field in the WVD header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceFlags {
    /// Put a random key control nonce in license requests.
    pub send_key_control_nonce: bool,
}

impl DeviceFlags {
    const SEND_KEY_CONTROL_NONCE: u8 = 0b0000_0001;

    pub fn from_bits(bits: u8) -> Self {
        Self {
            send_key_control_nonce: bits & Self::SEND_KEY_CONTROL_NONCE != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        if self.send_key_control_nonce {
            Self::SEND_KEY_CONTROL_NONCE
        } else {
            0
        }
    }
}

/// A device identity able to drive license sessions.
///
/// Devices are immutable and may be shared across threads; each call mutates
/// only the session it is given.
pub trait Device: fmt::Debug + Send + Sync {
    fn device_type(&self) -> DeviceType;

    fn security_level(&self) -> u8;

    /// System id of the device certificate, if known.
    fn system_id(&self) -> Option<u32>;

    /// Apply a service certificate to the session, enabling privacy mode.
    fn set_service_certificate(&self, session: &mut Session, certificate: &[u8]) -> Result<()>;

    /// Build a signed license request for the session.
    fn get_license_challenge(&self, session: &mut Session) -> Result<Vec<u8>>;

    /// Verify a license response and load its keys into the session.
    ///
    /// Fails with `NoPendingRequest` before a challenge was built.
    /// [`Session::request_license`] pairs the two calls.
    fn parse_license(&self, session: &mut Session, license: &[u8]) -> Result<()>;
}

/// Device with key material held in-process.
///
/// The protocol implementation for this type lives in `cdm`.
#[derive(Debug, Clone)]
pub struct LocalDevice {
    /// Device type (Chrome or Android).
    pub device_type: DeviceType,
    /// Security level (1-3, where 1 is highest).
    pub security_level: u8,
    pub flags: DeviceFlags,
    /// RSA private key for signing.
    pub private_key: Option<RsaPrivateKey>,
    /// Client identification blob.
    pub client_id: Option<ClientIdentification>,
    /// Verified Media Path (VMP) data.
    pub vmp: Option<FileHashes>,
    /// System ID extracted from the DRM certificate.
    pub system_id: Option<u32>,
    pub(crate) signer: Option<Arc<dyn Signer>>,
}

impl LocalDevice {
    /// Create a Device from components.
    ///
    /// A non-empty `vmp` blob is parsed and merged into the ClientIdentification.
    pub fn new(
        device_type: DeviceType,
        security_level: u8,
        flags: DeviceFlags,
        private_key: Option<RsaPrivateKey>,
        client_id: Option<ClientIdentification>,
        vmp: Option<&[u8]>,
    ) -> Result<Self> {
        if !(1..=3).contains(&security_level) {
            return Err(Error::InvalidDeviceFile(format!(
                "Invalid security level: {}",
                security_level
            )));
        }

        let vmp = match vmp {
            Some(data) if !data.is_empty() => Some(FileHashes::decode(data).map_err(|e| {
                Error::InvalidDeviceFile(format!("VMP could not be parsed as FileHashes: {}", e))
            })?),
            _ => None,
        };

        let mut client_id = client_id;
        if let (Some(client_id), Some(vmp)) = (client_id.as_mut(), vmp.as_ref()) {
            client_id.vmp_data = Some(vmp.encode_to_vec());
        }

        let system_id = client_id.as_ref().and_then(system_id_of);
        if system_id.is_none() {
            debug!("No system id could be read from the client identification");
        }

        Ok(Self {
            device_type,
            security_level,
            flags,
            private_key,
            client_id,
            vmp,
            system_id,
            signer: None,
        })
    }

    /// Use an external signer for devices without a private key.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// The key or signer used for private-key operations.
    pub(crate) fn signer(&self) -> Result<&dyn Signer> {
        if let Some(ref key) = self.private_key {
            return Ok(key);
        }
        self.signer
            .as_deref()
            .ok_or(Error::MissingSigningCapability)
    }

    /// Load a Device from a WVD file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Load a Device from a URL.
    #[cfg(feature = "remote")]
    pub fn from_url(url: &str) -> Result<Self> {
        let response = reqwest::blocking::get(url)?.error_for_status()?;
        Self::from_bytes(&response.bytes()?)
    }

    /// Load a Device from a path, or from a URL when `allow_network` is set.
    pub fn load(uri: &str, allow_network: bool) -> Result<Self> {
        let is_url = uri.starts_with("http://") || uri.starts_with("https://");
        if !is_url {
            return Self::from_path(uri);
        }
        if !allow_network {
            return Err(Error::Other(format!(
                "Refusing to fetch device from {} without network access",
                uri
            )));
        }
        #[cfg(feature = "remote")]
        {
            Self::from_url(uri)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(Error::Other("remote feature is disabled".to_string()))
        }
    }

    /// Load a Device from a provisioning directory.
    ///
    /// Expects `wv.json` and `device_client_id_blob`; `device_private_key`
    /// and `device_vmp_blob` are optional.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let config: DirConfig = serde_json::from_slice(&std::fs::read(dir.join("wv.json"))?)?;
        let device_type: DeviceType = config.session_id_type.parse()?;

        let private_key = read_optional(&dir.join("device_private_key"))?
            .map(|der| parse_private_key(&der))
            .transpose()?;
        let client_id = decode_client_id(&std::fs::read(dir.join("device_client_id_blob"))?)?;
        let vmp = read_optional(&dir.join("device_vmp_blob"))?;

        let flags = DeviceFlags {
            send_key_control_nonce: config
                .send_key_control_nonce
                .unwrap_or(device_type == DeviceType::Android),
        };

        Self::new(
            device_type,
            config.security_level,
            flags,
            private_key,
            Some(client_id),
            vmp.as_deref(),
        )
    }

    /// Load a Device from WVD bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        if reader.take(3, "magic")? != WVD_MAGIC {
            return Err(Error::InvalidDeviceFile("Invalid magic bytes".to_string()));
        }
        let version = reader.u8("version")?;
        if version != WVD_VERSION {
            return Err(Error::InvalidDeviceFile(format!(
                "Unsupported version: {}",
                version
            )));
        }

        let device_type = DeviceType::try_from(reader.u8("device type")?)?;
        let security_level = reader.u8("security level")?;
        let bits = reader.u8("flags")?;
        if bits & !DeviceFlags::SEND_KEY_CONTROL_NONCE != 0 {
            debug!("Ignoring reserved WVD flag bits {:#04x}", bits);
        }
        let flags = DeviceFlags::from_bits(bits);

        let private_key_len = reader.u16("private key length")? as usize;
        let private_key = if private_key_len > 0 {
            Some(parse_private_key(reader.take(private_key_len, "private key")?)?)
        } else {
            None
        };

        let client_id_len = reader.u16("client ID length")? as usize;
        if client_id_len == 0 {
            return Err(Error::InvalidDeviceFile("Client ID is empty".to_string()));
        }
        let client_id = decode_client_id(reader.take(client_id_len, "client ID")?)?;

        let vmp = if reader.is_empty() {
            None
        } else {
            let vmp_len = reader.u16("VMP length")? as usize;
            Some(reader.take(vmp_len, "VMP")?)
        };

        if !reader.is_empty() {
            debug!("Ignoring {} trailing bytes after WVD data", reader.remaining());
        }

        Self::new(
            device_type,
            security_level,
            flags,
            private_key,
            Some(client_id),
            vmp,
        )
    }

    /// Serialize the Device to WVD v1 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let private_key = match self.private_key {
            Some(ref key) => key
                .to_pkcs1_der()
                .map_err(|e| Error::Other(format!("Failed to encode RSA key: {}", e)))?
                .as_bytes()
                .to_vec(),
            None => Vec::new(),
        };
        let client_id = self
            .client_id
            .as_ref()
            .ok_or(Error::MissingIdentity)?
            .encode_to_vec();
        let vmp = self
            .vmp
            .as_ref()
            .map(|vmp| vmp.encode_to_vec())
            .unwrap_or_default();

        let mut buf = Vec::with_capacity(13 + private_key.len() + client_id.len() + vmp.len());
        buf.extend_from_slice(WVD_MAGIC);
        buf.push(WVD_VERSION);
        buf.push(self.device_type.into());
        buf.push(self.security_level);
        buf.push(self.flags.bits());
        write_block(&mut buf, &private_key, "private key")?;
        write_block(&mut buf, &client_id, "client ID")?;
        write_block(&mut buf, &vmp, "VMP")?;
        Ok(buf)
    }

    /// Save the Device to a WVD file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DirConfig {
    session_id_type: String,
    security_level: u8,
    send_key_control_nonce: Option<bool>,
}

/// Bounds-checked cursor over WVD bytes.
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::InvalidDeviceFile(format!("Data too short for {}", what)));
        }
        let out = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(out)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}

fn write_block(buf: &mut Vec<u8>, data: &[u8], what: &str) -> Result<()> {
    let len = u16::try_from(data.len())
        .map_err(|_| Error::Other(format!("{} is too large for WVD ({} bytes)", what, data.len())))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_private_key(der: &[u8]) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs1_der(der)
        .or_else(|_| RsaPrivateKey::from_pkcs8_der(der))
        .map_err(|e| Error::InvalidDeviceFile(format!("Failed to parse RSA key: {}", e)))
}

fn decode_client_id(data: &[u8]) -> Result<ClientIdentification> {
    ClientIdentification::decode(data).map_err(|e| {
        Error::InvalidDeviceFile(format!("Failed to parse ClientIdentification: {}", e))
    })
}

/// System id from the DRM certificate carried as the client id token.
fn system_id_of(client_id: &ClientIdentification) -> Option<u32> {
    let token = client_id.token.as_ref()?;
    let signed = SignedDrmCertificate::decode(token.as_slice()).ok()?;
    let certificate = DrmCertificate::decode(signed.drm_certificate.as_deref()?).ok()?;
    certificate.system_id
}

#[cfg(test)]
mod tests {
    use prost::Message;
    use rsa::pkcs1::EncodeRsaPrivateKey;

    use super::{DeviceFlags, DeviceType, LocalDevice};
    use crate::error::Error;
    use crate::license_protocol::{file_hashes, FileHashes};
    use crate::test_support::{client_id, private_key, SYSTEM_ID};

    fn wvd(flags: u8, with_key: bool, vmp: Option<&[u8]>) -> Vec<u8> {
        let key = if with_key {
            private_key().to_pkcs1_der().expect("der").as_bytes().to_vec()
        } else {
            Vec::new()
        };
        let cid = client_id().encode_to_vec();

        let mut buf = b"WVD".to_vec();
        buf.extend_from_slice(&[1, 2, 3, flags]);
        buf.extend_from_slice(&(key.len() as u16).to_be_bytes());
        buf.extend_from_slice(&key);
        buf.extend_from_slice(&(cid.len() as u16).to_be_bytes());
        buf.extend_from_slice(&cid);
        if let Some(vmp) = vmp {
            buf.extend_from_slice(&(vmp.len() as u16).to_be_bytes());
            buf.extend_from_slice(vmp);
        }
        buf
    }

    fn vmp_blob() -> Vec<u8> {
        FileHashes {
            signer: Some(b"signer".to_vec()),
            signatures: vec![file_hashes::Signature {
                filename: Some("widevinecdm.dll".to_string()),
                main_exe: Some(false),
                ..Default::default()
            }],
        }
        .encode_to_vec()
    }

    #[test]
    fn parses_header_fields() {
        let device = LocalDevice::from_bytes(&wvd(1, true, None)).expect("parse");
        assert_eq!(device.device_type, DeviceType::Android);
        assert_eq!(device.security_level, 3);
        assert!(device.flags.send_key_control_nonce);
        assert!(device.private_key.is_some());
        assert_eq!(device.client_id.as_ref(), Some(client_id()));
        assert_eq!(device.system_id, Some(SYSTEM_ID));
        assert!(device.vmp.is_none());
    }

    #[test]
    fn round_trips_without_vmp() {
        let bytes = wvd(1, true, Some(&[][..]));
        let device = LocalDevice::from_bytes(&bytes).expect("parse");
        assert_eq!(device.to_bytes().expect("serialize"), bytes);

        let keyless = wvd(0, false, Some(&[][..]));
        let device = LocalDevice::from_bytes(&keyless).expect("parse keyless");
        assert!(device.private_key.is_none());
        assert_eq!(device.to_bytes().expect("serialize"), keyless);
    }

    #[test]
    fn missing_vmp_trailer_is_accepted() {
        let device = LocalDevice::from_bytes(&wvd(0, false, None)).expect("parse");
        assert!(device.vmp.is_none());
        // Saving always writes the trailer.
        assert_eq!(device.to_bytes().expect("serialize"), wvd(0, false, Some(&[][..])));
    }

    #[test]
    fn vmp_is_merged_on_load_only() {
        let vmp = vmp_blob();
        let bytes = wvd(0, true, Some(&vmp[..]));
        let device = LocalDevice::from_bytes(&bytes).expect("parse");

        let merged = device.client_id.as_ref().expect("client id");
        assert_eq!(merged.vmp_data.as_deref(), Some(vmp.as_slice()));
        assert!(device.vmp.is_some());

        let saved = device.to_bytes().expect("serialize");
        assert_ne!(saved, bytes);
        let reloaded = LocalDevice::from_bytes(&saved).expect("reload");
        assert_eq!(reloaded.client_id, device.client_id);
        assert_eq!(reloaded.vmp, device.vmp);
    }

    #[test]
    fn rejects_malformed_files() {
        let good = wvd(0, true, None);

        let mut bad_magic = good.clone();
        bad_magic[0] = b'X';
        let mut bad_version = good.clone();
        bad_version[3] = 2;
        let mut bad_type = good.clone();
        bad_type[4] = 9;
        let mut bad_level = good.clone();
        bad_level[5] = 4;

        for data in [
            bad_magic,
            bad_version,
            bad_type,
            bad_level,
            good[..good.len() - 1].to_vec(),
            good[..10].to_vec(),
        ] {
            assert!(matches!(
                LocalDevice::from_bytes(&data),
                Err(Error::InvalidDeviceFile(_))
            ));
        }

        let mut truncated_vmp = wvd(0, false, None);
        truncated_vmp.extend_from_slice(&[0x00, 0x10, 0x01]);
        assert!(LocalDevice::from_bytes(&truncated_vmp).is_err());
    }

    #[test]
    fn reserved_flag_bits_are_dropped() {
        let device = LocalDevice::from_bytes(&wvd(0b1000_0001, false, None)).expect("parse");
        assert!(device.flags.send_key_control_nonce);
        assert_eq!(device.to_bytes().expect("serialize")[6], 1);

        let err = LocalDevice::from_bytes(b"WVD\x01\x01\x03").expect_err("no flags byte");
        assert!(matches!(err, Error::InvalidDeviceFile(ref m) if m.contains("flags")));
        assert_eq!(DeviceFlags::from_bits(0).bits(), 0);
    }

    #[test]
    fn saves_and_loads_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("device.wvd");
        let device = LocalDevice::from_bytes(&wvd(1, true, None)).expect("parse");
        device.save(&path).expect("save");

        let loaded = LocalDevice::load(path.to_str().expect("utf-8 path"), false).expect("load");
        assert_eq!(loaded.to_bytes().expect("bytes"), device.to_bytes().expect("bytes"));
        assert!(LocalDevice::load("https://example.invalid/device.wvd", false).is_err());
    }

    #[test]
    fn loads_provisioning_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("wv.json"),
            r#"{"session_id_type": "android", "security_level": 3}"#,
        )
        .expect("write config");
        std::fs::write(dir.path().join("device_client_id_blob"), client_id().encode_to_vec())
            .expect("write client id");
        std::fs::write(
            dir.path().join("device_private_key"),
            private_key().to_pkcs1_der().expect("der").as_bytes(),
        )
        .expect("write key");

        let device = LocalDevice::from_dir(dir.path()).expect("from_dir");
        assert_eq!(device.device_type, DeviceType::Android);
        assert!(device.flags.send_key_control_nonce);
        assert!(device.private_key.is_some());
        assert!(device.vmp.is_none());
    }

    #[test]
    fn missing_key_without_signer_cannot_sign() {
        let device = LocalDevice::from_bytes(&wvd(0, false, None)).expect("parse");
        assert!(matches!(device.signer(), Err(Error::MissingSigningCapability)));
    }
}
