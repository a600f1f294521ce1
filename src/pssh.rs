//! PSSH box parsing.
//!
//! Sessions that are not `raw` carry their init data as a parsed Widevine cenc
//! header; this module turns a PSSH box (or a bare header) into one.
use std::str::FromStr;

use base64::Engine;
use byteorder::{BigEndian, ByteOrder};
use prost::Message;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::license_protocol::WidevinePsshData;

/// Widevine DRM system id.
pub const WIDEVINE_SYSTEM_ID: Uuid = Uuid::from_u128(0xedef8ba979d64acea3c827dcd51d21ed);

/// Parsed PSSH box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pssh {
    pub version: u8,
    pub flags: u32,
    pub system_id: Uuid,
    pub key_ids: Vec<Uuid>,
    pub init_data: Vec<u8>,
}

impl Pssh {
    /// Wrap Widevine init data in a v0 box.
    pub fn new(init_data: Vec<u8>) -> Self {
        Self {
            version: 0,
            flags: 0,
            system_id: WIDEVINE_SYSTEM_ID,
            key_ids: Vec::new(),
            init_data,
        }
    }

    /// Parse a full PSSH box, falling back to a bare Widevine cenc header.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidInitData("Data must not be empty".to_string()));
        }

        match parse_pssh_box(data) {
            Ok(pssh) => Ok(pssh),
            Err(box_err) => {
                if is_widevine_pssh_data(data) {
                    return Ok(Self::new(data.to_vec()));
                }
                Err(box_err)
            }
        }
    }

    /// Parse a base64 PSSH box or cenc header.
    pub fn from_base64(data_b64: &str) -> Result<Self> {
        let data = base64::engine::general_purpose::STANDARD.decode(data_b64.trim())?;
        Self::from_bytes(&data)
    }

    /// Decode the init data as a Widevine cenc header.
    pub fn cenc_header(&self) -> Result<WidevinePsshData> {
        if self.system_id != WIDEVINE_SYSTEM_ID {
            return Err(Error::InvalidInitData(format!(
                "Not a Widevine PSSH box (system id {})",
                self.system_id
            )));
        }
        WidevinePsshData::decode(self.init_data.as_slice()).map_err(|e| {
            Error::InvalidInitData(format!("Failed to parse WidevinePsshData: {}", e))
        })
    }

    /// KIDs from the v1 box header, else from the cenc header.
    pub fn key_ids(&self) -> Result<Vec<Uuid>> {
        if self.version == 1 && !self.key_ids.is_empty() {
            return Ok(self.key_ids.clone());
        }
        Ok(self
            .cenc_header()?
            .key_ids
            .iter()
            .map(|kid| crate::key::Key::kid_to_uuid(kid))
            .collect())
    }

    /// Serialize as a full PSSH box.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(self.version);
        body.extend_from_slice(&self.flags.to_be_bytes()[1..]);
        body.extend_from_slice(self.system_id.as_bytes());

        if self.version == 1 {
            body.extend_from_slice(&(self.key_ids.len() as u32).to_be_bytes());
            for kid in self.key_ids.iter() {
                body.extend_from_slice(kid.as_bytes());
            }
        }

        body.extend_from_slice(&(self.init_data.len() as u32).to_be_bytes());
        body.extend_from_slice(&self.init_data);

        let mut out = Vec::with_capacity(body.len() + 8);
        out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(b"pssh");
        out.extend_from_slice(&body);
        out
    }

    /// Serialize as a base64 PSSH box.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }
}

impl FromStr for Pssh {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Pssh::from_base64(s)
    }
}

fn parse_pssh_box(data: &[u8]) -> Result<Pssh> {
    if data.len() < 8 {
        return Err(Error::InvalidInitData("Data too short".to_string()));
    }

    let mut offset = 0;
    let size = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
    offset += 4;
    if &data[offset..offset + 4] != b"pssh" {
        return Err(Error::InvalidInitData("Not a PSSH box".to_string()));
    }
    offset += 4;

    let box_size = match size {
        0 => data.len(),
        1 => {
            if data.len() < 16 {
                return Err(Error::InvalidInitData("Data too short".to_string()));
            }
            let large = BigEndian::read_u64(&data[offset..offset + 8]) as usize;
            offset += 8;
            large
        }
        n => n,
    };
    if box_size > data.len() {
        return Err(Error::InvalidInitData("PSSH size exceeds data length".to_string()));
    }
    let data = &data[..box_size];

    if data.len() < offset + 4 + 16 {
        return Err(Error::InvalidInitData("PSSH header incomplete".to_string()));
    }
    let version = data[offset];
    if version > 1 {
        return Err(Error::InvalidInitData(format!("Unsupported PSSH version {}", version)));
    }
    let flags = BigEndian::read_u32(&data[offset..offset + 4]) & 0x00FF_FFFF;
    offset += 4;

    let system_id = Uuid::from_slice(&data[offset..offset + 16])
        .map_err(|_| Error::InvalidInitData("Invalid system ID".to_string()))?;
    offset += 16;

    let mut key_ids = Vec::new();
    if version == 1 {
        if data.len() < offset + 4 {
            return Err(Error::InvalidInitData("Missing KID count".to_string()));
        }
        let kid_count = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
        offset += 4;

        let required = kid_count
            .checked_mul(16)
            .and_then(|n| n.checked_add(offset))
            .filter(|&n| n <= data.len())
            .ok_or_else(|| Error::InvalidInitData("Missing KIDs".to_string()))?;
        key_ids = data[offset..required]
            .chunks_exact(16)
            .map(|chunk| Uuid::from_slice(chunk).unwrap_or_else(|_| Uuid::nil()))
            .collect();
        offset = required;
    }

    if data.len() < offset + 4 {
        return Err(Error::InvalidInitData("Missing init data length".to_string()));
    }
    let data_size = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
    offset += 4;
    if data.len() < offset + data_size {
        return Err(Error::InvalidInitData("Missing init data".to_string()));
    }

    Ok(Pssh {
        version,
        flags,
        system_id,
        key_ids,
        init_data: data[offset..offset + data_size].to_vec(),
    })
}

fn is_widevine_pssh_data(data: &[u8]) -> bool {
    WidevinePsshData::decode(data).is_ok()
}

#[cfg(test)]
mod tests {
    use super::{Pssh, WIDEVINE_SYSTEM_ID};
    use prost::Message;
    use uuid::Uuid;

    use crate::license_protocol::WidevinePsshData;

    fn header(kid: Uuid) -> WidevinePsshData {
        WidevinePsshData {
            key_ids: vec![kid.as_bytes().to_vec()],
            content_id: Some(b"content".to_vec()),
            ..Default::default()
        }
    }

    #[test]
    fn parses_v0_box_into_cenc_header() {
        let kid = Uuid::new_v4();
        let pssh = Pssh::new(header(kid).encode_to_vec());

        let parsed = Pssh::from_bytes(&pssh.to_bytes()).expect("parse pssh");
        assert_eq!(parsed, pssh);
        assert_eq!(parsed.cenc_header().expect("header"), header(kid));
        assert_eq!(parsed.key_ids().expect("key ids"), vec![kid]);
    }

    #[test]
    fn parses_v1_box_key_ids() {
        let kid = Uuid::new_v4();
        let mut pssh = Pssh::new(Vec::new());
        pssh.version = 1;
        pssh.key_ids = vec![kid];

        let parsed = Pssh::from_base64(&pssh.to_base64()).expect("parse base64");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.key_ids().expect("key ids"), vec![kid]);
    }

    #[test]
    fn accepts_bare_cenc_header() {
        let data = header(Uuid::new_v4()).encode_to_vec();
        let parsed = Pssh::from_bytes(&data).expect("bare header");
        assert_eq!(parsed.system_id, WIDEVINE_SYSTEM_ID);
        assert_eq!(parsed.init_data, data);
    }

    #[test]
    fn keeps_undeclared_header_fields() {
        let mut data = header(Uuid::new_v4()).encode_to_vec();
        data.extend_from_slice(&[0x72, 0x03, 0x0a, 0x01, 0x41]);

        let bare = Pssh::from_bytes(&data).expect("bare header with extra field");
        assert_eq!(bare.init_data, data);

        let boxed = Pssh::from_bytes(&Pssh::new(data.clone()).to_bytes()).expect("boxed header");
        assert_eq!(boxed.init_data, data);
        assert!(boxed.cenc_header().is_ok());
    }

    #[test]
    fn rejects_empty_and_truncated_input() {
        let err = Pssh::from_base64("").expect_err("empty input should fail");
        assert!(err.to_string().contains("empty"));

        let bytes = Pssh::new(header(Uuid::new_v4()).encode_to_vec()).to_bytes();
        assert!(Pssh::from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn parses_the_widevine_test_vector() {
        let pssh: Pssh = "AAAAW3Bzc2gAAAAA7e+LqXnWSs6jyCfc1R0h7QAAADsIARIQ62dqu8s0Xpa7z2FmMPGj2hoNd2lkZXZpbmVfdGVzdCIQZmtqM2xqYVNkZmFsa3IzaioCSEQyAA=="
            .parse()
            .expect("parse test pssh");
        let header = pssh.cenc_header().expect("cenc header");
        assert_eq!(header.provider.as_deref(), Some("widevine_test"));
        assert_eq!(header.key_ids.len(), 1);
    }
}
