//! Fixtures shared by unit tests: one RSA identity, a device built on it and
//! an in-process license server.

use std::sync::LazyLock;

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use prost::Message;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::rand_core::{OsRng, RngCore};
use rsa::{Oaep, Pss, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::cdm::Cdm;
use crate::device::{DeviceFlags, DeviceType, LocalDevice};
use crate::key::KeyType;
use crate::license_protocol::client_identification::NameValue;
use crate::license_protocol::license::KeyContainer;
use crate::license_protocol::license_request::content_identification::ContentIdVariant;
use crate::license_protocol::signed_message::MessageType;
use crate::license_protocol::{
    ClientIdentification, DrmCertificate, License, LicenseIdentification, LicenseRequest,
    SignedDrmCertificate, SignedMessage, WidevinePsshData,
};
use crate::pssh::Pssh;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

pub const SYSTEM_ID: u32 = 4464;
pub const PROVIDER_ID: &str = "license.vinecdm.test";
pub const SERIAL_NUMBER: [u8; 16] = [0x5a; 16];
pub const KID: [u8; 16] = [
    0xeb, 0x67, 0x6a, 0xbb, 0xcb, 0x34, 0x5e, 0x96, 0xbb, 0xcf, 0x61, 0x66, 0x30, 0xf1, 0xa3, 0xda,
];

static PRIVATE_KEY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("generate RSA key"));

static PUBLIC_KEY: LazyLock<RsaPublicKey> = LazyLock::new(|| PRIVATE_KEY.to_public_key());

static CLIENT_ID: LazyLock<ClientIdentification> = LazyLock::new(|| {
    let certificate = DrmCertificate {
        r#type: Some(2),
        serial_number: Some(vec![0x01; 16]),
        creation_time_seconds: Some(1_700_000_000),
        public_key: Some(public_key_der()),
        system_id: Some(SYSTEM_ID),
        ..Default::default()
    };
    let token = SignedDrmCertificate {
        drm_certificate: Some(certificate.encode_to_vec()),
        signature: Some(vec![0u8; 256]),
        ..Default::default()
    };
    ClientIdentification {
        r#type: Some(1),
        token: Some(token.encode_to_vec()),
        client_info: vec![
            NameValue {
                name: Some("company_name".to_string()),
                value: Some("vinecdm".to_string()),
            },
            NameValue {
                name: Some("model_name".to_string()),
                value: Some("test-device".to_string()),
            },
        ],
        ..Default::default()
    }
});

pub fn private_key() -> &'static RsaPrivateKey {
    &PRIVATE_KEY
}

pub fn public_key() -> &'static RsaPublicKey {
    &PUBLIC_KEY
}

pub fn client_id() -> &'static ClientIdentification {
    &CLIENT_ID
}

fn public_key_der() -> Vec<u8> {
    PUBLIC_KEY
        .to_pkcs1_der()
        .expect("encode public key")
        .as_bytes()
        .to_vec()
}

/// Android device holding the shared key and client id.
pub fn device(send_key_control_nonce: bool) -> LocalDevice {
    LocalDevice::new(
        DeviceType::Android,
        3,
        DeviceFlags {
            send_key_control_nonce,
        },
        Some(private_key().clone()),
        Some(client_id().clone()),
        None,
    )
    .expect("device")
}

/// PSSH box carrying a single KID.
pub fn init_data() -> Vec<u8> {
    let header = WidevinePsshData {
        key_ids: vec![KID.to_vec()],
        provider: Some("vinecdm".to_string()),
        content_id: Some(b"content".to_vec()),
        ..Default::default()
    };
    Pssh::new(header.encode_to_vec()).to_bytes()
}

/// Service certificate as a SignedMessage, keyed with the shared RSA key.
pub fn service_certificate() -> Vec<u8> {
    let certificate = DrmCertificate {
        r#type: Some(3),
        serial_number: Some(SERIAL_NUMBER.to_vec()),
        public_key: Some(public_key_der()),
        provider_id: Some(PROVIDER_ID.to_string()),
        ..Default::default()
    };
    let signed = SignedDrmCertificate {
        drm_certificate: Some(certificate.encode_to_vec()),
        signature: Some(vec![0u8; 256]),
        ..Default::default()
    };
    SignedMessage {
        r#type: Some(MessageType::ServiceCertificate as i32),
        msg: Some(signed.encode_to_vec()),
        ..Default::default()
    }
    .encode_to_vec()
}

/// Decode a challenge and check its PSS signature.
pub fn decode_challenge(challenge: &[u8]) -> (Vec<u8>, LicenseRequest) {
    let signed = SignedMessage::decode(challenge).expect("signed message");
    assert_eq!(signed.r#type, Some(MessageType::LicenseRequest as i32));
    let msg = signed.msg.expect("request msg");
    public_key()
        .verify(
            Pss::new::<Sha1>(),
            &Sha1::digest(&msg),
            signed.signature.as_deref().expect("request signature"),
        )
        .expect("request signature verifies");
    let request = LicenseRequest::decode(msg.as_slice()).expect("license request");
    (msg, request)
}

/// Answer a challenge with a signed license holding `keys` as (type, kid, key).
pub fn license_response(challenge: &[u8], keys: &[(KeyType, &[u8], &[u8])]) -> Vec<u8> {
    let (msg, request) = decode_challenge(challenge);
    let request_id = match request.content_id.and_then(|c| c.content_id_variant) {
        Some(ContentIdVariant::WidevinePsshData(data)) => data.request_id,
        None => None,
    };

    let mut session_key = [0u8; 16];
    OsRng.fill_bytes(&mut session_key);
    let (enc_context, mac_context) = Cdm::derive_context(&msg);
    let derived = Cdm::derive_keys(&enc_context, &mac_context, &session_key).expect("derive keys");

    let containers = keys
        .iter()
        .map(|(key_type, kid, key)| {
            let mut iv = [0u8; 16];
            OsRng.fill_bytes(&mut iv);
            let encrypted = Aes128CbcEnc::new_from_slices(&derived.enc, &iv)
                .expect("cipher")
                .encrypt_padded_vec_mut::<Pkcs7>(key);
            KeyContainer {
                id: (!kid.is_empty()).then(|| kid.to_vec()),
                iv: Some(iv.to_vec()),
                key: Some(encrypted),
                r#type: Some(*key_type as i32),
                ..Default::default()
            }
        })
        .collect();

    let license = License {
        id: Some(LicenseIdentification {
            request_id,
            ..Default::default()
        }),
        key: containers,
        ..Default::default()
    }
    .encode_to_vec();

    let mut mac = HmacSha256::new_from_slice(&derived.auth_1).expect("hmac key");
    mac.update(&license);

    SignedMessage {
        r#type: Some(MessageType::License as i32),
        msg: Some(license),
        signature: Some(mac.finalize().into_bytes().to_vec()),
        session_key: Some(
            public_key()
                .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &session_key)
                .expect("wrap session key"),
        ),
        ..Default::default()
    }
    .encode_to_vec()
}
