//! Error types for vinecdm.

use thiserror::Error;

/// Main error type for CDM operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The service certificate could not be decoded.
    #[error("Malformed service certificate: {0}")]
    MalformedCertificate(String),

    /// The license response could not be decoded.
    #[error("Malformed license response: {0}")]
    MalformedResponse(String),

    /// The device has no client identification blob.
    #[error("No client identification is available for this device")]
    MissingIdentity,

    /// The device has neither a private key nor a delegated signer.
    #[error("No device private key or signer is available for this device")]
    MissingSigningCapability,

    /// The license signature did not match its message.
    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    /// `parse_license` was called before a challenge was created.
    #[error("No license request was created for this session")]
    NoPendingRequest,

    /// No session is open with the specified identifier.
    #[error("Session identifier {0:?} is invalid")]
    InvalidSession(Vec<u8>),

    /// The PSSH / init data is invalid or empty.
    #[error("Invalid init data: {0}")]
    InvalidInitData(String),

    /// Invalid WVD device data.
    #[error("Invalid WVD file: {0}")]
    InvalidDeviceFile(String),

    /// The remote CDM API answered with an error status.
    #[error("CDM API returned an error: {status} - {message}")]
    Remote { status: i64, message: String },

    /// Transport failure talking to a remote endpoint.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to parse protobuf message.
    #[error("Protobuf decode error: {0}")]
    ProtobufDecodeError(#[from] prost::DecodeError),

    /// RSA error.
    #[error("RSA error: {0}")]
    RsaError(#[from] rsa::Error),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "remote")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}

/// Result type alias for vinecdm operations.
pub type Result<T> = std::result::Result<T, Error>;
