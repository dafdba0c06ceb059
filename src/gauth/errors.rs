use std::time::SystemTimeError;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GAuthError>;

#[derive(Error, Debug)]
pub enum GAuthError {
    #[error("failed to read key file: {0}")]
    ReadKey(String),
    #[error("invalid credential JSON: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("invalid private key encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("RSA key pair: {0}")]
    RsaKeyPair(String),
    #[error("RSA signing failed: {0}")]
    RsaSign(String),
    #[error("ReqwestError: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("system clock error: {0}")]
    SystemTime(#[from] SystemTimeError),
    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: StatusCode, body: String },
    #[error("metadata server returned {0}")]
    MetadataStatus(StatusCode),
    #[error(
        "could not find application default credentials; set GOOGLE_APPLICATION_CREDENTIALS \
         or configure `key_file`"
    )]
    NoCredentials,
}
