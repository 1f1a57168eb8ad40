use thiserror::Error;

/// Errors that can occur during cryptographic operations
///
/// Keys, signatures and addresses are parsed from untrusted input
/// (config files, scripts, witnesses), so every failure is reported
/// instead of panicking.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid hexadecimal string format
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    /// Key material has an invalid length
    #[error("Invalid key length: {len} bytes, expected: {expected} bytes")]
    InvalidKeyLength { len: usize, expected: usize },

    /// Signature has an invalid length
    #[error("Invalid signature length: {len} bytes, expected: {expected} bytes")]
    InvalidSignatureLength { len: usize, expected: usize },

    /// Public key bytes are not a valid curve point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Signature does not match the message and key
    #[error("Signature verification failed")]
    VerificationFailed,

    /// Invalid checksum in address
    #[error("Invalid checksum")]
    InvalidChecksum,

    /// Address string is malformed or invalid
    #[error("Invalid address format: {0}")]
    InvalidAddress(String),
}
