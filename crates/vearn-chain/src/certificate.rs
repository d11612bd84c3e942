//! Identification certificates.
//!
//! A certificate binds an account to a `(domain, timestamp)` pair. The
//! signing hash is blake2b-256 over a canonical JSON encoding with sorted
//! keys and a lowercase signer; the signature is 65 bytes `r || s || v`.

use std::str::FromStr;

use alloy::primitives::{Address, Signature, B256};
use serde::{Deserialize, Serialize};

use vearn_common::serde_utils::{decode_hex, encode_hex};

use crate::error::GatewayError;
use crate::tx::blake2b256;

/// Purpose of the login certificate.
pub const IDENTIFICATION_PURPOSE: &str = "identification";
/// Text shown to the user when asked to sign in.
pub const IDENTIFICATION_CONTENT: &str = "Sign a certificate to prove your identity";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

/// What the wallet is asked to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMessage {
    pub purpose: String,
    pub payload: CertificatePayload,
}

impl CertificateMessage {
    pub fn identification() -> Self {
        Self {
            purpose: IDENTIFICATION_PURPOSE.to_string(),
            payload: CertificatePayload {
                kind: "text".to_string(),
                content: IDENTIFICATION_CONTENT.to_string(),
            },
        }
    }
}

/// A signed certificate as returned by a wallet and persisted with the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub purpose: String,
    pub payload: CertificatePayload,
    pub domain: String,
    pub timestamp: u64,
    pub signer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

// Field order is the sorted key order.
#[derive(Serialize)]
struct CanonicalPayload<'a> {
    content: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct CanonicalCertificate<'a> {
    domain: &'a str,
    payload: CanonicalPayload<'a>,
    purpose: &'a str,
    signer: String,
    timestamp: u64,
}

impl Certificate {
    /// Unsigned certificate for `message`.
    pub fn new(message: &CertificateMessage, domain: &str, timestamp: u64, signer: Address) -> Self {
        Self {
            purpose: message.purpose.clone(),
            payload: message.payload.clone(),
            domain: domain.to_string(),
            timestamp,
            signer: encode_hex(signer.as_slice()),
            signature: None,
        }
    }

    /// Canonical JSON bytes: sorted keys, no whitespace, lowercase signer.
    pub fn encode(&self) -> Vec<u8> {
        let canonical = CanonicalCertificate {
            domain: &self.domain,
            payload: CanonicalPayload {
                content: &self.payload.content,
                kind: &self.payload.kind,
            },
            purpose: &self.purpose,
            signer: self.signer.to_lowercase(),
            timestamp: self.timestamp,
        };
        // Serializing plain structs of strings and integers cannot fail.
        serde_json::to_vec(&canonical).unwrap_or_default()
    }

    pub fn signing_hash(&self) -> B256 {
        blake2b256(&[self.encode().as_slice()])
    }

    pub fn signer_address(&self) -> Result<Address, GatewayError> {
        Address::from_str(&self.signer)
            .map_err(|e| GatewayError::InvalidCertificate(format!("bad signer {}: {e}", self.signer)))
    }

    /// Attach a signature produced over `signing_hash`.
    pub fn with_signature(mut self, signature: &Signature) -> Self {
        self.signature = Some(encode_hex(signature_bytes(signature)));
        self
    }

    /// Recover the signer from the signature and check it matches `signer`.
    pub fn verify(&self) -> Result<Address, GatewayError> {
        let raw = self
            .signature
            .as_deref()
            .ok_or_else(|| GatewayError::InvalidCertificate("missing signature".to_string()))?;
        let bytes = decode_hex(raw)
            .map_err(|e| GatewayError::InvalidCertificate(format!("signature: {e}")))?;
        if bytes.len() != 65 {
            return Err(GatewayError::InvalidCertificate(format!(
                "signature must be 65 bytes, got {}",
                bytes.len()
            )));
        }

        let signature = Signature::from_raw(&bytes)
            .map_err(|e| GatewayError::InvalidCertificate(format!("signature: {e}")))?;
        let recovered = signature
            .recover_address_from_prehash(&self.signing_hash())
            .map_err(|e| GatewayError::InvalidCertificate(format!("recovery: {e}")))?;

        let claimed = self.signer_address()?;
        if recovered != claimed {
            return Err(GatewayError::InvalidCertificate(format!(
                "signed by {recovered}, claims {claimed}"
            )));
        }
        Ok(recovered)
    }
}

/// 65-byte `r || s || v` form with `v` in `{0, 1}`.
pub fn signature_bytes(signature: &Signature) -> [u8; 65] {
    let mut out = [0u8; 65];
    out[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
    out[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
    out[64] = signature.v() as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn signed_cert() -> (Certificate, Address) {
        let signer: PrivateKeySigner = KEY.parse().unwrap();
        let cert = Certificate::new(
            &CertificateMessage::identification(),
            "vearn.test",
            1_700_000_000,
            signer.address(),
        );
        let sig = signer.sign_hash_sync(&cert.signing_hash()).unwrap();
        (cert.with_signature(&sig), signer.address())
    }

    #[test]
    fn test_canonical_encoding_sorts_keys() {
        let (cert, _) = signed_cert();
        let json = String::from_utf8(cert.encode()).unwrap();
        assert!(json.starts_with(r#"{"domain":"vearn.test","payload":{"content":"Sign a certificate"#));
        assert!(json.contains(r#""type":"text"},"purpose":"identification","signer":"0x"#));
        assert!(json.ends_with(r#""timestamp":1700000000}"#));
        assert!(!json.contains("signature"));
    }

    #[test]
    fn test_signer_case_does_not_change_hash() {
        let (cert, _) = signed_cert();
        let mut upper = cert.clone();
        upper.signer = format!("0x{}", upper.signer[2..].to_uppercase());
        assert_eq!(cert.signing_hash(), upper.signing_hash());
    }

    #[test]
    fn test_signed_certificate_verifies() {
        let (cert, address) = signed_cert();
        assert_eq!(cert.verify().unwrap(), address);
    }

    #[test]
    fn test_tampered_certificate_fails() {
        let (mut cert, _) = signed_cert();
        cert.domain = "evil.example".to_string();
        assert!(matches!(cert.verify(), Err(GatewayError::InvalidCertificate(_))));
    }

    #[test]
    fn test_wrong_signer_fails() {
        let (mut cert, _) = signed_cert();
        cert.signer = "0x0000000000000000000000000000000000000001".to_string();
        assert!(matches!(cert.verify(), Err(GatewayError::InvalidCertificate(_))));
    }

    #[test]
    fn test_missing_signature_fails() {
        let (mut cert, _) = signed_cert();
        cert.signature = None;
        assert!(matches!(cert.verify(), Err(GatewayError::InvalidCertificate(_))));
    }

    #[test]
    fn test_persisted_shape() {
        let (cert, _) = signed_cert();
        let value = serde_json::to_value(&cert).unwrap();
        assert_eq!(value["payload"]["type"], "text");
        assert_eq!(value["purpose"], "identification");
        let back: Certificate = serde_json::from_value(value).unwrap();
        assert_eq!(back, cert);
    }
}
