//! VeChain transaction encoding and signing hashes.
//!
//! Body layout (RLP list):
//! `[chainTag, blockRef, expiration, clauses, gasPriceCoef, gas, dependsOn, nonce, reserved]`
//! with each clause encoded as `[to, value, data]`. The signing hash is
//! blake2b-256 of the unsigned body; the id is blake2b-256 of the signing
//! hash followed by the signer address.

use alloy::primitives::{Address, B256};
use alloy::rlp::{self, BufMut, Encodable, Header, EMPTY_LIST_CODE, EMPTY_STRING_CODE};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::contracts::Clause;

type Blake2b256 = Blake2b<U32>;

/// Base intrinsic gas of any transaction.
pub const TX_GAS: u64 = 5_000;
/// Intrinsic gas per call clause.
pub const CLAUSE_GAS: u64 = 16_000;
/// Intrinsic gas per contract-creation clause.
pub const CLAUSE_GAS_CONTRACT_CREATION: u64 = 48_000;
/// Gas per zero byte of clause data.
pub const ZERO_BYTE_GAS: u64 = 4;
/// Gas per non-zero byte of clause data.
pub const NON_ZERO_BYTE_GAS: u64 = 68;
/// Safety margin added on top of simulated execution gas.
pub const EXECUTION_GAS_BUFFER: u64 = 15_000;
/// Blocks after `blockRef` during which the transaction stays valid.
pub const DEFAULT_EXPIRATION: u32 = 32;

/// blake2b-256 over the concatenation of `parts`.
pub fn blake2b256(parts: &[&[u8]]) -> B256 {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    B256::from_slice(&hasher.finalize())
}

/// Intrinsic gas of a set of clauses.
pub fn intrinsic_gas(clauses: &[Clause]) -> u64 {
    if clauses.is_empty() {
        return TX_GAS + CLAUSE_GAS;
    }

    clauses.iter().fold(TX_GAS, |total, clause| {
        let clause_gas = if clause.to.is_some() {
            CLAUSE_GAS
        } else {
            CLAUSE_GAS_CONTRACT_CREATION
        };
        let data_gas: u64 = clause
            .data
            .iter()
            .map(|b| if *b == 0 { ZERO_BYTE_GAS } else { NON_ZERO_BYTE_GAS })
            .sum();
        total + clause_gas + data_gas
    })
}

impl Clause {
    fn payload_length(&self) -> usize {
        let to_len = match &self.to {
            Some(to) => to.length(),
            None => 1,
        };
        to_len + self.value.length() + self.data.length()
    }
}

impl Encodable for Clause {
    fn encode(&self, out: &mut dyn BufMut) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        match &self.to {
            Some(to) => to.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
        self.value.encode(out);
        self.data.encode(out);
    }

    fn length(&self) -> usize {
        let payload = self.payload_length();
        payload + rlp::length_of_length(payload)
    }
}

/// An unsigned VeChain transaction body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub chain_tag: u8,
    pub block_ref: u64,
    pub expiration: u32,
    pub clauses: Vec<Clause>,
    pub gas_price_coef: u8,
    pub gas: u64,
    pub depends_on: Option<B256>,
    pub nonce: u64,
}

impl Transaction {
    fn fields_length(&self) -> usize {
        let depends_on_len = match &self.depends_on {
            Some(id) => id.length(),
            None => 1,
        };
        self.chain_tag.length()
            + self.block_ref.length()
            + self.expiration.length()
            + self.clauses.length()
            + self.gas_price_coef.length()
            + self.gas.length()
            + depends_on_len
            + self.nonce.length()
            + 1 // reserved: empty list
    }

    fn encode_fields(&self, out: &mut dyn BufMut) {
        self.chain_tag.encode(out);
        self.block_ref.encode(out);
        self.expiration.encode(out);
        self.clauses.encode(out);
        self.gas_price_coef.encode(out);
        self.gas.encode(out);
        match &self.depends_on {
            Some(id) => id.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
        self.nonce.encode(out);
        out.put_u8(EMPTY_LIST_CODE);
    }

    /// RLP encoding of the unsigned body.
    pub fn encode_unsigned(&self) -> Vec<u8> {
        let mut out = Vec::new();
        Header {
            list: true,
            payload_length: self.fields_length(),
        }
        .encode(&mut out);
        self.encode_fields(&mut out);
        out
    }

    /// RLP encoding of the body followed by a 65-byte `r || s || v` signature.
    pub fn encode_signed(&self, signature: &[u8; 65]) -> Vec<u8> {
        let signature: &[u8] = signature;
        let mut out = Vec::new();
        Header {
            list: true,
            payload_length: self.fields_length() + signature.length(),
        }
        .encode(&mut out);
        self.encode_fields(&mut out);
        signature.encode(&mut out);
        out
    }

    /// Hash the signer signs over.
    pub fn signing_hash(&self) -> B256 {
        blake2b256(&[self.encode_unsigned().as_slice()])
    }

    /// Transaction id once signed by `signer`.
    pub fn id(&self, signer: Address) -> B256 {
        blake2b256(&[self.signing_hash().as_slice(), signer.as_slice()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, Bytes, U256};

    fn sample_tx() -> Transaction {
        Transaction {
            chain_tag: 0x27,
            block_ref: 0x00aabbccdd000000,
            expiration: 32,
            clauses: vec![Clause::new(
                address!("7567d83b7b8d80addcb281a71d54fc7b3364ffed"),
                U256::from(10_000u64),
                Bytes::from(vec![0x00, 0x01, 0x02, 0x03]),
            )],
            gas_price_coef: 0,
            gas: 21_000,
            depends_on: None,
            nonce: 12_345_678,
        }
    }

    #[test]
    fn test_blake2b256_known_vector() {
        // blake2b-256("")
        assert_eq!(
            blake2b256(&[&b""[..]]).to_string(),
            "0x0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
        assert_eq!(
            blake2b256(&[&b"ab"[..], &b"c"[..]]),
            blake2b256(&[&b"abc"[..]])
        );
    }

    #[test]
    fn test_intrinsic_gas() {
        assert_eq!(intrinsic_gas(&[]), TX_GAS + CLAUSE_GAS);

        let tx = sample_tx();
        // one zero byte, three non-zero bytes
        assert_eq!(
            intrinsic_gas(&tx.clauses),
            TX_GAS + CLAUSE_GAS + ZERO_BYTE_GAS + 3 * NON_ZERO_BYTE_GAS
        );
    }

    #[test]
    fn test_unsigned_encoding_is_a_list() {
        let encoded = sample_tx().encode_unsigned();
        let mut buf = encoded.as_slice();
        let header = Header::decode(&mut buf).unwrap();
        assert!(header.list);
        assert_eq!(header.payload_length, buf.len());
        // chain tag is the first field
        assert_eq!(buf[0], 0x27);
        // reserved (empty list) is the last field
        assert_eq!(*encoded.last().unwrap(), EMPTY_LIST_CODE);
    }

    #[test]
    fn test_signed_encoding_appends_signature() {
        let tx = sample_tx();
        let unsigned = tx.encode_unsigned();
        let signed = tx.encode_signed(&[7u8; 65]);
        assert!(signed.len() > unsigned.len() + 65);
        assert_eq!(&signed[signed.len() - 65..], &[7u8; 65]);
    }

    #[test]
    fn test_signing_hash_changes_with_nonce() {
        let tx = sample_tx();
        let mut other = tx.clone();
        other.nonce += 1;
        assert_ne!(tx.signing_hash(), other.signing_hash());
    }

    #[test]
    fn test_id_depends_on_signer() {
        let tx = sample_tx();
        let a = tx.id(address!("0000000000000000000000000000000000000001"));
        let b = tx.id(address!("0000000000000000000000000000000000000002"));
        assert_ne!(a, b);
    }
}
