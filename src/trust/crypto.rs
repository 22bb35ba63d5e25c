//! DNSSEC signature and digest primitives.

use ring::{digest, signature};
use thiserror::Error;

use crate::dns::rdata::{Dnskey, Ds, Rrsig, canonical_rdata};
use crate::dns::{Name, Record};

/// DNSSEC algorithm numbers.
pub mod alg {
    pub const RSASHA1: u8 = 5;
    pub const RSASHA1_NSEC3_SHA1: u8 = 7;
    pub const RSASHA256: u8 = 8;
    pub const RSASHA512: u8 = 10;
    pub const ECDSAP256SHA256: u8 = 13;
    pub const ECDSAP384SHA384: u8 = 14;
    pub const ED25519: u8 = 15;

    pub fn is_supported(alg: u8) -> bool {
        matches!(
            alg,
            RSASHA1
                | RSASHA1_NSEC3_SHA1
                | RSASHA256
                | RSASHA512
                | ECDSAP256SHA256
                | ECDSAP384SHA384
                | ED25519
        )
    }
}

/// DS digest types.
pub mod digest_type {
    pub const SHA1: u8 = 1;
    pub const SHA256: u8 = 2;
    pub const SHA384: u8 = 4;

    pub fn is_supported(digest: u8) -> bool {
        matches!(digest, SHA1 | SHA256 | SHA384)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmError {
    #[error("unsupported algorithm")]
    Unsupported,
    #[error("bad signature")]
    BadSig,
    #[error("invalid key data")]
    InvalidData,
}

/// Digest of a DNSKEY as carried in a DS record (RFC 4034, section 5.1.4).
pub fn ds_digest(owner: &Name, key: &Dnskey, digest: u8) -> Result<Vec<u8>, AlgorithmError> {
    let algorithm = match digest {
        digest_type::SHA1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
        digest_type::SHA256 => &digest::SHA256,
        digest_type::SHA384 => &digest::SHA384,
        _ => return Err(AlgorithmError::Unsupported),
    };
    let mut ctx = digest::Context::new(algorithm);
    ctx.update(owner.as_wire());
    ctx.update(&key.to_rdata());
    Ok(ctx.finish().as_ref().to_vec())
}

/// Whether `ds` refers to `key` published at `owner`.
pub fn ds_matches(ds: &Ds, owner: &Name, key: &Dnskey) -> bool {
    ds.algorithm == key.algorithm
        && ds.key_tag == key.key_tag()
        && ds_digest(owner, key, ds.digest_type).is_ok_and(|d| d == ds.digest)
}

/// The data an RRSIG covers (RFC 4035, section 5.3.2): RRSIG RDATA minus
/// the signature, then each record in canonical form and order.
pub fn signed_data(sig: &Rrsig, records: &[Record]) -> Vec<u8> {
    let mut buf = sig.signed_prefix();

    let mut canonical: Vec<(&Record, Vec<u8>)> = records
        .iter()
        .map(|r| (r, canonical_rdata(r.rtype, &r.rdata)))
        .collect();
    canonical.sort_by(|a, b| a.1.cmp(&b.1));
    canonical.dedup_by(|a, b| a.1 == b.1);

    for (record, rdata) in canonical {
        let owner_labels = record.name.label_count();
        let sig_labels = sig.labels as usize;
        if sig_labels < owner_labels {
            // Expanded wildcard: sign over "*." plus the rightmost labels.
            buf.extend_from_slice(b"\x01*");
            buf.extend_from_slice(record.name.suffix(sig_labels).as_wire());
        } else {
            buf.extend_from_slice(record.name.as_wire());
        }
        buf.extend_from_slice(&record.rtype.to_be_bytes());
        buf.extend_from_slice(&record.class.to_be_bytes());
        buf.extend_from_slice(&sig.original_ttl.to_be_bytes());
        buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&rdata);
    }
    buf
}

/// Check `sig` over `data` with `key`.
pub fn verify(sig: &Rrsig, key: &Dnskey, data: &[u8]) -> Result<(), AlgorithmError> {
    let signature = sig.signature.as_slice();

    match sig.algorithm {
        alg::RSASHA1 | alg::RSASHA1_NSEC3_SHA1 | alg::RSASHA256 | alg::RSASHA512 => {
            let params = match sig.algorithm {
                alg::RSASHA256 => &signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY,
                alg::RSASHA512 => &signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY,
                _ => &signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY,
            };
            if signature.len() < 1024 / 8 {
                return Err(AlgorithmError::Unsupported);
            }
            let (e, n) = rsa_exponent_modulus(&key.public_key)?;
            signature::RsaPublicKeyComponents { n, e }
                .verify(params, data, signature)
                .map_err(|_| AlgorithmError::BadSig)
        }
        alg::ECDSAP256SHA256 | alg::ECDSAP384SHA384 => {
            let params = if sig.algorithm == alg::ECDSAP256SHA256 {
                &signature::ECDSA_P256_SHA256_FIXED
            } else {
                &signature::ECDSA_P384_SHA384_FIXED
            };
            // ring wants the uncompressed point marker in front.
            let mut point = Vec::with_capacity(key.public_key.len() + 1);
            point.push(0x04);
            point.extend_from_slice(&key.public_key);
            signature::UnparsedPublicKey::new(params, &point)
                .verify(data, signature)
                .map_err(|_| AlgorithmError::BadSig)
        }
        alg::ED25519 => signature::UnparsedPublicKey::new(&signature::ED25519, &key.public_key)
            .verify(data, signature)
            .map_err(|_| AlgorithmError::BadSig),
        _ => Err(AlgorithmError::Unsupported),
    }
}

/// Split an RFC 3110 RSA public key into exponent and modulus.
fn rsa_exponent_modulus(key: &[u8]) -> Result<(&[u8], &[u8]), AlgorithmError> {
    if key.len() <= 3 {
        return Err(AlgorithmError::InvalidData);
    }
    let (pos, exp_len) = match key[0] {
        0 => (3, (usize::from(key[1]) << 8) | usize::from(key[2])),
        len => (1, usize::from(len)),
    };
    if key.len() < pos + exp_len {
        return Err(AlgorithmError::InvalidData);
    }
    Ok(key[pos..].split_at(exp_len))
}

/// NSEC3 hash of `name` (RFC 5155, section 5). Only SHA-1 is defined.
pub fn nsec3_hash(name: &Name, salt: &[u8], iterations: u16) -> Vec<u8> {
    let mut ctx = digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY);
    ctx.update(name.as_wire());
    ctx.update(salt);
    let mut hash = ctx.finish().as_ref().to_vec();
    for _ in 0..iterations {
        let mut ctx = digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY);
        ctx.update(&hash);
        ctx.update(salt);
        hash = ctx.finish().as_ref().to_vec();
    }
    hash
}
