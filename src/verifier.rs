use digest::Digest;

use crate::error::{PinningError, Result};
use crate::types::{DigestAlgorithm, FingerprintDigest};

/// Hash `bytes` with the named algorithm and render it as uppercase hex.
pub fn digest(bytes: &[u8], algorithm: &str) -> Result<FingerprintDigest> {
    let algorithm = DigestAlgorithm::from_name(algorithm)
        .ok_or_else(|| PinningError::UnsupportedAlgorithm(algorithm.to_string()))?;
    Ok(digest_with(bytes, algorithm))
}

pub fn digest_with(bytes: &[u8], algorithm: DigestAlgorithm) -> FingerprintDigest {
    let hash_bytes: Vec<u8> = match algorithm {
        DigestAlgorithm::Md5 => md5::Md5::digest(bytes).to_vec(),
        DigestAlgorithm::Sha1 => sha1::Sha1::digest(bytes).to_vec(),
        DigestAlgorithm::Sha224 => sha2::Sha224::digest(bytes).to_vec(),
        DigestAlgorithm::Sha256 => sha2::Sha256::digest(bytes).to_vec(),
        DigestAlgorithm::Sha384 => sha2::Sha384::digest(bytes).to_vec(),
        DigestAlgorithm::Sha512 => sha2::Sha512::digest(bytes).to_vec(),
        DigestAlgorithm::Sha512_224 => sha2::Sha512_224::digest(bytes).to_vec(),
        DigestAlgorithm::Sha512_256 => sha2::Sha512_256::digest(bytes).to_vec(),
    };

    FingerprintDigest::from_normalized(hex::encode_upper(hash_bytes))
}

/// Upper-case and drop whitespace and `:` separators.
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Membership test of `computed` against the normalized allow-list.
pub fn matches<S: AsRef<str>>(computed: &FingerprintDigest, allowed: &[S]) -> bool {
    allowed
        .iter()
        .any(|fp| normalize_fingerprint(fp.as_ref()) == computed.as_str())
}
