use sha2::{Digest, Sha256};

/// Compare a presented secret with the expected one in constant time.
///
/// Both sides are hashed first so the comparison length does not depend on
/// the inputs.
pub fn safe_equal(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Short, non-reversible label for a secret, safe to print.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    format!("sha256:{}", hex::encode(&digest[..6]))
}
