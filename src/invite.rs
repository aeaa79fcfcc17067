use mongodb::{bson::doc, Collection};
use rand::Rng;

use crate::error::SplitError;
use crate::schemas::Group;

pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CODE_LENGTH: usize = 6;

const MAX_ATTEMPTS: u32 = 8;

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are shared by voice and typed back in any case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Generates codes until one is unused by any group, giving up after a
/// bounded number of attempts so a drained keyspace surfaces as an error
/// instead of a hot loop.
pub async fn issue_unique_code(groups: &Collection<Group>) -> Result<String, SplitError> {
    for _ in 0..MAX_ATTEMPTS {
        let code = generate_code();
        let taken = groups
            .count_documents(doc! { "inviteCode": &code }, None)
            .await?
            > 0;
        if !taken {
            return Ok(code);
        }
    }
    Err(SplitError::CodeExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_use_the_fixed_alphabet_and_length() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|byte| CODE_ALPHABET.contains(&byte)));
        }
    }

    #[test]
    fn codes_vary() {
        let codes: HashSet<String> = (0..50).map(|_| generate_code()).collect();
        assert!(codes.len() > 1);
    }

    #[test]
    fn normalization_uppercases_and_trims() {
        assert_eq!(normalize_code("  ab12cd "), "AB12CD");
        assert_eq!(normalize_code("XY99ZZ"), "XY99ZZ");
    }
}
