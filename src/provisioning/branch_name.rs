//! Branch name generation.
//!
//! Names double as marker file stems, so they are restricted to ASCII
//! letters and digits.

use rand::{distr::Alphanumeric, Rng};
use uuid::Uuid;

/// Same alphabet `rand`'s `Alphanumeric` draws from
pub const BRANCH_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub const DEFAULT_BRANCH_NAME_LENGTH: usize = 21;

const NAMESPACE: Uuid = Uuid::from_u128(0x6d2c_4f0e_9a51_5b8e_b3f7_1c0a_2e4d_9f61);

/// Base-62 digits extracted from one 128-bit digest
const DIGITS_PER_BLOCK: usize = 21;

pub fn random_branch_name(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Stable name for an app id: UUIDv5 digests rendered in base 62.
pub fn deterministic_branch_name(app_id: i64, length: usize) -> String {
    let mut name = String::with_capacity(length);
    let mut block = 0u32;

    while name.len() < length {
        let digest = Uuid::new_v5(&NAMESPACE, format!("mobile-app:{app_id}:{block}").as_bytes());
        let mut value = digest.as_u128();

        for _ in 0..DIGITS_PER_BLOCK.min(length - name.len()) {
            name.push(BRANCH_ALPHABET[(value % 62) as usize] as char);
            value /= 62;
        }
        block += 1;
    }

    name
}

pub fn is_valid_branch_name(name: &str, length: usize) -> bool {
    name.len() == length && name.bytes().all(|b| b.is_ascii_alphanumeric())
}
