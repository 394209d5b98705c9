// src/common/id_generator.rs
//! Payment reference and access token generation
//!
//! Two kinds of identifiers leave this module:
//! - payment references: `<prefix><6 random digits>` (e.g. `tmzbrand482913`),
//!   short enough to type into a transfer narration
//! - access tokens: 16 Crockford Base32 characters, opaque and unguessable
//!
//! Crockford Base32 has no ambiguous characters (no I, L, O, U), so tokens
//! survive being read aloud or retyped from a screenshot.

use rand::Rng;

/// Crockford Base32 alphabet (excludes I, L, O, U to avoid confusion)
pub const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Length of an access token (80 bits of randomness)
pub const ACCESS_TOKEN_LENGTH: usize = 16;

/// Smallest and largest numeric part of a payment reference
const REFERENCE_DIGITS_MIN: u32 = 100_000;
const REFERENCE_DIGITS_MAX: u32 = 999_999;

/// Generate a random Crockford Base32 string of specified length
fn generate_crockford_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..32);
            CROCKFORD_ALPHABET[idx] as char
        })
        .collect()
}

/// Generate a payment reference
///
/// # Example
/// ```ignore
/// let reference = generate_reference("tmzbrand");
/// // Returns something like "tmzbrand482913"
/// ```
pub fn generate_reference(prefix: &str) -> String {
    let digits = rand::thread_rng().gen_range(REFERENCE_DIGITS_MIN..=REFERENCE_DIGITS_MAX);
    format!("{}{}", prefix, digits)
}

/// Generate an opaque access token
pub fn generate_access_token() -> String {
    generate_crockford_string(ACCESS_TOKEN_LENGTH)
}
