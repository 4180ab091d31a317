//! Random tokens for Call-IDs, tags and Via branches.

use rand::Rng;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default length of generated tokens.
pub const TOKEN_LEN: usize = 10;

/// Returns `len` random ASCII letters.
///
/// Backed by `rand::thread_rng`, which is seeded from the OS once per thread
/// on first use.
pub fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}
