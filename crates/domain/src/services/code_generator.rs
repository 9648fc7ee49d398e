//! Random code string generation.

use rand::Rng;

/// Characters used in generated codes. Excludes the look-alikes 0, O, I and 1.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Default length of the random part of a code.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Produces random code strings of a fixed shape: an optional prefix
/// followed by `length` characters drawn from [`CODE_ALPHABET`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGenerator {
    length: usize,
    prefix: String,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH, None)
    }
}

impl CodeGenerator {
    /// Create a generator. The prefix is uppercased and a blank prefix is
    /// ignored; a zero length is raised to one.
    pub fn new(length: usize, prefix: Option<&str>) -> Self {
        Self {
            length: length.max(1),
            prefix: prefix
                .map(|p| p.trim().to_ascii_uppercase())
                .unwrap_or_default(),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of distinct codes this generator can produce, saturating.
    pub fn keyspace(&self) -> u64 {
        let base = CODE_ALPHABET.len() as u64;
        u32::try_from(self.length)
            .ok()
            .and_then(|len| base.checked_pow(len))
            .unwrap_or(u64::MAX)
    }

    /// Generate one candidate code.
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let mut code = String::with_capacity(self.prefix.len() + self.length);
        code.push_str(&self.prefix);
        code.extend((0..self.length).map(|_| {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        }));
        code
    }
}
