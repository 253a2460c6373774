//! crates/exam_access_core/src/codegen.rs
//!
//! Short, human-typable exam codes.

use rand::Rng;

use crate::ports::CodeGenerator;

/// Uppercase letters and digits without the easily confused `I`, `O`, `0` and `1`.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Draws code characters uniformly from [`CODE_ALPHABET`] with the thread-local RNG.
#[derive(Debug, Clone, Copy)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_have_the_requested_length_and_alphabet() {
        for length in [1, 6, 16, 40] {
            let code = RandomCodeGenerator::new(length).generate();
            assert_eq!(code.len(), length);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)), "{code}");
        }
    }

    #[test]
    fn zero_length_falls_back_to_one_character() {
        assert_eq!(RandomCodeGenerator::new(0).generate().len(), 1);
    }

    #[test]
    fn consecutive_codes_differ() {
        let generator = RandomCodeGenerator::default();
        let first = generator.generate();
        let second = generator.generate();
        assert_ne!(first, second);
    }
}
