/// Expected keycap alphabet
///
/// This module defines the characters printed on the keyboard that must all be
/// found in the recognition output: the digits 0-9 and the letters A-Z.

use lazy_static::lazy_static;

/// Digits in canonical order
pub const NUMBERS: &str = "0123456789";

/// Letters in canonical order
pub const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// The two disjoint classes of expected characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedAlphabet {
    /// Expected digits, in `0123456789` order
    pub numbers: Vec<char>,
    /// Expected letters, in `A`-`Z` order
    pub letters: Vec<char>,
}

impl ExpectedAlphabet {
    fn new() -> Self {
        Self {
            numbers: NUMBERS.chars().collect(),
            letters: LETTERS.chars().collect(),
        }
    }

    /// Total number of expected symbols
    pub fn symbol_count(&self) -> usize {
        self.numbers.len() + self.letters.len()
    }
}

lazy_static! {
    /// Process-wide expected alphabet, built once on first use
    pub static ref EXPECTED_ALPHABET: ExpectedAlphabet = ExpectedAlphabet::new();
}

/// Uppercase a detected value for comparison.
///
/// Folding is ASCII-only; anything outside ASCII is left untouched.
pub fn canonicalize(value: &str) -> String {
    value.to_ascii_uppercase()
}

/// Returns the value as a single char, or `None` for empty and multi-character strings
fn single_char(value: &str) -> Option<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Check whether a canonicalized value is one of the expected digits
pub fn is_digit(value: &str) -> bool {
    single_char(value).map_or(false, |c| EXPECTED_ALPHABET.numbers.contains(&c))
}

/// Check whether a canonicalized value is one of the expected letters
pub fn is_letter(value: &str) -> bool {
    single_char(value).map_or(false, |c| EXPECTED_ALPHABET.letters.contains(&c))
}

/// Check whether a canonicalized value belongs to the expected alphabet
pub fn is_expected(value: &str) -> bool {
    is_digit(value) || is_letter(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_has_36_disjoint_symbols() {
        assert_eq!(EXPECTED_ALPHABET.symbol_count(), 36);
        for n in &EXPECTED_ALPHABET.numbers {
            assert!(!EXPECTED_ALPHABET.letters.contains(n));
        }
        assert_eq!(EXPECTED_ALPHABET.numbers.first(), Some(&'0'));
        assert_eq!(EXPECTED_ALPHABET.letters.last(), Some(&'Z'));
    }

    #[test]
    fn test_membership_is_on_canonical_values() {
        assert!(is_digit("7"));
        assert!(!is_digit("A"));
        assert!(is_letter("Q"));
        // Membership expects canonicalized input
        assert!(!is_letter("q"));
        assert!(is_letter(&canonicalize("q")));
    }

    #[test]
    fn test_multi_character_and_empty_values_are_not_expected() {
        assert!(!is_expected(""));
        assert!(!is_expected(" "));
        assert!(!is_expected("AB"));
        assert!(!is_expected("10"));
        assert!(!is_expected("#"));
    }

    #[test]
    fn test_canonicalize_is_ascii_only() {
        assert_eq!(canonicalize("a"), "A");
        assert_eq!(canonicalize("ß"), "ß");
        assert_eq!(canonicalize("é"), "é");
        assert_eq!(canonicalize("rn"), "RN");
    }
}
