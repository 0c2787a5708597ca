//! Base-N numerals over the `0-9a-zA-Z` alphabet used by packed scripts

const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Smallest supported radix
pub const MIN_RADIX: u32 = 2;

/// Largest supported radix
pub const MAX_RADIX: u32 = 62;

/// Converter between indices and their base-N token form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Radix {
    base: u32,
}

impl Radix {
    /// Create a converter; `None` when `base` is outside `[2, 62]`
    pub fn new(base: u32) -> Option<Self> {
        (MIN_RADIX..=MAX_RADIX)
            .contains(&base)
            .then_some(Self { base })
    }

    /// The numeric base
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Render `value` in this base, most significant digit first
    pub fn encode(&self, mut value: usize) -> String {
        let base = self.base as usize;
        if value == 0 {
            return "0".to_string();
        }

        let mut digits = Vec::new();
        while value > 0 {
            digits.push(ALPHABET[value % base]);
            value /= base;
        }
        digits.reverse();
        // The alphabet is ASCII, so every digit is a single-byte char
        digits.into_iter().map(char::from).collect()
    }

    /// Parse a token written in this base; `None` on foreign digits or overflow
    pub fn decode(&self, token: &str) -> Option<usize> {
        if token.is_empty() {
            return None;
        }
        let base = self.base as usize;
        token.bytes().try_fold(0usize, |acc, byte| {
            let digit = ALPHABET.iter().position(|&c| c == byte)?;
            if digit >= base {
                return None;
            }
            acc.checked_mul(base)?.checked_add(digit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_range() {
        assert!(Radix::new(1).is_none());
        assert!(Radix::new(63).is_none());
        assert!(Radix::new(99).is_none());
        assert_eq!(Radix::new(2).unwrap().base(), 2);
        assert_eq!(Radix::new(62).unwrap().base(), 62);
    }

    #[test]
    fn test_base_2() {
        let radix = Radix::new(2).unwrap();
        assert_eq!(radix.encode(11), "1011");
        assert_eq!(radix.decode("1011"), Some(11));
    }

    #[test]
    fn test_base_36() {
        let radix = Radix::new(36).unwrap();
        assert_eq!(radix.encode(0), "0");
        assert_eq!(radix.encode(35), "z");
        assert_eq!(radix.encode(36), "10");
        assert_eq!(radix.decode("z"), Some(35));
        // Uppercase digits do not exist below base 37
        assert_eq!(radix.decode("Z"), None);
    }

    #[test]
    fn test_base_62() {
        let radix = Radix::new(62).unwrap();
        assert_eq!(radix.encode(36), "A");
        assert_eq!(radix.encode(61), "Z");
        assert_eq!(radix.encode(62), "10");
        assert_eq!(radix.encode(2267), "Az");
        assert_eq!(radix.decode("Az"), Some(2267));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let radix = Radix::new(10).unwrap();
        assert_eq!(radix.decode("12a"), None);
        assert_eq!(radix.decode(""), None);
        assert_eq!(radix.decode("@"), None);
        assert_eq!(radix.decode(&"9".repeat(40)), None);
    }
}
