//! Compact symbolic tags packed reversibly into a `u64`.
//!
//! Mirrors the atom scheme of `caf::atom_value`: up to ten characters from a
//! restricted alphabet, packed 6 bits per character. Two atoms compare by
//! integer equality, making them cheap first-class message discriminants
//! (`atom("ok")`, `atom("tick")`, ...).

use std::fmt;

use crate::error::RuntimeError;

const MAX_CHARS: usize = 10;
const BITS_PER_CHAR: u32 = 6;

/// A packed symbolic tag. Atoms are case-insensitive and canonicalize to
/// lowercase on encode; `decode(encode(x)) == x` holds for any legal,
/// already-lowercase input.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u64);

impl Atom {
    /// Encodes `s` into an atom. Fails if `s` is longer than ten characters
    /// or contains a character outside `[a-z0-9_ ]` (case-insensitive).
    pub fn new(s: &str) -> Result<Atom, RuntimeError> {
        if s.chars().count() > MAX_CHARS {
            return Err(RuntimeError::InvalidAtomEncoding {
                input: s.to_string(),
                reason: "atom longer than 10 characters",
            });
        }

        let mut value: u64 = 0;
        for ch in s.chars() {
            let code = char_to_code(ch).ok_or_else(|| RuntimeError::InvalidAtomEncoding {
                input: s.to_string(),
                reason: "character outside [a-z0-9_ ]",
            })?;
            value = (value << BITS_PER_CHAR) | code as u64;
        }
        // Pad remaining character slots with the null code so the packing
        // is always exactly MAX_CHARS wide, regardless of input length.
        for _ in s.chars().count()..MAX_CHARS {
            value <<= BITS_PER_CHAR;
        }

        Ok(Atom(value))
    }

    /// Builds an atom from a literal known at compile time, panicking on an
    /// illegal literal. Intended for the predefined atom constants below.
    const fn const_new(s: &str) -> Atom {
        let bytes = s.as_bytes();
        assert!(bytes.len() <= MAX_CHARS, "atom literal longer than 10 characters");
        let mut value: u64 = 0;
        let mut i = 0;
        while i < bytes.len() {
            let code = const_char_to_code(bytes[i]);
            value = (value << BITS_PER_CHAR) | code as u64;
            i += 1;
        }
        let mut pad = bytes.len();
        while pad < MAX_CHARS {
            value <<= BITS_PER_CHAR;
            pad += 1;
        }
        Atom(value)
    }

    /// The raw little-endian wire form.
    pub fn to_bits(self) -> u64 {
        self.0
    }

    /// Reconstructs an atom from its wire form without validation; every
    /// `u64` is a structurally valid (if possibly nonsensical) atom value.
    pub fn from_bits(bits: u64) -> Atom {
        Atom(bits)
    }

    /// The printable character sequence, trailing nulls stripped.
    pub fn as_str(self) -> String {
        let mut out = String::with_capacity(MAX_CHARS);
        for i in 0..MAX_CHARS {
            let shift = BITS_PER_CHAR * (MAX_CHARS as u32 - 1 - i as u32);
            let code = ((self.0 >> shift) & 0x3f) as u8;
            if code == 0 {
                break;
            }
            out.push(code_to_char(code));
        }
        out
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?})", self.as_str())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn char_to_code(ch: char) -> Option<u8> {
    let lower = ch.to_ascii_lowercase();
    const_char_to_code_opt(lower as u8)
}

fn code_to_char(code: u8) -> char {
    match code {
        1..=26 => (b'a' + code - 1) as char,
        27..=36 => (b'0' + code - 27) as char,
        37 => '_',
        38 => ' ',
        _ => unreachable!("decoded an atom code outside the legal alphabet"),
    }
}

const fn const_char_to_code(byte: u8) -> u8 {
    match const_char_to_code_opt(byte) {
        Some(code) => code,
        None => panic!("atom literal contains a character outside [a-z0-9_ ]"),
    }
}

const fn const_char_to_code_opt(byte: u8) -> Option<u8> {
    match byte {
        b'a'..=b'z' => Some(byte - b'a' + 1),
        b'0'..=b'9' => Some(byte - b'0' + 27),
        b'_' => Some(37),
        b' ' => Some(38),
        _ => None,
    }
}

macro_rules! predefined_atoms {
    ($($name:ident => $lit:expr),+ $(,)?) => {
        $(
            #[doc = concat!("The atom `", $lit, "`.")]
            pub const $name: Atom = Atom::const_new($lit);
        )+
    };
}

predefined_atoms! {
    OK => "ok",
    ERROR => "error",
    GET => "get",
    PUT => "put",
    ADD => "add",
    UPDATE => "update",
    DELETE => "delete",
    TICK => "tick",
    TIMEOUT => "timeout",
    EXIT => "exit",
    DOWN => "down",
    SKIP => "skip",
    QUIT => "quit",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_legal_inputs() {
        for s in ["ok", "get", "tick_42", "a b c", "0123456789"] {
            let atom = Atom::new(s).unwrap();
            assert_eq!(atom.as_str(), s, "round trip failed for {s:?}");
        }
    }

    #[test]
    fn canonicalizes_case() {
        let a = Atom::new("Get").unwrap();
        let b = Atom::new("get").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "get");
    }

    #[test]
    fn injective_on_distinct_inputs() {
        let a = Atom::new("get").unwrap();
        let b = Atom::new("put").unwrap();
        assert_ne!(a, b);
        assert_ne!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn rejects_too_long() {
        assert!(Atom::new("elevenchars").is_err());
    }

    #[test]
    fn rejects_illegal_characters() {
        assert!(Atom::new("hello!").is_err());
        assert!(Atom::new("caf\u{e9}").is_err());
    }

    #[test]
    fn predefined_atoms_match_runtime_encoding() {
        assert_eq!(OK, Atom::new("ok").unwrap());
        assert_eq!(TICK, Atom::new("tick").unwrap());
    }
}
