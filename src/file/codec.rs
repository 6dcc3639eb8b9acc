//! Digit/letter substitution used to hide the time bucket inside a file ID.
//!
//! `'0'..='9'` maps onto `'a'..='j'`. Characters outside the source range are
//! normalized (to `'0'` when encoding, `'a'` when decoding) instead of being
//! rejected, so both directions are total and length-preserving.

const OFFSET: u8 = b'a' - b'0';

pub fn encode(digits: &str) -> String {
    digits
        .chars()
        .map(|c| {
            let c = if c.is_ascii_digit() { c as u8 } else { b'0' };
            (c + OFFSET) as char
        })
        .collect()
}

pub fn decode(letters: &str) -> String {
    letters
        .chars()
        .map(|c| {
            let c = if ('a'..='j').contains(&c) { c as u8 } else { b'a' };
            (c - OFFSET) as char
        })
        .collect()
}
