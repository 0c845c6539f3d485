//! Program images as they come off disk: either raw bytes, or hex text that
//! a person typed up.

use std::num::ParseIntError;

/// Turn a file's contents into the bytes to load. Hex text wins if every
/// token in it is a byte; otherwise the contents are taken as raw bytes.
pub fn decode_image(contents: &[u8]) -> Vec<u8> {
    match std::str::from_utf8(contents).ok().and_then(parse_hex_text) {
        Some(program) => program,
        None => contents.to_vec(),
    }
}

/// Whitespace or comma separated bytes, each with an optional `0x`. `;` and
/// `#` start a comment that runs to the end of the line.
pub fn parse_hex_text(text: &str) -> Option<Vec<u8>> {
    let mut program = Vec::new();
    for line in text.lines() {
        let code = match line.find([';', '#']) {
            Some(comment) => &line[..comment],
            None => line,
        };
        for token in code
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| !token.is_empty())
        {
            program.push(parse_byte(token)?);
        }
    }
    Some(program)
}

fn parse_byte(token: &str) -> Option<u8> {
    let digits = strip_hex_prefix(token).unwrap_or(token);
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

fn strip_hex_prefix(token: &str) -> Option<&str> {
    token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
}

/// Parse an address given on the command line: `0x`-prefixed hex, or
/// decimal.
pub fn parse_address(raw: &str) -> Result<u16, ParseIntError> {
    let trimmed = raw.trim();
    if let Some(hex) = strip_hex_prefix(trimmed) {
        return u16::from_str_radix(hex, 16);
    }
    trimmed.parse::<u16>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_text_with_comments() {
        let text = "; greeting\nA2 02 A0 06  # print string\n0xFF,0x00\n";
        assert_eq!(
            decode_image(text.as_bytes()),
            [0xA2, 0x02, 0xA0, 0x06, 0xFF, 0x00]
        );
    }

    #[test]
    fn raw_bytes_pass_through() {
        let raw = [0xA9, 0x01, 0x8D, 0x00, 0x02, 0x00];
        assert_eq!(decode_image(&raw), raw);
    }

    #[test]
    fn one_bad_token_means_raw() {
        // valid UTF-8, but "hello" is not a byte
        assert_eq!(decode_image(b"A9 hello"), b"A9 hello");
        assert_eq!(parse_hex_text("A9 123"), None);
    }

    #[test]
    fn addresses_in_hex_or_decimal() {
        assert_eq!(parse_address("0x0400"), Ok(0x0400));
        assert_eq!(parse_address("0XFFFF"), Ok(0xFFFF));
        assert_eq!(parse_address("1024"), Ok(1024));
        assert!(parse_address("0x10000").is_err());
        assert!(parse_address("zero").is_err());
    }
}
