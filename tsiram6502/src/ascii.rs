//! The character table: the 128 standard 7-bit codes and the characters they
//! stand for. Only the I/O edges (keyboard in, console out) use it; the
//! pipeline itself only ever sees bytes.

/// Highest code in the table.
pub const LAST_CODE: u8 = 0x7F;

/// Character for a code, or `None` if the code is outside the 7-bit table.
pub fn decode(code: u8) -> Option<char> {
    if code <= LAST_CODE {
        Some(code as char)
    } else {
        None
    }
}

/// Code for a character, or `None` if the character has no 7-bit code.
pub fn encode(character: char) -> Option<u8> {
    if character.is_ascii() {
        Some(character as u8)
    } else {
        None
    }
}

/// A printable rendering of a code, for log lines. Control codes get their
/// usual abbreviation instead of being dumped raw into the terminal.
pub fn describe(code: u8) -> String {
    const CONTROL_NAMES: [&str; 32] = [
        "NUL", "SOH", "STX", "ETX", "EOT", "ENQ", "ACK", "BEL", "BS", "TAB", "LF", "VT", "FF",
        "CR", "SO", "SI", "DLE", "DC1", "DC2", "DC3", "DC4", "NAK", "SYN", "ETB", "CAN", "EM",
        "SUB", "ESC", "FS", "GS", "RS", "US",
    ];
    match code {
        0x00..=0x1F => format!("<{}>", CONTROL_NAMES[code as usize]),
        0x7F => "<DEL>".to_string(),
        0x20..=0x7E => (code as char).to_string(),
        _ => format!("<${code:02X}>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_table_goes_both_ways() {
        for code in 0..=LAST_CODE {
            let character = decode(code).unwrap();
            assert_eq!(encode(character), Some(code));
        }
    }

    #[test]
    fn nothing_outside_seven_bits() {
        assert_eq!(decode(0x80), None);
        assert_eq!(decode(0xFF), None);
        assert_eq!(encode('é'), None);
    }

    #[test]
    fn describe_names_control_codes() {
        assert_eq!(describe(b'h'), "h");
        assert_eq!(describe(0x03), "<ETX>");
        assert_eq!(describe(0x0A), "<LF>");
        assert_eq!(describe(0x7F), "<DEL>");
        assert_eq!(describe(0xC0), "<$C0>");
    }
}
