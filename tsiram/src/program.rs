use std::{fs::File, io::Read, path::Path};

use anyhow::{Context, Result};
use log::*;
use tsiram6502::image::decode_image;

/// What the machine runs when nobody hands it anything: print the string at
/// $0006 through system call 2, then BRK.
const GREETING_CODE: [u8; 6] = [0xA2, 0x02, 0xA0, 0x06, 0xFF, 0x00];
const GREETING_TEXT: &[u8] = b"6502 Tsiram by Ryan Munger\0";

pub struct Program {
    pub bytes: Vec<u8>,
    pub load_address: u16,
}

impl Program {
    pub fn greeting() -> Program {
        let mut bytes = GREETING_CODE.to_vec();
        bytes.extend_from_slice(GREETING_TEXT);
        return Program {
            bytes,
            load_address: 0x0000,
        };
    }

    pub fn open(path: &Path, load_address: u16) -> Result<Program> {
        info!("Attempting to open path: '{}'", path.display());
        let mut f = File::open(path)
            .with_context(|| format!("failed to open program image {}", path.display()))?;
        let mut contents = Vec::new();
        f.read_to_end(&mut contents)
            .with_context(|| format!("failed to read program image {}", path.display()))?;
        let bytes = decode_image(&contents);
        info!(
            "Program info: {} bytes, loading at ${load_address:04X}",
            bytes.len()
        );
        return Ok(Program {
            bytes,
            load_address,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_points_y_at_its_own_text() {
        let program = Program::greeting();
        assert_eq!(program.bytes.len(), 33);
        // LDY operand is where the text starts
        assert_eq!(program.bytes[3], 0x06);
        assert_eq!(&program.bytes[6..10], b"6502");
        assert_eq!(program.bytes.last(), Some(&0x00));
    }

    #[test]
    fn missing_file_is_an_error_not_a_panic() {
        let error = Program::open(Path::new("/no/such/program.bin"), 0).err();
        assert!(error.is_some());
    }
}
