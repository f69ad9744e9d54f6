/// Decodes a byte stream into text without splitting multi-byte characters
/// across chunk boundaries. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let keep = incomplete_tail_len(&self.pending);
        let split = self.pending.len() - keep;
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// Length of a trailing, not-yet-complete UTF-8 sequence (0..=3).
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => 0,
        Err(e) if e.error_len().is_none() => bytes.len() - e.valid_up_to(),
        Err(_) => {
            // an invalid byte earlier on; only look at the last three bytes
            let start = bytes.len().saturating_sub(3);
            for i in start..bytes.len() {
                if let Err(e) = std::str::from_utf8(&bytes[i..]) {
                    if e.valid_up_to() == 0 && e.error_len().is_none() {
                        return bytes.len() - i;
                    }
                }
            }
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_back_split_character() {
        let mut carry = Utf8Carry::default();
        let bytes = "añb".as_bytes();
        assert_eq!(carry.push(&bytes[..2]), "a");
        assert_eq!(carry.push(&bytes[2..]), "ñb");
        assert!(carry.finish().is_empty());
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(&[b'x', 0xFF, b'y']), "x\u{FFFD}y");
    }

    #[test]
    fn finish_flushes_dangling_bytes() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(&[0xE2, 0x82]), "");
        assert_eq!(carry.finish(), "\u{FFFD}");
    }
}
