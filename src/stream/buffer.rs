use super::StreamError;

/// Anti-hijacking preamble sent ahead of the key-free endpoint's stream.
pub const XSSI_PREAMBLE: &[u8] = b")]}'";

/// Byte accumulator that turns transport chunks into complete lines.
///
/// Bytes that do not yet end in `\n` stay in the buffer until a later chunk
/// completes them. Nothing bounds the size of the retained tail.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    pending: Vec<u8>,
    /// Leading bytes of `pending` already known to hold no `\n`.
    scanned: usize,
    preamble: Preamble,
}

#[derive(Debug, Default)]
enum Preamble {
    #[default]
    None,
    Expected(&'static [u8]),
    Resolved,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer that drops `preamble` if the stream opens with it.
    ///
    /// The check runs once, against the first bytes of the stream. A
    /// preamble split across chunks is still recognised; later occurrences
    /// of the same bytes are ordinary data.
    pub fn with_preamble(preamble: &'static [u8]) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            preamble: Preamble::Expected(preamble),
        }
    }

    /// Append `bytes` and drain every complete line, terminator removed.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, StreamError> {
        self.pending
            .try_reserve(bytes.len())
            .map_err(|_| StreamError::Allocation {
                requested: bytes.len(),
                retained: self.pending.len(),
            })?;
        self.pending.extend_from_slice(bytes);

        if let Preamble::Expected(preamble) = self.preamble {
            let probe = self.pending.len().min(preamble.len());
            if self.pending[..probe] != preamble[..probe] {
                self.preamble = Preamble::Resolved;
            } else if probe == preamble.len() {
                self.pending.drain(..probe);
                self.preamble = Preamble::Resolved;
            } else {
                // Still a strict prefix of the preamble, so no newline yet.
                return Ok(Vec::new());
            }
        }

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.pending[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            lines.push(self.pending[start..end].to_vec());
            start = end + 1;
            from = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();

        Ok(lines)
    }

    /// Bytes received but not yet resolved into a line.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_partial_line_for_next_chunk() {
        let mut buffer = StreamBuffer::new();
        assert!(buffer.feed(b"data: {\"a\"").unwrap().is_empty());
        assert_eq!(buffer.pending(), b"data: {\"a\"");

        let lines = buffer.feed(b":1}\nnext").unwrap();
        assert_eq!(lines, vec![b"data: {\"a\":1}".to_vec()]);
        assert_eq!(buffer.pending(), b"next");
    }

    #[test]
    fn long_line_in_single_bytes_is_reassembled() {
        let mut buffer = StreamBuffer::new();
        for byte in b"abcdef" {
            assert!(buffer.feed(&[*byte]).unwrap().is_empty());
        }
        assert_eq!(buffer.feed(b"\nxy").unwrap(), vec![b"abcdef".to_vec()]);
        assert_eq!(buffer.feed(b"z\n").unwrap(), vec![b"xyz".to_vec()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn yields_empty_lines() {
        let mut buffer = StreamBuffer::new();
        let lines = buffer.feed(b"a\n\nb\n").unwrap();
        assert_eq!(lines, vec![b"a".to_vec(), Vec::new(), b"b".to_vec()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn preamble_split_across_chunks_is_stripped() {
        let mut buffer = StreamBuffer::with_preamble(XSSI_PREAMBLE);
        assert!(buffer.feed(b")]").unwrap().is_empty());
        let lines = buffer.feed(b"}'\n[1]\n").unwrap();
        assert_eq!(lines, vec![Vec::new(), b"[1]".to_vec()]);
    }

    #[test]
    fn stream_without_preamble_is_untouched() {
        let mut buffer = StreamBuffer::with_preamble(XSSI_PREAMBLE);
        let lines = buffer.feed(b")x\n").unwrap();
        assert_eq!(lines, vec![b")x".to_vec()]);
    }
}
