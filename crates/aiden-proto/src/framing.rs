/// One decoded push-stream record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload of a `data:` line, leading space stripped.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental decoder for newline-delimited `data: <payload>` records.
///
/// Bytes are buffered until a newline arrives; the incomplete trailing line is
/// carried into the next `feed`. Buffering raw bytes keeps multi-byte UTF-8
/// sequences intact when a chunk boundary falls inside one.
#[derive(Debug, Default)]
pub struct DataLineDecoder {
    buffer: Vec<u8>,
}

impl DataLineDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = decode_line(&line[..line.len() - 1]) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<Frame> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

fn decode_line(line: &[u8]) -> Option<Frame> {
    let line = String::from_utf8_lossy(line);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.is_empty() {
        return None;
    }
    if payload.trim() == "[DONE]" {
        return Some(Frame::Done);
    }
    Some(Frame::Data(payload.to_string()))
}

/// Encode a payload as one push-stream record.
pub fn encode_data_line(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

pub const DONE_LINE: &str = "data: [DONE]\n\n";
