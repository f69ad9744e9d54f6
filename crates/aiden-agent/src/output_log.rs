use std::collections::VecDeque;

/// Ordered output chunks bounded by a byte budget. The oldest chunks are
/// dropped first once the budget is exceeded; the newest chunk is always
/// kept, even when it alone is larger than the budget.
#[derive(Debug, Clone)]
pub struct OutputLog {
    chunks: VecDeque<String>,
    total_bytes: usize,
    max_bytes: usize,
    dropped_chunks: usize,
}

impl OutputLog {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            total_bytes: 0,
            max_bytes,
            dropped_chunks: 0,
        }
    }

    pub fn push(&mut self, chunk: String) {
        if chunk.is_empty() {
            return;
        }
        self.total_bytes = self.total_bytes.saturating_add(chunk.len());
        self.chunks.push_back(chunk);

        while self.total_bytes > self.max_bytes && self.chunks.len() > 1 {
            if let Some(removed) = self.chunks.pop_front() {
                self.total_bytes = self.total_bytes.saturating_sub(removed.len());
                self.dropped_chunks += 1;
            }
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.chunks.iter().cloned().collect()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn dropped_chunks(&self) -> usize {
        self.dropped_chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
