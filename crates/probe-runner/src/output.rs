/// Keeps the last `max` bytes written to it.
///
/// stdout and stderr are pushed into the same buffer as they arrive, so the
/// result reads like `2>&1`. Only the tail survives because a failing probe
/// tends to explain itself at the end.
#[derive(Debug)]
pub(crate) struct TailBuffer {
    max: usize,
    buf: Vec<u8>,
    truncated: bool,
}

impl TailBuffer {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            max,
            buf: Vec::with_capacity(max.min(8 * 1024)),
            truncated: false,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.max {
            self.truncated |= !self.buf.is_empty() || chunk.len() > self.max;
            self.buf.clear();
            self.buf.extend_from_slice(&chunk[chunk.len() - self.max..]);
            return;
        }
        let overflow = (self.buf.len() + chunk.len()).saturating_sub(self.max);
        if overflow > 0 {
            self.buf.drain(..overflow);
            self.truncated = true;
        }
        self.buf.extend_from_slice(chunk);
    }

    pub(crate) fn truncated(&self) -> bool {
        self.truncated
    }

    /// Decode the tail, dropping a leading partial UTF-8 sequence left by the cut.
    pub(crate) fn to_text(&self) -> String {
        let start = if self.truncated {
            self.buf
                .iter()
                .take(4)
                .position(|b| (b & 0xC0) != 0x80)
                .unwrap_or(0)
        } else {
            0
        };
        String::from_utf8_lossy(&self.buf[start..]).into_owned()
    }
}
