//! Fixed-size window accumulation on the sensor side.

use super::types::{Sample, Window};

/// Accumulates samples into windows of a fixed size.
///
/// `push` returns a completed window on exactly the N-th push since the last
/// completion, resetting the buffer in the same call. Never blocks; the
/// caller controls sampling rate. Samples are assumed to arrive in capture
/// order from a single source per builder instance.
#[derive(Debug)]
pub struct WindowBuilder {
    size: usize,
    buffer: Vec<Sample>,
}

impl WindowBuilder {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            buffer: Vec::with_capacity(size),
        }
    }

    pub fn push(&mut self, sample: Sample) -> Option<Window> {
        self.buffer.push(sample);
        if self.buffer.len() == self.size {
            let samples = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.size));
            Some(Window { samples })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
