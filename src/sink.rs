//! Bounded writer over a caller-supplied output buffer.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// `io::Write` adapter that fails before overrunning the fixed buffer.
///
/// The number of bytes successfully written is shared through a
/// [`WriteCount`] so encoders can report the final size after the
/// wrapping codec writer has been consumed.
pub(crate) struct BoundedWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    written: WriteCount,
}

/// Byte counter surviving the writer that fed it.
#[derive(Clone, Default)]
pub(crate) struct WriteCount(Arc<AtomicUsize>);

impl WriteCount {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, value: usize) {
        self.0.store(value, Ordering::Release);
    }
}

impl<'a> BoundedWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> (Self, WriteCount) {
        let written = WriteCount::default();
        (
            Self {
                buf,
                pos: 0,
                written: written.clone(),
            },
            written,
        )
    }
}

impl Write for BoundedWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let end = self
            .pos
            .checked_add(data.len())
            .ok_or_else(overflow_error)?;
        if end > self.buf.len() {
            return Err(overflow_error());
        }
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        self.written.set(self.pos);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The error kind used to signal output-buffer exhaustion.
pub(crate) fn overflow_error() -> io::Error {
    io::Error::new(io::ErrorKind::WriteZero, "output buffer full")
}

pub(crate) fn is_overflow(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WriteZero
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_capacity_succeeds_and_one_more_fails() {
        let mut buf = [0u8; 4];
        let (mut w, written) = BoundedWriter::new(&mut buf);
        w.write_all(&[1, 2, 3, 4]).unwrap();
        assert_eq!(written.get(), 4);
        assert!(is_overflow(&w.write_all(&[5]).unwrap_err()));
        assert_eq!(written.get(), 4);
    }
}
