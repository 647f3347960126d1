use std::io::{ErrorKind, Read};

/// Counting reader used by the synchronizer.
///
/// Wraps a reader with single-byte reads, whole-buffer fills that report a
/// clean end-of-stream instead of an error, and a running byte offset.
/// Callers that care about throughput should hand in a buffered reader.
pub(crate) struct Bytes<R> {
    reader: R,
    num_read: usize,
    buf: [u8; 1],
}

impl<R> Bytes<R>
where
    R: Read,
{
    pub fn new(reader: R) -> Self {
        Bytes {
            reader,
            num_read: 0,
            buf: [0u8; 1],
        }
    }

    /// Next byte from the stream, or `None` at end-of-stream.
    pub fn next(&mut self) -> std::io::Result<Option<u8>> {
        let n = self.reader.read(&mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.num_read += 1;
        Ok(Some(self.buf[0]))
    }

    /// Fill `buf` completely, returning false if the stream ended before
    /// `buf.len()` bytes were available.
    pub fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<bool> {
        if let Err(err) = self.reader.read_exact(buf) {
            if err.kind() == ErrorKind::UnexpectedEof {
                return Ok(false);
            }
            return Err(err);
        }
        self.num_read += buf.len();
        Ok(true)
    }

    /// Total bytes consumed from the underlying reader.
    pub fn offset(&self) -> usize {
        self.num_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_produces_bytes_then_none() {
        let dat = [1u8, 2, 3];
        let mut bytes = Bytes::new(&dat[..]);

        assert_eq!(bytes.next().unwrap(), Some(1));
        assert_eq!(bytes.next().unwrap(), Some(2));
        assert_eq!(bytes.next().unwrap(), Some(3));
        assert_eq!(bytes.offset(), 3);
        assert_eq!(bytes.next().unwrap(), None);
    }

    #[test]
    fn fill_reads_exact() {
        let dat = [1u8, 2, 3, 4, 5];
        let mut bytes = Bytes::new(&dat[..]);

        let mut buf = [0u8; 3];
        assert!(bytes.fill(&mut buf).unwrap());
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(bytes.offset(), 3);
    }

    #[test]
    fn fill_returns_false_when_short() {
        let dat = [1u8, 2];
        let mut bytes = Bytes::new(&dat[..]);

        let mut buf = [0u8; 3];
        assert!(!bytes.fill(&mut buf).unwrap());
    }
}
