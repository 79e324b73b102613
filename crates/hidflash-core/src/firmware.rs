//! Firmware image sectoring.
//!
//! The image is a raw binary streamed from any [`Read`] source. It is cut
//! into `SECTOR_SIZE` sectors; a short final sector is zero-padded so the
//! device always receives whole sectors.

use std::io::{self, Read};

use crate::protocol::constants::{SECTOR_SIZE, TX_PAYLOAD_SIZE};

/// One sector of firmware, zero-padded to `SECTOR_SIZE`.
#[derive(Clone)]
pub struct Sector {
    /// Position of the sector in the image.
    pub index: usize,
    data: [u8; SECTOR_SIZE],
    len: usize,
}

impl Sector {
    /// Bytes taken from the image (the rest is padding).
    pub fn data_len(&self) -> usize {
        self.len
    }

    /// The full padded sector.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Data-frame payloads, in transmission order.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks(TX_PAYLOAD_SIZE)
    }
}

impl std::fmt::Debug for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sector")
            .field("index", &self.index)
            .field("len", &self.len)
            .finish()
    }
}

/// Reads consecutive sectors from a firmware source.
pub struct SectorReader<R> {
    source: R,
    next_index: usize,
    bytes_read: usize,
}

impl<R: Read> SectorReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            next_index: 0,
            bytes_read: 0,
        }
    }

    /// Total image bytes consumed so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Read the next sector, `None` once the source is exhausted.
    ///
    /// Keeps reading until the sector is full or the source ends, so a
    /// source returning short reads still yields full sectors.
    pub fn next_sector(&mut self) -> io::Result<Option<Sector>> {
        let mut data = [0u8; SECTOR_SIZE];
        let mut len = 0;

        while len < SECTOR_SIZE {
            match self.source.read(&mut data[len..]) {
                Ok(0) => break,
                Ok(n) => len += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if len == 0 {
            return Ok(None);
        }

        let sector = Sector {
            index: self.next_index,
            data,
            len,
        };
        self.next_index += 1;
        self.bytes_read += len;
        Ok(Some(sector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::DATA_CHUNKS_PER_SECTOR;
    use std::io::Cursor;

    /// Source that hands out at most `step` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_exact_sectors() {
        let image: Vec<u8> = (0..2048).map(|i| i as u8).collect();
        let mut reader = SectorReader::new(Cursor::new(image.clone()));

        let first = reader.next_sector().unwrap().unwrap();
        let second = reader.next_sector().unwrap().unwrap();
        assert!(reader.next_sector().unwrap().is_none());

        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert_eq!(first.as_bytes(), &image[..1024]);
        assert_eq!(second.as_bytes(), &image[1024..]);
        assert_eq!(reader.bytes_read(), 2048);
    }

    #[test]
    fn test_short_tail_padded() {
        let mut reader = SectorReader::new(Cursor::new(vec![0xAB; 100]));

        let sector = reader.next_sector().unwrap().unwrap();
        assert_eq!(sector.data_len(), 100);
        assert!(sector.as_bytes()[..100].iter().all(|&b| b == 0xAB));
        assert!(sector.as_bytes()[100..].iter().all(|&b| b == 0));
        assert_eq!(sector.chunks().count(), DATA_CHUNKS_PER_SECTOR);
        assert!(reader.next_sector().unwrap().is_none());
    }

    #[test]
    fn test_empty_image() {
        let mut reader = SectorReader::new(Cursor::new(Vec::new()));
        assert!(reader.next_sector().unwrap().is_none());
    }

    #[test]
    fn test_short_reads_fill_sector() {
        let source = Trickle {
            data: vec![0x5A; 1500],
            pos: 0,
            step: 7,
        };
        let mut reader = SectorReader::new(source);

        assert_eq!(reader.next_sector().unwrap().unwrap().data_len(), 1024);
        assert_eq!(reader.next_sector().unwrap().unwrap().data_len(), 476);
        assert!(reader.next_sector().unwrap().is_none());
    }

    /// Source that is interrupted once before every read that succeeds.
    struct Interrupting {
        inner: Cursor<Vec<u8>>,
        interrupt_next: bool,
    }

    impl Read for Interrupting {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt_next = !self.interrupt_next;
            if !self.interrupt_next {
                return Err(io::ErrorKind::Interrupted.into());
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn test_interrupted_reads_retried() {
        let source = Interrupting {
            inner: Cursor::new(vec![0x11; 1100]),
            interrupt_next: true,
        };
        let mut reader = SectorReader::new(source);

        assert_eq!(reader.next_sector().unwrap().unwrap().data_len(), 1024);
        assert_eq!(reader.next_sector().unwrap().unwrap().data_len(), 76);
        assert!(reader.next_sector().unwrap().is_none());
        assert_eq!(reader.bytes_read(), 1100);
    }

    #[test]
    fn test_read_error_propagates() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk gone"))
            }
        }

        let err = SectorReader::new(Broken).next_sector().unwrap_err();
        assert_eq!(err.to_string(), "disk gone");
    }

    #[test]
    fn test_chunk_layout() {
        let image: Vec<u8> = (0..1024).map(|i| (i / 64) as u8).collect();
        let sector = SectorReader::new(Cursor::new(image))
            .next_sector()
            .unwrap()
            .unwrap();

        for (i, chunk) in sector.chunks().enumerate() {
            assert_eq!(chunk.len(), 64);
            assert!(chunk.iter().all(|&b| b == i as u8));
        }
    }
}
