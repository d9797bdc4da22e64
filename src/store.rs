use memmap2::Mmap;
use std::io;

/// Random access, read-only byte storage backing a volume.
///
/// Reads are positioned and take `&self`, so one store can serve several
/// slice extractions running on different threads.
pub trait VoxelStore: Send + Sync {
    /// Fills `buf` with the bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_from_slice(bytes: &[u8], offset: u64, buf: &mut [u8]) -> io::Result<()> {
    let range = usize::try_from(offset)
        .ok()
        .and_then(|start| Some(start..start.checked_add(buf.len())?))
        .filter(|range| range.end <= bytes.len())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at offset {offset} exceeds store of {} bytes",
                    buf.len(),
                    bytes.len()
                ),
            )
        })?;
    buf.copy_from_slice(&bytes[range]);
    Ok(())
}

impl VoxelStore for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        read_from_slice(self, offset, buf)
    }

    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }
}

impl VoxelStore for Mmap {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        read_from_slice(self, offset, buf)
    }

    fn len(&self) -> u64 {
        (**self).len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_inside_bounds() {
        let store: Vec<u8> = (0..16).collect();
        let mut buf = [0u8; 3];
        store.read_at(5, &mut buf).unwrap();
        assert_eq!(buf, [5, 6, 7]);
        assert_eq!(VoxelStore::len(&store), 16);
    }

    #[test]
    fn reads_past_end_fail() {
        let store: Vec<u8> = vec![0; 4];
        let mut buf = [0u8; 2];
        let err = store.read_at(3, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
