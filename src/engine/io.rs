//! Scoped local file/device access for per-block tasks.
//!
//! Every call opens its own file descriptor, seeks, does its one read or
//! write, and lets the descriptor close on return — no descriptor is shared
//! across tasks, so there's no seek race to guard against. An open-then-operate
//! pattern adapted from whole-file streaming to per-chunk positional access.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::chunk::CHUNK_SIZE;

/// Writes `data` (expected to be exactly `CHUNK_SIZE` bytes) at the byte
/// offset `index * CHUNK_SIZE` in the file/device at `path`.
pub fn write_chunk_at(path: &Path, index: u32, data: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(index as u64 * CHUNK_SIZE as u64))?;
    file.write_all(data)?;
    file.flush()
}

/// Reads up to `CHUNK_SIZE` bytes starting at `index * CHUNK_SIZE` from the
/// file/device at `path`. Returns fewer than `CHUNK_SIZE` bytes only at the
/// final, short tail chunk of a file-backed upload source; callers
/// right-pad via [`crate::chunk::pad_to_chunk_size`].
pub fn read_chunk_at(path: &Path, index: u32) -> std::io::Result<Vec<u8>> {
    let mut file = OpenOptions::new().read(true).open(path)?;
    file.seek(SeekFrom::Start(index as u64 * CHUNK_SIZE as u64))?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0;
    loop {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    buf.truncate(total);
    Ok(buf)
}

/// Total block count of a local file/device, rounding down (`size / CHUNK_SIZE`).
pub fn block_count(path: &Path) -> std::io::Result<u64> {
    Ok(path.metadata()?.len() / CHUNK_SIZE as u64)
}

/// `⌈bytes / 2^30⌉` GiB, the `volume_size_gib` for an uploaded file.
pub fn volume_size_gib(byte_len: u64) -> u64 {
    const GIB: u64 = 1 << 30;
    byte_len.div_ceil(GIB)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips_at_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dev.img");
        std::fs::File::create(&path).unwrap().set_len(CHUNK_SIZE as u64 * 4).unwrap();

        let payload = vec![9u8; CHUNK_SIZE];
        write_chunk_at(&path, 2, &payload).unwrap();
        let read_back = read_chunk_at(&path, 2).unwrap();
        assert_eq!(read_back, payload);

        // Untouched chunks remain zero.
        let zero_chunk = read_chunk_at(&path, 0).unwrap();
        assert_eq!(zero_chunk, vec![0u8; CHUNK_SIZE]);
    }

    #[test]
    fn volume_size_rounds_up() {
        assert_eq!(volume_size_gib(1), 1);
        assert_eq!(volume_size_gib(1 << 30), 1);
        assert_eq!(volume_size_gib((1 << 30) + 1), 2);
    }

    #[test]
    fn block_count_rounds_down() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.img");
        std::fs::File::create(&path).unwrap().set_len(CHUNK_SIZE as u64 * 3 + 10).unwrap();
        assert_eq!(block_count(&path).unwrap(), 3);
    }

    #[test]
    fn short_tail_read_returns_fewer_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.img");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&[5u8; 10]).unwrap();
        let read = read_chunk_at(&path, 0).unwrap();
        assert_eq!(read.len(), 10);
    }
}
