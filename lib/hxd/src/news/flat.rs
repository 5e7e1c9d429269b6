//! The flat message board: one file, newest post first. Posts are
//! prepended atomically; legacy clients expect CR line endings.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Replace LF and CRLF with the CR the 1997 clients want.
pub fn normalize_newlines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().peekable();
    while let Some(&b) = iter.next() {
        match b {
            b'\r' => {
                out.push(b'\r');
                // Swallow the LF of a CRLF pair.
                if iter.peek() == Some(&&b'\n') {
                    iter.next();
                }
            }
            b'\n' => out.push(b'\r'),
            _ => out.push(b),
        }
    }
    out
}

/// File-backed flat news. `Read`/`Seek` stream the board contents for
/// `GetMsgs`; `Write` is an atomic prepend.
pub struct FlatNews {
    path: PathBuf,
    pos: u64,
}

impl FlatNews {
    pub fn open(path: PathBuf) -> io::Result<FlatNews> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, b"")?;
        }
        Ok(FlatNews { path, pos: 0 })
    }

    /// The whole board, newest post first.
    pub fn contents(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }
}

impl Read for FlatNews {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = fs::read(&self.path)?;
        let start = (self.pos as usize).min(data.len());
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        self.pos += count as u64;
        Ok(count)
    }
}

impl Seek for FlatNews {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.len()?;
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => len as i64 + offset,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

impl Write for FlatNews {
    /// Atomic prepend: the new post lands in front of the existing board
    /// via temp-file + rename.
    fn write(&mut self, post: &[u8]) -> io::Result<usize> {
        let existing = fs::read(&self.path)?;

        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(post)?;
        file.write_all(&existing)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;

        Ok(post.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, FlatNews) {
        let dir = TempDir::new().unwrap();
        let news = FlatNews::open(dir.path().join("news.txt")).unwrap();
        (dir, news)
    }

    #[test]
    fn test_prepend_order() {
        let (_dir, mut news) = fixture();

        news.write(b"first\r").unwrap();
        news.write(b"second\r").unwrap();

        assert_eq!(news.contents().unwrap(), b"second\rfirst\r".to_vec());
    }

    #[test]
    fn test_read_streams_from_seek_position() {
        let (_dir, mut news) = fixture();
        news.write(b"hello board").unwrap();

        news.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 5];
        news.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        news.seek(SeekFrom::Start(6)).unwrap();
        let mut rest = Vec::new();
        news.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"board".to_vec());
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines(b"a\nb"), b"a\rb".to_vec());
        assert_eq!(normalize_newlines(b"a\r\nb"), b"a\rb".to_vec());
        assert_eq!(normalize_newlines(b"a\rb"), b"a\rb".to_vec());
        assert_eq!(normalize_newlines(b"\r\n\r\n"), b"\r\r".to_vec());
    }

    #[test]
    fn test_open_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let news = FlatNews::open(dir.path().join("sub/news.txt")).unwrap();
        assert_eq!(news.contents().unwrap(), Vec::<u8>::new());
    }
}
