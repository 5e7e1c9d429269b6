//! Upload direction: parse the incoming flattened file object, landing the
//! data fork in `<target>.incomplete` and renaming into place once the
//! declared size has arrived.

use super::copy_cancellable;
use crate::files::forks;
use crate::registry::transfers::Transfer;
use hotline::flattened::{InfoFork, FORK_DATA, FORK_INFO, FORK_RSRC};
use hotline::ProtocolError;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::Path;

fn bad_data(err: ProtocolError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Parse one flattened file object off `stream` and materialize it as the
/// fork triple for `target`. The data fork goes through the `.incomplete`
/// staging file; `resume_offset` appends to a previous partial landing.
pub(crate) fn read_flattened<R: Read>(
    target: &Path,
    resume_offset: u32,
    cancelled: &dyn Fn() -> bool,
    stream: &mut R,
) -> io::Result<()> {
    let mut flat_header = [0u8; 24];
    stream.read_exact(&mut flat_header)?;
    if &flat_header[..4] != b"FILP" {
        return Err(bad_data(ProtocolError::BadMagic));
    }
    let fork_count = u16::from_be_bytes([flat_header[22], flat_header[23]]);

    let incomplete = forks::incomplete_path(target);

    for _ in 0..fork_count {
        let mut fork_header = [0u8; 16];
        stream.read_exact(&mut fork_header)?;

        let mut fork_type = [0u8; 4];
        fork_type.copy_from_slice(&fork_header[..4]);
        let fork_size = u32::from_be_bytes([fork_header[12], fork_header[13], fork_header[14], fork_header[15]]);

        if &fork_type == FORK_INFO {
            let mut info_bytes = vec![0u8; fork_size as usize];
            stream.read_exact(&mut info_bytes)?;
            let info = InfoFork::decode(&info_bytes).map_err(bad_data)?;
            forks::write_info_fork(target, &info)?;
        } else if &fork_type == FORK_DATA {
            let mut file = if resume_offset > 0 {
                OpenOptions::new().append(true).open(&incomplete)?
            } else {
                File::create(&incomplete)?
            };
            copy_cancellable(stream, &mut file, u64::from(fork_size), cancelled)?;
            file.sync_all()?;
        } else if &fork_type == FORK_RSRC {
            let mut file = File::create(forks::rsrc_fork_path(target))?;
            copy_cancellable(stream, &mut file, u64::from(fork_size), cancelled)?;
        } else {
            // Unknown fork kinds are drained and dropped.
            copy_cancellable(stream, &mut io::sink(), u64::from(fork_size), cancelled)?;
        }
    }

    std::fs::rename(&incomplete, target)
}

/// Serve a `FileUpload` transfer.
pub fn receive_file<R: Read>(transfer: &Transfer, _declared_size: u32, stream: &mut R) -> io::Result<()> {
    let cancelled = || transfer.is_cancelled();
    read_flattened(&transfer.path, transfer.resume.data_offset, &cancelled, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::transfers::TransferKind;
    use crate::transfer::download::write_flattened;
    use hotline::flattened::ResumeData;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// Flatten a scratch file into bytes the way a client would upload it.
    fn flattened_bytes(content: &[u8], name: &str) -> Vec<u8> {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join(name);
        fs::write(&source, content).unwrap();

        let mut buf = Vec::new();
        write_flattened(&source, &ResumeData::default(), &|| false, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_upload_lands_and_renames() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("landed.txt");

        let transfer = Transfer::new(
            TransferKind::FileUpload,
            1,
            b"landed.txt".to_vec(),
            target.clone(),
        );
        let bytes = flattened_bytes(b"payload bytes", "landed.txt");

        receive_file(&transfer, bytes.len() as u32, &mut Cursor::new(bytes)).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"payload bytes".to_vec());
        assert!(!forks::incomplete_path(&target).exists());
        assert!(forks::info_fork_path(&target).exists());
    }

    #[test]
    fn test_upload_resume_appends() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("landed.txt");
        fs::write(forks::incomplete_path(&target), b"first-").unwrap();

        let mut transfer = Transfer::new(
            TransferKind::FileUpload,
            1,
            b"landed.txt".to_vec(),
            target.clone(),
        );
        transfer.resume = ResumeData {
            data_offset: 6,
            rsrc_offset: 0,
        };

        let bytes = flattened_bytes(b"second", "landed.txt");
        receive_file(&transfer, bytes.len() as u32, &mut Cursor::new(bytes)).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"first-second".to_vec());
    }

    #[test]
    fn test_upload_bad_magic_rejected() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("landed.txt");
        let transfer = Transfer::new(TransferKind::FileUpload, 1, Vec::new(), target.clone());

        let err = receive_file(&transfer, 8, &mut Cursor::new(b"XXXXXXXXXXXXXXXXXXXXXXXX".to_vec()))
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(!target.exists());
    }

    #[test]
    fn test_upload_truncated_stream_keeps_incomplete() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("landed.txt");
        let transfer = Transfer::new(TransferKind::FileUpload, 1, Vec::new(), target.clone());

        let mut bytes = flattened_bytes(b"payload bytes", "landed.txt");
        bytes.truncate(bytes.len() - 4);

        let err = receive_file(&transfer, bytes.len() as u32, &mut Cursor::new(bytes)).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(!target.exists());
        assert!(forks::incomplete_path(&target).exists(), "partial landing lost");
    }
}
