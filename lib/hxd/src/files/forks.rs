//! The on-disk fork triple: the data file itself plus adjacent
//! `.info_<name>` and `.rsrc_<name>` companions. Missing companions are
//! non-fatal; metadata is synthesized from the filesystem.

use chrono::{DateTime, Utc};
use hotline::date::encode_date;
use hotline::flattened::{
    encode_flat_file_header, encode_fork_header, InfoFork, FORK_DATA, FORK_INFO, FORK_RSRC,
    FLAT_FILE_HEADER_SIZE, FORK_HEADER_SIZE,
};
use hotline::payload::{CREATOR_GENERIC, TYPE_FOLDER, TYPE_GENERIC};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const INFO_FORK_PREFIX: &str = ".info_";
pub const RSRC_FORK_PREFIX: &str = ".rsrc_";
pub const INCOMPLETE_SUFFIX: &str = ".incomplete";

fn sibling(path: &Path, prefix: &str) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!("{}{}", prefix, name))
}

pub fn info_fork_path(path: &Path) -> PathBuf {
    sibling(path, INFO_FORK_PREFIX)
}

pub fn rsrc_fork_path(path: &Path) -> PathBuf {
    sibling(path, RSRC_FORK_PREFIX)
}

pub fn incomplete_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!("{}{}", name, INCOMPLETE_SUFFIX))
}

/// Fork companions and upload leftovers stay out of listings.
pub fn is_fork_artifact(name: &str) -> bool {
    name.starts_with(INFO_FORK_PREFIX) || name.starts_with(RSRC_FORK_PREFIX) || name.ends_with(INCOMPLETE_SUFFIX)
}

fn fs_date(when: io::Result<SystemTime>) -> [u8; 8] {
    let when: DateTime<Utc> = when.map(DateTime::from).unwrap_or_else(|_| Utc::now());
    encode_date(when)
}

/// Read the info fork, synthesizing defaults when the companion file is
/// absent or unreadable.
pub fn read_info_fork(path: &Path) -> InfoFork {
    if let Ok(bytes) = fs::read(info_fork_path(path)) {
        if let Ok(info) = InfoFork::decode(&bytes) {
            return info;
        }
    }
    synthesize_info_fork(path)
}

/// Default metadata derived from the filesystem.
pub fn synthesize_info_fork(path: &Path) -> InfoFork {
    let meta = fs::metadata(path).ok();
    let is_dir = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);

    let (create_date, modify_date) = match &meta {
        Some(meta) => (fs_date(meta.created()), fs_date(meta.modified())),
        None => (encode_date(Utc::now()), encode_date(Utc::now())),
    };

    InfoFork {
        type_code: if is_dir { TYPE_FOLDER } else { TYPE_GENERIC },
        creator_code: if is_dir { [0; 4] } else { CREATOR_GENERIC },
        flags: 0,
        platform_flags: 0,
        create_date,
        modify_date,
        name_script: 0,
        name: crate::files::paths::wire_name(path),
        comment: Vec::new(),
    }
}

pub fn write_info_fork(path: &Path, info: &InfoFork) -> io::Result<()> {
    fs::write(info_fork_path(path), info.encode())
}

/// Size of the resource fork, zero when absent.
pub fn rsrc_size(path: &Path) -> u64 {
    fs::metadata(rsrc_fork_path(path)).map(|meta| meta.len()).unwrap_or(0)
}

/// Size of the data fork.
pub fn data_size(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

/// Wire size of the complete flattened file object for a download.
pub fn flattened_size(info: &InfoFork, data_len: u64, rsrc_len: u64) -> u64 {
    let mut size = (FLAT_FILE_HEADER_SIZE + FORK_HEADER_SIZE) as u64 + info.size() as u64;
    size += FORK_HEADER_SIZE as u64 + data_len;
    if rsrc_len > 0 {
        size += FORK_HEADER_SIZE as u64 + rsrc_len;
    }
    size
}

/// Serialize the leading sections of a flattened file object: the file
/// header, the info fork, and the data fork header. The data bytes are
/// streamed behind this by the transfer worker.
pub fn flattened_prefix(info: &InfoFork, data_len: u64, rsrc_len: u64) -> Vec<u8> {
    let fork_count = if rsrc_len > 0 { 3 } else { 2 };

    let mut buf = Vec::with_capacity(FLAT_FILE_HEADER_SIZE + 2 * FORK_HEADER_SIZE + info.size());
    buf.extend_from_slice(&encode_flat_file_header(fork_count));
    buf.extend_from_slice(&encode_fork_header(FORK_INFO, info.size() as u32));
    buf.extend_from_slice(&info.encode());
    buf.extend_from_slice(&encode_fork_header(FORK_DATA, data_len as u32));
    buf
}

/// Header of the trailing resource fork section.
pub fn rsrc_section_header(rsrc_len: u64) -> Vec<u8> {
    encode_fork_header(FORK_RSRC, rsrc_len as u32).to_vec()
}

/// Rename the fork triple together. The companions move best-effort; a file
/// without companions renames cleanly.
pub fn rename_with_forks(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)?;
    let _ = fs::rename(info_fork_path(from), info_fork_path(to));
    let _ = fs::rename(rsrc_fork_path(from), rsrc_fork_path(to));
    Ok(())
}

/// Remove the fork triple together.
pub fn remove_with_forks(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    let _ = fs::remove_file(info_fork_path(path));
    let _ = fs::remove_file(rsrc_fork_path(path));
    Ok(())
}
