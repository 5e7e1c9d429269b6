//! Folder transfers: a depth-first stream of per-item headers and
//! flattened files, with a 2-byte action code exchanged before each item's
//! contents.

use super::{download, upload};
use crate::files::{forks, paths};
use crate::registry::transfers::Transfer;
use hotline::flattened::ResumeData;
use hotline::path::{decode_path, encode_path};
use hotline::xfer::{FolderItemHeader, FLDR_ACTION_NEXT_FILE, FLDR_ACTION_SEND_FILE};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

struct WalkItem {
    path: PathBuf,
    rel: Vec<Vec<u8>>,
    is_dir: bool,
}

/// Depth-first listing, parents ahead of their contents, fork companions
/// hidden.
fn walk(root: &Path) -> io::Result<Vec<WalkItem>> {
    fn recurse(dir: &Path, rel: &[Vec<u8>], out: &mut Vec<WalkItem>) -> io::Result<()> {
        let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if forks::is_fork_artifact(&name) || name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            let mut item_rel = rel.to_vec();
            item_rel.push(hotline::macroman::from_utf8(&name));

            let is_dir = entry.file_type()?.is_dir();
            out.push(WalkItem {
                path: path.clone(),
                rel: item_rel.clone(),
                is_dir,
            });

            if is_dir {
                recurse(&path, &item_rel, out)?;
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    recurse(root, &[], &mut out)?;
    Ok(out)
}

/// Declared size and item count for a folder download, computed the same
/// way the stream is later produced.
pub fn folder_transfer_stats(root: &Path) -> io::Result<(u64, u32)> {
    let items = walk(root)?;

    let mut size: u64 = 0;
    for item in &items {
        let header = FolderItemHeader {
            is_folder: item.is_dir,
            data_size: 0,
            path: encode_path(&item.rel).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?,
        };
        size += header.encode().len() as u64;

        if !item.is_dir {
            let info = forks::read_info_fork(&item.path);
            size += forks::flattened_size(&info, forks::data_size(&item.path)?, forks::rsrc_size(&item.path));
        }
    }

    Ok((size, items.len() as u32))
}

fn read_action<S: Read>(stream: &mut S) -> io::Result<u16> {
    let mut action = [0u8; 2];
    stream.read_exact(&mut action)?;
    Ok(u16::from_be_bytes(action))
}

/// Serve a `FolderDownload`: header, action, contents, per item.
pub fn send_folder<S: Read + Write>(transfer: &Transfer, stream: &mut S) -> io::Result<()> {
    let cancelled = || transfer.is_cancelled();
    let items = walk(&transfer.path)?;

    for item in items {
        if cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled"));
        }

        let data_size = if item.is_dir {
            0
        } else {
            let info = forks::read_info_fork(&item.path);
            forks::flattened_size(&info, forks::data_size(&item.path)?, forks::rsrc_size(&item.path)) as u32
        };

        let header = FolderItemHeader {
            is_folder: item.is_dir,
            data_size,
            path: encode_path(&item.rel).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?,
        };
        stream.write_all(&header.encode())?;

        let action = read_action(stream)?;
        if item.is_dir || action == FLDR_ACTION_NEXT_FILE {
            continue;
        }

        // Send and resume both stream the item; folder resumes restart the
        // file from zero.
        download::write_flattened(&item.path, &ResumeData::default(), &cancelled, stream)?;
    }

    Ok(())
}

/// Serve a `FolderUpload`: request each item with an action code, then land
/// it under the target folder. Item paths are wire paths and go through
/// the same validation as control-plane requests.
pub fn receive_folder<S: Read + Write>(transfer: &Transfer, stream: &mut S) -> io::Result<()> {
    let cancelled = || transfer.is_cancelled();
    fs::create_dir_all(&transfer.path)?;

    for _ in 0..transfer.folder_item_count {
        if cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled"));
        }

        stream.write_all(&FLDR_ACTION_NEXT_FILE.to_be_bytes())?;

        let mut len_bytes = [0u8; 2];
        stream.read_exact(&mut len_bytes)?;
        let body_len = u16::from_be_bytes(len_bytes) as usize;

        let mut body = vec![0u8; body_len];
        stream.read_exact(&mut body)?;

        let mut header_bytes = len_bytes.to_vec();
        header_bytes.extend_from_slice(&body);
        let header = FolderItemHeader::decode(&header_bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        let segments =
            decode_path(&header.path).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let target = paths::resolve(&transfer.path, &segments, None)
            .map_err(|err| io::Error::new(io::ErrorKind::PermissionDenied, err.to_string()))?;

        if header.is_folder {
            fs::create_dir_all(&target)?;
            continue;
        }

        stream.write_all(&FLDR_ACTION_SEND_FILE.to_be_bytes())?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        upload::read_flattened(&target, 0, &cancelled, stream)?;
    }

    Ok(())
}
