//! Download direction: stream a flattened file object (or a bare data fork
//! in preview mode) to the client.

use super::copy_cancellable;
use crate::files::forks;
use crate::handlers::file::XFER_OPTION_PREVIEW;
use crate::registry::transfers::Transfer;
use crate::state::ServerState;
use hotline::flattened::ResumeData;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

/// Stream one file as a flattened object: header, info fork, data fork
/// from the resume offset, resource fork if present.
pub(crate) fn write_flattened<W: Write>(
    path: &Path,
    resume: &ResumeData,
    cancelled: &dyn Fn() -> bool,
    stream: &mut W,
) -> io::Result<u64> {
    let info = forks::read_info_fork(path);
    let data_len = forks::data_size(path)?;
    let rsrc_len = forks::rsrc_size(path);

    let remaining_data = data_len.saturating_sub(u64::from(resume.data_offset));
    let prefix = forks::flattened_prefix(&info, remaining_data, rsrc_len);
    stream.write_all(&prefix)?;
    let mut sent = prefix.len() as u64;

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(u64::from(resume.data_offset)))?;
    sent += copy_cancellable(&mut file, stream, remaining_data, cancelled)?;

    if rsrc_len > 0 {
        let remaining_rsrc = rsrc_len.saturating_sub(u64::from(resume.rsrc_offset));
        let section = forks::rsrc_section_header(remaining_rsrc);
        stream.write_all(&section)?;
        sent += section.len() as u64;

        let mut rsrc = File::open(forks::rsrc_fork_path(path))?;
        rsrc.seek(SeekFrom::Start(u64::from(resume.rsrc_offset)))?;
        sent += copy_cancellable(&mut rsrc, stream, remaining_rsrc, cancelled)?;
    }

    Ok(sent)
}

/// Serve a `FileDownload` transfer.
pub fn send_file<W: Write>(transfer: &Transfer, stream: &mut W) -> io::Result<()> {
    let cancelled = || transfer.is_cancelled();

    if transfer.options == XFER_OPTION_PREVIEW {
        let data_len = forks::data_size(&transfer.path)?;
        let remaining = data_len.saturating_sub(u64::from(transfer.resume.data_offset));

        let mut file = File::open(&transfer.path)?;
        file.seek(SeekFrom::Start(u64::from(transfer.resume.data_offset)))?;
        copy_cancellable(&mut file, stream, remaining, &cancelled)?;
        return Ok(());
    }

    write_flattened(&transfer.path, &transfer.resume, &cancelled, stream)?;
    Ok(())
}

/// Serve a `BannerDownload` transfer: the raw banner bytes, no container.
pub fn send_banner<W: Write>(state: &ServerState, transfer: &Transfer, stream: &mut W) -> io::Result<()> {
    if transfer.is_cancelled() {
        return Err(io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled"));
    }
    stream.write_all(&state.banner)
}
