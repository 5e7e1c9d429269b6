//! File-volume handlers: listing, metadata, manipulation, and the control
//! plane of every transfer.

use super::*;
use crate::error::{HandlerError, HandlerResult};
use crate::files::{self, forks, paths};
use crate::registry::clients::ClientConn;
use crate::registry::transfers::{Transfer, TransferKind};
use crate::state::ServerState;
use crate::transfer::folder::folder_transfer_stats;
use hotline::access;
use hotline::flattened::ResumeData;
use hotline::macroman;
use hotline::path::decode_path;
use hotline::payload::{FileNameWithInfo, TYPE_ALIAS_CREATOR, TYPE_FOLDER};
use hotline::transaction::Transaction;
use hotline::types::*;
use hotline::Field;
use std::path::PathBuf;

/// Transfer option signalling preview mode: the bare data fork, no
/// flattened container.
pub const XFER_OPTION_PREVIEW: u32 = 2;

fn upload_denied(name: &[u8]) -> HandlerError {
    HandlerError::new(format!(
        "Cannot accept upload of the file \"{}\" because you are only allowed to upload to the \"{}\" folder.",
        macroman::to_utf8(name),
        files::UPLOADS_FOLDER,
    ))
}

fn upload_conflict(name: &[u8]) -> HandlerError {
    HandlerError::new(format!(
        "Cannot accept upload because there is already a file named \"{}\".",
        macroman::to_utf8(name),
    ))
}

/// Decode the path field and resolve it (and an optional leaf name) under
/// the connection's file root.
fn resolve_request(
    conn: &ClientConn,
    tx: &Transaction,
    path_field: u16,
    name_field: Option<u16>,
) -> HandlerResult<(Vec<Vec<u8>>, PathBuf)> {
    let segments = decode_path(tx.field_bytes(path_field)).map_err(|_| HandlerError::new(ERR_BAD_PATH))?;

    let leaf = match name_field {
        Some(field_id) => {
            let name = tx.field_bytes(field_id);
            if name.is_empty() {
                None
            } else {
                Some(name)
            }
        }
        None => None,
    };

    let resolved = paths::resolve(&conn.file_root, &segments, leaf)
        .map_err(|_| HandlerError::new(ERR_BAD_PATH))?;
    Ok((segments, resolved))
}

fn register_transfer(state: &ServerState, transfer: Transfer) -> HandlerResult<u32> {
    state
        .transfers
        .lock()
        .unwrap()
        .add(transfer)
        .ok_or_else(|| HandlerError::new(ERR_TRANSFER_LIMIT))
}

/// `TranGetFileNameList`: the visible entries of one folder.
pub fn handle_get_file_name_list(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    let (segments, dir) = resolve_request(&conn, tx, FIELD_FILE_PATH, None)?;

    // Drop box contents are invisible without the permission.
    if let Some(leaf) = segments.last() {
        if files::is_drop_box(&macroman::to_utf8(leaf)) && !conn.authorize(access::VIEW_DROP_BOXES) {
            return Err(HandlerError::new(DENY_VIEW_DROP_BOXES));
        }
    }

    let entries = state.store.read_dir(&dir).map_err(|_| HandlerError::new(ERR_FILE_NOT_FOUND))?;

    let mut listed: Vec<(String, Field)> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if forks::is_fork_artifact(&name) || name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        let meta = match state.store.stat(&path) {
            Ok(meta) => meta,
            Err(_) => continue,
        };

        let info = if meta.is_dir() {
            let item_count = state
                .store
                .read_dir(&path)
                .map(|entries| {
                    entries
                        .flatten()
                        .filter(|e| !forks::is_fork_artifact(&e.file_name().to_string_lossy()))
                        .count() as u32
                })
                .unwrap_or(0);
            FileNameWithInfo {
                type_code: TYPE_FOLDER,
                creator_code: [0; 4],
                file_size: item_count,
                name_script: 0,
                name: macroman::from_utf8(&name),
            }
        } else {
            let fork_info = forks::read_info_fork(&path);
            let is_alias = std::fs::symlink_metadata(&path)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            FileNameWithInfo {
                type_code: fork_info.type_code,
                creator_code: if is_alias { TYPE_ALIAS_CREATOR } else { fork_info.creator_code },
                file_size: (meta.len() + forks::rsrc_size(&path)) as u32,
                name_script: 0,
                name: macroman::from_utf8(&name),
            }
        };

        listed.push((name, Field::new(FIELD_FILE_NAME_WITH_INFO, info.encode())));
    }

    listed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(vec![Outbound::reply(listed.into_iter().map(|(_, field)| field).collect())])
}

/// `TranGetFileInfo`: metadata from the info fork, synthesized if absent.
pub fn handle_get_file_info(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    let (_, path) = resolve_request(&conn, tx, FIELD_FILE_PATH, Some(FIELD_FILE_NAME))?;

    let meta = state.store.stat(&path).map_err(|_| HandlerError::new(ERR_FILE_NOT_FOUND))?;
    let info = forks::read_info_fork(&path);

    let mut fields = vec![
        Field::new(FIELD_FILE_NAME, paths::wire_name(&path)),
        Field::new(FIELD_FILE_TYPE_STRING, info.type_code.to_vec()),
        Field::new(FIELD_FILE_CREATOR_STRING, info.creator_code.to_vec()),
        Field::new(FIELD_FILE_COMMENT, info.comment.clone()),
        Field::new(FIELD_FILE_TYPE, info.type_code.to_vec()),
        Field::new(FIELD_FILE_CREATE_DATE, info.create_date.to_vec()),
        Field::new(FIELD_FILE_MODIFY_DATE, info.modify_date.to_vec()),
    ];
    if !meta.is_dir() {
        fields.push(Field::with_u32(FIELD_FILE_SIZE, (meta.len() + forks::rsrc_size(&path)) as u32));
    }

    Ok(vec![Outbound::reply(fields)])
}

/// `TranSetFileInfo`: comment updates and renames, each behind its own
/// permission.
pub fn handle_set_file_info(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    let (_, path) = resolve_request(&conn, tx, FIELD_FILE_PATH, Some(FIELD_FILE_NAME))?;

    let meta = state.store.stat(&path).map_err(|_| HandlerError::new(ERR_FILE_NOT_FOUND))?;
    let is_dir = meta.is_dir();

    if let Some(comment) = tx.get_field(FIELD_FILE_COMMENT) {
        if is_dir {
            require(&conn, access::SET_FOLDER_COMMENT, DENY_SET_FOLDER_COMMENT)?;
        } else {
            require(&conn, access::SET_FILE_COMMENT, DENY_SET_FILE_COMMENT)?;
        }

        let mut info = forks::read_info_fork(&path);
        info.comment = comment.data.clone();
        forks::write_info_fork(&path, &info).map_err(|_| HandlerError::new(ERR_BAD_PATH))?;
    }

    let new_name = tx.field_bytes(FIELD_FILE_NEW_NAME);
    if !new_name.is_empty() {
        if is_dir {
            require(&conn, access::RENAME_FOLDER, DENY_RENAME_FOLDER)?;
        } else {
            require(&conn, access::RENAME_FILE, DENY_RENAME_FILE)?;
        }

        let clean = hotline::path::sanitize_name(new_name);
        if clean.is_empty() {
            return Err(HandlerError::new(ERR_BAD_PATH));
        }
        let target = path.with_file_name(macroman::to_utf8(&clean));
        if target.exists() {
            return Err(HandlerError::new(if is_dir { ERR_FOLDER_EXISTS } else { ERR_FILE_EXISTS }));
        }
        forks::rename_with_forks(&path, &target).map_err(|_| HandlerError::new(ERR_BAD_PATH))?;
    }

    Ok(vec![Outbound::ok()])
}

/// `TranDeleteFile`: remove a file or a whole folder, forks included.
pub fn handle_delete_file(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    let (_, path) = resolve_request(&conn, tx, FIELD_FILE_PATH, Some(FIELD_FILE_NAME))?;

    let meta = state.store.stat(&path).map_err(|_| HandlerError::new(ERR_FILE_NOT_FOUND))?;
    if meta.is_dir() {
        require(&conn, access::DELETE_FOLDER, DENY_DELETE_FOLDER)?;
    } else {
        require(&conn, access::DELETE_FILE, DENY_DELETE_FILE)?;
    }

    forks::remove_with_forks(&path).map_err(|_| HandlerError::new(ERR_FILE_NOT_FOUND))?;
    Ok(vec![Outbound::ok()])
}

/// `TranMoveFile`: relocate within the volume.
pub fn handle_move_file(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    let (_, source) = resolve_request(&conn, tx, FIELD_FILE_PATH, Some(FIELD_FILE_NAME))?;
    let (_, dest_dir) = resolve_request(&conn, tx, FIELD_FILE_NEW_PATH, None)?;

    let meta = state.store.stat(&source).map_err(|_| HandlerError::new(ERR_FILE_NOT_FOUND))?;
    if meta.is_dir() {
        require(&conn, access::MOVE_FOLDER, DENY_MOVE_FOLDER)?;
    } else {
        require(&conn, access::MOVE_FILE, DENY_MOVE_FILE)?;
    }

    let file_name = source
        .file_name()
        .ok_or_else(|| HandlerError::new(ERR_BAD_PATH))?
        .to_os_string();
    let target = dest_dir.join(file_name);
    if target.exists() {
        return Err(HandlerError::new(if meta.is_dir() { ERR_FOLDER_EXISTS } else { ERR_FILE_EXISTS }));
    }

    forks::rename_with_forks(&source, &target).map_err(|_| HandlerError::new(ERR_BAD_PATH))?;
    Ok(vec![Outbound::ok()])
}

/// `TranNewFolder`: create a folder; the name is sanitized, the path is
/// validated.
pub fn handle_new_folder(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::CREATE_FOLDER, DENY_CREATE_FOLDER)?;

    let (_, path) = resolve_request(&conn, tx, FIELD_FILE_PATH, Some(FIELD_FILE_NAME))?;
    if path == conn.file_root {
        return Err(HandlerError::new(ERR_BAD_PATH));
    }
    if path.exists() {
        return Err(HandlerError::new(ERR_FOLDER_EXISTS));
    }

    state.store.mkdir(&path).map_err(|_| HandlerError::new(ERR_BAD_PATH))?;
    Ok(vec![Outbound::ok()])
}

/// `TranMakeFileAlias`: symlink a file into a second location.
pub fn handle_make_file_alias(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::MAKE_ALIAS, DENY_MAKE_ALIAS)?;

    let (_, source) = resolve_request(&conn, tx, FIELD_FILE_PATH, Some(FIELD_FILE_NAME))?;
    let (_, dest_dir) = resolve_request(&conn, tx, FIELD_FILE_NEW_PATH, None)?;

    state.store.stat(&source).map_err(|_| HandlerError::new(ERR_FILE_NOT_FOUND))?;

    let file_name = source
        .file_name()
        .ok_or_else(|| HandlerError::new(ERR_BAD_PATH))?
        .to_os_string();
    let link = dest_dir.join(file_name);
    if link.exists() {
        return Err(HandlerError::new(ERR_FILE_EXISTS));
    }

    state.store.symlink(&source, &link).map_err(|_| HandlerError::new(ERR_BAD_PATH))?;
    Ok(vec![Outbound::ok()])
}

/// `TranDownloadFile`: allocate the side-channel transfer and report its
/// sizes. Preview mode sends the bare data fork; resume offsets shrink the
/// declared size.
pub fn handle_download_file(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::DOWNLOAD_FILE, DENY_DOWNLOAD_FILE)?;

    let (_, path) = resolve_request(&conn, tx, FIELD_FILE_PATH, Some(FIELD_FILE_NAME))?;
    let meta = state.store.stat(&path).map_err(|_| HandlerError::new(ERR_FILE_NOT_FOUND))?;
    if meta.is_dir() {
        return Err(HandlerError::new(ERR_FILE_NOT_FOUND));
    }

    let options = tx.field_int(FIELD_FILE_TRANSFER_OPTIONS).unwrap_or(0);
    let resume = match tx.get_field(FIELD_FILE_RESUME_DATA) {
        Some(field) => ResumeData::decode(&field.data).map_err(|_| HandlerError::new(ERR_BAD_PATH))?,
        None => ResumeData::default(),
    };

    let data_len = meta.len();
    let rsrc_len = forks::rsrc_size(&path);
    let info = forks::read_info_fork(&path);

    let transfer_size = if options == XFER_OPTION_PREVIEW {
        data_len.saturating_sub(u64::from(resume.data_offset))
    } else {
        forks::flattened_size(&info, data_len, rsrc_len)
            .saturating_sub(u64::from(resume.data_offset))
            .saturating_sub(u64::from(resume.rsrc_offset))
    };

    let mut transfer = Transfer::new(
        TransferKind::FileDownload,
        origin,
        paths::wire_name(&path),
        path,
    );
    transfer.transfer_size = transfer_size;
    transfer.resume = resume;
    transfer.options = options;

    let ref_num = register_transfer(state, transfer)?;

    Ok(vec![Outbound::reply(vec![
        Field::with_u32(FIELD_REF_NUM, ref_num),
        Field::with_u32(FIELD_TRANSFER_SIZE, transfer_size as u32),
        Field::with_u32(FIELD_FILE_SIZE, data_len as u32),
        Field::with_u16(FIELD_WAITING_COUNT, 0),
    ])])
}

/// `TranDownloadFldr`: allocate a recursive folder download.
///
/// Gating mirrors the original server, which checks the download-*file*
/// permission here; build without `legacy-folder-download-gate` for the
/// folder bit instead.
pub fn handle_download_folder(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    #[cfg(feature = "legacy-folder-download-gate")]
    require(&conn, access::DOWNLOAD_FILE, DENY_DOWNLOAD_FOLDER)?;
    #[cfg(not(feature = "legacy-folder-download-gate"))]
    require(&conn, access::DOWNLOAD_FOLDER, DENY_DOWNLOAD_FOLDER)?;

    let (_, path) = resolve_request(&conn, tx, FIELD_FILE_PATH, Some(FIELD_FILE_NAME))?;
    let meta = state.store.stat(&path).map_err(|_| HandlerError::new(ERR_FILE_NOT_FOUND))?;
    if !meta.is_dir() {
        return Err(HandlerError::new(ERR_FILE_NOT_FOUND));
    }

    let (transfer_size, item_count) =
        folder_transfer_stats(&path).map_err(|_| HandlerError::new(ERR_FILE_NOT_FOUND))?;

    let mut transfer = Transfer::new(
        TransferKind::FolderDownload,
        origin,
        paths::wire_name(&path),
        path,
    );
    transfer.transfer_size = transfer_size;
    transfer.folder_item_count = item_count;

    let ref_num = register_transfer(state, transfer)?;

    Ok(vec![Outbound::reply(vec![
        Field::with_u32(FIELD_REF_NUM, ref_num),
        Field::with_u32(FIELD_TRANSFER_SIZE, transfer_size as u32),
        Field::with_u32(FIELD_FOLDER_ITEM_COUNT, item_count),
        Field::with_u16(FIELD_WAITING_COUNT, 0),
    ])])
}

/// Check the upload restriction shared by file and folder uploads.
fn check_upload_target(conn: &ClientConn, segments: &[Vec<u8>], name: &[u8]) -> HandlerResult<()> {
    if conn.authorize(access::UPLOAD_ANYWHERE) || files::upload_allowed(segments) {
        Ok(())
    } else {
        Err(upload_denied(name))
    }
}

/// `TranUploadFile`: allocate an upload and, on resume, report how much of
/// the `.incomplete` file already landed.
pub fn handle_upload_file(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::UPLOAD_FILE, DENY_UPLOAD_FILE)?;

    let name = tx.field_bytes(FIELD_FILE_NAME).to_vec();
    let (segments, path) = resolve_request(&conn, tx, FIELD_FILE_PATH, Some(FIELD_FILE_NAME))?;
    check_upload_target(&conn, &segments, &name)?;

    if path.exists() {
        return Err(upload_conflict(&name));
    }

    let resuming = tx.get_field(FIELD_FILE_TRANSFER_OPTIONS).is_some();
    let mut reply_fields = Vec::new();

    let mut transfer = Transfer::new(TransferKind::FileUpload, origin, name, path.clone());
    transfer.transfer_size = u64::from(tx.field_int(FIELD_TRANSFER_SIZE).unwrap_or(0));

    if resuming {
        let offset = state
            .store
            .stat(&forks::incomplete_path(&path))
            .map(|meta| meta.len() as u32)
            .unwrap_or(0);
        transfer.resume = ResumeData {
            data_offset: offset,
            rsrc_offset: 0,
        };
        reply_fields.push(Field::new(
            FIELD_FILE_RESUME_DATA,
            transfer.resume.encode(),
        ));
    }

    let ref_num = register_transfer(state, transfer)?;
    reply_fields.insert(0, Field::with_u32(FIELD_REF_NUM, ref_num));

    Ok(vec![Outbound::reply(reply_fields)])
}

/// `TranUploadFldr`: allocate a recursive folder upload.
pub fn handle_upload_folder(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::UPLOAD_FOLDER, DENY_UPLOAD_FOLDER)?;

    let name = tx.field_bytes(FIELD_FILE_NAME).to_vec();
    let (segments, path) = resolve_request(&conn, tx, FIELD_FILE_PATH, Some(FIELD_FILE_NAME))?;
    check_upload_target(&conn, &segments, &name)?;

    if path.exists() {
        return Err(upload_conflict(&name));
    }

    let mut transfer = Transfer::new(TransferKind::FolderUpload, origin, name, path);
    transfer.transfer_size = u64::from(tx.field_int(FIELD_TRANSFER_SIZE).unwrap_or(0));
    transfer.folder_item_count = tx.field_int(FIELD_FOLDER_ITEM_COUNT).unwrap_or(0);

    let ref_num = register_transfer(state, transfer)?;
    Ok(vec![Outbound::reply(vec![Field::with_u32(FIELD_REF_NUM, ref_num)])])
}

/// `TranDownloadBanner`: the server banner goes over the side channel like
/// any other download.
pub fn handle_download_banner(state: &ServerState, origin: u16, _tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    origin_conn(state, origin)?;

    let banner_len = state.banner.len() as u64;
    let mut transfer = Transfer::new(TransferKind::BannerDownload, origin, Vec::new(), PathBuf::new());
    transfer.transfer_size = banner_len;

    let ref_num = register_transfer(state, transfer)?;
    Ok(vec![Outbound::reply(vec![
        Field::with_u32(FIELD_REF_NUM, ref_num),
        Field::with_u32(FIELD_TRANSFER_SIZE, banner_len as u32),
    ])])
}
