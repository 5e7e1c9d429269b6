//! The file-transfer side channel.
//!
//! A second listener on `port + 1` accepts plain blocking TCP connections.
//! Each one opens with the 16-byte HTXF header quoting a reference number
//! previously allocated on the control plane; the matching transfer then
//! runs to completion on its own thread, independent of the control
//! channel. Errors here are logged and kill only the side-channel
//! connection.

pub mod download;
pub mod folder;
pub mod upload;

use crate::logging::{self, Logger};
use crate::registry::transfers::TransferKind;
use crate::state::ServerState;
use hotline::xfer::{TransferHandshake, HTXF_HEADER_SIZE};
use std::io::{self, Read};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Base idle deadline on side-channel sockets; bulk streaming refreshes it
/// per chunk, so it only needs to outlive a stalled peer.
pub const IO_TIMEOUT: Duration = Duration::from_secs(120);

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bind the transfer listener and serve until shutdown. Returns the accept
/// thread's handle.
pub fn run_listener(
    state: Arc<ServerState>,
    shutdown: Arc<AtomicBool>,
    log: Logger,
) -> io::Result<thread::JoinHandle<()>> {
    let listener = TcpListener::bind(state.config.transfer_address())?;
    listener.set_nonblocking(true)?;

    logging::info!(log, "transfer listener bound"; "addr" => state.config.transfer_address());

    let handle = thread::spawn(move || {
        while !shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    let conn_state = state.clone();
                    let conn_log = log.new(logging::o!());
                    thread::spawn(move || {
                        if let Err(err) = serve_connection(&conn_state, stream, &conn_log) {
                            logging::info!(conn_log, "transfer aborted";
                                           "addr" => %addr, "err" => %err);
                        }
                    });
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) => {
                    logging::warn!(log, "transfer accept failed"; "err" => %err);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
    });

    Ok(handle)
}

/// Read the HTXF header, match it to a pending transfer and run it. A
/// missing or already-claimed reference number closes the connection with
/// no control-plane signal.
pub fn serve_connection(state: &ServerState, mut stream: TcpStream, log: &Logger) -> io::Result<()> {
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;
    stream.set_nonblocking(false)?;

    let mut header = [0u8; HTXF_HEADER_SIZE];
    stream.read_exact(&mut header)?;
    let handshake = TransferHandshake::decode(&header)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

    let transfer = state
        .transfers
        .lock()
        .unwrap()
        .get(handshake.ref_num)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown reference number"))?;

    if !transfer.claim() {
        return Err(io::Error::new(io::ErrorKind::AlreadyExists, "reference number already claimed"));
    }

    logging::debug!(log, "transfer claimed";
                    "ref" => transfer.ref_num,
                    "kind" => ?transfer.kind,
                    "client_id" => transfer.client_id);

    let result = match transfer.kind {
        TransferKind::FileDownload => download::send_file(&transfer, &mut stream),
        TransferKind::BannerDownload => download::send_banner(state, &transfer, &mut stream),
        TransferKind::FolderDownload => folder::send_folder(&transfer, &mut stream),
        TransferKind::FileUpload => upload::receive_file(&transfer, handshake.data_size, &mut stream),
        TransferKind::FolderUpload => folder::receive_folder(&transfer, &mut stream),
    };

    state.transfers.lock().unwrap().delete(transfer.ref_num);

    match &result {
        Ok(()) => logging::debug!(log, "transfer complete"; "ref" => transfer.ref_num),
        Err(err) => logging::info!(log, "transfer failed"; "ref" => transfer.ref_num, "err" => %err),
    }
    result
}

/// Chunked copy with a cancellation check between chunks.
pub(crate) fn copy_cancellable<R: Read, W: io::Write>(
    reader: &mut R,
    writer: &mut W,
    mut remaining: u64,
    cancelled: &dyn Fn() -> bool,
) -> io::Result<u64> {
    let mut chunk = [0u8; 65536];
    let mut copied: u64 = 0;

    while remaining > 0 {
        if cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled"));
        }

        let want = chunk.len().min(remaining as usize);
        let got = reader.read(&mut chunk[..want])?;
        if got == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed mid-transfer"));
        }

        writer.write_all(&chunk[..got])?;
        copied += got as u64;
        remaining -= got as u64;
    }

    Ok(copied)
}
