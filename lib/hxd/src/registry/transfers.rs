//! Pending file-transfer registry: maps the random 32-bit reference numbers
//! handed out on the control plane to the side-channel workers that later
//! claim them.

use hashbrown::HashMap;
use hotline::flattened::ResumeData;
use rand::Rng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Concurrent transfers a single connection may have pending; excess
/// requests are rejected on the control plane.
pub const MAX_PER_CLIENT: usize = 8;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TransferKind {
    FileDownload,
    FolderDownload,
    FileUpload,
    FolderUpload,
    BannerDownload,
}

#[derive(Debug)]
pub struct Transfer {
    pub ref_num: u32,
    pub kind: TransferKind,
    pub client_id: u16,
    /// Display name of the addressed item.
    pub file_name: Vec<u8>,
    /// Resolved absolute path under the connection's file root.
    pub path: PathBuf,
    /// Expected byte count of the data stream, framing excluded.
    pub transfer_size: u64,
    pub folder_item_count: u32,
    pub resume: ResumeData,
    pub options: u32,
    cancelled: AtomicBool,
    claimed: AtomicBool,
}

impl Transfer {
    pub fn new(kind: TransferKind, client_id: u16, file_name: Vec<u8>, path: PathBuf) -> Transfer {
        Transfer {
            ref_num: 0,
            kind,
            client_id,
            file_name,
            path,
            transfer_size: 0,
            folder_item_count: 0,
            resume: ResumeData::default(),
            options: 0,
            cancelled: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
        }
    }

    /// First side-channel connection quoting the reference number wins;
    /// later claims are rejected and their connections dropped.
    #[inline]
    pub fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::SeqCst)
    }

    /// Flag checked by the side-channel worker between chunks; set when the
    /// owning connection goes away.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

pub struct Transfers {
    active: HashMap<u32, Arc<Transfer>>,
}

impl Transfers {
    pub fn new() -> Transfers {
        Transfers { active: HashMap::new() }
    }

    /// Register a transfer under a fresh random reference number. Fails
    /// when the owning connection is already at its queue cap.
    pub fn add(&mut self, mut transfer: Transfer) -> Option<u32> {
        let owned = self
            .active
            .values()
            .filter(|t| t.client_id == transfer.client_id)
            .count();
        if owned >= MAX_PER_CLIENT {
            return None;
        }

        let mut rng = rand::thread_rng();
        let ref_num = loop {
            let candidate: u32 = rng.gen();
            if !self.active.contains_key(&candidate) {
                break candidate;
            }
        };

        transfer.ref_num = ref_num;
        self.active.insert(ref_num, Arc::new(transfer));
        Some(ref_num)
    }

    pub fn get(&self, ref_num: u32) -> Option<Arc<Transfer>> {
        self.active.get(&ref_num).cloned()
    }

    pub fn delete(&mut self, ref_num: u32) -> Option<Arc<Transfer>> {
        self.active.remove(&ref_num)
    }

    /// Snapshot of a connection's pending transfers, for the client-info
    /// text and disconnect cleanup.
    pub fn list_for_client(&self, client_id: u16) -> Vec<Arc<Transfer>> {
        self.active
            .values()
            .filter(|t| t.client_id == client_id)
            .cloned()
            .collect()
    }

    /// Cancel and unregister everything a disconnecting client owns.
    pub fn cancel_for_client(&mut self, client_id: u16) {
        let refs: Vec<u32> = self
            .active
            .values()
            .filter(|t| t.client_id == client_id)
            .map(|t| t.ref_num)
            .collect();

        for ref_num in refs {
            if let Some(transfer) = self.active.remove(&ref_num) {
                transfer.cancel();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }
}
