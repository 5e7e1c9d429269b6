//! Live-connection registry: 16-bit client ids drawn from a free list and
//! the per-connection user state every handler consults.

use hashbrown::HashMap;
use hotline::access::{self, AccessBitmap};
use hotline::types::{USER_FLAG_REFUSE_CHAT, USER_FLAG_REFUSE_PM};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Per-connection state. Created on accept, mutated by the login and
/// user-info handlers, torn down on disconnect.
#[derive(Debug, Clone)]
pub struct ClientConn {
    pub id: u16,
    /// Login of the resolved account; empty before login completes.
    pub login: String,
    /// Display name of the resolved account.
    pub account_name: String,
    pub access: AccessBitmap,
    /// Nickname bytes as the client sent them (Mac-Roman or otherwise).
    pub user_name: Vec<u8>,
    pub icon: u16,
    pub flags: u16,
    pub auto_reply: Vec<u8>,
    pub remote_addr: String,
    pub version: u16,
    /// Effective root for this connection's file operations.
    pub file_root: PathBuf,
    pub logged_in: bool,
    /// Set once the agreement round-trip completes; only joined clients are
    /// listed, receive chat, or can be invited.
    pub joined: bool,
}

impl ClientConn {
    fn new(id: u16, remote_addr: String, file_root: PathBuf) -> ClientConn {
        ClientConn {
            id,
            login: String::new(),
            account_name: String::new(),
            access: AccessBitmap::default(),
            user_name: Vec::new(),
            icon: 0,
            flags: 0,
            auto_reply: Vec::new(),
            remote_addr,
            version: 0,
            file_root,
            logged_in: false,
            joined: false,
        }
    }

    #[inline]
    pub fn authorize(&self, bit: u8) -> bool {
        self.access.is_set(bit)
    }

    #[inline]
    pub fn refuses_pm(&self) -> bool {
        self.flags & USER_FLAG_REFUSE_PM != 0
    }

    #[inline]
    pub fn refuses_private_chat(&self) -> bool {
        self.flags & USER_FLAG_REFUSE_CHAT != 0
    }

    /// Peer IP without the port, for the ban list.
    pub fn remote_ip(&self) -> &str {
        self.remote_addr
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(&self.remote_addr)
    }

    #[inline]
    pub fn can_be_disconnected(&self) -> bool {
        !self.access.is_set(access::CANNOT_BE_DISCONNECTED)
    }
}

pub type SharedConn = Arc<Mutex<ClientConn>>;

/// Assigns ids and stores live connections. Ids start at 1 (the zero id is
/// the wire sentinel for "reply to origin") and are reused only after the
/// owning connection terminates.
pub struct Clients {
    conns: HashMap<u16, SharedConn>,
    free: Vec<u16>,
    next: u16,
    max: u16,
}

impl Clients {
    pub fn new(max: u16) -> Clients {
        Clients {
            conns: HashMap::new(),
            free: Vec::new(),
            next: 1,
            max,
        }
    }

    /// Allocate an id and create the connection record. Returns `None` when
    /// the id space is exhausted; the caller rejects the accept.
    pub fn add(&mut self, remote_addr: String, file_root: PathBuf) -> Option<SharedConn> {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                if self.next > self.max {
                    return None;
                }
                let id = self.next;
                self.next += 1;
                id
            }
        };

        let conn = Arc::new(Mutex::new(ClientConn::new(id, remote_addr, file_root)));
        self.conns.insert(id, conn.clone());
        Some(conn)
    }

    pub fn get(&self, id: u16) -> Option<SharedConn> {
        self.conns.get(&id).cloned()
    }

    /// Remove a connection and return its id to the free list.
    pub fn delete(&mut self, id: u16) -> Option<SharedConn> {
        let conn = self.conns.remove(&id);
        if conn.is_some() {
            self.free.push(id);
        }
        conn
    }

    /// Point-in-time snapshot, ordered by id. Safe to iterate without
    /// holding the registry lock.
    pub fn list(&self) -> Vec<SharedConn> {
        let mut ids: Vec<u16> = self.conns.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(|id| self.conns[&id].clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}
