//! The single owner of all shared server state. One instance lives in an
//! `Arc` and is handed to the poll loop and every transfer thread; there is
//! no other global state.

use crate::config::Config;
use crate::files::{FileStore, OsFileStore, UPLOADS_FOLDER};
use crate::logging::{self, Logger};
use crate::news::{FlatNews, ThreadedNews};
use crate::registry::clients::{ClientConn, SharedConn};
use crate::registry::{Accounts, Bans, Chats, Clients, Transfers};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A disconnect ordered by an admin, executed by the poll loop after the
/// grace delay so the farewell message can drain first.
#[derive(Debug, Copy, Clone)]
pub struct PendingDisconnect {
    pub due: Instant,
    pub client_id: u16,
}

pub struct ServerState {
    pub config: Config,
    pub log: Logger,

    pub clients: Mutex<Clients>,
    pub chats: Mutex<Chats>,
    pub accounts: Mutex<Accounts>,
    pub bans: Mutex<Bans>,
    pub transfers: Mutex<Transfers>,
    pub flat_news: Mutex<FlatNews>,
    pub threaded_news: Mutex<ThreadedNews>,

    pub store: Box<dyn FileStore>,

    /// Agreement text pushed after login; `None` disables the round-trip.
    pub agreement: Option<Vec<u8>>,
    /// Server banner bytes served through the side channel.
    pub banner: Vec<u8>,

    pub pending_disconnects: Mutex<Vec<PendingDisconnect>>,
}

impl ServerState {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(config: Config, log: L) -> io::Result<Arc<ServerState>> {
        let log = logging::child(log);

        fs::create_dir_all(&config.paths.file_root)?;
        fs::create_dir_all(config.paths.file_root.join(UPLOADS_FOLDER))?;
        fs::create_dir_all(&config.paths.data)?;

        let mut accounts = Accounts::new(config.paths.accounts.clone(), &log);
        accounts.load()?;

        let mut bans = Bans::new(config.paths.data.join("bans.json"));
        bans.load()?;

        let flat_news = FlatNews::open(config.paths.data.join("news.txt"))?;
        let threaded_news = ThreadedNews::open(config.paths.data.join("threaded-news.json"), &log)?;

        let agreement = match &config.paths.agreement {
            Some(path) => Some(fs::read(path)?),
            None => None,
        };
        let banner = match &config.paths.banner {
            Some(path) => fs::read(path)?,
            None => Vec::new(),
        };

        let max_clients = config.server.max_clients;

        Ok(Arc::new(ServerState {
            config,
            log,
            clients: Mutex::new(Clients::new(max_clients)),
            chats: Mutex::new(Chats::new()),
            accounts: Mutex::new(accounts),
            bans: Mutex::new(bans),
            transfers: Mutex::new(Transfers::new()),
            flat_news: Mutex::new(flat_news),
            threaded_news: Mutex::new(threaded_news),
            store: Box::new(OsFileStore),
            agreement,
            banner,
            pending_disconnects: Mutex::new(Vec::new()),
        }))
    }

    /// Shared handle to a live connection.
    pub fn conn(&self, client_id: u16) -> Option<SharedConn> {
        self.clients.lock().unwrap().get(client_id)
    }

    /// Copy of a connection's state, for read-mostly handler logic.
    pub fn conn_snapshot(&self, client_id: u16) -> Option<ClientConn> {
        self.conn(client_id).map(|conn| conn.lock().unwrap().clone())
    }

    /// Snapshot of every live connection.
    pub fn conn_list(&self) -> Vec<SharedConn> {
        self.clients.lock().unwrap().list()
    }

    /// File root effective for a connection; falls back to the server root
    /// for connections that predate login.
    pub fn file_root(&self, client_id: u16) -> PathBuf {
        self.conn_snapshot(client_id)
            .map(|conn| conn.file_root)
            .unwrap_or_else(|| self.config.paths.file_root.clone())
    }

    pub fn schedule_disconnect(&self, client_id: u16, delay: Duration) {
        self.pending_disconnects.lock().unwrap().push(PendingDisconnect {
            due: Instant::now() + delay,
            client_id,
        });
    }

    /// Disconnects whose grace delay has elapsed.
    pub fn due_disconnects(&self, now: Instant) -> Vec<u16> {
        let mut pending = self.pending_disconnects.lock().unwrap();
        let due: Vec<u16> = pending
            .iter()
            .filter(|entry| entry.due <= now)
            .map(|entry| entry.client_id)
            .collect();
        pending.retain(|entry| entry.due > now);
        due
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_bootstraps_layout() {
        let (dir, state) = testutil::state();

        assert!(dir.path().join("files/Uploads").is_dir());
        assert!(state.accounts.lock().unwrap().exists("admin"));
        assert!(state.agreement.is_none());
    }

    #[test]
    fn test_due_disconnects() {
        let (_dir, state) = testutil::state();

        state.schedule_disconnect(3, Duration::from_millis(0));
        state.schedule_disconnect(4, Duration::from_secs(60));

        let due = state.due_disconnects(Instant::now() + Duration::from_millis(1));
        assert_eq!(due, vec![3]);

        let remaining = state.pending_disconnects.lock().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].client_id, 4);
    }
}
