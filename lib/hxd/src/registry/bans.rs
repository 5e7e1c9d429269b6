//! Ban list: peer IP to optional expiry. Consulted on every accept before
//! the handshake is read.

use chrono::{DateTime, Duration, Utc};
use hashbrown::HashMap;
use serde_json;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Default length of a temporary ban handed out by `DisconnectUser`.
pub const TEMP_BAN_MINUTES: i64 = 30;

pub struct Bans {
    path: PathBuf,
    entries: HashMap<String, Option<DateTime<Utc>>>,
}

impl Bans {
    pub fn new(path: PathBuf) -> Bans {
        Bans {
            path,
            entries: HashMap::new(),
        }
    }

    pub fn load(&mut self) -> io::Result<()> {
        if !self.path.exists() {
            self.entries.clear();
            return Ok(());
        }

        let file = fs::File::open(&self.path)?;
        self.entries =
            serde_json::from_reader(file).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(())
    }

    fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        let file = fs::File::create(&tmp)?;
        serde_json::to_writer_pretty(file, &self.entries)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        fs::rename(&tmp, &self.path)
    }

    /// Ban an address. `None` expiry is permanent.
    pub fn add(&mut self, ip: &str, expiry: Option<DateTime<Utc>>) -> io::Result<()> {
        self.entries.insert(ip.to_string(), expiry);
        self.save()
    }

    /// Convenience for the default-duration temporary ban.
    pub fn add_temporary(&mut self, ip: &str) -> io::Result<()> {
        self.add(ip, Some(Utc::now() + Duration::minutes(TEMP_BAN_MINUTES)))
    }

    /// Whether the address is currently banned, with the expiry if any.
    /// Expired entries report unbanned.
    pub fn is_banned(&self, ip: &str) -> (bool, Option<DateTime<Utc>>) {
        match self.entries.get(ip) {
            Some(None) => (true, None),
            Some(Some(expiry)) if *expiry > Utc::now() => (true, Some(*expiry)),
            _ => (false, None),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
