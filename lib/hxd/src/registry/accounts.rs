//! Account registry with one JSON record per login on disk.
//!
//! Records are written atomically via temp-file + rename; an account rename
//! relocates the record before the old file is removed so a crash never
//! loses the account.

use crate::logging::{self, Logger};
use hashbrown::HashMap;
use hotline::access::AccessBitmap;
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
    pub name: String,
    /// bcrypt hash; the empty string means "no password".
    pub password: String,
    pub access: AccessBitmap,
}

impl Account {
    pub fn verify_password(&self, cleartext: &[u8]) -> bool {
        if self.password.is_empty() {
            return cleartext.is_empty();
        }
        bcrypt::verify(cleartext, &self.password).unwrap_or(false)
    }
}

/// Hash a cleartext password for storage. Empty passwords are stored as the
/// empty string rather than hashed, which keeps "no password" queryable.
pub fn hash_password(cleartext: &[u8]) -> String {
    if cleartext.is_empty() {
        return String::new();
    }
    bcrypt::hash(cleartext, bcrypt::DEFAULT_COST).expect("bcrypt rejected input")
}

/// Logins become filenames, so anything that could escape the accounts
/// directory is refused outright.
pub fn valid_login(login: &str) -> bool {
    !login.is_empty()
        && login != ".."
        && login.chars().all(|ch| ch.is_ascii_graphic() && ch != '/' && ch != '\\')
}

pub struct Accounts {
    dir: PathBuf,
    by_login: HashMap<String, Account>,
    log: Logger,
}

impl Accounts {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(dir: PathBuf, log: L) -> Accounts {
        Accounts {
            dir,
            by_login: HashMap::new(),
            log: logging::child(log),
        }
    }

    /// Load every record in the accounts directory. Creates the directory
    /// and a default admin/guest pair when it does not exist yet.
    pub fn load(&mut self) -> io::Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            self.seed_defaults()?;
        }

        self.by_login.clear();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|ext| ext == "json") != Some(true) {
                continue;
            }

            let file = fs::File::open(&path)?;
            match serde_json::from_reader::<_, Account>(file) {
                Ok(account) => {
                    self.by_login.insert(account.login.clone(), account);
                }
                Err(err) => {
                    logging::warn!(self.log, "skipping unreadable account record";
                                   "path" => %path.display(), "err" => %err);
                }
            }
        }

        logging::info!(self.log, "accounts loaded"; "count" => self.by_login.len());
        Ok(())
    }

    fn seed_defaults(&mut self) -> io::Result<()> {
        let admin = Account {
            login: "admin".to_string(),
            name: "Administrator".to_string(),
            password: String::new(),
            access: AccessBitmap::full(),
        };
        let mut guest_access = AccessBitmap::default();
        for &bit in &[
            hotline::access::READ_CHAT,
            hotline::access::SEND_CHAT,
            hotline::access::DOWNLOAD_FILE,
            hotline::access::UPLOAD_FILE,
            hotline::access::NEWS_READ_ART,
            hotline::access::SEND_PRIV_MSG,
        ] {
            guest_access.set(bit, true);
        }
        let guest = Account {
            login: "guest".to_string(),
            name: "Guest".to_string(),
            password: String::new(),
            access: guest_access,
        };

        self.persist(&admin)?;
        self.persist(&guest)?;
        self.by_login.insert(admin.login.clone(), admin);
        self.by_login.insert(guest.login.clone(), guest);
        Ok(())
    }

    fn record_path(&self, login: &str) -> PathBuf {
        self.dir.join(format!("{}.json", login))
    }

    fn persist(&self, account: &Account) -> io::Result<()> {
        let target = self.record_path(&account.login);
        let tmp = target.with_extension("json.tmp");

        let file = fs::File::create(&tmp)?;
        serde_json::to_writer_pretty(file, account)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        fs::rename(&tmp, &target)
    }

    pub fn get(&self, login: &str) -> Option<Account> {
        self.by_login.get(login).cloned()
    }

    pub fn exists(&self, login: &str) -> bool {
        self.by_login.contains_key(login)
    }

    /// Snapshot of every account, ordered by login.
    pub fn list(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self.by_login.values().cloned().collect();
        accounts.sort_by(|a, b| a.login.cmp(&b.login));
        accounts
    }

    pub fn create(&mut self, account: Account) -> io::Result<()> {
        if !valid_login(&account.login) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad login"));
        }
        if self.by_login.contains_key(&account.login) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "duplicate login"));
        }

        self.persist(&account)?;
        logging::info!(self.log, "account created"; "login" => &account.login);
        self.by_login.insert(account.login.clone(), account);
        Ok(())
    }

    /// Update an account, optionally renaming it. A rename writes the new
    /// record before removing the old one.
    pub fn update(&mut self, mut account: Account, new_login: Option<&str>) -> io::Result<()> {
        let old_login = account.login.clone();
        if !self.by_login.contains_key(&old_login) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such account"));
        }

        if let Some(new_login) = new_login {
            if new_login != old_login {
                if !valid_login(new_login) {
                    return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad login"));
                }
                if self.by_login.contains_key(new_login) {
                    return Err(io::Error::new(io::ErrorKind::AlreadyExists, "duplicate login"));
                }
                account.login = new_login.to_string();
            }
        }

        self.persist(&account)?;
        if account.login != old_login {
            fs::remove_file(self.record_path(&old_login))?;
            self.by_login.remove(&old_login);
            logging::info!(self.log, "account renamed";
                           "from" => &old_login, "to" => &account.login);
        }
        self.by_login.insert(account.login.clone(), account);
        Ok(())
    }

    pub fn delete(&mut self, login: &str) -> io::Result<Account> {
        match self.by_login.remove(login) {
            Some(account) => {
                fs::remove_file(self.record_path(login))?;
                logging::info!(self.log, "account deleted"; "login" => login);
                Ok(account)
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such account")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Accounts) {
        let dir = TempDir::new().unwrap();
        let mut accounts = Accounts::new(dir.path().join("accounts"), None);
        accounts.load().unwrap();
        (dir, accounts)
    }

    #[test]
    fn test_seeds_defaults_on_first_load() {
        let (_dir, accounts) = fixture();

        assert!(accounts.exists("admin"));
        assert!(accounts.exists("guest"));
        assert!(accounts.get("admin").unwrap().access.is_set(hotline::access::DISCONNECT_USER));
    }

    #[test]
    fn test_create_and_reload() {
        let (dir, mut accounts) = fixture();

        accounts
            .create(Account {
                login: "alice".to_string(),
                name: "Alice".to_string(),
                password: hash_password(b"s3cret"),
                access: AccessBitmap::default(),
            })
            .unwrap();

        let mut reloaded = Accounts::new(dir.path().join("accounts"), None);
        reloaded.load().unwrap();

        let alice = reloaded.get("alice").unwrap();
        assert!(alice.verify_password(b"s3cret"));
        assert!(!alice.verify_password(b"wrong"));
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let (_dir, mut accounts) = fixture();

        let result = accounts.create(Account {
            login: "guest".to_string(),
            name: String::new(),
            password: String::new(),
            access: AccessBitmap::default(),
        });

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_rename_relocates_record() {
        let (dir, mut accounts) = fixture();
        let guest = accounts.get("guest").unwrap();

        accounts.update(guest, Some("visitor")).unwrap();

        assert!(!accounts.exists("guest"));
        assert!(accounts.exists("visitor"));
        assert!(dir.path().join("accounts/visitor.json").exists());
        assert!(!dir.path().join("accounts/guest.json").exists());
    }

    #[test]
    fn test_rename_onto_existing_rejected() {
        let (_dir, mut accounts) = fixture();
        let guest = accounts.get("guest").unwrap();

        let result = accounts.update(guest, Some("admin"));
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_delete() {
        let (dir, mut accounts) = fixture();

        accounts.delete("guest").unwrap();

        assert!(!accounts.exists("guest"));
        assert!(!dir.path().join("accounts/guest.json").exists());
        assert!(accounts.delete("guest").is_err());
    }

    #[test]
    fn test_login_validation() {
        assert!(valid_login("alice"));
        assert!(valid_login("a.b-c_1"));
        assert!(!valid_login(""));
        assert!(!valid_login(".."));
        assert!(!valid_login("a/b"));
        assert!(!valid_login("a b"));
    }

    #[test]
    fn test_empty_password_semantics() {
        let account = Account {
            login: "p".to_string(),
            name: String::new(),
            password: String::new(),
            access: AccessBitmap::default(),
        };

        assert!(account.verify_password(b""));
        assert!(!account.verify_password(b"anything"));
    }
}
