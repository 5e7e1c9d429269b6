//! Shared server registries.
//!
//! Each registry is a plain struct guarded by a `Mutex` in
//! [`crate::state::ServerState`]. Handlers take at most one registry lock
//! at a time and every `list()`-shaped accessor returns a snapshot so
//! iteration never happens under the lock.

pub mod accounts;
pub mod bans;
pub mod chats;
pub mod clients;
pub mod transfers;

pub use self::accounts::{Account, Accounts};
pub use self::bans::Bans;
pub use self::chats::{Chat, Chats, PUBLIC_CHAT_ID};
pub use self::clients::{ClientConn, Clients};
pub use self::transfers::{Transfer, TransferKind, Transfers};
