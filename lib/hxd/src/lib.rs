//! The server engine: connection channels and the poll loop, the shared
//! registries, the transaction handler table, the file subsystem, news, and
//! the file-transfer side channel.

pub mod config;
pub mod error;
pub mod files;
pub mod handlers;
pub mod logging;
pub mod net;
pub mod news;
pub mod registry;
pub mod server;
pub mod state;
pub mod transfer;

pub use crate::config::Config;
pub use crate::error::{ErrorType, NetError, NetResult};
pub use crate::server::Server;
