//! The server facade: owns the shared state, the control-plane endpoint
//! and the transfer side channel, and coordinates shutdown.

use crate::config::Config;
use crate::logging::{self, Logger};
use crate::net::Endpoint;
use crate::state::ServerState;
use crate::transfer;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Root cancellation signal. Requesting shutdown stops the accept loops,
/// broadcasts the reason and drains within the grace window.
pub struct Shutdown {
    flag: AtomicBool,
    reason: Mutex<String>,
}

impl Shutdown {
    pub fn new() -> Shutdown {
        Shutdown {
            flag: AtomicBool::new(false),
            reason: Mutex::new(String::new()),
        }
    }

    pub fn request(&self, reason: &str) {
        *self.reason.lock().unwrap() = reason.to_string();
        self.flag.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> String {
        self.reason.lock().unwrap().clone()
    }
}

pub struct Server {
    state: Arc<ServerState>,
    shutdown: Arc<Shutdown>,
    log: Logger,
}

impl Server {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(config: Config, log: L) -> io::Result<Server> {
        let log = logging::child(log);
        let state = ServerState::new(config, &log)?;

        Ok(Server {
            state,
            shutdown: Arc::new(Shutdown::new()),
            log,
        })
    }

    /// Handle for requesting shutdown from another thread or a signal
    /// handler.
    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    /// Bind both listeners and serve until shutdown. The transfer accept
    /// thread shares the shutdown flag and is joined on the way out.
    pub fn run(&mut self) -> io::Result<()> {
        let transfer_flag = Arc::new(AtomicBool::new(false));
        let transfer_thread = transfer::run_listener(
            self.state.clone(),
            transfer_flag.clone(),
            self.log.new(logging::o!()),
        )?;

        let mut endpoint = Endpoint::new(self.state.clone(), &self.log)?;

        logging::info!(self.log, "server up";
                       "name" => &self.state.config.server.name,
                       "addr" => self.state.config.bind_address());

        let result = endpoint.run(&self.shutdown);

        transfer_flag.store(true, Ordering::SeqCst);
        let _ = transfer_thread.join();

        logging::info!(self.log, "server stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.requested());

        shutdown.request("maintenance window");

        assert!(shutdown.requested());
        assert_eq!(shutdown.reason(), "maintenance window");
    }
}
