//! The control-plane poll loop: accepts connections (ban-checked), drives
//! every channel's framing, runs the handler table and routes the outbound
//! fan-out.

use crate::error::{ErrorUtils, NetError};
use crate::handlers::{self, Outbound};
use crate::logging::{self, Logger};
use crate::net::channel::{Channel, ChannelState};
use crate::server::Shutdown;
use crate::state::ServerState;
use hashbrown::HashMap;
use hotline::transaction::Transaction;
use hotline::types::{FIELD_DATA, FIELD_USER_ID, TRAN_DISCONNECT_MSG, TRAN_NOTIFY_CHAT_DELETE_USER, TRAN_NOTIFY_DELETE_USER};
use hotline::Field;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SERVER_TOKEN: mio::Token = mio::Token(0);

/// Idle deadline on the control channel; generous against the legacy
/// 3-minute keepalive interval.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);
/// A client that cannot produce 12 handshake bytes in this window is gone.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(500);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Endpoint {
    listener: mio::net::TcpListener,
    poll: mio::Poll,
    channels: HashMap<u16, Channel>,
    state: Arc<ServerState>,
    next_notify_id: u32,
    housekeeping_at: Instant,
    log: Logger,
}

impl Endpoint {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(state: Arc<ServerState>, log: L) -> io::Result<Endpoint> {
        let addr = state
            .config
            .bind_address()
            .parse::<SocketAddr>()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let listener = mio::net::TcpListener::bind(&addr)?;
        let poll = mio::Poll::new()?;

        Ok(Endpoint {
            listener,
            poll,
            channels: HashMap::new(),
            state,
            next_notify_id: 1,
            housekeeping_at: Instant::now(),
            log: logging::child(log),
        })
    }

    /// Address actually bound, for tests and logs.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    #[inline]
    fn fresh_notify_id(&mut self) -> u32 {
        let id = self.next_notify_id;
        self.next_notify_id = self.next_notify_id.wrapping_add(1).max(1);
        id
    }

    /// Serve until the shutdown signal fires. Only a listener failure
    /// aborts the loop with an error.
    pub fn run(&mut self, shutdown: &Shutdown) -> io::Result<()> {
        self.poll
            .register(&self.listener, SERVER_TOKEN, mio::Ready::readable(), mio::PollOpt::edge())?;

        logging::info!(self.log, "control listener ready"; "addr" => %self.local_addr()?);

        let mut events = mio::Events::with_capacity(1024);

        loop {
            if shutdown.requested() {
                self.graceful_shutdown(&shutdown.reason());
                return Ok(());
            }

            self.poll.poll(&mut events, Some(POLL_INTERVAL))?;

            let ready: Vec<(usize, bool, bool)> = events
                .iter()
                .map(|event| {
                    (
                        usize::from(event.token()),
                        event.readiness().is_readable(),
                        event.readiness().is_writable(),
                    )
                })
                .collect();

            let now = Instant::now();
            for (token, readable, writable) in ready {
                if token == usize::from(SERVER_TOKEN) {
                    self.accept_ready(now)?;
                } else {
                    self.conn_ready(token as u16, readable, writable, now);
                }
            }

            if now.duration_since(self.housekeeping_at) >= HOUSEKEEPING_INTERVAL {
                self.housekeeping(now);
                self.housekeeping_at = now;
            }
        }
    }

    fn accept_ready(&mut self, now: Instant) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.handle_accept(stream, addr, now),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    fn handle_accept(&mut self, stream: mio::net::TcpStream, addr: SocketAddr, now: Instant) {
        let ip = addr.ip().to_string();

        let (banned, expiry) = self.state.bans.lock().unwrap().is_banned(&ip);
        if banned {
            logging::info!(self.log, "rejected banned address";
                           "addr" => &ip, "expiry" => ?expiry);
            return;
        }

        let conn = self
            .state
            .clients
            .lock()
            .unwrap()
            .add(addr.to_string(), self.state.config.paths.file_root.clone());
        let conn = match conn {
            Some(conn) => conn,
            None => {
                logging::warn!(self.log, "rejecting connection, no free client ids"; "addr" => %addr);
                return;
            }
        };

        let id = conn.lock().unwrap().id;
        let channel = Channel::new(id, stream, addr.to_string(), now, &self.log);

        if channel.register(&self.poll).has_failed() {
            logging::warn!(self.log, "channel registration failed"; "client_id" => id);
            self.state.clients.lock().unwrap().delete(id);
            return;
        }

        logging::info!(self.log, "connection accepted"; "client_id" => id, "addr" => %addr);
        self.channels.insert(id, channel);
    }

    fn conn_ready(&mut self, id: u16, readable: bool, writable: bool, now: Instant) {
        if !self.channels.contains_key(&id) {
            return;
        }

        if writable {
            let result = self.channels.get_mut(&id).expect("checked above").send(now);
            if result.has_failed() {
                self.disconnect(id, false);
                return;
            }
        }

        if readable {
            let result = self.channels.get_mut(&id).expect("checked above").receive(now);
            if result.has_failed() {
                self.disconnect(id, false);
                return;
            }
            self.drain_frames(id, now);
        }
    }

    /// Process every complete frame buffered on a channel.
    fn drain_frames(&mut self, id: u16, now: Instant) {
        loop {
            let state = match self.channels.get(&id) {
                Some(channel) => channel.state(),
                None => return,
            };

            match state {
                ChannelState::Handshake(_) => {
                    let result = self.channels.get_mut(&id).expect("checked above").read_handshake();
                    match result {
                        Ok(_) => continue,
                        Err(NetError::Wait) => break,
                        Err(_) => {
                            // Flush the error reply, then drop.
                            self.disconnect(id, true);
                            return;
                        }
                    }
                }
                ChannelState::Established => {
                    let result = self.channels.get_mut(&id).expect("checked above").next_transaction();
                    match result {
                        Ok(tx) => self.process(id, tx, now),
                        Err(NetError::Wait) => break,
                        Err(NetError::Fatal(err)) => {
                            logging::info!(self.log, "protocol violation";
                                           "client_id" => id, "err" => %err);
                            self.disconnect(id, false);
                            return;
                        }
                    }
                }
                ChannelState::Disconnected => return,
            }
        }

        self.flush(id, now);
    }

    /// Run one request through the handler table and route the fan-out.
    fn process(&mut self, origin: u16, tx: Transaction, now: Instant) {
        // Clients acknowledge some notifications with empty replies; those
        // correlate to nothing on the server and are dropped.
        if tx.is_reply != 0 {
            return;
        }

        logging::trace!(self.log, "transaction"; "client_id" => origin, "type" => tx.ty, "id" => tx.id);

        let outbound = handlers::dispatch(&self.state, origin, &tx);
        self.route(origin, tx.id, outbound, now);
    }

    /// Stamp correlation ids and deliver to the target write buffers.
    fn route(&mut self, origin: u16, request_id: u32, outbound: Vec<Outbound>, now: Instant) {
        let mut doomed: Vec<u16> = Vec::new();
        let mut touched: Vec<u16> = Vec::new();

        for item in outbound {
            let (target, mut tx) = match item {
                Outbound::Reply(mut reply) => {
                    reply.id = request_id;
                    (origin, reply)
                }
                Outbound::Notify(target, notify) => (target, notify),
            };
            if tx.is_reply == 0 {
                tx.id = self.fresh_notify_id();
            }

            if let Some(channel) = self.channels.get_mut(&target) {
                if channel.write_transaction(&tx).has_failed() {
                    logging::warn!(self.log, "outbound queue full"; "client_id" => target);
                    doomed.push(target);
                } else {
                    touched.push(target);
                }
            }
        }

        for id in touched {
            self.flush(id, now);
        }
        for id in doomed {
            self.disconnect(id, false);
        }
    }

    /// Opportunistic send so replies leave without waiting for a writable
    /// edge.
    fn flush(&mut self, id: u16, now: Instant) {
        if let Some(channel) = self.channels.get_mut(&id) {
            if channel.send(now).has_failed() {
                self.disconnect(id, false);
            }
        }
    }

    /// Tear a connection down and fan out the departure notifications.
    fn disconnect(&mut self, id: u16, flush: bool) {
        let mut channel = match self.channels.remove(&id) {
            Some(channel) => channel,
            None => return,
        };

        let _ = channel.deregister(&self.poll);
        channel.close(flush);

        logging::info!(self.log, "connection closed";
                       "client_id" => id, "addr" => channel.remote_addr());

        let was_joined = self
            .state
            .conn_snapshot(id)
            .map(|conn| conn.joined)
            .unwrap_or(false);

        self.state.clients.lock().unwrap().delete(id);
        self.state.transfers.lock().unwrap().cancel_for_client(id);

        let mut notices: Vec<(u16, Transaction)> = Vec::new();

        // Chats first: remaining members hear the member leave.
        let affected = self.state.chats.lock().unwrap().remove_conn(id);
        for chat_id in affected {
            let members = self.state.chats.lock().unwrap().members(chat_id);
            let notice = Transaction::new(
                TRAN_NOTIFY_CHAT_DELETE_USER,
                vec![
                    Field::with_u32(hotline::types::FIELD_CHAT_ID, chat_id),
                    Field::with_u16(FIELD_USER_ID, id),
                ],
            );
            notices.extend(members.into_iter().map(|member| (member, notice.clone())));
        }

        // Then the global departure, for joined clients only.
        if was_joined {
            let notice = Transaction::new(TRAN_NOTIFY_DELETE_USER, vec![Field::with_u16(FIELD_USER_ID, id)]);
            for other in self.state.conn_list() {
                let other = other.lock().unwrap();
                if other.joined {
                    notices.push((other.id, notice.clone()));
                }
            }
        }

        let now = Instant::now();
        let routed: Vec<Outbound> = notices
            .into_iter()
            .map(|(target, tx)| Outbound::Notify(target, tx))
            .collect();
        self.route(id, 0, routed, now);
    }

    fn housekeeping(&mut self, now: Instant) {
        // Admin-ordered disconnects whose grace elapsed.
        for id in self.state.due_disconnects(now) {
            self.disconnect(id, true);
        }

        // Deadline enforcement.
        let expired: Vec<(u16, bool)> = self
            .channels
            .values()
            .filter_map(|channel| match channel.state() {
                ChannelState::Handshake(since) if now.duration_since(since) >= HANDSHAKE_TIMEOUT => {
                    Some((channel.id(), true))
                }
                ChannelState::Established if channel.last_ingress_elapsed(now) >= IDLE_TIMEOUT => {
                    Some((channel.id(), false))
                }
                _ => None,
            })
            .collect();

        for (id, handshake) in expired {
            logging::info!(self.log, "connection timed out";
                           "client_id" => id, "during_handshake" => handshake);
            self.disconnect(id, false);
        }
    }

    /// Announce the shutdown, drain what we can within the grace window,
    /// then close everything.
    fn graceful_shutdown(&mut self, reason: &str) {
        logging::info!(self.log, "shutting down"; "reason" => reason, "connections" => self.channels.len());

        let notice = Transaction::new(TRAN_DISCONNECT_MSG, vec![Field::with_str(FIELD_DATA, reason)]);
        let ids: Vec<u16> = self.channels.keys().copied().collect();
        for id in ids {
            let notify_id = self.fresh_notify_id();
            if let Some(channel) = self.channels.get_mut(&id) {
                let mut tx = notice.clone();
                tx.id = notify_id;
                let _ = channel.write_transaction(&tx);
            }
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        let mut events = mio::Events::with_capacity(256);
        while Instant::now() < deadline {
            if !self.channels.values().any(Channel::has_egress) {
                break;
            }

            if self.poll.poll(&mut events, Some(Duration::from_millis(50))).is_err() {
                break;
            }
            let now = Instant::now();
            let ids: Vec<u16> = self.channels.keys().copied().collect();
            for id in ids {
                if let Some(channel) = self.channels.get_mut(&id) {
                    if channel.send(now).has_failed() {
                        channel.close(false);
                    }
                }
            }
        }

        for (_, mut channel) in self.channels.drain() {
            channel.close(true);
        }
    }
}
