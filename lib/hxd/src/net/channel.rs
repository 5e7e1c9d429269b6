//! One control-channel connection: the socket, its buffers and the framing
//! state machine. All methods are non-blocking; `Wait` means "need more
//! readiness", anything fatal is the caller's cue to tear the channel down.

use crate::error::{ErrorType, NetError, NetResult};
use crate::logging::{self, Logger};
use crate::net::buffer::Buffer;
use hotline::transaction::Transaction;
use hotline::xfer::{decode_handshake, encode_handshake_reply, ClientHandshake, HANDSHAKE_SIZE};
use mio::net::TcpStream;
use std::net::Shutdown;
use std::time::{Duration, Instant};

/// Large enough for the biggest accepted frame plus pipelined requests.
pub const READ_BUF_SIZE: usize = 2 * 1024 * 1024;
/// Outbound queue bound; a client that cannot drain this is disconnected.
pub const WRITE_BUF_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChannelState {
    /// Waiting for the 12-byte client hello.
    Handshake(Instant),
    /// Hello accepted; transactions flow.
    Established,
    Disconnected,
}

pub struct Channel {
    id: u16,
    stream: Option<TcpStream>,
    state: ChannelState,
    remote_addr: String,

    read_buffer: Buffer,
    write_buffer: Buffer,

    last_ingress: Instant,
    last_egress: Instant,

    log: Logger,
}

impl Channel {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(
        id: u16,
        stream: TcpStream,
        remote_addr: String,
        now: Instant,
        log: L,
    ) -> Channel {
        Channel {
            id,
            stream: Some(stream),
            state: ChannelState::Handshake(now),
            remote_addr,
            read_buffer: Buffer::new(READ_BUF_SIZE),
            write_buffer: Buffer::new(WRITE_BUF_SIZE),
            last_ingress: now,
            last_egress: now,
            log: logging::child(log),
        }
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[inline]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    #[inline]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    #[inline]
    pub fn has_egress(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    #[inline]
    pub fn last_ingress_elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.last_ingress)
    }

    /// Register on the poll, readable and writable, edge-triggered.
    pub fn register(&self, poll: &mio::Poll) -> NetResult<()> {
        let stream = self.stream.as_ref().expect("cannot register a closed channel");
        poll.register(
            stream,
            mio::Token(usize::from(self.id)),
            mio::Ready::readable() | mio::Ready::writable(),
            mio::PollOpt::edge(),
        )
        .map_err(Into::into)
    }

    pub fn deregister(&self, poll: &mio::Poll) -> NetResult<()> {
        let stream = self.stream.as_ref().expect("cannot deregister a closed channel");
        poll.deregister(stream).map_err(Into::into)
    }

    /// Pull everything available off the socket.
    pub fn receive(&mut self, now: Instant) -> NetResult<usize> {
        let stream = self.stream.as_mut().expect("channel must have a stream");
        let (received, eof) = self.read_buffer.ingress(stream)?;

        if received > 0 {
            self.last_ingress = now;
        }
        if eof {
            return Err(NetError::Fatal(ErrorType::Closed));
        }
        Ok(received)
    }

    /// Flush as much of the write buffer as the socket accepts.
    pub fn send(&mut self, now: Instant) -> NetResult<usize> {
        if self.write_buffer.is_empty() {
            return Ok(0);
        }

        let stream = self.stream.as_mut().expect("channel must have a stream");
        let sent = self.write_buffer.egress(stream)?;
        if sent > 0 {
            self.last_egress = now;
        }
        Ok(sent)
    }

    /// Parse the client hello. `Wait` until 12 bytes are in; bad magic is
    /// fatal after a best-effort error reply.
    pub fn read_handshake(&mut self) -> NetResult<ClientHandshake> {
        if self.read_buffer.len() < HANDSHAKE_SIZE {
            return Err(NetError::Wait);
        }

        match decode_handshake(self.read_buffer.as_slice()) {
            Ok(hello) => {
                self.read_buffer.consume(HANDSHAKE_SIZE);
                self.write_buffer.push(&encode_handshake_reply(0));
                self.state = ChannelState::Established;

                logging::debug!(self.log, "handshake accepted";
                                "channel_id" => self.id,
                                "version" => hello.version,
                                "sub_version" => hello.sub_version);
                Ok(hello)
            }
            Err(err) => {
                self.write_buffer.push(&encode_handshake_reply(1));
                Err(NetError::Fatal(ErrorType::Protocol(err)))
            }
        }
    }

    /// Next complete transaction, `Wait` if the frame is still partial.
    pub fn next_transaction(&mut self) -> NetResult<Transaction> {
        match Transaction::decode(self.read_buffer.as_slice()) {
            Ok(Some((tx, consumed))) => {
                self.read_buffer.consume(consumed);
                Ok(tx)
            }
            Ok(None) => {
                // A frame that can never fit the buffer will starve here.
                if self.read_buffer.free_capacity() == 0 {
                    return Err(NetError::Fatal(ErrorType::Protocol(
                        hotline::ProtocolError::PayloadTooLarge(self.read_buffer.len() as u32),
                    )));
                }
                Err(NetError::Wait)
            }
            Err(err) => Err(NetError::Fatal(ErrorType::Protocol(err))),
        }
    }

    /// Queue one transaction. A full queue is fatal for this connection.
    pub fn write_transaction(&mut self, tx: &Transaction) -> NetResult<()> {
        let bytes = tx.encode().map_err(|err| NetError::Fatal(ErrorType::Protocol(err)))?;
        if !self.write_buffer.push(&bytes) {
            return Err(NetError::Fatal(ErrorType::BufferFull));
        }
        Ok(())
    }

    /// Shut the socket down, attempting to flush first when asked.
    pub fn close(&mut self, flush: bool) {
        if flush {
            let now = Instant::now();
            let _ = self.send(now);
        }

        self.read_buffer.clear();
        self.write_buffer.clear();
        self.state = ChannelState::Disconnected;

        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }

        logging::debug!(self.log, "channel closed"; "channel_id" => self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotline::types::{FIELD_DATA, TRAN_CHAT_SEND};
    use hotline::Field;
    use std::net::{TcpListener as StdListener, TcpStream as StdStream};

    /// A connected mio stream; framing tests only touch the buffers.
    fn connected_channel() -> (Channel, StdStream) {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = StdStream::connect(addr).unwrap();
        let (accepted, remote) = listener.accept().unwrap();
        let stream = TcpStream::from_stream(accepted).unwrap();

        (
            Channel::new(1, stream, remote.to_string(), Instant::now(), None),
            peer,
        )
    }

    fn seed_read_buffer(channel: &mut Channel, bytes: &[u8]) {
        assert!(channel.read_buffer.push(bytes));
    }

    #[test]
    fn test_handshake_wait_then_accept() {
        let (mut channel, _peer) = connected_channel();

        assert_eq!(channel.read_handshake().unwrap_err(), NetError::Wait);

        seed_read_buffer(&mut channel, b"TRTPHOTL\x00\x01\x00\x02");
        let hello = channel.read_handshake().unwrap();

        assert_eq!(hello.version, 1);
        assert_eq!(channel.state(), ChannelState::Established);
        // Positive reply queued.
        assert_eq!(channel.write_buffer.as_slice(), b"TRTP\x00\x00\x00\x00");
    }

    #[test]
    fn test_handshake_bad_magic_fatal_with_error_reply() {
        let (mut channel, _peer) = connected_channel();
        seed_read_buffer(&mut channel, b"XXXXHOTL\x00\x01\x00\x02");

        let err = channel.read_handshake().unwrap_err();

        assert!(matches!(err, NetError::Fatal(ErrorType::Protocol(_))));
        assert_eq!(channel.write_buffer.as_slice(), b"TRTP\x00\x00\x00\x01");
    }

    #[test]
    fn test_transaction_framing_partial_then_complete() {
        let (mut channel, _peer) = connected_channel();

        let mut tx = Transaction::new(TRAN_CHAT_SEND, vec![Field::new(FIELD_DATA, b"hi".to_vec())]);
        tx.id = 9;
        let bytes = tx.encode().unwrap();

        seed_read_buffer(&mut channel, &bytes[..10]);
        assert_eq!(channel.next_transaction().unwrap_err(), NetError::Wait);

        seed_read_buffer(&mut channel, &bytes[10..]);
        let decoded = channel.next_transaction().unwrap();
        assert_eq!(decoded, tx);

        // Nothing left.
        assert_eq!(channel.next_transaction().unwrap_err(), NetError::Wait);
    }

    #[test]
    fn test_two_pipelined_transactions() {
        let (mut channel, _peer) = connected_channel();

        let a = Transaction::new(TRAN_CHAT_SEND, vec![Field::new(FIELD_DATA, b"one".to_vec())]);
        let b = Transaction::new(TRAN_CHAT_SEND, vec![Field::new(FIELD_DATA, b"two".to_vec())]);
        let mut bytes = a.encode().unwrap();
        bytes.extend_from_slice(&b.encode().unwrap());
        seed_read_buffer(&mut channel, &bytes);

        assert_eq!(channel.next_transaction().unwrap().field_bytes(FIELD_DATA), b"one");
        assert_eq!(channel.next_transaction().unwrap().field_bytes(FIELD_DATA), b"two");
    }

    #[test]
    fn test_malformed_frame_is_fatal() {
        let (mut channel, _peer) = connected_channel();

        // Header whose totalSize and dataSize disagree.
        let mut bytes = Transaction::new(TRAN_CHAT_SEND, Vec::new()).encode().unwrap();
        bytes[15] ^= 0x01;
        seed_read_buffer(&mut channel, &bytes);

        assert!(matches!(
            channel.next_transaction().unwrap_err(),
            NetError::Fatal(ErrorType::Protocol(_))
        ));
    }

    #[test]
    fn test_write_transaction_queues_frame_bytes() {
        let (mut channel, _peer) = connected_channel();

        let tx = Transaction::reply(vec![Field::new(FIELD_DATA, b"ok".to_vec())]);
        channel.write_transaction(&tx).unwrap();

        let queued = channel.write_buffer.as_slice().to_vec();
        let (decoded, consumed) = Transaction::decode(&queued).unwrap().unwrap();
        assert_eq!(consumed, queued.len());
        assert_eq!(decoded, tx);
    }
}
