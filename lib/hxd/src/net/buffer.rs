//! A bounded, compacting byte FIFO for non-blocking socket I/O. Data is
//! appended at the tail and consumed from the head; the capacity bound is
//! what makes a slow consumer connection-fatal instead of a memory leak.

use std::io::{self, Read, Write};

pub struct Buffer {
    data: Vec<u8>,
    head: usize,
    cap: usize,
}

impl Buffer {
    pub fn new(cap: usize) -> Buffer {
        Buffer {
            data: Vec::with_capacity(cap.min(65536)),
            head: 0,
            cap,
        }
    }

    /// Bytes currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Room left before the bound.
    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.cap - self.len()
    }

    /// The queued bytes, oldest first.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// Drop `count` bytes from the head.
    pub fn consume(&mut self, count: usize) {
        debug_assert!(count <= self.len());
        self.head += count;

        // Reclaim dead prefix space once it dominates the allocation.
        if self.head == self.data.len() {
            self.data.clear();
            self.head = 0;
        } else if self.head > self.cap / 2 {
            self.data.drain(..self.head);
            self.head = 0;
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    /// Append bytes if they fit within the bound.
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.free_capacity() {
            return false;
        }
        self.data.extend_from_slice(bytes);
        true
    }

    /// Read from `reader` until it would block, the bound is reached, or
    /// end of stream. Returns bytes read and whether EOF was observed.
    pub fn ingress<R: Read>(&mut self, reader: &mut R) -> io::Result<(usize, bool)> {
        let mut total = 0;
        let mut chunk = [0u8; 65536];

        loop {
            let want = self.free_capacity().min(chunk.len());
            if want == 0 {
                return Ok((total, false));
            }

            match reader.read(&mut chunk[..want]) {
                Ok(0) => return Ok((total, true)),
                Ok(count) => {
                    self.data.extend_from_slice(&chunk[..count]);
                    total += count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok((total, false)),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Write queued bytes to `writer` until it would block or the queue is
    /// drained.
    pub fn egress<W: Write>(&mut self, writer: &mut W) -> io::Result<usize> {
        let mut total = 0;

        while !self.is_empty() {
            match writer.write(self.as_slice()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => {
                    self.consume(count);
                    total += count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(total)
    }
}
