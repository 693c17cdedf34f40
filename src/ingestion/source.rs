//! Non-blocking, batched datagram sources.
//!
//! The server only needs two operations from the network: wait (bounded)
//! until data may be readable, then pull datagrams in batches until none
//! are left. [`DatagramSource`] captures exactly that so the ingestion path
//! can run against [`MemorySource`] in tests, against the epoll-backed
//! socket on Linux, and against [`UdpSource`] elsewhere.

use crate::core::{CollectorError, Result};
use crate::ingestion::Packet;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

/// Datagrams pulled per receive call
pub const BATCH_SIZE: usize = 64;
/// Largest datagram kept; longer payloads are truncated
pub const MAX_PACKET: usize = 512;

pub trait DatagramSource: Send {
    /// Wait up to `timeout` for data. `Ok(false)` on timeout or interruption.
    fn wait_ready(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Append up to [`BATCH_SIZE`] pending datagrams to `out` without
    /// blocking. Returns how many were appended; `0` means drained.
    fn recv_batch(&mut self, out: &mut Vec<Packet>) -> io::Result<usize>;

    /// Receive until nothing is pending, handing each datagram to `sink`.
    ///
    /// Edge-triggered readiness fires once per transition, so every wake-up
    /// must end here or pending datagrams wait for the next sender.
    fn drain<F>(&mut self, mut sink: F) -> io::Result<usize>
    where
        Self: Sized,
        F: FnMut(Packet),
    {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        let mut total = 0;
        loop {
            let received = self.recv_batch(&mut batch)?;
            if received == 0 {
                return Ok(total);
            }
            total += received;
            batch.drain(..).for_each(&mut sink);
        }
    }
}

/// Portable source over `std::net::UdpSocket`.
///
/// Readiness is a blocking `peek_from` bounded by a read timeout, and
/// batches are read one `recv_from` at a time in non-blocking mode. std
/// exposes no `SO_REUSEPORT`, so the port cannot be shared.
pub struct UdpSource {
    socket: UdpSocket,
    local_addr: SocketAddrV4,
    nonblocking: bool,
    read_timeout: Option<Duration>,
    buffer: Box<[u8; MAX_PACKET]>,
}

impl UdpSource {
    pub fn bind(addr: SocketAddrV4) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|source| socket_error("bind", source))?;
        let local_addr = match socket.local_addr() {
            Ok(SocketAddr::V4(local)) => local,
            Ok(other) => {
                return Err(CollectorError::config(format!("unexpected local address {}", other)))
            },
            Err(source) => return Err(socket_error("getsockname", source)),
        };

        Ok(Self {
            socket,
            local_addr,
            nonblocking: false,
            read_timeout: None,
            buffer: Box::new([0u8; MAX_PACKET]),
        })
    }

    /// Address actually bound, with the ephemeral port resolved
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        if self.nonblocking != nonblocking {
            self.socket.set_nonblocking(nonblocking)?;
            self.nonblocking = nonblocking;
        }
        Ok(())
    }
}

impl DatagramSource for UdpSource {
    fn wait_ready(&mut self, timeout: Duration) -> io::Result<bool> {
        self.set_nonblocking(false)?;

        // A zero read timeout is rejected by std
        let timeout = Some(timeout.max(Duration::from_millis(1)));
        if self.read_timeout != timeout {
            self.socket.set_read_timeout(timeout)?;
            self.read_timeout = timeout;
        }

        let mut probe = [0u8; 1];
        match self.socket.peek_from(&mut probe) {
            Ok(_) => Ok(true),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(false)
            },
            Err(e) => Err(e),
        }
    }

    fn recv_batch(&mut self, out: &mut Vec<Packet>) -> io::Result<usize> {
        self.set_nonblocking(true)?;

        let mut received = 0;
        while received < BATCH_SIZE {
            match self.socket.recv_from(&mut self.buffer[..]) {
                Ok((len, _)) => {
                    out.push(Bytes::copy_from_slice(&self.buffer[..len]));
                    received += 1;
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // hand back what was already read
                Err(_) if received > 0 => break,
                Err(e) => return Err(e),
            }
        }
        Ok(received)
    }
}

fn socket_error(op: &'static str, source: io::Error) -> CollectorError {
    let err = CollectorError::Socket { op, source };
    tracing::error!(error = %err, "UDP listener setup failed");
    err
}

#[derive(Default)]
struct Shared {
    queue: Mutex<VecDeque<Packet>>,
    ready: Condvar,
}

/// In-process datagram source fed by [`MemorySender`]
pub struct MemorySource {
    shared: Arc<Shared>,
}

/// Sending side of a [`MemorySource`]
#[derive(Clone)]
pub struct MemorySender {
    shared: Arc<Shared>,
}

/// Create a connected sender/source pair
pub fn memory_source() -> (MemorySender, MemorySource) {
    let shared = Arc::new(Shared::default());
    (
        MemorySender {
            shared: Arc::clone(&shared),
        },
        MemorySource { shared },
    )
}

impl MemorySender {
    /// Queue one datagram, truncated to [`MAX_PACKET`] like a socket would
    pub fn send(&self, datagram: impl Into<Bytes>) {
        let mut datagram = datagram.into();
        datagram.truncate(MAX_PACKET);

        self.shared.queue.lock().push_back(datagram);
        self.shared.ready.notify_one();
    }

    /// Datagrams not yet received
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

impl DatagramSource for MemorySource {
    fn wait_ready(&mut self, timeout: Duration) -> io::Result<bool> {
        let mut queue = self.shared.queue.lock();
        if queue.is_empty() {
            self.shared.ready.wait_for(&mut queue, timeout);
        }
        Ok(!queue.is_empty())
    }

    fn recv_batch(&mut self, out: &mut Vec<Packet>) -> io::Result<usize> {
        let mut queue = self.shared.queue.lock();
        let count = queue.len().min(BATCH_SIZE);
        out.extend(queue.drain(..count));
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out_when_idle() {
        let (_sender, mut source) = memory_source();
        let started = Instant::now();
        assert!(!source.wait_ready(Duration::from_millis(20)).unwrap());
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_wait_wakes_on_send() {
        let (sender, mut source) = memory_source();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            sender.send(&b"a:1|c"[..]);
        });

        assert!(source.wait_ready(Duration::from_secs(5)).unwrap());
        handle.join().unwrap();
    }

    #[test]
    fn test_recv_batch_is_bounded() {
        let (sender, mut source) = memory_source();
        for _ in 0..(BATCH_SIZE + 10) {
            sender.send(&b"a:1|c"[..]);
        }

        let mut out = Vec::new();
        assert_eq!(source.recv_batch(&mut out).unwrap(), BATCH_SIZE);
        assert_eq!(sender.pending(), 10);
    }

    #[test]
    fn test_drain_reads_to_exhaustion() {
        let (sender, mut source) = memory_source();
        for _ in 0..(BATCH_SIZE * 3 + 5) {
            sender.send(&b"a:1|c"[..]);
        }

        let mut seen = 0;
        let drained = source.drain(|_| seen += 1).unwrap();
        assert_eq!(drained, BATCH_SIZE * 3 + 5);
        assert_eq!(seen, drained);
        assert_eq!(sender.pending(), 0);
    }

    #[test]
    fn test_oversized_datagram_truncated() {
        let (sender, mut source) = memory_source();
        sender.send(vec![b'x'; MAX_PACKET * 2]);

        let mut out = Vec::new();
        source.recv_batch(&mut out).unwrap();
        assert_eq!(out[0].len(), MAX_PACKET);
    }

    fn loopback_udp() -> (UdpSource, UdpSocket) {
        let source = UdpSource::bind(SocketAddrV4::new(std::net::Ipv4Addr::LOCALHOST, 0)).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.connect(source.local_addr()).unwrap();
        (source, sender)
    }

    #[test]
    fn test_udp_source_waits_and_drains() {
        let (mut source, sender) = loopback_udp();
        assert_ne!(source.local_addr().port(), 0);
        assert!(!source.wait_ready(Duration::from_millis(10)).unwrap());

        for _ in 0..(BATCH_SIZE + 6) {
            sender.send(b"req:1|c").unwrap();
        }
        assert!(source.wait_ready(Duration::from_secs(5)).unwrap());

        let mut seen = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen < BATCH_SIZE + 6 && Instant::now() < deadline {
            seen += source.drain(|packet| assert_eq!(packet.as_ref(), b"req:1|c")).unwrap();
        }
        assert_eq!(seen, BATCH_SIZE + 6);
    }

    #[test]
    fn test_udp_source_truncates() {
        let (mut source, sender) = loopback_udp();
        sender.send(&[b'y'; MAX_PACKET + 1]).unwrap();

        assert!(source.wait_ready(Duration::from_secs(5)).unwrap());
        let mut out = Vec::new();
        assert_eq!(source.recv_batch(&mut out).unwrap(), 1);
        assert_eq!(out[0].len(), MAX_PACKET);
    }
}
