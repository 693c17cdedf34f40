//! Edge-triggered UDP listener: one non-blocking socket registered with
//! epoll, read in batches through `recvmmsg`.

use crate::core::{CollectorError, Result};
use crate::ingestion::source::{DatagramSource, BATCH_SIZE, MAX_PACKET};
use crate::ingestion::Packet;
use bytes::Bytes;
use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

const MAX_EVENTS: usize = 8;

pub struct EpollSource {
    socket: OwnedFd,
    epoll: OwnedFd,
    local_addr: SocketAddrV4,
    buffers: Box<[[u8; MAX_PACKET]]>,
}

impl EpollSource {
    /// Bind a non-blocking UDP socket with address and port reuse, and
    /// register it for edge-triggered readability.
    ///
    /// Port `0` binds an ephemeral port; see [`EpollSource::local_addr`].
    pub fn bind(addr: SocketAddrV4) -> Result<Self> {
        let socket = new_socket()?;
        set_nonblocking(socket.as_raw_fd())?;
        enable_reuse(socket.as_raw_fd())?;
        bind_socket(socket.as_raw_fd(), addr)?;
        let local_addr = query_local_addr(socket.as_raw_fd())?;

        let epoll = new_epoll()?;
        register(epoll.as_raw_fd(), socket.as_raw_fd())?;

        tracing::debug!(addr = %local_addr, "UDP socket registered with epoll");

        Ok(Self {
            socket,
            epoll,
            local_addr,
            buffers: vec![[0u8; MAX_PACKET]; BATCH_SIZE].into_boxed_slice(),
        })
    }

    /// Address actually bound, with the ephemeral port resolved
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }
}

/// Whole milliseconds for `epoll_wait`, rounded up so a non-zero timeout
/// never turns into a non-blocking poll.
fn timeout_millis(timeout: Duration) -> libc::c_int {
    let millis = (timeout.as_nanos() + 999_999) / 1_000_000;
    millis.min(i32::MAX as u128) as libc::c_int
}

impl DatagramSource for EpollSource {
    fn wait_ready(&mut self, timeout: Duration) -> io::Result<bool> {
        // SAFETY: epoll_event is plain old data
        let mut events: [libc::epoll_event; MAX_EVENTS] = unsafe { mem::zeroed() };
        let timeout_ms = timeout_millis(timeout);

        // SAFETY: `events` outlives the call and holds MAX_EVENTS entries
        let ready = unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                events.as_mut_ptr(),
                MAX_EVENTS as libc::c_int,
                timeout_ms,
            )
        };

        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(ready > 0)
    }

    fn recv_batch(&mut self, out: &mut Vec<Packet>) -> io::Result<usize> {
        // SAFETY: iovec and mmsghdr are plain old data; null pointers and
        // zero lengths are valid defaults
        let mut iovecs: [libc::iovec; BATCH_SIZE] = unsafe { mem::zeroed() };
        let mut messages: [libc::mmsghdr; BATCH_SIZE] = unsafe { mem::zeroed() };

        for ((iov, msg), buffer) in iovecs
            .iter_mut()
            .zip(messages.iter_mut())
            .zip(self.buffers.iter_mut())
        {
            iov.iov_base = buffer.as_mut_ptr().cast();
            iov.iov_len = MAX_PACKET;
            msg.msg_hdr.msg_iov = iov;
            msg.msg_hdr.msg_iovlen = 1;
        }

        let received = loop {
            // SAFETY: every header points at a live iovec, which points at a
            // MAX_PACKET buffer owned by `self`
            let rc = unsafe {
                libc::recvmmsg(
                    self.socket.as_raw_fd(),
                    messages.as_mut_ptr(),
                    BATCH_SIZE as _,
                    libc::MSG_DONTWAIT as _,
                    ptr::null_mut(),
                )
            };
            if rc >= 0 {
                break rc as usize;
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => return Ok(0),
                io::ErrorKind::Interrupted => continue,
                _ => return Err(err),
            }
        };

        out.extend(
            messages[..received]
                .iter()
                .zip(self.buffers.iter())
                .map(|(msg, buffer)| {
                    let len = (msg.msg_len as usize).min(MAX_PACKET);
                    Bytes::copy_from_slice(&buffer[..len])
                }),
        );
        Ok(received)
    }
}

fn new_socket() -> Result<OwnedFd> {
    // SAFETY: no pointers involved
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
    owned(fd, "socket")
}

fn new_epoll() -> Result<OwnedFd> {
    // SAFETY: no pointers involved
    let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
    owned(fd, "epoll_create1")
}

fn owned(fd: RawFd, op: &'static str) -> Result<OwnedFd> {
    if fd < 0 {
        return Err(fail(op));
    }
    // SAFETY: `fd` was just returned by the kernel and has no other owner
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    // SAFETY: F_GETFL/F_SETFL take no pointers
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(fail("fcntl"));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(fail("fcntl"));
    }
    Ok(())
}

fn enable_reuse(fd: RawFd) -> Result<()> {
    for (option, op) in [
        (libc::SO_REUSEADDR, "setsockopt(SO_REUSEADDR)"),
        (libc::SO_REUSEPORT, "setsockopt(SO_REUSEPORT)"),
    ] {
        let enable: libc::c_int = 1;
        // SAFETY: `enable` is a live c_int and the length matches it
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                option,
                (&enable as *const libc::c_int).cast(),
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(fail(op));
        }
    }
    Ok(())
}

fn bind_socket(fd: RawFd, addr: SocketAddrV4) -> Result<()> {
    // SAFETY: sockaddr_in is plain old data
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = addr.port().to_be();
    sin.sin_addr = libc::in_addr {
        s_addr: u32::from(*addr.ip()).to_be(),
    };

    // SAFETY: `sin` is a fully initialized sockaddr_in of the given length
    let rc = unsafe {
        libc::bind(
            fd,
            (&sin as *const libc::sockaddr_in).cast(),
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(fail("bind"));
    }
    Ok(())
}

fn query_local_addr(fd: RawFd) -> Result<SocketAddrV4> {
    // SAFETY: sockaddr_in is plain old data
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

    // SAFETY: `sin` and `len` are live and describe the same buffer
    let rc = unsafe { libc::getsockname(fd, (&mut sin as *mut libc::sockaddr_in).cast(), &mut len) };
    if rc < 0 {
        return Err(fail("getsockname"));
    }

    Ok(SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)),
        u16::from_be(sin.sin_port),
    ))
}

fn register(epoll: RawFd, socket: RawFd) -> Result<()> {
    let mut event = libc::epoll_event {
        events: (libc::EPOLLIN | libc::EPOLLET) as u32,
        u64: socket as u64,
    };

    // SAFETY: `event` is live for the duration of the call
    let rc = unsafe { libc::epoll_ctl(epoll, libc::EPOLL_CTL_ADD, socket, &mut event) };
    if rc < 0 {
        return Err(fail("epoll_ctl"));
    }
    Ok(())
}

fn fail(op: &'static str) -> CollectorError {
    let err = CollectorError::last_os_error(op);
    tracing::error!(error = %err, "UDP listener setup failed");
    err
}
