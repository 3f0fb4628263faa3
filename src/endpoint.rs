//! Datagram Endpoint: one segment per `send`, one segment per `recv`, and a
//! bounded variant of `recv` that returns `Timeout` instead of blocking
//! forever. Built over `std::net::UdpSocket` — there is no TUN device or raw
//! IP layer in this protocol, so a socket-level read timeout stands in for
//! a poll-based readiness loop.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::err::{Error, RecvOutcome};
use crate::segment::{Segment, WIRE_SIZE};

pub const DEFAULT_TIMEOUT_US: u64 = 250_000;

pub struct Endpoint {
    socket: UdpSocket,
}

impl Endpoint {
    pub fn new(socket: UdpSocket) -> Self {
        Endpoint { socket }
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// One datagram write of exactly one segment.
    pub fn send(&self, seg: &Segment, peer: SocketAddr) -> Result<(), Error> {
        let wire = seg.to_wire();
        self.socket
            .send_to(&wire, peer)
            .map_err(Error::SendFailed)?;
        Ok(())
    }

    /// Block until a datagram arrives, then verify its checksum. The caller
    /// treats `peer` as the most recent source of traffic, not a stable
    /// remote identity: it is overwritten on every successful receive.
    pub fn recv(&self) -> Result<(SocketAddr, RecvOutcome<Segment>), Error> {
        self.socket.set_read_timeout(None).ok();
        self.recv_inner()
    }

    /// Wait up to `DEFAULT_TIMEOUT_US` for a datagram; returns
    /// `RecvOutcome::Timeout` if nothing arrives in time.
    pub fn recv_bounded(&self) -> Result<(SocketAddr, RecvOutcome<Segment>), Error> {
        self.socket
            .set_read_timeout(Some(Duration::from_micros(DEFAULT_TIMEOUT_US)))
            .map_err(Error::UnknownFailure)?;
        self.recv_inner()
    }

    fn recv_inner(&self) -> Result<(SocketAddr, RecvOutcome<Segment>), Error> {
        let mut buf = [0u8; WIRE_SIZE];
        match self.socket.recv_from(&mut buf) {
            Ok((n, peer)) => {
                if n != WIRE_SIZE {
                    // A short/garbled datagram can never pass the checksum
                    // check either way; treat it the same as one that does.
                    return Ok((peer, RecvOutcome::ChecksumFailed));
                }
                let seg = Segment::from_wire(&buf[..n]).expect("length checked above");
                if seg.verify() {
                    Ok((peer, RecvOutcome::Ok(seg)))
                } else {
                    Ok((peer, RecvOutcome::ChecksumFailed))
                }
            }
            Err(e) if is_timeout(&e) => {
                // The socket has no peer bound yet when nothing has arrived,
                // so there is no meaningful address to report back.
                Ok((unspecified_peer(), RecvOutcome::Timeout))
            }
            Err(e) => Err(Error::RecvFailed(e)),
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn unspecified_peer() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 0))
}
