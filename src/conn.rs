//! Connection Manager: the three-phase setup/teardown handshakes for both
//! roles, expressed as a small explicit state machine.
//!
//! ```text
//!      sender                              receiver
//!   CONNECT_SENDING --SYN-->                  IDLE
//!         |                      SYN------->  (emits SYN|ACK, -> OPEN)
//!   CONNECT_WAIT   <--SYN|ACK--------------
//!         |
//!        OPEN                               OPEN
//!         |                      FIN------->  (emits FIN|ACK, -> CLOSED)
//!   teardown: FIN -->
//!         |          <--FIN|ACK-------------
//!       CLOSED                             CLOSED
//! ```

use std::net::SocketAddr;

use tracing::{debug, warn};

use crate::err::{Error, RecvOutcome};
use crate::endpoint::Endpoint;
use crate::segment::{Segment, SegmentKind, ACK, FIN, SYN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Open,
    Closing,
    Closed,
}

/// Soft per-run connection state. There is no simultaneous-connection
/// table; each process serves exactly one peer per invocation.
pub struct Connection {
    pub local_port: u16,
    pub peer: SocketAddr,
    pub phase: Phase,
}

impl Connection {
    pub fn new(local_port: u16, peer: SocketAddr) -> Self {
        Connection {
            local_port,
            peer,
            phase: Phase::Idle,
        }
    }

    /// Sender-side setup: `CONNECT_SENDING -> CONNECT_WAIT -> OPEN`.
    /// Retries sending the SYN on timeout or checksum failure,
    /// unconditionally; only a hard receive failure aborts.
    pub fn setup_as_sender(&mut self, ep: &Endpoint) -> Result<(), Error> {
        loop {
            let syn = Segment::build(self.local_port, self.peer.port(), 0, 0, SYN, b"");
            ep.send(&syn, self.peer)?;
            debug!(peer = %self.peer, "sent SYN");

            let (from, outcome) = ep.recv_bounded()?;
            match outcome {
                RecvOutcome::Timeout | RecvOutcome::ChecksumFailed => continue,
                RecvOutcome::Ok(seg) => {
                    if matches!(seg.classify(), SegmentKind::SetupAck) {
                        self.peer = from;
                        self.phase = Phase::Open;
                        debug!(peer = %self.peer, "connection established");
                        return Ok(());
                    }
                    // swallow and retry: anything else while waiting is noise
                }
            }
        }
    }

    /// Receiver-side setup responder: a SYN arriving in `IDLE` (or `OPEN`,
    /// idempotently) triggers a SYN|ACK back to whoever sent it.
    pub fn accept_setup(&mut self, ep: &Endpoint, from: SocketAddr) -> Result<(), Error> {
        self.peer = from;
        // ACK source/dest port both set to the receiver's own port: an
        // oversight in the original, preserved here for bit-exact behavior.
        let syn_ack = Segment::build(self.local_port, self.local_port, 0, 0, SYN | ACK, b"");
        ep.send(&syn_ack, from)?;
        self.phase = Phase::Open;
        debug!(peer = %from, "accepted setup, sent SYN|ACK");
        Ok(())
    }

    /// Sender-side teardown: send FIN, wait for FIN|ACK, retry up to 10
    /// times, then give up and report success regardless — the sender
    /// cannot wait forever for a FIN|ACK that may itself have been lost.
    pub fn teardown_as_sender(&mut self, ep: &Endpoint) -> Result<(), Error> {
        const MAX_RETRIES: u32 = 10;

        let fin = Segment::build(self.local_port, self.peer.port(), 0, 0, FIN, b"");
        for attempt in 0..MAX_RETRIES {
            ep.send(&fin, self.peer)?;
            debug!(attempt, "sent FIN");

            let (_, outcome) = ep.recv_bounded()?;
            if let RecvOutcome::Ok(seg) = outcome {
                if matches!(seg.classify(), SegmentKind::TeardownAck) {
                    self.phase = Phase::Closed;
                    debug!("connection closed");
                    return Ok(());
                }
            }
        }

        warn!("teardown FIN unacknowledged after {MAX_RETRIES} attempts, closing anyway");
        self.phase = Phase::Closed;
        Ok(())
    }

    /// Receiver-side teardown responder: a FIN triggers a FIN|ACK back to
    /// the same peer and a transition to `CLOSED`. Callers are responsible
    /// for flushing any remaining reassembly buffer before/after this call.
    pub fn accept_teardown(&mut self, ep: &Endpoint, from: SocketAddr) -> Result<(), Error> {
        let fin_ack = Segment::build(self.local_port, self.local_port, 0, 0, FIN | ACK, b"");
        ep.send(&fin_ack, from)?;
        self.phase = Phase::Closed;
        debug!(peer = %from, "accepted teardown, sent FIN|ACK");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::thread;

    fn bound(port_hint: u16) -> (Endpoint, SocketAddr) {
        let sock = UdpSocket::bind(("127.0.0.1", port_hint)).unwrap();
        let addr = sock.local_addr().unwrap();
        (Endpoint::new(sock), addr)
    }

    #[test]
    fn sender_setup_completes_against_a_cooperating_receiver() {
        let (sender_ep, sender_addr) = bound(0);
        let (receiver_ep, receiver_addr) = bound(0);

        let handle = thread::spawn(move || {
            let (from, outcome) = receiver_ep.recv().unwrap();
            let seg = match outcome {
                RecvOutcome::Ok(seg) => seg,
                other => panic!("expected Ok, got {other:?}"),
            };
            assert!(matches!(seg.classify(), SegmentKind::SetupReq));

            let mut conn = Connection::new(receiver_addr.port(), receiver_addr);
            conn.accept_setup(&receiver_ep, from).unwrap();
            assert_eq!(conn.phase, Phase::Open);
        });

        let mut conn = Connection::new(sender_addr.port(), receiver_addr);
        conn.setup_as_sender(&sender_ep).unwrap();
        assert_eq!(conn.phase, Phase::Open);

        handle.join().unwrap();
    }

    #[test]
    fn sender_teardown_completes_against_a_cooperating_receiver() {
        let (sender_ep, sender_addr) = bound(0);
        let (receiver_ep, receiver_addr) = bound(0);

        let handle = thread::spawn(move || {
            let (from, outcome) = receiver_ep.recv().unwrap();
            let seg = match outcome {
                RecvOutcome::Ok(seg) => seg,
                other => panic!("expected Ok, got {other:?}"),
            };
            assert!(matches!(seg.classify(), SegmentKind::TeardownReq));

            let mut conn = Connection::new(receiver_addr.port(), receiver_addr);
            conn.accept_teardown(&receiver_ep, from).unwrap();
            assert_eq!(conn.phase, Phase::Closed);
        });

        let mut conn = Connection::new(sender_addr.port(), receiver_addr);
        conn.phase = Phase::Open;
        conn.teardown_as_sender(&sender_ep).unwrap();
        assert_eq!(conn.phase, Phase::Closed);

        handle.join().unwrap();
    }

    #[test]
    fn sender_teardown_gives_up_after_ten_retries_and_still_succeeds() {
        let (sender_ep, sender_addr) = bound(0);
        // Bind a receiver that never replies, to force every retry to time out.
        let (_silent_ep, receiver_addr) = bound(0);

        let mut conn = Connection::new(sender_addr.port(), receiver_addr);
        conn.phase = Phase::Open;
        let result = conn.teardown_as_sender(&sender_ep);
        assert!(result.is_ok());
        assert_eq!(conn.phase, Phase::Closed);
    }
}
