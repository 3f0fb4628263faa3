//! Receiver Engine: reassembly window, ACK policy, and in-order flush to
//! the output file.

use std::io::Write;

use tracing::{debug, trace};

use crate::conn::Connection;
use crate::endpoint::Endpoint;
use crate::err::{Error, RecvOutcome};
use crate::segment::{Segment, SegmentKind, ACK, DATA_SIZE};
use crate::MAX_WINDOW_SIZE;

/// Fixed `MAX_WINDOW_SIZE`-slot reassembly buffer. Slot `k` holds the
/// 512-byte payload of sequence `last_flushed_seq + k`, plus a present-bit
/// (modeled here as `Option`).
pub struct ReassemblyWindow {
    slots: [Option<[u8; DATA_SIZE]>; MAX_WINDOW_SIZE],
    last_flushed_seq: u32,
}

impl ReassemblyWindow {
    pub fn new() -> Self {
        ReassemblyWindow {
            slots: [None; MAX_WINDOW_SIZE],
            last_flushed_seq: 0,
        }
    }

    pub fn last_flushed_seq(&self) -> u32 {
        self.last_flushed_seq
    }

    /// Store a data segment's payload if its sequence falls within
    /// `[last_flushed_seq, last_flushed_seq + MAX_WINDOW_SIZE)`. Out-of-window
    /// payloads (too old or too far ahead) are silently dropped.
    pub fn store(&mut self, seq: u32, payload: [u8; DATA_SIZE]) {
        let b = self.last_flushed_seq;
        if seq >= b && seq < b.wrapping_add(MAX_WINDOW_SIZE as u32) {
            self.slots[(seq - b) as usize] = Some(payload);
        }
    }

    /// Whether this `seq` should be ACKed: anything not so far ahead of the
    /// window that the receiver has no room to buffer it. This natural
    /// back-pressure test deliberately compares against
    /// `last_flushed_seq + MAX_WINDOW_SIZE`, not current slot occupancy, so
    /// duplicates already inside (or below) the window are ACKed too.
    pub fn should_ack(&self, seq: u32) -> bool {
        seq < self.last_flushed_seq.wrapping_add(MAX_WINDOW_SIZE as u32)
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    fn present_prefix_len(&self) -> usize {
        self.slots.iter().take_while(|s| s.is_some()).count()
    }

    /// Flush the contiguous present-prefix to a byte buffer. When
    /// `trim_final` is set (the FIN-triggered flush), trailing zero bytes
    /// of the last populated slot are trimmed, since the sender zero-pads
    /// its final segment; intermediate flushes never trim. All
    /// `MAX_WINDOW_SIZE` slots are cleared regardless of how much of the
    /// window was actually present, matching the original.
    pub fn flush(&mut self, trim_final: bool) -> Vec<u8> {
        let p = self.present_prefix_len();
        let mut bytes = Vec::with_capacity(p * DATA_SIZE);
        for slot in self.slots.iter().take(p) {
            bytes.extend_from_slice(slot.as_ref().expect("within present prefix"));
        }

        if trim_final && p > 0 {
            let last_slot_start = (p - 1) * DATA_SIZE;
            let mut end = bytes.len();
            while end > last_slot_start && bytes[end - 1] == 0 {
                end -= 1;
            }
            bytes.truncate(end);
        }

        self.slots = [None; MAX_WINDOW_SIZE];
        self.last_flushed_seq = self.last_flushed_seq.wrapping_add(p as u32);

        bytes
    }
}

impl Default for ReassemblyWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the ingress loop to completion: dispatch on each segment's
/// [`SegmentKind`], flush full windows as they fill, and exit once a FIN
/// has been handled and its final flush written.
pub fn run<W: Write>(ep: &Endpoint, conn: &mut Connection, out: &mut W) -> Result<(), Error> {
    let mut window = ReassemblyWindow::new();

    loop {
        let (from, outcome) = ep.recv()?;
        let seg = match outcome {
            RecvOutcome::Timeout => continue,
            RecvOutcome::ChecksumFailed => continue,
            RecvOutcome::Ok(seg) => seg,
        };

        match seg.classify() {
            SegmentKind::SetupReq => {
                debug!(peer = %from, "received SYN");
                conn.accept_setup(ep, from)?;
            }
            SegmentKind::TeardownReq => {
                debug!(peer = %from, "received FIN");
                conn.accept_teardown(ep, from)?;
                let bytes = window.flush(true);
                out.write_all(&bytes).map_err(|e| Error::FileWrite {
                    path: "<output>".to_string(),
                    source: e,
                })?;
                break;
            }
            SegmentKind::Data { seq, payload } => {
                window.store(seq, payload);

                if window.is_full() {
                    let bytes = window.flush(false);
                    trace!(bytes = bytes.len(), "full-window flush");
                    out.write_all(&bytes).map_err(|e| Error::FileWrite {
                        path: "<output>".to_string(),
                        source: e,
                    })?;
                }

                if window.should_ack(seq) {
                    let ack =
                        Segment::build(conn.local_port, conn.local_port, 0, seq, ACK, b"");
                    ep.send(&ack, from)?;
                }
            }
            SegmentKind::SetupAck | SegmentKind::TeardownAck => {
                // Not expected inbound at a receiver; drop.
            }
        }
    }

    Ok(())
}
