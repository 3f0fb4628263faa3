//! Sender Engine: sliding-window transmit loop with cumulative-prefix
//! advance and go-back-N retransmission.

use std::io::Read;

use tracing::{debug, trace};

use crate::conn::Connection;
use crate::endpoint::Endpoint;
use crate::err::{Error, RecvOutcome};
use crate::segment::{Segment, ACK, DATA_SIZE};
use crate::MAX_WINDOW_SIZE;

/// Segments staged from the file in one refill; the original reads up to
/// this many segment-widths at a time.
const STAGING_SEGMENTS: usize = 1024;
const STAGING_BYTES: usize = STAGING_SEGMENTS * DATA_SIZE;

/// Run the sliding-window transfer to completion, then tear down the
/// connection. `file` is read sequentially; `bytes_to_xfer` caps how many
/// bytes of it are transmitted.
pub fn run<R: Read>(
    ep: &Endpoint,
    conn: &mut Connection,
    file: &mut R,
    mut bytes_to_xfer: u64,
) -> Result<(), Error> {
    let mut staging = vec![0u8; STAGING_BYTES];
    let mut staging_len = 0usize;
    let mut staging_pos = 0usize;

    let mut seq: u32 = 0;
    let mut window: usize = 1; // slow start

    loop {
        if staging_pos >= staging_len {
            staging_pos = 0;
            staging_len = 0;

            if bytes_to_xfer == 0 {
                break;
            }

            let want = STAGING_BYTES.min(bytes_to_xfer as usize);
            let n = read_fully(file, &mut staging[..want])?;
            if n == 0 {
                break;
            }
            staging_len = n;
            bytes_to_xfer -= n as u64;
        }

        let remaining = staging_len - staging_pos;
        let segments_left = remaining.div_ceil(DATA_SIZE);
        let n = window.min(segments_left);

        let delivered = send_and_collect_acks(ep, conn, seq, &staging[staging_pos..staging_len], n)?;

        if delivered == window {
            window = MAX_WINDOW_SIZE.min(window + 2);
        } else {
            window = 1.max(window / 2);
        }

        seq += delivered as u32;
        let advanced = (delivered * DATA_SIZE).min(remaining);
        staging_pos += advanced;

        trace!(seq, window, delivered, "burst complete");
    }

    conn.teardown_as_sender(ep)
}

/// One inner burst: build and transmit `n` segments starting at `seq`,
/// collect up to `n` ACKs, and return the length of the contiguous
/// acknowledged prefix (the go-back-N "delivered" count).
fn send_and_collect_acks(
    ep: &Endpoint,
    conn: &Connection,
    seq: u32,
    data: &[u8],
    n: usize,
) -> Result<usize, Error> {
    for i in 0..n {
        let start = i * DATA_SIZE;
        let end = (start + DATA_SIZE).min(data.len());
        let seg = Segment::build(
            conn.local_port,
            conn.peer.port(),
            seq + i as u32,
            0,
            0,
            &data[start..end],
        );
        ep.send(&seg, conn.peer)?;
    }
    debug!(seq, n, "burst sent");

    let mut acked = vec![false; n];
    let mut collected = 0;
    while collected < n {
        let (_, outcome) = ep.recv_bounded()?;
        match outcome {
            RecvOutcome::Timeout => break,
            RecvOutcome::ChecksumFailed => continue,
            RecvOutcome::Ok(segment) => {
                // Read the ack flag/number directly rather than through
                // classify(): a bare-ACK segment classifies as Data there,
                // since the tagged enum only distinguishes the five kinds
                // the wider protocol defines.
                if segment.flags == ACK {
                    let local = segment.ack_number.wrapping_sub(seq);
                    if (local as usize) < n {
                        acked[local as usize] = true;
                        collected += 1;
                        continue;
                    }
                }
                // Out-of-range ACK, or traffic that isn't an ACK at all:
                // silently retried, doesn't count against the budget.
            }
        }
    }

    Ok(acked.iter().take_while(|&&b| b).count())
}

/// Fill `buf` from `file` until full or EOF, returning the number of bytes
/// actually read (mirrors `fread`'s short-read-at-EOF behavior).
fn read_fully<R: Read>(file: &mut R, buf: &mut [u8]) -> Result<usize, Error> {
    let mut total = 0;
    while total < buf.len() {
        let n = file
            .read(&mut buf[total..])
            .map_err(|e| Error::FileRead {
                path: "<input>".to_string(),
                source: e,
            })?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::Phase;
    use crate::segment::SegmentKind;
    use std::io::Cursor;
    use std::net::{SocketAddr, UdpSocket};

    fn bound() -> (Endpoint, SocketAddr) {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = sock.local_addr().unwrap();
        (Endpoint::new(sock), addr)
    }

    #[test]
    fn go_back_n_delivers_only_the_contiguous_prefix() {
        // Drive send_and_collect_acks directly against a scripted peer that
        // ACKs slots 0,1,3,4 of a 5-segment burst but drops the ACK for 2:
        // the contiguous prefix stops there, so only 2 should be delivered.
        let (sender_ep, sender_addr) = bound();
        let (receiver_ep, receiver_addr) = bound();
        let mut conn = Connection::new(sender_addr.port(), receiver_addr);
        conn.phase = Phase::Open;

        let data = vec![7u8; DATA_SIZE * 5];

        let handle = std::thread::spawn(move || {
            for _ in 0..5 {
                let (from, outcome) = receiver_ep.recv_bounded().unwrap();
                let seg = match outcome {
                    RecvOutcome::Ok(seg) => seg,
                    other => panic!("expected data segment, got {other:?}"),
                };
                let SegmentKind::Data { seq, .. } = seg.classify() else {
                    panic!("expected data segment")
                };
                if seq == 2 {
                    continue; // drop this one
                }
                let ack = Segment::build(0, 0, 0, seq, crate::segment::ACK, b"");
                receiver_ep.send(&ack, from).unwrap();
            }
        });

        let delivered = send_and_collect_acks(&sender_ep, &conn, 0, &data, 5).unwrap();
        handle.join().unwrap();

        assert_eq!(delivered, 2);
    }

    #[test]
    fn run_transfers_the_requested_prefix_over_loopback() {
        let (sender_ep, sender_addr) = bound();
        let (receiver_ep, receiver_addr) = bound();

        let payload = b"the quick brown fox jumps over the lazy dog".to_vec();
        let to_send = payload.clone();

        let handle = std::thread::spawn(move || {
            let mut received = Vec::new();
            loop {
                let (from, outcome) = receiver_ep.recv().unwrap();
                let seg = match outcome {
                    RecvOutcome::Ok(seg) => seg,
                    _ => continue,
                };
                match seg.classify() {
                    SegmentKind::Data { seq, payload } => {
                        received.push((seq, payload));
                        let ack = Segment::build(0, 0, 0, seq, crate::segment::ACK, b"");
                        receiver_ep.send(&ack, from).unwrap();
                    }
                    SegmentKind::TeardownReq => {
                        let fin_ack =
                            Segment::build(0, 0, 0, 0, crate::segment::FIN | crate::segment::ACK, b"");
                        receiver_ep.send(&fin_ack, from).unwrap();
                        break;
                    }
                    _ => {}
                }
            }
            received.sort_by_key(|(seq, _)| *seq);
            let mut bytes = Vec::new();
            for (_, payload) in received {
                bytes.extend_from_slice(&payload);
            }
            bytes.truncate(to_send.len());
            bytes
        });

        let mut conn = Connection::new(sender_addr.port(), receiver_addr);
        conn.phase = crate::conn::Phase::Open;
        let mut cursor = Cursor::new(payload.clone());
        run(&sender_ep, &mut conn, &mut cursor, payload.len() as u64).unwrap();

        let received = handle.join().unwrap();
        assert_eq!(received, payload);
    }
}
