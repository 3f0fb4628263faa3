//! Fixed-layout wire segment: header fields, checksum, and flag-byte
//! dispatch. This is the sole place wire bytes and the tagged [`SegmentKind`]
//! meet; everything above this layer matches on `SegmentKind`, never on raw
//! flag bits.

/// Size of the data region carried by every segment, present at full width
/// even when mostly zero-padded.
pub const DATA_SIZE: usize = 512;

/// Sum of the six fixed header field widths (2+2+4+4+1+1+2), matching
/// `head_len` in the original layout.
pub const HEAD_LEN: u8 = 16;

/// Total on-wire size of one segment.
pub const WIRE_SIZE: usize = HEAD_LEN as usize + DATA_SIZE;

pub const FIN: u8 = 0x01;
pub const SYN: u8 = 0x02;
pub const RST: u8 = 0x04;
pub const PSH: u8 = 0x08;
pub const ACK: u8 = 0x10;
pub const URG: u8 = 0x20;
pub const ECE: u8 = 0x40;
pub const CWR: u8 = 0x80;

/// One fixed-size on-wire message: header plus a full 512-byte data region.
///
/// Numeric fields are transmitted in host-native byte order; this protocol
/// is only interoperable with another instance of itself.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub source_port: u16,
    pub dest_port: u16,
    pub seq_number: u32,
    pub ack_number: u32,
    pub head_len: u8,
    pub flags: u8,
    pub checksum: u16,
    pub data: [u8; DATA_SIZE],
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("source_port", &self.source_port)
            .field("dest_port", &self.dest_port)
            .field("seq_number", &self.seq_number)
            .field("ack_number", &self.ack_number)
            .field("head_len", &self.head_len)
            .field("flags", &format_args!("{:#04x}", self.flags))
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

/// Flag-byte dispatch, centralized here: every caller above this module
/// matches on `SegmentKind`, never on `flags` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    SetupReq,
    SetupAck,
    TeardownReq,
    TeardownAck,
    Data { seq: u32, payload: [u8; DATA_SIZE] },
}

impl Segment {
    /// Build a segment, zeroing and then filling the data region, setting
    /// `head_len`, and computing the checksum over the fully populated
    /// segment. Total.
    pub fn build(
        source_port: u16,
        dest_port: u16,
        seq_number: u32,
        ack_number: u32,
        flags: u8,
        payload: &[u8],
    ) -> Segment {
        let mut data = [0u8; DATA_SIZE];
        let n = payload.len().min(DATA_SIZE);
        data[..n].copy_from_slice(&payload[..n]);

        let mut seg = Segment {
            source_port,
            dest_port,
            seq_number,
            ack_number,
            head_len: HEAD_LEN,
            flags,
            checksum: 0,
            data,
        };
        seg.checksum = seg.compute_checksum();
        seg
    }

    /// 16-bit one's-complement fold over every other field. Each data byte
    /// is sign-extended before accumulation, matching the original's
    /// `signed char` summation — a faithful port must do the same or
    /// checksums will disagree with a peer running the C original.
    fn compute_checksum(&self) -> u16 {
        let mut sum: u32 = 0;
        sum = sum.wrapping_add(self.source_port as u32);
        sum = sum.wrapping_add(self.dest_port as u32);
        sum = sum.wrapping_add(self.seq_number);
        sum = sum.wrapping_add(self.ack_number);
        sum = sum.wrapping_add(self.head_len as u32);
        sum = sum.wrapping_add(self.flags as u32);

        for &byte in &self.data {
            let signed = byte as i8 as i32;
            sum = sum.wrapping_add(signed as u32);
        }

        sum = (sum & 0xFFFF).wrapping_add(sum >> 16);
        !(sum as u16)
    }

    /// Recompute the checksum and compare to the stored field. The checksum
    /// field itself is excluded from the sum, so recomputing with it intact
    /// is equivalent to zeroing it first.
    pub fn verify(&self) -> bool {
        self.compute_checksum() == self.checksum
    }

    /// Dispatch on `flags` into the tagged enum. Any flag byte not matching
    /// a known combination (including 0, and a bare `ACK` with no `SYN`/`FIN`
    /// set) is treated as a data segment; the sender's burst ACKs are read
    /// via `flags`/`ack_number` directly rather than through this dispatch.
    pub fn classify(&self) -> SegmentKind {
        match self.flags {
            SYN => SegmentKind::SetupReq,
            f if f == SYN | ACK => SegmentKind::SetupAck,
            FIN => SegmentKind::TeardownReq,
            f if f == FIN | ACK => SegmentKind::TeardownAck,
            _ => SegmentKind::Data {
                seq: self.seq_number,
                payload: self.data,
            },
        }
    }

    /// Encode into the fixed wire layout: the declared header fields
    /// followed by the full data region, native byte order.
    pub fn to_wire(&self) -> [u8; WIRE_SIZE] {
        let mut buf = [0u8; WIRE_SIZE];
        let mut off = 0;

        macro_rules! put {
            ($val:expr) => {{
                let bytes = $val.to_ne_bytes();
                buf[off..off + bytes.len()].copy_from_slice(&bytes);
                off += bytes.len();
            }};
        }

        put!(self.source_port);
        put!(self.dest_port);
        put!(self.seq_number);
        put!(self.ack_number);
        put!(self.head_len);
        put!(self.flags);
        put!(self.checksum);
        buf[off..off + DATA_SIZE].copy_from_slice(&self.data);

        buf
    }

    /// Decode a wire buffer back into a `Segment`. Returns `None` if the
    /// buffer is not exactly `WIRE_SIZE` bytes; the codec performs no other
    /// validation (no port or flag checks).
    pub fn from_wire(buf: &[u8]) -> Option<Segment> {
        if buf.len() != WIRE_SIZE {
            return None;
        }

        let mut off = 0;

        macro_rules! take {
            ($ty:ty) => {{
                let size = std::mem::size_of::<$ty>();
                let mut tmp = [0u8; std::mem::size_of::<$ty>()];
                tmp.copy_from_slice(&buf[off..off + size]);
                off += size;
                <$ty>::from_ne_bytes(tmp)
            }};
        }

        let source_port = take!(u16);
        let dest_port = take!(u16);
        let seq_number = take!(u32);
        let ack_number = take!(u32);
        let head_len = take!(u8);
        let flags = take!(u8);
        let checksum = take!(u16);

        let mut data = [0u8; DATA_SIZE];
        data.copy_from_slice(&buf[off..off + DATA_SIZE]);

        Some(Segment {
            source_port,
            dest_port,
            seq_number,
            ack_number,
            head_len,
            flags,
            checksum,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_produces_a_verifiable_segment() {
        let seg = Segment::build(1, 2, 0, 0, SYN, b"hello");
        assert!(seg.verify());
        assert_eq!(seg.head_len, HEAD_LEN);
    }

    #[test]
    fn flipping_any_header_bit_breaks_verification() {
        let seg = Segment::build(1, 2, 42, 7, ACK, b"payload");
        assert!(seg.verify());

        let mut broken = seg;
        broken.seq_number ^= 1;
        assert!(!broken.verify());

        let mut broken = seg;
        broken.flags ^= 1;
        assert!(!broken.verify());

        let mut broken = seg;
        broken.ack_number ^= 1;
        assert!(!broken.verify());
    }

    #[test]
    fn flipping_a_data_byte_breaks_verification() {
        let seg = Segment::build(1, 2, 0, 0, 0, b"payload");
        let mut broken = seg;
        broken.data[3] ^= 0xFF;
        assert!(!broken.verify());
    }

    #[test]
    fn wire_round_trip_preserves_every_field() {
        let seg = Segment::build(111, 222, 999, 888, PSH | ACK, b"round trip me");
        let wire = seg.to_wire();
        let decoded = Segment::from_wire(&wire).unwrap();
        assert_eq!(seg, decoded);
        assert!(decoded.verify());
    }

    #[test]
    fn from_wire_rejects_wrong_length() {
        assert!(Segment::from_wire(&[0u8; 10]).is_none());
    }

    #[test]
    fn classify_maps_flag_bytes_to_tags() {
        assert_eq!(
            Segment::build(0, 0, 0, 0, SYN, &[]).classify(),
            SegmentKind::SetupReq
        );
        assert_eq!(
            Segment::build(0, 0, 0, 0, SYN | ACK, &[]).classify(),
            SegmentKind::SetupAck
        );
        assert_eq!(
            Segment::build(0, 0, 0, 0, FIN, &[]).classify(),
            SegmentKind::TeardownReq
        );
        assert_eq!(
            Segment::build(0, 0, 0, 0, FIN | ACK, &[]).classify(),
            SegmentKind::TeardownAck
        );

        match Segment::build(0, 0, 7, 0, 0, b"abc").classify() {
            SegmentKind::Data { seq, payload } => {
                assert_eq!(seq, 7);
                assert_eq!(&payload[..3], b"abc");
            }
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[test]
    fn a_bare_ack_segment_with_no_syn_or_fin_classifies_as_data() {
        match Segment::build(0, 0, 9, 5, ACK, &[]).classify() {
            SegmentKind::Data { seq, .. } => assert_eq!(seq, 9),
            other => panic!("expected Data, got {other:?}"),
        }
    }
}
