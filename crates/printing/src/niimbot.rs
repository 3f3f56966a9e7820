//! NiiMBot label printer framing.
//!
//! Every frame is `55 55 | cmd | len | payload | xor | AA AA`, where `xor`
//! covers `cmd`, `len` and the payload.

use serde::{Deserialize, Serialize};

const HEAD: [u8; 2] = [0x55, 0x55];
const TAIL: [u8; 2] = [0xAA, 0xAA];
/// Head, cmd, len, checksum, tail.
const FRAME_OVERHEAD: usize = 7;

pub mod command {
    pub const PRINT_START: u8 = 0x01;
    pub const PAGE_START: u8 = 0x03;
    pub const SET_PAGE_SIZE: u8 = 0x13;
    pub const SET_DENSITY: u8 = 0x21;
    pub const SET_LABEL_TYPE: u8 = 0x23;
    pub const EMPTY_ROW: u8 = 0x84;
    pub const BITMAP_ROW: u8 = 0x85;
    pub const PRINT_STATUS: u8 = 0xA3;
    pub const CONNECT: u8 = 0xC1;
    pub const HEARTBEAT: u8 = 0xDC;
    pub const PAGE_END: u8 = 0xE3;
    pub const PRINT_END: u8 = 0xF3;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("payload of {0} bytes exceeds 255")]
    PayloadTooLong(usize),

    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("bad frame head")]
    BadHead,

    #[error("bad frame tail")]
    BadTail,

    #[error("length mismatch: header says {declared}, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    cmd: u8,
    payload: Vec<u8>,
}

fn checksum(cmd: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(cmd ^ payload.len() as u8, |acc, b| acc ^ b)
}

impl Packet {
    pub fn new(cmd: u8, payload: Vec<u8>) -> Result<Self, PacketError> {
        if payload.len() > u8::MAX as usize {
            return Err(PacketError::PayloadTooLong(payload.len()));
        }
        Ok(Self { cmd, payload })
    }

    fn single(cmd: u8, value: u8) -> Self {
        Self {
            cmd,
            payload: vec![value],
        }
    }

    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + FRAME_OVERHEAD);
        out.extend_from_slice(&HEAD);
        out.push(self.cmd);
        out.push(self.payload.len() as u8);
        out.extend_from_slice(&self.payload);
        out.push(checksum(self.cmd, &self.payload));
        out.extend_from_slice(&TAIL);
        out
    }

    pub fn decode(frame: &[u8]) -> Result<Self, PacketError> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(PacketError::TooShort(frame.len()));
        }
        if frame[..2] != HEAD {
            return Err(PacketError::BadHead);
        }
        if frame[frame.len() - 2..] != TAIL {
            return Err(PacketError::BadTail);
        }
        let cmd = frame[2];
        let declared = frame[3] as usize;
        let actual = frame.len() - FRAME_OVERHEAD;
        if declared != actual {
            return Err(PacketError::LengthMismatch { declared, actual });
        }
        let payload = frame[4..4 + declared].to_vec();
        let expected = checksum(cmd, &payload);
        let got = frame[4 + declared];
        if expected != got {
            return Err(PacketError::ChecksumMismatch {
                expected,
                actual: got,
            });
        }
        Ok(Self { cmd, payload })
    }

    pub fn connect() -> Self {
        Self::single(command::CONNECT, 0x01)
    }

    pub fn heartbeat() -> Self {
        Self::single(command::HEARTBEAT, 0x01)
    }

    pub fn set_density(density: u8) -> Self {
        Self::single(command::SET_DENSITY, density)
    }

    pub fn set_label_type(label_type: u8) -> Self {
        Self::single(command::SET_LABEL_TYPE, label_type)
    }

    pub fn print_start() -> Self {
        Self::single(command::PRINT_START, 0x01)
    }

    pub fn page_start() -> Self {
        Self::single(command::PAGE_START, 0x01)
    }

    /// Rows, columns and copies, each big-endian u16.
    pub fn set_page_size(rows: u16, cols: u16, copies: u16) -> Self {
        let mut payload = Vec::with_capacity(6);
        payload.extend_from_slice(&rows.to_be_bytes());
        payload.extend_from_slice(&cols.to_be_bytes());
        payload.extend_from_slice(&copies.to_be_bytes());
        Self {
            cmd: command::SET_PAGE_SIZE,
            payload,
        }
    }

    /// `repeat` blank rows starting at `row`.
    pub fn empty_row(row: u16, repeat: u8) -> Self {
        let [hi, lo] = row.to_be_bytes();
        Self {
            cmd: command::EMPTY_ROW,
            payload: vec![hi, lo, repeat],
        }
    }

    /// Row index, three black-pixel counts, repeat, then the packed row.
    pub fn bitmap_row(row: u16, bytes: &[u8]) -> Result<Self, PacketError> {
        let mut payload = Vec::with_capacity(bytes.len() + 6);
        payload.extend_from_slice(&row.to_be_bytes());
        payload.extend_from_slice(&pixel_counts(bytes));
        payload.push(1);
        payload.extend_from_slice(bytes);
        Self::new(command::BITMAP_ROW, payload)
    }

    pub fn page_end() -> Self {
        Self::single(command::PAGE_END, 0x01)
    }

    pub fn print_end() -> Self {
        Self::single(command::PRINT_END, 0x01)
    }

    pub fn print_status() -> Self {
        Self::single(command::PRINT_STATUS, 0x01)
    }
}

/// Black pixels in each third of the row, saturating at 255.
fn pixel_counts(bytes: &[u8]) -> [u8; 3] {
    let chunk = bytes.len().div_ceil(3).max(1);
    let mut counts = [0u8; 3];
    for (slot, part) in counts.iter_mut().zip(bytes.chunks(chunk)) {
        let ones: u32 = part.iter().map(|b| b.count_ones()).sum();
        *slot = ones.min(u8::MAX as u32) as u8;
    }
    counts
}

/// Splits a notification byte stream into frames.
#[derive(Debug, Default)]
pub struct PacketReader {
    buffer: Vec<u8>,
}

impl PacketReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete frame, skipping garbage before a frame head.
    /// `None` means more bytes are needed.
    pub fn next_packet(&mut self) -> Option<Result<Packet, PacketError>> {
        let start = self.buffer.windows(2).position(|w| w == HEAD);
        match start {
            Some(start) => {
                self.buffer.drain(..start);
            }
            None => {
                // Keep a trailing 0x55 that may start the next head.
                let keep = usize::from(self.buffer.last() == Some(&HEAD[0]));
                let drop = self.buffer.len() - keep;
                self.buffer.drain(..drop);
                return None;
            }
        }

        if self.buffer.len() < 4 {
            return None;
        }
        let total = self.buffer[3] as usize + FRAME_OVERHEAD;
        if self.buffer.len() < total {
            return None;
        }
        let frame: Vec<u8> = self.buffer.drain(..total).collect();
        Some(Packet::decode(&frame))
    }

    pub fn drain_packets(&mut self) -> Vec<Result<Packet, PacketError>> {
        std::iter::from_fn(|| self.next_packet()).collect()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("label must be at least 1x1 pixels")]
    Empty,

    #[error("row {row} has {actual} bytes, expected {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("label is too large: {0}")]
    TooLarge(String),

    #[error("density must be between 1 and 5, got {0}")]
    InvalidDensity(u8),

    #[error("copies must be at least 1")]
    InvalidCopies,

    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// 1-bit label image, row-major, most significant bit leftmost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelBitmap {
    width: u16,
    rows: Vec<Vec<u8>>,
}

impl LabelBitmap {
    pub fn blank(width: u16, height: u16) -> Result<Self, LabelError> {
        if width == 0 || height == 0 {
            return Err(LabelError::Empty);
        }
        let row_bytes = (width as usize).div_ceil(8);
        Ok(Self {
            width,
            rows: vec![vec![0; row_bytes]; height as usize],
        })
    }

    pub fn from_rows(width: u16, rows: Vec<Vec<u8>>) -> Result<Self, LabelError> {
        if width == 0 || rows.is_empty() {
            return Err(LabelError::Empty);
        }
        if rows.len() > u16::MAX as usize {
            return Err(LabelError::TooLarge(format!("{} rows", rows.len())));
        }
        let expected = (width as usize).div_ceil(8);
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(LabelError::RowLength {
                row,
                expected,
                actual: r.len(),
            });
        }
        Ok(Self { width, rows })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.rows.len() as u16
    }

    pub fn row(&self, y: usize) -> Option<&[u8]> {
        self.rows.get(y).map(Vec::as_slice)
    }

    pub fn set(&mut self, x: u16, y: u16, on: bool) {
        if x >= self.width {
            return;
        }
        if let Some(row) = self.rows.get_mut(y as usize) {
            let mask = 0x80u8 >> (x % 8);
            let byte = &mut row[(x / 8) as usize];
            if on {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }

    pub fn get(&self, x: u16, y: u16) -> bool {
        x < self.width
            && self
                .rows
                .get(y as usize)
                .is_some_and(|row| row[(x / 8) as usize] & (0x80 >> (x % 8)) != 0)
    }

    fn is_blank(&self, y: usize) -> bool {
        self.rows[y].iter().all(|b| *b == 0)
    }
}

/// Full packet sequence for one print job, ready to be written in order.
pub fn label_job(
    bitmap: &LabelBitmap,
    density: u8,
    label_type: u8,
    copies: u16,
) -> Result<Vec<Packet>, LabelError> {
    if !(1..=5).contains(&density) {
        return Err(LabelError::InvalidDensity(density));
    }
    if copies == 0 {
        return Err(LabelError::InvalidCopies);
    }

    let mut packets = vec![
        Packet::set_density(density),
        Packet::set_label_type(label_type),
        Packet::print_start(),
        Packet::page_start(),
        Packet::set_page_size(bitmap.height(), bitmap.width(), copies),
    ];

    let height = bitmap.rows.len();
    let mut y = 0;
    while y < height {
        if bitmap.is_blank(y) {
            let mut run = 1;
            while y + run < height && run < u8::MAX as usize && bitmap.is_blank(y + run) {
                run += 1;
            }
            packets.push(Packet::empty_row(y as u16, run as u8));
            y += run;
        } else {
            packets.push(Packet::bitmap_row(y as u16, &bitmap.rows[y])?);
            y += 1;
        }
    }

    packets.push(Packet::page_end());
    packets.push(Packet::print_end());
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_a_frame() {
        let bytes = Packet::set_density(3).encode();
        assert_eq!(bytes, vec![0x55, 0x55, 0x21, 0x01, 0x03, 0x21 ^ 0x01 ^ 0x03, 0xAA, 0xAA]);
    }

    #[test]
    fn decode_reports_each_failure() {
        let good = Packet::heartbeat().encode();

        assert_eq!(Packet::decode(&good[..5]), Err(PacketError::TooShort(5)));

        let mut bad = good.clone();
        bad[0] = 0x00;
        assert_eq!(Packet::decode(&bad), Err(PacketError::BadHead));

        let mut bad = good.clone();
        bad[7] = 0x00;
        assert_eq!(Packet::decode(&bad), Err(PacketError::BadTail));

        let mut bad = good.clone();
        bad[3] = 2;
        assert_eq!(
            Packet::decode(&bad),
            Err(PacketError::LengthMismatch {
                declared: 2,
                actual: 1
            })
        );

        let mut bad = good.clone();
        bad[4] ^= 0xFF;
        assert!(matches!(Packet::decode(&bad), Err(PacketError::ChecksumMismatch { .. })));
    }

    #[test]
    fn payload_is_limited_to_255_bytes() {
        assert!(Packet::new(0x85, vec![0; 255]).is_ok());
        assert_eq!(Packet::new(0x85, vec![0; 256]), Err(PacketError::PayloadTooLong(256)));
    }

    #[test]
    fn reader_splits_stream_and_skips_noise() {
        let mut stream = vec![0x00, 0x13];
        stream.extend(Packet::print_status().encode());
        stream.extend(Packet::connect().encode());

        let mut reader = PacketReader::new();
        reader.push(&stream[..6]);
        assert!(reader.next_packet().is_none());
        reader.push(&stream[6..]);

        let packets: Vec<Packet> = reader.drain_packets().into_iter().map(Result::unwrap).collect();
        assert_eq!(packets, vec![Packet::print_status(), Packet::connect()]);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn bitmap_bits_are_msb_first() {
        let mut bmp = LabelBitmap::blank(12, 2).unwrap();
        bmp.set(0, 0, true);
        bmp.set(9, 1, true);
        assert_eq!(bmp.row(0), Some(&[0x80, 0x00][..]));
        assert_eq!(bmp.row(1), Some(&[0x00, 0x40][..]));
        assert!(bmp.get(9, 1));
        assert!(!bmp.get(8, 1));

        assert_eq!(
            LabelBitmap::from_rows(12, vec![vec![0, 0], vec![0]]),
            Err(LabelError::RowLength {
                row: 1,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn label_job_compresses_blank_rows() {
        let mut bmp = LabelBitmap::blank(16, 6).unwrap();
        bmp.set(3, 2, true);

        let packets = label_job(&bmp, 3, 1, 2).unwrap();
        let cmds: Vec<u8> = packets.iter().map(Packet::cmd).collect();
        assert_eq!(
            cmds,
            vec![
                command::SET_DENSITY,
                command::SET_LABEL_TYPE,
                command::PRINT_START,
                command::PAGE_START,
                command::SET_PAGE_SIZE,
                command::EMPTY_ROW,
                command::BITMAP_ROW,
                command::EMPTY_ROW,
                command::PAGE_END,
                command::PRINT_END,
            ]
        );
        assert_eq!(packets[4].payload(), &[0, 6, 0, 16, 0, 2]);
        assert_eq!(packets[5].payload(), &[0, 0, 2]);
        assert_eq!(packets[6].payload(), &[0, 2, 1, 0, 0, 1, 0x10, 0x00]);
        assert_eq!(packets[7].payload(), &[0, 3, 3]);
    }

    #[test]
    fn label_job_validates_settings() {
        let bmp = LabelBitmap::blank(8, 1).unwrap();
        assert_eq!(label_job(&bmp, 0, 1, 1), Err(LabelError::InvalidDensity(0)));
        assert_eq!(label_job(&bmp, 3, 1, 0), Err(LabelError::InvalidCopies));
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(cmd in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..=255)) {
            let packet = Packet::new(cmd, payload).unwrap();
            prop_assert_eq!(Packet::decode(&packet.encode()), Ok(packet));
        }
    }
}
