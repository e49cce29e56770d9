//! Variable width LZW decompression for GIF image data
//!
//! Codes are packed least significant bit first with no byte alignment. The
//! code table deliberately grows the way long deployed GIF decoders grow it
//! instead of the way GIF89a describes: streams in the wild are tuned to
//! that behavior, so changing it changes the decoded pixels.

use thiserror::Error;
use tracing::{trace, warn};

/// Code type
pub type Code = u16;

/// Widest start code size a [`Code`] can hold
pub const MAX_START_CODE_SIZE: u8 = 16;

/// Table length at which growth stops.
///
/// Twelve bit codes could address 4096 entries, but the last slot is never
/// filled, and neither the "new code" case nor ordinary growth may create it.
/// Start sizes of 13 bits or more begin at or above the limit, so their table
/// never grows.
pub const TABLE_GROWTH_LIMIT: usize = 4095;

/// Recoverable problems found while decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Anomaly {
    #[error("Ignoring unexpected code {code} (table has {table_len} entries)")]
    InvalidCode { code: Code, table_len: usize },

    #[error("LZW without end code")]
    MissingEndCode,

    /// Start size of zero, or too wide for a [`Code`]; nothing is decoded
    #[error("Unsupported LZW start code size {0}")]
    UnsupportedCodeSize(u8),
}

/// Best effort output of [`decode`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Color table indices in stream order
    pub indices: Vec<u16>,
    pub anomalies: Vec<Anomaly>,
}

/// Decompress `data`, starting with `start_code_size` bit codes.
///
/// Never fails: out of range codes are skipped and a stream without an end
/// code returns what was decoded up to the end of the input. Both are listed
/// in [`Decoded::anomalies`]. A `start_code_size` outside
/// `1..=MAX_START_CODE_SIZE` decodes nothing and is reported the same way.
pub fn decode(data: &[u8], start_code_size: u8) -> Decoded {
    let mut decoded = Decoded::default();
    if !(1..=MAX_START_CODE_SIZE).contains(&start_code_size) {
        let anomaly = Anomaly::UnsupportedCodeSize(start_code_size);
        warn!("{}", anomaly);
        decoded.anomalies.push(anomaly);
        return decoded;
    }

    let mut decoder = Decoder::new(start_code_size);
    let mut reader = CodeReader::new(data);

    loop {
        let Some(code) = reader.read(decoder.code_size()) else {
            warn!("LZW without end code");
            decoded.anomalies.push(Anomaly::MissingEndCode);
            return decoded;
        };

        match decoder.push(code, &mut decoded.indices) {
            Ok(Step::End) => return decoded,
            Ok(Step::Continue) => {}
            Err(anomaly) => {
                warn!("{}", anomaly);
                decoded.anomalies.push(anomaly);
            }
        }
    }
}

/// Number of bits needed to write `n`
fn bit_width(n: usize) -> u8 {
    (usize::BITS - n.leading_zeros()) as u8
}

/// Reads codes of varying width, least significant bit first
struct CodeReader<'a> {
    data: &'a [u8],
    buffer: u32,
    n_bits: u8,
}

impl<'a> CodeReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            buffer: 0,
            n_bits: 0,
        }
    }

    /// Read one code, `None` once fewer than `size` bits remain
    fn read(&mut self, size: u8) -> Option<Code> {
        while self.n_bits < size {
            let (&byte, rest) = self.data.split_first()?;
            self.data = rest;
            self.buffer |= u32::from(byte) << self.n_bits;
            self.n_bits += 8;
        }
        let code = (self.buffer & ((1 << size) - 1)) as Code;
        self.buffer >>= size;
        self.n_bits -= size;
        Some(code)
    }
}

/// Table entry: a literal `value` appended to the entry at `prefix`
#[derive(Clone, Copy, Debug)]
struct Node {
    prefix: Option<Code>,
    value: u16,
    first: u16,
    len: u16,
}

impl Node {
    fn root(value: u16) -> Self {
        Self {
            prefix: None,
            value,
            first: value,
            len: 1,
        }
    }
}

/// Code table.
///
/// Codes below the clear code are single literals, the clear and end codes
/// follow, and every later code is stored in `nodes`.
#[derive(Debug)]
struct Table {
    clear_code: Code,
    nodes: Vec<Node>,
}

impl Table {
    fn new(start_code_size: u8) -> Self {
        Self {
            clear_code: 1 << (start_code_size - 1),
            nodes: Vec::with_capacity(TABLE_GROWTH_LIMIT),
        }
    }

    fn end_code(&self) -> Code {
        self.clear_code + 1
    }

    fn len(&self) -> usize {
        usize::from(self.clear_code) + 2 + self.nodes.len()
    }

    /// Bits needed to address one entry past the end of the table
    fn code_size(&self) -> u8 {
        bit_width(self.len())
    }

    /// Get a node, `code` must be a literal or an added entry
    fn node(&self, code: Code) -> Node {
        match usize::from(code).checked_sub(usize::from(self.clear_code) + 2) {
            Some(index) => self.nodes[index],
            None => Node::root(code),
        }
    }

    fn first(&self, code: Code) -> u16 {
        self.node(code).first
    }

    /// Add the string of `prefix` followed by `value`
    fn extend(&mut self, prefix: Code, value: u16) {
        let parent = self.node(prefix);
        self.nodes.push(Node {
            prefix: Some(prefix),
            value,
            first: parent.first,
            len: parent.len + 1,
        });
    }

    /// Append the literals of `code` to `out`
    fn emit(&self, code: Code, out: &mut Vec<u16>) {
        let mut node = self.node(code);
        let start = out.len();
        out.resize(start + usize::from(node.len), 0);
        for slot in out[start..].iter_mut().rev() {
            *slot = node.value;
            match node.prefix {
                Some(prefix) => node = self.node(prefix),
                None => break,
            }
        }
    }
}

/// Result of one accepted code
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    End,
}

/// Table driven decoder, fed one code at a time
#[derive(Debug)]
struct Decoder {
    start_code_size: u8,
    table: Table,
    code_size: u8,
    /// Code emitted before the current one, `None` right after a clear
    last: Option<Code>,
}

impl Decoder {
    /// `start_code_size` must be in `1..=MAX_START_CODE_SIZE`
    fn new(start_code_size: u8) -> Self {
        Self {
            start_code_size,
            table: Table::new(start_code_size),
            code_size: start_code_size,
            last: None,
        }
    }

    fn code_size(&self) -> u8 {
        self.code_size
    }

    /// Decode `code`, appending its literals to `out`
    fn push(&mut self, code: Code, out: &mut Vec<u16>) -> Result<Step, Anomaly> {
        if code == self.table.end_code() {
            return Ok(Step::End);
        }

        if code == self.table.clear_code {
            trace!("LZW clear");
            self.table = Table::new(self.start_code_size);
            self.last = None;
        } else if usize::from(code) < self.table.len() {
            self.table.emit(code, out);
            // No entry for the first code after a clear, and none once the
            // table reaches the growth limit.
            if let Some(last) = self.last {
                if self.table.len() < TABLE_GROWTH_LIMIT {
                    let value = self.table.first(code);
                    self.table.extend(last, value);
                }
            }
            self.last = Some(code);
        } else {
            match self.last {
                Some(last)
                    if usize::from(code) == self.table.len()
                        && self.table.len() < TABLE_GROWTH_LIMIT =>
                {
                    let value = self.table.first(last);
                    self.table.extend(last, value);
                    self.table.emit(code, out);
                    self.last = Some(code);
                }
                _ => {
                    return Err(Anomaly::InvalidCode {
                        code,
                        table_len: self.table.len(),
                    })
                }
            }
        }

        self.code_size = self.table.code_size();
        Ok(Step::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct BitWriter {
        bytes: Vec<u8>,
        buffer: u32,
        n_bits: u8,
    }

    impl BitWriter {
        fn write(&mut self, code: Code, size: u8) {
            self.buffer |= u32::from(code) << self.n_bits;
            self.n_bits += size;
            while self.n_bits >= 8 {
                self.bytes.push(self.buffer as u8);
                self.buffer >>= 8;
                self.n_bits -= 8;
            }
        }

        fn finish(mut self) -> Vec<u8> {
            if self.n_bits > 0 {
                self.bytes.push(self.buffer as u8);
            }
            self.bytes
        }
    }

    fn pack(codes: &[Code], size: u8) -> Vec<u8> {
        let mut writer = BitWriter::default();
        for &code in codes {
            writer.write(code, size);
        }
        writer.finish()
    }

    /// Reference encoder whose table and code widths track the decoder above
    struct Encoder {
        clear_code: Code,
        dict: HashMap<Vec<u16>, Code>,
        decoder_len: usize,
        emitted: usize,
        code_size: u8,
        writer: BitWriter,
    }

    impl Encoder {
        fn new(start_code_size: u8) -> Self {
            Self {
                clear_code: 1 << (start_code_size - 1),
                dict: HashMap::new(),
                decoder_len: 0,
                emitted: 0,
                code_size: start_code_size,
                writer: BitWriter::default(),
            }
        }

        fn clear(&mut self) {
            self.writer.write(self.clear_code, self.code_size);
            self.dict = (0..self.clear_code).map(|i| (vec![i], i)).collect();
            self.decoder_len = usize::from(self.clear_code) + 2;
            self.emitted = 0;
            self.code_size = bit_width(self.decoder_len);
        }

        fn emit(&mut self, code: Code) {
            self.writer.write(code, self.code_size);
            self.emitted += 1;
            if self.emitted > 1 && self.decoder_len < TABLE_GROWTH_LIMIT {
                self.decoder_len += 1;
            }
            self.code_size = bit_width(self.decoder_len);
        }

        fn encode(mut self, indices: &[u16], clear_at: Option<usize>) -> Vec<u8> {
            self.clear();
            let mut current: Vec<u16> = Vec::new();
            for (n, &value) in indices.iter().enumerate() {
                if clear_at == Some(n) {
                    if !current.is_empty() {
                        let code = self.dict[&current];
                        self.emit(code);
                        current.clear();
                    }
                    self.clear();
                }
                let mut next = current.clone();
                next.push(value);
                if current.is_empty() || self.dict.contains_key(&next) {
                    current = next;
                    continue;
                }
                let code = self.dict[&current];
                self.emit(code);
                let new_code = self.dict.len() + 2;
                if new_code < TABLE_GROWTH_LIMIT {
                    self.dict.insert(next, new_code as Code);
                }
                current = vec![value];
            }
            if !current.is_empty() {
                let code = self.dict[&current];
                self.emit(code);
            }
            let end_code = self.clear_code + 1;
            let code_size = self.code_size;
            self.writer.write(end_code, code_size);
            self.writer.finish()
        }
    }

    /// Deterministic pseudo random indices below `limit`
    fn noise(len: usize, limit: u16, seed: u32) -> Vec<u16> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                // Short runs keep the dictionary busy with repeats
                ((state >> 16) as u16 % limit) / 2 * 2
            })
            .collect()
    }

    #[test]
    fn single_pixel() {
        let decoded = decode(&[0x44, 0x01], 3);
        assert_eq!(decoded.indices, vec![0]);
        assert!(decoded.anomalies.is_empty());
    }

    #[test]
    fn literal_run_round_trip() {
        let indices: Vec<u16> = (0..16).collect();
        let data = Encoder::new(5).encode(&indices, None);
        assert_eq!(decode(&data, 5), Decoded { indices, anomalies: vec![] });
    }

    #[test]
    fn repeat_run_round_trip() {
        let indices = vec![3; 500];
        let data = Encoder::new(3).encode(&indices, None);
        assert_eq!(decode(&data, 3), Decoded { indices, anomalies: vec![] });
    }

    #[test]
    fn mid_stream_clear_round_trip() {
        let indices = noise(2000, 8, 7);
        let data = Encoder::new(4).encode(&indices, Some(700));
        assert_eq!(decode(&data, 4), Decoded { indices, anomalies: vec![] });
    }

    #[test]
    fn full_table_round_trip() {
        let indices = noise(40_000, 256, 42);
        let data = Encoder::new(9).encode(&indices, None);
        assert_eq!(decode(&data, 9), Decoded { indices, anomalies: vec![] });
    }

    #[test]
    fn self_referential_code() {
        // clear, 1, then the code one past the table end
        let decoded = decode(&pack(&[4, 1, 6, 5], 3), 3);
        assert_eq!(decoded.indices, vec![1, 1, 1]);
        assert!(decoded.anomalies.is_empty());
    }

    #[test]
    fn clear_discards_earlier_entries() {
        let fresh = decode(&pack(&[4, 1, 6, 5], 3), 3);
        let after_clear = decode(&pack(&[4, 1, 2, 4, 1, 6, 5], 3), 3);
        assert_eq!(after_clear.indices[..2], [1, 2]);
        assert_eq!(after_clear.indices[2..], fresh.indices[..]);
        assert!(after_clear.anomalies.is_empty());
    }

    #[test]
    fn clear_resets_code_size() {
        let mut decoder = Decoder::new(3);
        let mut out = vec![];
        for code in [4, 0, 0, 0] {
            assert_eq!(decoder.push(code, &mut out), Ok(Step::Continue));
        }
        assert_eq!(decoder.table.len(), 8);
        assert_eq!(decoder.code_size(), 4);

        assert_eq!(decoder.push(4, &mut out), Ok(Step::Continue));
        assert_eq!(decoder.table.len(), 6);
        assert_eq!(decoder.code_size(), 3);
        assert_eq!(decoder.last, None);
    }

    #[test]
    fn no_growth_after_clear() {
        let mut decoder = Decoder::new(3);
        let mut out = vec![];
        decoder.push(4, &mut out).unwrap();
        decoder.push(2, &mut out).unwrap();
        assert_eq!(decoder.table.len(), 6);
        decoder.push(3, &mut out).unwrap();
        assert_eq!(decoder.table.len(), 7);
        assert_eq!(out, vec![2, 3]);
    }

    #[test]
    fn growth_stops_at_limit() {
        let mut decoder = Decoder::new(3);
        let mut out = vec![];
        decoder.push(4, &mut out).unwrap();
        for _ in 0..5000 {
            assert_eq!(decoder.push(0, &mut out), Ok(Step::Continue));
            assert!(decoder.table.len() <= TABLE_GROWTH_LIMIT);
            assert!(decoder.code_size() <= 12);
        }
        assert_eq!(decoder.table.len(), TABLE_GROWTH_LIMIT);
        assert_eq!(decoder.code_size(), 12);
        assert_eq!(out.len(), 5000);

        assert_eq!(
            decoder.push(4095, &mut out),
            Err(Anomaly::InvalidCode {
                code: 4095,
                table_len: TABLE_GROWTH_LIMIT
            })
        );
        assert_eq!(decoder.table.len(), TABLE_GROWTH_LIMIT);

        // The last entry still decodes, every added entry is [0, 0]
        decoder.push(4094, &mut out).unwrap();
        assert_eq!(out.len(), 5002);
    }

    #[test]
    fn invalid_code_is_skipped() {
        let decoded = decode(&pack(&[4, 7, 1, 5], 3), 3);
        assert_eq!(decoded.indices, vec![1]);
        assert_eq!(
            decoded.anomalies,
            vec![Anomaly::InvalidCode {
                code: 7,
                table_len: 6
            }]
        );
    }

    #[test]
    fn new_code_right_after_clear_is_invalid() {
        let decoded = decode(&pack(&[4, 6, 0, 5], 3), 3);
        assert_eq!(decoded.indices, vec![0]);
        assert_eq!(
            decoded.anomalies,
            vec![Anomaly::InvalidCode {
                code: 6,
                table_len: 6
            }]
        );
    }

    #[test]
    fn missing_end_code_keeps_output() {
        let decoded = decode(&[0x44], 3);
        assert_eq!(decoded.indices, vec![0]);
        assert_eq!(decoded.anomalies, vec![Anomaly::MissingEndCode]);

        let decoded = decode(&[], 3);
        assert!(decoded.indices.is_empty());
        assert_eq!(decoded.anomalies, vec![Anomaly::MissingEndCode]);
    }

    #[test]
    fn codes_straddle_bytes() {
        let mut reader = CodeReader::new(&[0b1010_1100, 0b0000_0111]);
        assert_eq!(reader.read(3), Some(0b100));
        assert_eq!(reader.read(7), Some(0b11_10101));
        assert_eq!(reader.read(6), Some(0b000001));
        assert_eq!(reader.read(1), None);
    }

    #[test]
    fn wide_start_code_size() {
        // 13 bit clear, 7, end
        let decoded = decode(&[0x00, 0xf0, 0x00, 0x04, 0x40], 13);
        assert_eq!(decoded, Decoded { indices: vec![7], anomalies: vec![] });

        let decoder = Decoder::new(13);
        assert_eq!(decoder.table.clear_code, 4096);
        assert_eq!(decoder.code_size(), 13);
    }

    #[test]
    fn wide_table_never_grows() {
        let mut decoder = Decoder::new(13);
        let mut out = vec![];
        for code in [4096, 1, 2, 3] {
            assert_eq!(decoder.push(code, &mut out), Ok(Step::Continue));
        }
        assert_eq!(decoder.table.len(), 4098);
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(
            decoder.push(4098, &mut out),
            Err(Anomaly::InvalidCode {
                code: 4098,
                table_len: 4098
            })
        );
    }

    #[test]
    fn widest_start_code_size() {
        let data = pack(&[32768, 32767, 32769], 16);
        assert_eq!(decode(&data, 16).indices, vec![32767]);
    }

    #[test]
    fn unsupported_start_code_size() {
        for size in [0, 17, 255] {
            assert_eq!(
                decode(&[0x00, 0xf0, 0x00, 0x04, 0x40], size),
                Decoded {
                    indices: vec![],
                    anomalies: vec![Anomaly::UnsupportedCodeSize(size)]
                }
            );
        }
    }
}
