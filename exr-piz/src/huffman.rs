//! Canonical Huffman coder with run-length acceleration.
//!
//! PIZ entropy-codes 16-bit samples with a canonical Huffman code built per
//! block. The alphabet has one slot more than the sample domain: the extra
//! symbol, placed at one past the highest live sample value, escapes into a
//! run-length form so long runs of one symbol cost a handful of bits.
//!
//! A compressed block is framed as a 20-byte little-endian header
//! `(d_min, d_max, table_len, payload_bits, reserved)` followed by the packed
//! code-length table and the payload bits.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use exr_core::bitstream::{BitReader, BitWriter};
use exr_core::byteio::{ByteReader, ByteWriter, Endian};

use crate::error::{PizError, Result};

/// Bits in a sample value.
pub const ENC_BITS: usize = 16;
/// Bits of the decoding table index.
pub const DEC_BITS: usize = 14;
/// Alphabet size: the sample domain plus the run-length escape slot.
pub const ENC_SIZE: usize = (1 << ENC_BITS) + 1;
/// Decoding table size.
pub const DEC_SIZE: usize = 1 << DEC_BITS;
const DEC_MASK: u64 = (DEC_SIZE - 1) as u64;

/// Longest code a pack can hold.
const MAX_CODE_LEN: u64 = 58;

// Zero-run escapes in the packed code-length table. Values 0..=58 are
// literal lengths; 59..=62 stand for runs of 2..=5 zeros; 63 is followed by
// an 8-bit literal holding (run - 6).
const SHORT_ZERO_RUN: u64 = 59;
const LONG_ZERO_RUN: u64 = 63;
const SHORTEST_LONG_RUN: usize = 2 + (LONG_ZERO_RUN - SHORT_ZERO_RUN) as usize;
const LONGEST_LONG_RUN: usize = 255 + SHORTEST_LONG_RUN;

/// Framed-block header size in bytes.
const HEADER_SIZE: usize = 20;

/// A canonical code and its length packed in 64 bits: code in the upper 58,
/// length in the lower 6. Length zero means the symbol is absent.
#[inline]
fn pack_code(pack: u64) -> u64 {
    pack >> 6
}

#[inline]
fn pack_length(pack: u64) -> u64 {
    pack & 0b11_1111
}

/// One slot of the decoding table.
///
/// Codes of up to 14 bits resolve in one probe (`Short`); longer codes share
/// the slot addressed by their first 14 bits and are distinguished by a
/// linear scan (`Long`). Well-behaved inputs hit `Short` almost always.
#[derive(Debug, Clone, Default)]
enum DecEntry {
    #[default]
    Empty,
    Short {
        len: u8,
        lit: u32,
    },
    Long(Vec<u32>),
}

/// Count how often each sample value occurs. The table has [`ENC_SIZE`]
/// entries; the last one is reserved for the run-length escape symbol.
fn count_frequencies(raw: &[u16]) -> Vec<u64> {
    let mut freq = vec![0u64; ENC_SIZE];
    for &s in raw {
        freq[s as usize] += 1;
    }
    freq
}

/// Assign canonical codes to a table of code lengths, in place.
///
/// Entries hold bare lengths on input and full packs on output. Codes are
/// ordered by length (longest first gets the numerically smallest codes),
/// then by symbol index within a length.
fn canonical_codes(packs: &mut [u64]) {
    let mut count = [0u64; MAX_CODE_LEN as usize + 1];
    for &l in packs.iter() {
        count[l as usize] += 1;
    }

    // count[l] becomes the first code of length l. Slot 0 collects the
    // absent symbols and is never read back.
    let mut c: u64 = 0;
    for l in (1..=MAX_CODE_LEN as usize).rev() {
        let next = (c + count[l]) >> 1;
        count[l] = c;
        c = next;
    }

    for pack in packs.iter_mut() {
        let l = *pack;
        if l > 0 {
            *pack = l | (count[l as usize] << 6);
            count[l as usize] += 1;
        }
    }
}

/// Build the encoding table for a frequency table.
///
/// Returns the packs plus the live symbol range `(d_min, d_max)`, where
/// `d_max` is the run-length escape symbol (one past the highest value that
/// actually occurs, inserted with frequency 1 before construction so its
/// length takes part in code assignment).
///
/// Code lengths are derived without allocating tree nodes: each symbol heads
/// a chain through `hlink` (initially just itself), and merging two heap
/// entries bumps the length of every symbol in both chains, then splices the
/// chains into one. The caller must pass at least one non-zero frequency.
fn build_encoding_table(freq: &[u64]) -> Result<(Vec<u64>, usize, usize)> {
    let mut freq = freq.to_vec();
    let mut hlink: Vec<u32> = (0..ENC_SIZE as u32).collect();

    let mut heap: BinaryHeap<Reverse<(u64, u32)>> = BinaryHeap::new();
    let mut d_min = ENC_SIZE;
    let mut d_max = 0usize;
    for (sym, &f) in freq.iter().enumerate() {
        if f > 0 {
            if d_min == ENC_SIZE {
                d_min = sym;
            }
            d_max = sym;
            heap.push(Reverse((f, sym as u32)));
        }
    }
    assert!(d_min < ENC_SIZE, "frequency table has no live symbols");

    // The run-length escape symbol. It must enter the heap now so its code
    // length is assigned alongside the real symbols; it also keeps a
    // single-symbol input from collapsing to a zero-length code.
    d_max += 1;
    freq[d_max] = 1;
    heap.push(Reverse((1, d_max as u32)));

    let mut lengths = vec![0u64; ENC_SIZE];
    while heap.len() > 1 {
        let Reverse((f_absorbed, absorbed)) = heap.pop().unwrap();
        let Reverse((f_kept, kept)) = heap.pop().unwrap();
        heap.push(Reverse((f_kept + f_absorbed, kept)));

        // Every symbol coded under the merged node gets one bit longer.
        // Walk the kept chain, splice the absorbed chain onto its sentinel,
        // then walk the absorbed chain.
        let mut j = kept as usize;
        loop {
            lengths[j] += 1;
            if lengths[j] > MAX_CODE_LEN {
                return Err(PizError::CodeTooLong { symbol: j });
            }
            if hlink[j] as usize == j {
                hlink[j] = absorbed;
                break;
            }
            j = hlink[j] as usize;
        }
        let mut j = absorbed as usize;
        loop {
            lengths[j] += 1;
            if lengths[j] > MAX_CODE_LEN {
                return Err(PizError::CodeTooLong { symbol: j });
            }
            if hlink[j] as usize == j {
                break;
            }
            j = hlink[j] as usize;
        }
    }

    canonical_codes(&mut lengths);
    Ok((lengths, d_min, d_max))
}

/// Serialise code lengths for symbols `d_min..=d_max` into the 6-bit
/// run-length form.
fn pack_table(packs: &[u64], d_min: usize, d_max: usize) -> Vec<u8> {
    // Worst case is 14 bits per covered symbol.
    let mut w = BitWriter::new((d_max - d_min + 1) * 14 + 8);
    let mut sym = d_min;
    while sym <= d_max {
        let l = pack_length(packs[sym]);
        if l == 0 {
            let mut zerun = 1usize;
            while sym < d_max && zerun < LONGEST_LONG_RUN {
                if pack_length(packs[sym + 1]) > 0 {
                    break;
                }
                sym += 1;
                zerun += 1;
            }
            if zerun >= SHORTEST_LONG_RUN {
                write6(&mut w, LONG_ZERO_RUN as u8);
                w.write(8, &[(zerun - SHORTEST_LONG_RUN) as u8]);
            } else if zerun >= 2 {
                write6(&mut w, (SHORT_ZERO_RUN as usize + zerun - 2) as u8);
            } else {
                write6(&mut w, 0);
            }
        } else {
            write6(&mut w, l as u8);
        }
        sym += 1;
    }
    let nbytes = w.index().div_ceil(8);
    let mut data = w.into_data();
    data.truncate(nbytes);
    data
}

/// Rebuild packs from a packed code-length table covering `d_min..=d_max`.
fn unpack_table(data: &[u8], d_min: usize, d_max: usize) -> Result<Vec<u64>> {
    let mut packs = vec![0u64; ENC_SIZE];
    let mut r = BitReader::new(data, data.len() * 8);
    let mut sym = d_min;
    while sym <= d_max {
        if r.remain() < 6 {
            return Err(PizError::TruncatedTable);
        }
        let l = (r.read(6)[0] >> 2) as u64;
        if l == LONG_ZERO_RUN {
            if r.remain() < 8 {
                return Err(PizError::TruncatedTable);
            }
            let zerun = r.read(8)[0] as usize + SHORTEST_LONG_RUN;
            if sym + zerun > d_max + 1 {
                return Err(PizError::TableRunOverflow);
            }
            sym += zerun;
        } else if l >= SHORT_ZERO_RUN {
            let zerun = (l - SHORT_ZERO_RUN) as usize + 2;
            if sym + zerun > d_max + 1 {
                return Err(PizError::TableRunOverflow);
            }
            sym += zerun;
        } else {
            packs[sym] = l;
            sym += 1;
        }
    }
    canonical_codes(&mut packs);
    Ok(packs)
}

/// Write a 6-bit value.
fn write6(w: &mut BitWriter, v: u8) {
    w.write(6, &[v << 2]);
}

/// Write a pack's code, MSB first.
fn write_code(w: &mut BitWriter, pack: u64) {
    let l = pack_length(pack);
    let left_aligned = pack_code(pack) << (64 - l);
    w.write(l as usize, &left_aligned.to_be_bytes());
}

/// Build the decoding table for the live symbol range.
fn build_decoding_table(
    packs: &[u64],
    d_min: usize,
    d_max: usize,
) -> Result<Vec<DecEntry>> {
    let mut table = vec![DecEntry::Empty; DEC_SIZE];
    for sym in d_min..=d_max {
        let c = pack_code(packs[sym]);
        let l = pack_length(packs[sym]) as usize;
        if c >> l != 0 {
            return Err(PizError::InvalidTableEntry { symbol: sym });
        }
        if l > DEC_BITS {
            // Long code: store the symbol under its leading 14 bits.
            let index = (c >> (l - DEC_BITS)) as usize;
            match &mut table[index] {
                DecEntry::Short { .. } => {
                    return Err(PizError::TableCollision { index });
                }
                DecEntry::Long(lits) => lits.push(sym as u32),
                slot @ DecEntry::Empty => *slot = DecEntry::Long(vec![sym as u32]),
            }
        } else if l > 0 {
            // Short code: fill every index that starts with it.
            let base = (c << (DEC_BITS - l)) as usize;
            for index in base..base + (1 << (DEC_BITS - l)) {
                if !matches!(table[index], DecEntry::Empty) {
                    return Err(PizError::TableCollision { index });
                }
                table[index] = DecEntry::Short {
                    len: l as u8,
                    lit: sym as u32,
                };
            }
        }
    }
    Ok(table)
}

/// Emit one run: either `run + 1` plain copies of the symbol's code, or the
/// code once plus the escape code and an 8-bit extra-repeat count, whichever
/// is fewer bits. `run` counts repeats beyond the first occurrence.
fn send_code(w: &mut BitWriter, packs: &[u64], sym: usize, run: usize, escape: usize) {
    let sym_len = pack_length(packs[sym]);
    let esc_len = pack_length(packs[escape]);
    if sym_len + esc_len + 8 < sym_len * (run as u64 + 1) {
        write_code(w, packs[sym]);
        write_code(w, packs[escape]);
        w.write(8, &[run as u8]);
    } else {
        for _ in 0..=run {
            write_code(w, packs[sym]);
        }
    }
}

/// Encode the sample stream, returning the number of payload bits written.
fn encode_payload(w: &mut BitWriter, packs: &[u64], raw: &[u16], escape: usize) -> usize {
    let mut sym = raw[0];
    let mut run = 0usize;
    for &s in &raw[1..] {
        if s == sym && run < 255 {
            run += 1;
        } else {
            send_code(w, packs, sym as usize, run, escape);
            sym = s;
            run = 0;
        }
    }
    send_code(w, packs, sym as usize, run, escape);
    w.index()
}

/// Decoder state: a shift register of input bits.
struct Register<'a> {
    data: &'a [u8],
    pos: usize,
    nbytes: usize,
    c: u64,
    lc: i64,
}

impl<'a> Register<'a> {
    fn pull(&mut self) -> bool {
        if self.pos < self.nbytes {
            self.c = (self.c << 8) | self.data[self.pos] as u64;
            self.pos += 1;
            self.lc += 8;
            true
        } else {
            false
        }
    }
}

/// Append one decoded symbol, expanding the run-length escape.
fn emit(
    sym: u32,
    escape: usize,
    reg: &mut Register,
    out: &mut Vec<u16>,
    expected: usize,
) -> Result<()> {
    if sym as usize == escape {
        if reg.lc < 8 && !reg.pull() {
            return Err(PizError::NotEnoughData {
                produced: out.len(),
                expected,
            });
        }
        reg.lc -= 8;
        let extra = ((reg.c >> reg.lc) & 0xFF) as usize;
        let prev = *out.last().ok_or(PizError::RunWithoutSymbol)?;
        if out.len() + extra > expected {
            return Err(PizError::TooMuchData { expected });
        }
        out.extend(std::iter::repeat(prev).take(extra));
    } else {
        if out.len() >= expected {
            return Err(PizError::TooMuchData { expected });
        }
        out.push(sym as u16);
    }
    Ok(())
}

/// Decode `n_bits` of payload into exactly `expected` samples.
fn decode_payload(
    packs: &[u64],
    table: &[DecEntry],
    data: &[u8],
    n_bits: usize,
    escape: usize,
    expected: usize,
) -> Result<Vec<u16>> {
    let nbytes = n_bits.div_ceil(8);
    if nbytes > data.len() {
        return Err(PizError::PayloadOverrun {
            bits: n_bits,
            available: data.len(),
        });
    }

    let mut out: Vec<u16> = Vec::with_capacity(expected);
    let mut reg = Register {
        data,
        pos: 0,
        nbytes,
        c: 0,
        lc: 0,
    };

    while reg.pull() {
        while reg.lc >= DEC_BITS as i64 {
            let index = ((reg.c >> (reg.lc - DEC_BITS as i64)) & DEC_MASK) as usize;
            match &table[index] {
                DecEntry::Short { len, lit } => {
                    reg.lc -= *len as i64;
                    emit(*lit, escape, &mut reg, &mut out, expected)?;
                }
                DecEntry::Long(lits) => {
                    let mut matched = false;
                    for &sym in lits {
                        let l = pack_length(packs[sym as usize]) as i64;
                        while reg.lc < l {
                            if !reg.pull() {
                                break;
                            }
                        }
                        if reg.lc >= l
                            && pack_code(packs[sym as usize])
                                == (reg.c >> (reg.lc - l)) & ((1u64 << l) - 1)
                        {
                            reg.lc -= l;
                            emit(sym, escape, &mut reg, &mut out, expected)?;
                            matched = true;
                            break;
                        }
                    }
                    if !matched {
                        return Err(PizError::InvalidCode);
                    }
                }
                DecEntry::Empty => return Err(PizError::InvalidCode),
            }
        }
    }

    // Discard the padding bits of the final partial byte, then drain the
    // register; only short codes can finish flush with the stream end.
    let pad = (8 - n_bits % 8) % 8;
    reg.c >>= pad;
    reg.lc -= pad as i64;
    while reg.lc > 0 {
        let index = ((reg.c << (DEC_BITS as i64 - reg.lc)) & DEC_MASK) as usize;
        match &table[index] {
            DecEntry::Short { len, lit } => {
                reg.lc -= *len as i64;
                emit(*lit, escape, &mut reg, &mut out, expected)?;
            }
            _ => return Err(PizError::InvalidCode),
        }
    }

    if out.len() != expected {
        return Err(PizError::NotEnoughData {
            produced: out.len(),
            expected,
        });
    }
    Ok(out)
}

/// Compress a sample stream into a framed Huffman block.
pub fn compress(raw: &[u16]) -> Result<Vec<u8>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let freq = count_frequencies(raw);
    let (packs, d_min, d_max) = build_encoding_table(&freq)?;
    let table = pack_table(&packs, d_min, d_max);

    // A sample never costs more than its code length, and codes top out at
    // 58 bits.
    let mut w = BitWriter::new(raw.len() * MAX_CODE_LEN as usize + 8);
    let payload_bits = encode_payload(&mut w, &packs, raw, d_max);
    let payload_bytes = payload_bits.div_ceil(8);
    let mut payload = w.into_data();
    payload.truncate(payload_bytes);

    let mut out = vec![0u8; HEADER_SIZE + table.len() + payload.len()];
    let mut header = ByteWriter::new(Endian::Little, &mut out[..HEADER_SIZE]);
    header.u32(d_min as u32);
    header.u32(d_max as u32);
    header.u32(table.len() as u32);
    header.u32(payload_bits as u32);
    header.u32(0);
    out[HEADER_SIZE..HEADER_SIZE + table.len()].copy_from_slice(&table);
    out[HEADER_SIZE + table.len()..].copy_from_slice(&payload);
    Ok(out)
}

/// Decompress a framed Huffman block into exactly `expected` samples.
pub fn decompress(data: &[u8], expected: usize) -> Result<Vec<u16>> {
    if data.is_empty() {
        if expected != 0 {
            return Err(PizError::NotEnoughData {
                produced: 0,
                expected,
            });
        }
        return Ok(Vec::new());
    }
    if data.len() < HEADER_SIZE {
        return Err(PizError::TruncatedBlock {
            needed: HEADER_SIZE,
            available: data.len(),
        });
    }

    let mut r = ByteReader::new(Endian::Little, data);
    let d_min = r.u32() as usize;
    let d_max = r.u32() as usize;
    let table_len = r.u32() as usize;
    let payload_bits = r.u32() as usize;
    let _reserved = r.u32();

    if d_min > d_max || d_max >= ENC_SIZE {
        return Err(PizError::InvalidSymbolRange {
            min: d_min,
            max: d_max,
        });
    }
    let rest = &data[HEADER_SIZE..];
    if table_len > rest.len() {
        return Err(PizError::TruncatedBlock {
            needed: HEADER_SIZE + table_len,
            available: data.len(),
        });
    }
    let packs = unpack_table(&rest[..table_len], d_min, d_max)?;
    let payload = &rest[table_len..];
    if payload_bits > payload.len() * 8 {
        return Err(PizError::PayloadOverrun {
            bits: payload_bits,
            available: payload.len(),
        });
    }
    let table = build_decoding_table(&packs, d_min, d_max)?;
    decode_payload(&packs, &table, payload, payload_bits, d_max, expected)
}
