//! Property-based round-trip tests for the PIZ pipeline stages.

use proptest::prelude::*;

use exr_core::channel::Channel;
use exr_core::compression::Compression;
use exr_piz::bitmap::{apply_lut, forward_lut, reverse_lut, Bitmap};
use exr_piz::{huffman, wavelet, BlockInfo};

/// Sample buffers drawn from a small alphabet, so runs and skewed
/// frequencies show up often.
fn clustered_samples(max: u16, len: usize) -> impl Strategy<Value = Vec<u16>> {
    prop::collection::vec(0..=max, 1..=len)
}

proptest! {
    #[test]
    fn bitmap_records_exactly_the_values(samples in clustered_samples(2000, 400)) {
        let bitmap = Bitmap::from_samples(&samples);
        let live: std::collections::HashSet<u16> = samples.iter().copied().collect();
        for v in 0..=2001u16 {
            let expected = v != 0 && live.contains(&v);
            prop_assert_eq!(bitmap.has(v), expected, "value {}", v);
        }
    }

    #[test]
    fn lut_inverts_and_orders(samples in clustered_samples(60000, 300)) {
        let bitmap = Bitmap::from_samples(&samples);
        let (forward, fmax) = forward_lut(&bitmap);
        let (reverse, rmax) = reverse_lut(&bitmap);
        prop_assert_eq!(fmax, rmax);

        let mut remapped = samples.clone();
        apply_lut(&mut remapped, &forward);
        let mut restored = remapped.clone();
        apply_lut(&mut restored, &reverse);
        prop_assert_eq!(restored, samples.clone());

        // Monotone over the live set.
        let mut live: Vec<u16> = samples.iter().copied().filter(|&v| v != 0).collect();
        live.sort_unstable();
        live.dedup();
        for pair in live.windows(2) {
            prop_assert!(forward[pair[0] as usize] < forward[pair[1] as usize]);
        }
    }

    #[test]
    fn huffman_round_trips(samples in clustered_samples(500, 3000)) {
        let compressed = huffman::compress(&samples).unwrap();
        let decoded = huffman::decompress(&compressed, samples.len()).unwrap();
        prop_assert_eq!(decoded, samples);
    }

    #[test]
    fn huffman_round_trips_full_domain(samples in prop::collection::vec(any::<u16>(), 1..800)) {
        let compressed = huffman::compress(&samples).unwrap();
        let decoded = huffman::decompress(&compressed, samples.len()).unwrap();
        prop_assert_eq!(decoded, samples);
    }

    #[test]
    fn wavelet_round_trips(
        nx in 1usize..24,
        ny in 1usize..24,
        seed in any::<u64>(),
        wide in any::<bool>(),
    ) {
        let max_value: u16 = if wide { u16::MAX } else { (1 << 14) - 1 };
        let mut state = seed | 1;
        let mut original = vec![0u16; nx * ny];
        for s in original.iter_mut() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *s = ((state >> 48) % (max_value as u64 + 1)) as u16;
        }
        let mut buf = original.clone();
        wavelet::encode(&mut buf, nx, 1, ny, nx, max_value);
        wavelet::decode(&mut buf, nx, 1, ny, nx, max_value);
        prop_assert_eq!(buf, original);
    }

    #[test]
    fn piz_round_trips(
        width in 1usize..24,
        height in 1usize..24,
        samples_seed in any::<u64>(),
    ) {
        let block = BlockInfo::new(
            Compression::Piz,
            vec![Channel::half("G"), Channel::half("R")],
            width,
            height,
        );
        let mut state = samples_seed | 1;
        let mut raw = vec![0u16; block.total_samples()];
        for s in raw.iter_mut() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *s = (state >> 52) as u16;
        }
        let compressed = exr_piz::compress(&raw, &block).unwrap();
        let decoded = exr_piz::decompress(&compressed, &block).unwrap();
        prop_assert_eq!(decoded, raw);
    }
}

#[test]
fn piz_round_trips_a_typical_scanline_block() {
    // A realistic PIZ block: 32 scanlines of RGB half data.
    let block = BlockInfo::new(
        Compression::Piz,
        vec![
            Channel::half("B"),
            Channel::half("G"),
            Channel::half("R"),
        ],
        277,
        32,
    );
    let mut raw = vec![0u16; block.total_samples()];
    for (i, s) in raw.iter_mut().enumerate() {
        // Smooth gradients with occasional spikes, like rendered output.
        let base = (i % 277) * 11 + (i / 277) * 3;
        *s = if i % 97 == 0 { 0x7BFF } else { (base % 0x3C00) as u16 };
    }
    let compressed = exr_piz::compress(&raw, &block).unwrap();
    let decoded = exr_piz::decompress(&compressed, &block).unwrap();
    assert_eq!(decoded, raw);
}

#[test]
fn piz_compresses_smooth_data() {
    // The whole point of the wavelet + bitmap stages: smooth half data
    // should shrink substantially.
    let block = BlockInfo::new(Compression::Piz, vec![Channel::half("Y")], 256, 32);
    let mut raw = vec![0u16; block.total_samples()];
    for (i, s) in raw.iter_mut().enumerate() {
        *s = ((i % 256) / 4) as u16;
    }
    let compressed = exr_piz::compress(&raw, &block).unwrap();
    assert!(
        compressed.len() < raw.len(),
        "compressed {} bytes from {} raw bytes",
        compressed.len(),
        raw.len() * 2
    );
}
