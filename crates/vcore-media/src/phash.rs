//! Perceptual-hash capability: a 64-bit DCT hash over grayscale pixels.
//!
//! Hamming distance between two hashes approximates perceptual similarity;
//! this is what the Frames stage's dedup step relies on.

use std::path::Path;

use async_trait::async_trait;
use image::GenericImageView;

use crate::error::MediaResult;

const DCT_SIZE: usize = 32;
const HASH_SIZE: usize = 8;

/// Computes a 64-bit perceptual hash for an image, returned hex-encoded.
#[async_trait]
pub trait PerceptualHasher: Send + Sync {
    async fn hash(&self, image_path: &Path) -> MediaResult<String>;
}

/// Hamming distance between two hex-encoded 64-bit hashes.
pub fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    let a = u64::from_str_radix(a, 16).ok()?;
    let b = u64::from_str_radix(b, 16).ok()?;
    Some((a ^ b).count_ones())
}

/// Pure-Rust phash using a discrete cosine transform over a downscaled
/// grayscale image, following the standard pHash recipe: resize to
/// `32x32`, DCT, keep the top-left `8x8` block (dropping the DC term),
/// threshold against the median.
pub struct DctPerceptualHasher;

impl Default for DctPerceptualHasher {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl PerceptualHasher for DctPerceptualHasher {
    async fn hash(&self, image_path: &Path) -> MediaResult<String> {
        let path = image_path.to_path_buf();
        let hash = tokio::task::spawn_blocking(move || compute_phash(&path))
            .await
            .map_err(|e| crate::error::MediaError::InvalidVideo(e.to_string()))??;
        Ok(format!("{hash:016x}"))
    }
}

fn compute_phash(path: &Path) -> MediaResult<u64> {
    let img = image::open(path).map_err(|e| crate::error::MediaError::InvalidVideo(e.to_string()))?;
    let gray = img
        .resize_exact(
            DCT_SIZE as u32,
            DCT_SIZE as u32,
            image::imageops::FilterType::Triangle,
        )
        .to_luma8();

    let mut pixels = [[0f64; DCT_SIZE]; DCT_SIZE];
    for y in 0..DCT_SIZE {
        for x in 0..DCT_SIZE {
            pixels[y][x] = gray.get_pixel(x as u32, y as u32).0[0] as f64;
        }
    }

    let dct = dct_2d(&pixels);

    let mut coeffs = Vec::with_capacity(HASH_SIZE * HASH_SIZE - 1);
    for v in 0..HASH_SIZE {
        for u in 0..HASH_SIZE {
            if u == 0 && v == 0 {
                continue;
            }
            coeffs.push(dct[v][u]);
        }
    }

    let mut sorted = coeffs.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = sorted[sorted.len() / 2];

    let mut hash: u64 = 0;
    for (i, &c) in coeffs.iter().enumerate() {
        if c > median {
            hash |= 1 << i;
        }
    }
    Ok(hash)
}

/// Naive O(n^4) 2D DCT-II, fine at `32x32`.
fn dct_2d(pixels: &[[f64; DCT_SIZE]; DCT_SIZE]) -> [[f64; DCT_SIZE]; DCT_SIZE] {
    let n = DCT_SIZE;
    let mut out = [[0f64; DCT_SIZE]; DCT_SIZE];
    for v in 0..n {
        for u in 0..n {
            let mut sum = 0.0;
            for y in 0..n {
                for x in 0..n {
                    let cos_x = ((2.0 * x as f64 + 1.0) * u as f64 * std::f64::consts::PI
                        / (2.0 * n as f64))
                        .cos();
                    let cos_y = ((2.0 * y as f64 + 1.0) * v as f64 * std::f64::consts::PI
                        / (2.0 * n as f64))
                        .cos();
                    sum += pixels[y][x] * cos_x * cos_y;
                }
            }
            let cu = if u == 0 { 1.0 / (2.0f64).sqrt() } else { 1.0 };
            let cv = if v == 0 { 1.0 / (2.0f64).sqrt() } else { 1.0 };
            out[v][u] = 0.25 * cu * cv * sum;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_distance_of_identical_hashes_is_zero() {
        assert_eq!(hamming_distance("aabbccdd00112233", "aabbccdd00112233"), Some(0));
    }

    #[test]
    fn hamming_distance_counts_differing_bits() {
        assert_eq!(hamming_distance("0000000000000000", "0000000000000001"), Some(1));
        assert_eq!(hamming_distance("0000000000000000", "ffffffffffffffff"), Some(64));
    }

    #[test]
    fn invalid_hex_returns_none() {
        assert_eq!(hamming_distance("not-hex", "0000000000000000"), None);
    }
}
