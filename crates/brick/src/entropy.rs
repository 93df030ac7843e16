//! Shannon entropy over byte buffers, in bits per byte.

use serde::{Deserialize, Serialize};

pub fn measure(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }

    let mut histogram = [0u64; 256];
    for byte in bytes {
        histogram[*byte as usize] += 1;
    }

    let total = bytes.len() as f64;
    let mut entropy = 0.0;
    for count in histogram {
        if count == 0 {
            continue;
        }
        let probability = count as f64 / total;
        entropy -= probability * probability.log2();
    }
    entropy
}

/// Coarse content class derived from entropy, shown next to the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntropyClass {
    Empty,
    Sparse,
    Text,
    Dense,
    Random,
}

impl EntropyClass {
    pub fn classify(entropy: f64) -> Self {
        if !entropy.is_finite() || entropy <= 0.0 {
            Self::Empty
        } else if entropy < 1.0 {
            Self::Sparse
        } else if entropy < 6.0 {
            Self::Text
        } else if entropy < 7.5 {
            Self::Dense
        } else {
            Self::Random
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_has_zero_entropy() {
        assert_eq!(measure(&[]), 0.0);
    }

    #[test]
    fn repeated_byte_has_zero_entropy() {
        assert_eq!(measure(&[b'A'; 1024]), 0.0);
        assert_eq!(measure(&[0u8]), 0.0);
    }

    #[test]
    fn uniform_bytes_have_eight_bits() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(256 * 4).collect();
        assert_eq!(measure(&bytes), 8.0);
    }

    #[test]
    fn two_equally_likely_values_have_one_bit() {
        let bytes: Vec<u8> = [0u8, 1].iter().copied().cycle().take(100).collect();
        assert!((measure(&bytes) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn measure_is_independent_of_byte_order() {
        let forward = b"fn fs_main() -> vec4<f32> { return vec4(1.0); }".to_vec();
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(measure(&forward), measure(&reversed));
    }

    #[test]
    fn classify_buckets_typical_content() {
        assert_eq!(EntropyClass::classify(0.0), EntropyClass::Empty);
        assert_eq!(EntropyClass::classify(f64::NAN), EntropyClass::Empty);
        assert_eq!(EntropyClass::classify(0.5), EntropyClass::Sparse);
        assert_eq!(
            EntropyClass::classify(measure(b"@fragment fn fs_main() {}")),
            EntropyClass::Text
        );
        assert_eq!(EntropyClass::classify(8.0), EntropyClass::Random);
    }
}
