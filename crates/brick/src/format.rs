//! Brick container and its byte-exact on-disk layout.
//!
//! Layout (little-endian, no padding):
//! | magic (4) | version (u32) | order (u8) | bytes_per_pixel (u8) |
//! | original_size (u64) | entropy (f64) | payload (W * H * P) |

use thiserror::Error;

use crate::hilbert::{self, MAX_ORDER};

pub const BRICK_MAGIC: [u8; 4] = *b"SBRK";
pub const BRICK_VERSION: u32 = 1;
pub const SUPPORTED_VERSIONS: &[u32] = &[BRICK_VERSION];
pub const HEADER_LEN: usize = 26;
pub const MAX_BYTES_PER_PIXEL: u8 = 16;
pub const BRICK_EXTENSION: &str = "brick";

const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const ORDER_OFFSET: usize = 8;
const BYTES_PER_PIXEL_OFFSET: usize = 9;
const ORIGINAL_SIZE_OFFSET: usize = 10;
const ENTROPY_OFFSET: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrickHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub order: u8,
    pub bytes_per_pixel: u8,
    pub original_size: u64,
    pub entropy: f64,
}

/// Header plus pixel payload.
///
/// Fields are public so hand-edited bricks can be represented as they are found on disk;
/// nothing here is trusted until it passes [`crate::validate::check_header`].
#[derive(Debug, Clone, PartialEq)]
pub struct Brick {
    pub header: BrickHeader,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BrickParseError {
    #[error("brick truncated: header needs {needed} bytes, found {actual}")]
    Truncated { needed: usize, actual: usize },
}

impl Brick {
    /// Grid side `2^order`, or `None` when the order is outside the supported range.
    pub fn side(&self) -> Option<u32> {
        (self.header.order <= MAX_ORDER).then(|| hilbert::side_len(self.header.order))
    }

    /// Payload byte capacity implied by the header, `W * H * P`.
    pub fn capacity(&self) -> Option<u64> {
        grid_capacity(self.header.order, self.header.bytes_per_pixel)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&self.header.magic);
        bytes.extend_from_slice(&self.header.version.to_le_bytes());
        bytes.push(self.header.order);
        bytes.push(self.header.bytes_per_pixel);
        bytes.extend_from_slice(&self.header.original_size.to_le_bytes());
        bytes.extend_from_slice(&self.header.entropy.to_le_bytes());
        debug_assert_eq!(bytes.len(), HEADER_LEN);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parse a brick without judging it. Only a short header is an error here; a wrong
    /// magic, version or payload length is reported later by the validator.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BrickParseError> {
        if bytes.len() < HEADER_LEN {
            return Err(BrickParseError::Truncated {
                needed: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let header = BrickHeader {
            magic: array_at(bytes, MAGIC_OFFSET),
            version: u32::from_le_bytes(array_at(bytes, VERSION_OFFSET)),
            order: bytes[ORDER_OFFSET],
            bytes_per_pixel: bytes[BYTES_PER_PIXEL_OFFSET],
            original_size: u64::from_le_bytes(array_at(bytes, ORIGINAL_SIZE_OFFSET)),
            entropy: f64::from_le_bytes(array_at(bytes, ENTROPY_OFFSET)),
        };

        Ok(Self {
            header,
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

/// `(2^order)^2 * bytes_per_pixel`, or `None` for an unsupported geometry.
pub fn grid_capacity(order: u8, bytes_per_pixel: u8) -> Option<u64> {
    if order > MAX_ORDER || bytes_per_pixel == 0 || bytes_per_pixel > MAX_BYTES_PER_PIXEL {
        return None;
    }
    hilbert::cell_count(order).checked_mul(bytes_per_pixel as u64)
}

fn array_at<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_brick() -> Brick {
        Brick {
            header: BrickHeader {
                magic: BRICK_MAGIC,
                version: BRICK_VERSION,
                order: 1,
                bytes_per_pixel: 2,
                original_size: 5,
                entropy: 2.25,
            },
            payload: vec![1, 2, 3, 4, 5, 0, 0, 0],
        }
    }

    #[test]
    fn header_layout_is_byte_exact() {
        let bytes = sample_brick().to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 8);
        assert_eq!(&bytes[0..4], b"SBRK");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[9], 2);
        assert_eq!(&bytes[10..18], &5u64.to_le_bytes());
        assert_eq!(&bytes[18..26], &2.25f64.to_le_bytes());
        assert_eq!(&bytes[26..], &[1, 2, 3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn parse_reads_back_serialized_brick() {
        let brick = sample_brick();
        assert_eq!(Brick::from_bytes(&brick.to_bytes()), Ok(brick));
    }

    #[test]
    fn parse_keeps_foreign_magic_and_short_payload_for_the_validator() {
        let mut bytes = sample_brick().to_bytes();
        bytes[0] = b'X';
        bytes.truncate(HEADER_LEN + 3);
        let brick = Brick::from_bytes(&bytes).expect("header is complete");
        assert_eq!(&brick.header.magic, b"XBRK");
        assert_eq!(brick.payload.len(), 3);
    }

    #[test]
    fn parse_rejects_truncated_header() {
        let bytes = sample_brick().to_bytes();
        assert_eq!(
            Brick::from_bytes(&bytes[..HEADER_LEN - 1]),
            Err(BrickParseError::Truncated {
                needed: HEADER_LEN,
                actual: HEADER_LEN - 1
            })
        );
    }

    #[test]
    fn capacity_follows_geometry() {
        assert_eq!(grid_capacity(4, 4), Some(1024));
        assert_eq!(grid_capacity(0, 1), Some(1));
        assert_eq!(grid_capacity(MAX_ORDER + 1, 4), None);
        assert_eq!(grid_capacity(4, 0), None);
        assert_eq!(sample_brick().side(), Some(2));
        assert_eq!(sample_brick().capacity(), Some(8));
    }
}
