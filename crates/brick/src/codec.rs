//! Fold source bytes into a brick along the Hilbert curve, and unfold them back.
//!
//! Linear chunk `i` (of `bytes_per_pixel` bytes) lives in grid cell `index_to_xy(order, i)`;
//! the payload itself is stored row-major so it uploads directly as a texture.

use thiserror::Error;

use crate::entropy;
use crate::format::{BRICK_MAGIC, BRICK_VERSION, Brick, BrickHeader, grid_capacity};
use crate::hilbert::{self, MAX_ORDER};
use crate::validate::{ValidationError, check_header};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("source of {len} bytes exceeds brick capacity of {capacity} bytes")]
    CapacityExceeded { len: u64, capacity: u64 },
    #[error("unsupported brick geometry: order {order}, {bytes_per_pixel} bytes per pixel")]
    InvalidGeometry { order: u8, bytes_per_pixel: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid brick header: {0}")]
    InvalidHeader(#[from] ValidationError),
    #[error("decoded {actual} bytes but header declares {expected}")]
    LengthMismatch { expected: u64, actual: u64 },
}

pub fn encode(source: &[u8], order: u8, bytes_per_pixel: u8) -> Result<Brick, EncodeError> {
    let Some(capacity) = grid_capacity(order, bytes_per_pixel) else {
        return Err(EncodeError::InvalidGeometry {
            order,
            bytes_per_pixel,
        });
    };
    let len = source.len() as u64;
    if len > capacity {
        return Err(EncodeError::CapacityExceeded { len, capacity });
    }

    let side = hilbert::side_len(order) as usize;
    let cell_bytes = bytes_per_pixel as usize;
    let mut payload = vec![0u8; capacity as usize];
    for (index, chunk) in source.chunks(cell_bytes).enumerate() {
        let (x, y) = hilbert::index_to_xy(order, index as u64);
        let offset = (y as usize * side + x as usize) * cell_bytes;
        payload[offset..offset + chunk.len()].copy_from_slice(chunk);
    }

    Ok(Brick {
        header: BrickHeader {
            magic: BRICK_MAGIC,
            version: BRICK_VERSION,
            order,
            bytes_per_pixel,
            original_size: len,
            entropy: entropy::measure(source),
        },
        payload,
    })
}

/// Encode into the smallest grid of at least `min_order` that holds `source`.
pub fn encode_fit(source: &[u8], bytes_per_pixel: u8, min_order: u8) -> Result<Brick, EncodeError> {
    let order = smallest_order_for(source.len() as u64, bytes_per_pixel)
        .map(|order| order.max(min_order))
        .ok_or(EncodeError::CapacityExceeded {
            len: source.len() as u64,
            capacity: grid_capacity(MAX_ORDER, bytes_per_pixel).unwrap_or(0),
        })?;
    encode(source, order, bytes_per_pixel)
}

pub fn smallest_order_for(len: u64, bytes_per_pixel: u8) -> Option<u8> {
    (0..=MAX_ORDER).find(|order| {
        grid_capacity(*order, bytes_per_pixel).is_some_and(|capacity| capacity >= len)
    })
}

pub fn decode(brick: &Brick) -> Result<Vec<u8>, DecodeError> {
    check_header(brick)?;

    let bytes = unfold_payload(brick);
    let actual = bytes.len() as u64;
    if actual != brick.header.original_size {
        return Err(DecodeError::LengthMismatch {
            expected: brick.header.original_size,
            actual,
        });
    }
    Ok(bytes)
}

/// Walk the curve for `original_size` bytes. The header must already have passed
/// [`check_header`].
pub(crate) fn unfold_payload(brick: &Brick) -> Vec<u8> {
    let order = brick.header.order;
    let cell_bytes = brick.header.bytes_per_pixel as usize;
    let side = hilbert::side_len(order) as usize;
    let original_size = brick.header.original_size as usize;
    let cell_total = original_size.div_ceil(cell_bytes);

    let mut bytes = Vec::with_capacity(cell_total * cell_bytes);
    for index in 0..cell_total {
        let (x, y) = hilbert::index_to_xy(order, index as u64);
        let offset = (y as usize * side + x as usize) * cell_bytes;
        bytes.extend_from_slice(&brick.payload[offset..offset + cell_bytes]);
    }
    bytes.truncate(original_size);
    bytes
}
