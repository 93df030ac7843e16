//! Spatial brick codec.
//!
//! A brick stores a byte sequence in a square pixel grid, placing consecutive chunks along a
//! Hilbert curve so neighbouring bytes stay spatially close. The header records the grid
//! geometry, the original length and the Shannon entropy of the source.

pub mod codec;
pub mod entropy;
pub mod format;
pub mod hilbert;
pub mod image_io;
pub mod storage;
pub mod validate;

pub use codec::{DecodeError, EncodeError, decode, encode, encode_fit, smallest_order_for};
pub use entropy::EntropyClass;
pub use format::{
    BRICK_EXTENSION, BRICK_MAGIC, BRICK_VERSION, Brick, BrickHeader, BrickParseError,
    HEADER_LEN, MAX_BYTES_PER_PIXEL, grid_capacity,
};
pub use hilbert::MAX_ORDER;
pub use image_io::{BrickImageError, export_png, import_png_payload};
pub use storage::{
    BrickDigest, BrickReadError, BrickWriteError, brick_path_for, content_digest, is_brick_path,
    read_brick, write_brick_atomic,
};
pub use validate::{
    BrickValidator, DEFAULT_ENTROPY_TOLERANCE, ValidationError, ValidationReport,
    ValidationWarning, check_header,
};
