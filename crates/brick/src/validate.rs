//! Trust checks for bricks loaded from storage.
//!
//! Structural problems are hard errors. A disagreeing entropy is only a warning: a brick
//! whose pixels were edited by hand is expected to drift from its declared entropy while
//! still being well formed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::unfold_payload;
use crate::entropy;
use crate::format::{BRICK_MAGIC, Brick, MAX_BYTES_PER_PIXEL, SUPPORTED_VERSIONS, grid_capacity};
use crate::hilbert::MAX_ORDER;

pub const DEFAULT_ENTROPY_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("bad magic {found:?}, expected \"SBRK\"")]
    BadMagic { found: [u8; 4] },
    #[error("unsupported brick version {found}")]
    UnsupportedVersion { found: u32 },
    #[error(
        "dimension mismatch: order {order} with {bytes_per_pixel} bytes per pixel \
         does not describe a {payload_len}-byte payload"
    )]
    DimensionMismatch {
        order: u8,
        bytes_per_pixel: u8,
        payload_len: usize,
    },
    #[error("original size {original_size} exceeds grid capacity {capacity}")]
    CapacityInconsistent { original_size: u64, capacity: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ValidationWarning {
    EntropyMismatch { declared: f64, measured: f64 },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::EntropyMismatch { declared, measured } => write!(
                formatter,
                "entropy mismatch: declared {declared:.4} bits/byte, measured {measured:.4}"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Header checks, in order: magic, version, dimensions, capacity.
pub fn check_header(brick: &Brick) -> Result<(), ValidationError> {
    let header = &brick.header;
    if header.magic != BRICK_MAGIC {
        return Err(ValidationError::BadMagic {
            found: header.magic,
        });
    }
    if !SUPPORTED_VERSIONS.contains(&header.version) {
        return Err(ValidationError::UnsupportedVersion {
            found: header.version,
        });
    }

    let dimension_mismatch = ValidationError::DimensionMismatch {
        order: header.order,
        bytes_per_pixel: header.bytes_per_pixel,
        payload_len: brick.payload.len(),
    };
    if header.order > MAX_ORDER
        || header.bytes_per_pixel == 0
        || header.bytes_per_pixel > MAX_BYTES_PER_PIXEL
    {
        return Err(dimension_mismatch);
    }
    let Some(capacity) = grid_capacity(header.order, header.bytes_per_pixel) else {
        return Err(dimension_mismatch);
    };
    if brick.payload.len() as u64 != capacity {
        return Err(dimension_mismatch);
    }

    if header.original_size > capacity {
        return Err(ValidationError::CapacityInconsistent {
            original_size: header.original_size,
            capacity,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrickValidator {
    entropy_tolerance: f64,
}

impl Default for BrickValidator {
    fn default() -> Self {
        Self::new(DEFAULT_ENTROPY_TOLERANCE)
    }
}

impl BrickValidator {
    pub fn new(entropy_tolerance: f64) -> Self {
        assert!(
            entropy_tolerance.is_finite() && entropy_tolerance >= 0.0,
            "entropy tolerance must be a finite non-negative number"
        );
        Self { entropy_tolerance }
    }

    pub fn entropy_tolerance(&self) -> f64 {
        self.entropy_tolerance
    }

    pub fn validate(&self, brick: &Brick) -> Result<ValidationReport, ValidationError> {
        check_header(brick)?;

        let mut report = ValidationReport::default();
        let measured = entropy::measure(&unfold_payload(brick));
        let declared = brick.header.entropy;
        if !declared.is_finite() || (declared - measured).abs() > self.entropy_tolerance {
            tracing::warn!(
                target: "brick::validate",
                declared,
                measured,
                tolerance = self.entropy_tolerance,
                "brick entropy disagrees with its payload"
            );
            report
                .warnings
                .push(ValidationWarning::EntropyMismatch { declared, measured });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;

    fn shader_brick() -> Brick {
        encode(b"@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4(1.0); }", 4, 4)
            .expect("fits in a 16x16 grid")
    }

    #[test]
    fn freshly_encoded_brick_is_clean() {
        let report = BrickValidator::default()
            .validate(&shader_brick())
            .expect("valid header");
        assert!(report.is_clean());
    }

    #[test]
    fn altered_magic_is_rejected_first() {
        let mut brick = shader_brick();
        brick.header.magic = *b"JUNK";
        brick.header.version = 99;
        assert_eq!(
            check_header(&brick),
            Err(ValidationError::BadMagic { found: *b"JUNK" })
        );
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut brick = shader_brick();
        brick.header.version = 2;
        assert_eq!(
            check_header(&brick),
            Err(ValidationError::UnsupportedVersion { found: 2 })
        );
    }

    #[test]
    fn payload_not_matching_order_is_rejected() {
        let mut brick = shader_brick();
        brick.payload.pop();
        assert!(matches!(
            check_header(&brick),
            Err(ValidationError::DimensionMismatch {
                order: 4,
                bytes_per_pixel: 4,
                payload_len: 1023
            })
        ));

        let mut brick = shader_brick();
        brick.header.order = 5;
        assert!(matches!(
            check_header(&brick),
            Err(ValidationError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn unsupported_geometry_is_a_dimension_mismatch() {
        let mut brick = shader_brick();
        brick.header.order = MAX_ORDER + 1;
        assert!(matches!(
            check_header(&brick),
            Err(ValidationError::DimensionMismatch { .. })
        ));

        let mut brick = shader_brick();
        brick.header.bytes_per_pixel = 0;
        assert!(matches!(
            check_header(&brick),
            Err(ValidationError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn original_size_beyond_capacity_is_rejected() {
        let mut brick = shader_brick();
        brick.header.original_size = 1025;
        assert_eq!(
            check_header(&brick),
            Err(ValidationError::CapacityInconsistent {
                original_size: 1025,
                capacity: 1024
            })
        );
    }

    #[test]
    fn hand_edited_payload_only_warns() {
        let mut brick = shader_brick();
        let side = brick.side().expect("supported order");
        for index in 0..8 {
            let (x, y) = crate::hilbert::index_to_xy(brick.header.order, index);
            let offset = (y * side + x) as usize * 4;
            brick.payload[offset..offset + 4].copy_from_slice(&[0x7f; 4]);
        }
        let report = BrickValidator::default()
            .validate(&brick)
            .expect("edited brick is still well formed");
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            report.warnings[0],
            ValidationWarning::EntropyMismatch { .. }
        ));
    }

    #[test]
    fn non_finite_declared_entropy_warns() {
        let mut brick = shader_brick();
        brick.header.entropy = f64::NAN;
        let report = BrickValidator::default().validate(&brick).expect("valid header");
        assert!(!report.is_clean());
    }

    #[test]
    fn small_drift_within_tolerance_is_clean() {
        let mut brick = shader_brick();
        brick.header.entropy += 0.01;
        assert!(BrickValidator::new(0.05).validate(&brick).expect("valid").is_clean());
        assert!(!BrickValidator::new(0.0).validate(&brick).expect("valid").is_clean());
    }
}
