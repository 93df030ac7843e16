use std::path::PathBuf;
use std::time::Instant;

use brick::{Brick, EntropyClass, ValidationReport, ValidationWarning};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub timestamp: Instant,
}

impl WatchEvent {
    pub fn now(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timestamp: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReloadKind {
    /// Program text that is folded into a brick before loading.
    Source,
    /// A brick file, loaded as found on disk.
    Brick,
}

/// Header facts of the brick behind a swap, kept for display after the brick is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickSummary {
    pub order: u8,
    pub side: u32,
    pub bytes_per_pixel: u8,
    pub original_size: u64,
    pub entropy: f64,
    pub class: EntropyClass,
    pub warnings: Vec<ValidationWarning>,
}

impl BrickSummary {
    pub fn describe(brick: &Brick, report: &ValidationReport) -> Self {
        Self {
            order: brick.header.order,
            side: brick.side().unwrap_or(0),
            bytes_per_pixel: brick.header.bytes_per_pixel,
            original_size: brick.header.original_size,
            entropy: brick.header.entropy,
            class: EntropyClass::classify(brick.header.entropy),
            warnings: report.warnings.clone(),
        }
    }
}

/// A compiled program and its uploaded texture, ready to replace the active pair.
#[derive(Debug)]
pub struct SwapRequest<Program, Texture> {
    pub generation: u64,
    pub path: PathBuf,
    pub program: Program,
    pub texture: Texture,
    pub summary: BrickSummary,
}

impl<Program, Texture> SwapRequest<Program, Texture> {
    /// Collapse two pending requests into the one with the newer generation.
    pub fn merge_mailbox(current: Self, newer: Self) -> Self {
        if newer.generation >= current.generation {
            newer
        } else {
            current
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadStage {
    Reading,
    Encoding,
    Writing,
    Decoding,
    Validating,
    Compiling,
    Uploading,
    Swapping,
}

impl std::fmt::Display for ReloadStage {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReloadStage::Reading => "read",
            ReloadStage::Encoding => "encode",
            ReloadStage::Writing => "write",
            ReloadStage::Decoding => "decode",
            ReloadStage::Validating => "validate",
            ReloadStage::Compiling => "compile",
            ReloadStage::Uploading => "upload",
            ReloadStage::Swapping => "swap",
        };
        formatter.write_str(name)
    }
}

/// Coarse position of the reload state machine, without the per-path payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadPhase {
    #[default]
    Idle,
    Pending,
    Encoding,
    Decoding,
    Compiling,
    Uploading,
    Swapping,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadOutcome {
    /// Handed to the render loop; becomes active at the next frame boundary.
    Submitted { generation: u64 },
    Failed { stage: ReloadStage, reason: String },
    /// A newer event for the same path arrived before the attempt committed.
    Superseded { generation: u64 },
    /// The file matches a brick this process wrote itself.
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadCounters {
    pub events: u64,
    pub attempts: u64,
    pub submitted: u64,
    pub failed: u64,
    pub superseded: u64,
    pub unchanged: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReloadStatus {
    pub phase: ReloadPhase,
    pub active_generation: Option<u64>,
    pub last_path: Option<PathBuf>,
    pub last_brick: Option<BrickSummary>,
    pub last_outcome: Option<ReloadOutcome>,
    pub counters: ReloadCounters,
}

impl ReloadStatus {
    /// One-line summary used for window titles and logs.
    pub fn headline(&self) -> String {
        let mut line = match &self.last_brick {
            Some(summary) => format!(
                "{side}x{side} P={bpp} H={entropy:.3} ({class:?})",
                side = summary.side,
                bpp = summary.bytes_per_pixel,
                entropy = summary.entropy,
                class = summary.class,
            ),
            None => "no brick".to_string(),
        };
        if let Some(generation) = self.active_generation {
            line.push_str(&format!(" gen {generation}"));
        }
        match &self.last_outcome {
            Some(ReloadOutcome::Failed { stage, reason }) => {
                line.push_str(&format!(" | {stage} failed: {reason}"));
            }
            Some(ReloadOutcome::Superseded { .. }) => line.push_str(" | superseded"),
            _ => {}
        }
        if self
            .last_brick
            .as_ref()
            .is_some_and(|summary| !summary.warnings.is_empty())
        {
            line.push_str(" | entropy mismatch");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(generation: u64) -> SwapRequest<u64, u64> {
        SwapRequest {
            generation,
            path: PathBuf::from("shader.wgsl"),
            program: generation,
            texture: generation,
            summary: BrickSummary {
                order: 4,
                side: 16,
                bytes_per_pixel: 4,
                original_size: 17,
                entropy: 3.5,
                class: EntropyClass::Text,
                warnings: Vec::new(),
            },
        }
    }

    #[test]
    fn mailbox_merge_keeps_newest_generation_in_any_order() {
        let merged = SwapRequest::merge_mailbox(request(3), request(5));
        assert_eq!(merged.generation, 5);
        let merged = SwapRequest::merge_mailbox(request(7), request(4));
        assert_eq!(merged.generation, 7);
        assert_eq!((merged.program, merged.texture), (7, 7));
    }

    #[test]
    fn summary_reflects_header_and_warnings() {
        let brick = brick::encode(b"Hello, Geometry!\n", 4, 4).expect("fits");
        let report = ValidationReport {
            warnings: vec![ValidationWarning::EntropyMismatch {
                declared: 1.0,
                measured: 2.0,
            }],
        };
        let summary = BrickSummary::describe(&brick, &report);
        assert_eq!(summary.side, 16);
        assert_eq!(summary.original_size, 17);
        assert_eq!(summary.class, EntropyClass::Text);
        assert_eq!(summary.warnings.len(), 1);
    }

    #[test]
    fn headline_mentions_failures_and_mismatches() {
        let mut status = ReloadStatus {
            active_generation: Some(2),
            last_brick: Some(request(2).summary),
            last_outcome: Some(ReloadOutcome::Failed {
                stage: ReloadStage::Compiling,
                reason: "expected `;`".to_string(),
            }),
            ..ReloadStatus::default()
        };
        let line = status.headline();
        assert!(line.starts_with("16x16 P=4"));
        assert!(line.contains("gen 2"));
        assert!(line.contains("compile failed: expected `;`"));

        if let Some(summary) = status.last_brick.as_mut() {
            summary.warnings.push(ValidationWarning::EntropyMismatch {
                declared: 0.0,
                measured: 4.0,
            });
        }
        assert!(status.headline().ends_with("entropy mismatch"));
    }

    #[test]
    fn status_serializes_to_json() {
        let status = ReloadStatus {
            phase: ReloadPhase::Compiling,
            last_outcome: Some(ReloadOutcome::Submitted { generation: 9 }),
            ..ReloadStatus::default()
        };
        let json = serde_json::to_string(&status).expect("serialize");
        assert!(json.contains("\"Compiling\""));
        let back: ReloadStatus = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, status);
    }
}
