//! Offline brick tools behind the CLI subcommands.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use brick::{Brick, BrickValidator, EntropyClass};
use reload::ReloadConfig;
use serde::Serialize;

pub fn fold(
    source: &Path,
    output: Option<&Path>,
    order: Option<u8>,
    bytes_per_pixel: Option<u8>,
    config: &ReloadConfig,
) -> Result<PathBuf> {
    let bytes =
        std::fs::read(source).with_context(|| format!("read source {}", source.display()))?;
    let bytes_per_pixel = bytes_per_pixel.unwrap_or(config.bytes_per_pixel);
    let brick = match order.or(config.order) {
        Some(order) => brick::encode(&bytes, order, bytes_per_pixel),
        None => brick::encode_fit(&bytes, bytes_per_pixel, config.min_order),
    }
    .with_context(|| format!("encode {}", source.display()))?;

    let unfolded = brick::decode(&brick).context("decode freshly encoded brick")?;
    if unfolded != bytes {
        bail!("brick for {} does not reproduce its source", source.display());
    }

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source.with_extension(brick::BRICK_EXTENSION));
    brick::write_brick_atomic(&output, &brick)?;
    tracing::info!(
        target: "shader_host::commands",
        source = %source.display(),
        output = %output.display(),
        order = brick.header.order,
        bytes_per_pixel,
        entropy = brick.header.entropy,
        "folded"
    );
    Ok(output)
}

pub fn unfold(brick_path: &Path, output: Option<&Path>, entropy_tolerance: f64) -> Result<()> {
    let brick = brick::read_brick(brick_path)?;
    let report = BrickValidator::new(entropy_tolerance)
        .validate(&brick)
        .with_context(|| format!("validate {}", brick_path.display()))?;
    for warning in &report.warnings {
        tracing::warn!(target: "shader_host::commands", path = %brick_path.display(), %warning);
    }
    let bytes = brick::decode(&brick).with_context(|| format!("decode {}", brick_path.display()))?;

    match output {
        Some(output) => std::fs::write(output, &bytes)
            .with_context(|| format!("write {}", output.display()))?,
        None => std::io::stdout()
            .lock()
            .write_all(&bytes)
            .context("write decoded bytes to stdout")?,
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectReport {
    pub path: PathBuf,
    pub magic: String,
    pub version: u32,
    pub order: u8,
    pub side: Option<u32>,
    pub bytes_per_pixel: u8,
    pub original_size: u64,
    pub capacity: Option<u64>,
    /// SHA-256 of the serialized brick, as used to recognize the reload host's own writes.
    pub sha256: String,
    pub entropy: f64,
    pub class: EntropyClass,
    pub measured_entropy: Option<f64>,
    pub warnings: Vec<String>,
    /// Set when the brick fails validation; the header fields are still reported.
    pub error: Option<String>,
}

impl InspectReport {
    pub fn build(path: &Path, brick: &Brick, entropy_tolerance: f64) -> Self {
        let header = &brick.header;
        let (warnings, error) = match BrickValidator::new(entropy_tolerance).validate(brick) {
            Ok(report) => (
                report.warnings.iter().map(ToString::to_string).collect(),
                None,
            ),
            Err(error) => (Vec::new(), Some(error.to_string())),
        };
        let measured_entropy = error
            .is_none()
            .then(|| brick::decode(brick).ok())
            .flatten()
            .map(|bytes| brick::entropy::measure(&bytes));

        Self {
            path: path.to_path_buf(),
            magic: String::from_utf8_lossy(&header.magic).into_owned(),
            version: header.version,
            order: header.order,
            side: brick.side(),
            bytes_per_pixel: header.bytes_per_pixel,
            original_size: header.original_size,
            capacity: brick.capacity(),
            sha256: hex::encode(brick::content_digest(&brick.to_bytes())),
            entropy: header.entropy,
            class: EntropyClass::classify(header.entropy),
            measured_entropy,
            warnings,
            error,
        }
    }

    pub fn render_text(&self) -> String {
        let mut lines = vec![
            format!("path:           {}", self.path.display()),
            format!("magic/version:  {} v{}", self.magic, self.version),
        ];
        match self.side {
            Some(side) => lines.push(format!(
                "grid:           {side}x{side} (order {}), {} bytes per pixel",
                self.order, self.bytes_per_pixel
            )),
            None => lines.push(format!("grid:           order {} out of range", self.order)),
        }
        lines.push(format!(
            "size:           {} of {} bytes",
            self.original_size,
            self.capacity
                .map(|capacity| capacity.to_string())
                .unwrap_or_else(|| "?".to_string())
        ));
        lines.push(format!("sha256:         {}", self.sha256));
        lines.push(format!(
            "entropy:        {:.4} bits/byte ({:?})",
            self.entropy, self.class
        ));
        if let Some(measured) = self.measured_entropy {
            lines.push(format!("measured:       {measured:.4} bits/byte"));
        }
        for warning in &self.warnings {
            lines.push(format!("warning:        {warning}"));
        }
        match &self.error {
            Some(error) => lines.push(format!("invalid:        {error}")),
            None => lines.push("valid:          yes".to_string()),
        }
        lines.join("\n")
    }
}

pub fn inspect(brick_path: &Path, json: bool, entropy_tolerance: f64) -> Result<String> {
    let brick = brick::read_brick(brick_path)?;
    let report = InspectReport::build(brick_path, &brick, entropy_tolerance);
    if json {
        serde_json::to_string_pretty(&report).context("serialize inspect report")
    } else {
        Ok(report.render_text())
    }
}

pub fn export_png(brick_path: &Path, output: &Path) -> Result<()> {
    let brick = brick::read_brick(brick_path)?;
    brick::export_png(&brick, output)?;
    tracing::info!(
        target: "shader_host::commands",
        brick = %brick_path.display(),
        output = %output.display(),
        "payload exported"
    );
    Ok(())
}

/// Swap in an edited payload. The header, including the declared entropy, is kept.
pub fn import_png(
    brick_path: &Path,
    png: &Path,
    output: Option<&Path>,
    entropy_tolerance: f64,
) -> Result<PathBuf> {
    let brick = brick::read_brick(brick_path)?;
    let edited = brick::import_png_payload(&brick, png)?;
    let report = BrickValidator::new(entropy_tolerance)
        .validate(&edited)
        .context("validate edited brick")?;
    for warning in &report.warnings {
        tracing::warn!(target: "shader_host::commands", png = %png.display(), %warning);
    }

    let output = output.unwrap_or(brick_path).to_path_buf();
    brick::write_brick_atomic(&output, &edited)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &[u8] = b"Hello, Geometry!\n";

    #[test]
    fn fold_then_unfold_restores_the_source() {
        let directory = tempfile::tempdir().expect("tempdir");
        let source = directory.path().join("hello.txt");
        std::fs::write(&source, HELLO).expect("write source");

        let brick_path =
            fold(&source, None, Some(4), Some(4), &ReloadConfig::default()).expect("fold");
        assert_eq!(brick_path, directory.path().join("hello.brick"));

        let unfolded = directory.path().join("hello.out");
        unfold(&brick_path, Some(&unfolded), brick::DEFAULT_ENTROPY_TOLERANCE).expect("unfold");
        assert_eq!(std::fs::read(&unfolded).expect("read"), HELLO);
    }

    #[test]
    fn fold_reports_capacity_overflow() {
        let directory = tempfile::tempdir().expect("tempdir");
        let source = directory.path().join("big.txt");
        std::fs::write(&source, vec![b'x'; 1025]).expect("write source");
        let error = fold(&source, None, Some(4), Some(4), &ReloadConfig::default())
            .expect_err("too large");
        assert!(
            error
                .chain()
                .any(|cause| cause.to_string().contains("exceeds brick capacity")),
            "{error:#}"
        );
        assert!(!directory.path().join("big.brick").exists());
    }

    #[test]
    fn inspect_json_reports_header_facts() {
        let directory = tempfile::tempdir().expect("tempdir");
        let brick_path = directory.path().join("hello.brick");
        brick::write_brick_atomic(&brick_path, &brick::encode(HELLO, 4, 4).expect("fits"))
            .expect("write");

        let json = inspect(&brick_path, true, brick::DEFAULT_ENTROPY_TOLERANCE).expect("inspect");
        let value: serde_json::Value = serde_json::from_str(&json).expect("json");
        assert_eq!(value["side"], 16);
        assert_eq!(value["original_size"], 17);
        assert_eq!(value["class"], "Text");
        assert!(value["error"].is_null());
        let on_disk = std::fs::read(&brick_path).expect("read");
        let digest = hex::encode(brick::content_digest(&on_disk));
        assert_eq!(value["sha256"], digest.as_str());

        let text = inspect(&brick_path, false, brick::DEFAULT_ENTROPY_TOLERANCE).expect("inspect");
        assert!(text.contains("16x16"), "{text}");
        assert!(text.contains(&format!("sha256:         {digest}")), "{text}");
    }

    #[test]
    fn inspect_shows_why_a_brick_is_invalid() {
        let mut brick = brick::encode(HELLO, 4, 4).expect("fits");
        brick.header.magic = *b"PNG\0";
        let report = InspectReport::build(Path::new("bad.brick"), &brick, 0.05);
        assert!(report.error.as_deref().is_some_and(|error| error.contains("bad magic")));
        assert_eq!(report.measured_entropy, None);
    }

    #[test]
    fn png_round_trip_through_commands_keeps_brick_valid() {
        let directory = tempfile::tempdir().expect("tempdir");
        let brick_path = directory.path().join("hello.brick");
        let png_path = directory.path().join("hello.png");
        let original = brick::encode(HELLO, 4, 4).expect("fits");
        brick::write_brick_atomic(&brick_path, &original).expect("write");

        export_png(&brick_path, &png_path).expect("export");
        let imported = directory.path().join("imported.brick");
        import_png(&brick_path, &png_path, Some(&imported), 0.05).expect("import");
        assert_eq!(brick::read_brick(&imported).expect("read"), original);
    }
}
