//! Front-end checks for hot-loaded programs before they reach the device.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use reload::CompileError;

pub const FRAGMENT_ENTRY: &str = "fs_main";
pub const VERTEX_ENTRY: &str = "vs_main";

pub const DEFAULT_PROGRAM: &str = include_str!("default_program.wgsl");
pub const FULLSCREEN_VERTEX: &str = include_str!("fullscreen.wgsl");

/// Parse and validate `source` and require a `fs_main` fragment entry point.
pub fn check_program(source: &str) -> Result<naga::Module, CompileError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|error| CompileError::new(error.emit_to_string(source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|error| CompileError::new(error.emit_to_string(source)))?;

    let has_fragment_entry = module.entry_points.iter().any(|entry| {
        entry.name == FRAGMENT_ENTRY && entry.stage == naga::ShaderStage::Fragment
    });
    if !has_fragment_entry {
        return Err(CompileError::new(format!(
            "program has no @fragment entry point named `{FRAGMENT_ENTRY}`"
        )));
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_programs_are_valid() {
        check_program(DEFAULT_PROGRAM).unwrap_or_else(|error| panic!("{error}"));
        let module = naga::front::wgsl::parse_str(FULLSCREEN_VERTEX)
            .unwrap_or_else(|error| panic!("{}", error.emit_to_string(FULLSCREEN_VERTEX)));
        assert!(module
            .entry_points
            .iter()
            .any(|entry| entry.name == VERTEX_ENTRY && entry.stage == naga::ShaderStage::Vertex));
    }

    #[test]
    fn syntax_error_is_reported_with_source_context() {
        let source = "@fragment fn fs_main( -> @location(0) vec4<f32> {}";
        let error = check_program(source).expect_err("broken program");
        assert!(error.message.contains("fs_main"), "{}", error.message);
    }

    #[test]
    fn type_error_is_caught_by_validation() {
        let source = "@fragment fn fs_main() -> @location(0) vec4<f32> { return 1.0; }";
        assert!(check_program(source).is_err());
    }

    #[test]
    fn missing_fragment_entry_is_rejected() {
        let source = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }";
        let error = check_program(source).expect_err("no fragment entry");
        assert!(error.message.contains("fs_main"));
    }
}
