//! Runtime configuration for `clox`: the debug switches a C implementation
//! would gate behind `#define`s, re-architected here as a runtime-toggleable
//! config set from CLI flags or a `clox.toml` file.

use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Debug switches as fields on a config object, set from CLI flags or a
/// `clox.toml` project file and combined with the builder methods below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunConfig {
    /// `DEBUG_DUMP_CODE`: disassemble each finished function as soon as it
    /// compiles.
    pub dump_code: bool,
    /// `DEBUG_TRACE_EXECUTION`: print the stack and next instruction before
    /// every dispatch-loop step.
    pub trace_execution: bool,
    /// `DEBUG_CONST_TABLE_EXTRA`: annotate the constant pool dump with each
    /// entry's runtime type, not just its printed value.
    pub const_table_extra: bool,
}

impl RunConfig {
    #[must_use]
    pub fn new() -> Self {
        RunConfig::default()
    }

    #[must_use]
    pub fn with_dump_code(mut self, enabled: bool) -> Self {
        self.dump_code = enabled;
        self
    }

    #[must_use]
    pub fn with_trace_execution(mut self, enabled: bool) -> Self {
        self.trace_execution = enabled;
        self
    }

    #[must_use]
    pub fn with_const_table_extra(mut self, enabled: bool) -> Self {
        self.const_table_extra = enabled;
        self
    }

    /// Merge in whichever fields `other` sets to `true`; used to combine a
    /// `clox.toml` file's settings with CLI flags (flags win when both are
    /// present, since the caller applies them after loading the file).
    #[must_use]
    pub fn merge(mut self, other: RunConfig) -> Self {
        self.dump_code |= other.dump_code;
        self.trace_execution |= other.trace_execution;
        self.const_table_extra |= other.const_table_extra;
        self
    }
}

/// On-disk shape of `clox.toml`, parsed with the `toml` crate.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    dump_code: bool,
    #[serde(default)]
    trace_execution: bool,
    #[serde(default)]
    dump_constants: bool,
}

impl From<FileConfig> for RunConfig {
    fn from(file: FileConfig) -> Self {
        RunConfig {
            dump_code: file.dump_code,
            trace_execution: file.trace_execution,
            const_table_extra: file.dump_constants,
        }
    }
}

/// Load `clox.toml` from `path` if it exists; a missing file is not an
/// error (it simply yields the all-`false` default), but a present, invalid
/// file is.
pub fn load_config_file(path: &Path) -> Result<RunConfig, String> {
    if !path.exists() {
        return Ok(RunConfig::default());
    }
    let text = fs::read_to_string(path)
        .map_err(|e| format!("could not read {}: {e}", path.display()))?;
    let file: FileConfig =
        toml::from_str(&text).map_err(|e| format!("could not parse {}: {e}", path.display()))?;
    Ok(file.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_all_switches_off() {
        let config = RunConfig::new();
        assert!(!config.dump_code);
        assert!(!config.trace_execution);
        assert!(!config.const_table_extra);
    }

    #[test]
    fn builder_methods_set_individual_flags() {
        let config = RunConfig::new().with_dump_code(true).with_trace_execution(true);
        assert!(config.dump_code);
        assert!(config.trace_execution);
        assert!(!config.const_table_extra);
    }

    #[test]
    fn merge_ors_each_field() {
        let a = RunConfig::new().with_dump_code(true);
        let b = RunConfig::new().with_trace_execution(true);
        let merged = a.merge(b);
        assert!(merged.dump_code);
        assert!(merged.trace_execution);
    }

    #[test]
    fn missing_config_file_yields_default() {
        let config = load_config_file(Path::new("/nonexistent/clox.toml")).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn parses_clox_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clox.toml");
        fs::write(&path, "dump_code = true\ndump_constants = true\n").unwrap();
        let config = load_config_file(&path).unwrap();
        assert!(config.dump_code);
        assert!(config.const_table_extra);
        assert!(!config.trace_execution);
    }

    #[test]
    fn invalid_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clox.toml");
        fs::write(&path, "dump_code = \"not a bool\"\n").unwrap();
        assert!(load_config_file(&path).is_err());
    }
}
