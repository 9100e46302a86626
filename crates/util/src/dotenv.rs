//! `.env` file variable loader.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::substitution::VariableLoader;

static DOTENV_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z0-9_]+)\s*=\s*(.*?)\s*$").expect("dotenv line regex should compile"));

/// Serves variables parsed from a `KEY=VALUE` file.
#[derive(Debug, Clone, Default)]
pub struct DotEnvVariableLoader {
    path: Option<PathBuf>,
    values: HashMap<String, String>,
}

impl DotEnvVariableLoader {
    /// Reads and parses `path`. A missing file yields an empty loader.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let values = match std::fs::read_to_string(path) {
            Ok(contents) => parse_dotenv(&contents),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(target: "utcp_substitution", path = %path.display(), "dotenv file not found, no variables loaded");
                HashMap::new()
            }
            Err(error) => return Err(error),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            values,
        })
    }

    /// Parses `.env` contents that are already in memory.
    pub fn from_contents(contents: &str) -> Self {
        Self {
            path: None,
            values: parse_dotenv(contents),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl VariableLoader for DotEnvVariableLoader {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

fn parse_dotenv(contents: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(captures) = DOTENV_LINE.captures(line) else {
            continue;
        };
        let key = captures[1].to_string();
        values.insert(key, strip_matching_quotes(&captures[2]).to_string());
    }
    values
}

fn strip_matching_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parses_assignments_comments_and_quotes() {
        let loader = DotEnvVariableLoader::from_contents(
            "# comment\n\nAPI_KEY = abc123\nQUOTED=\"hello world\"\nSINGLE='x'\nnot a variable line\nEMPTY=\n",
        );
        assert_eq!(loader.get("API_KEY").as_deref(), Some("abc123"));
        assert_eq!(loader.get("QUOTED").as_deref(), Some("hello world"));
        assert_eq!(loader.get("SINGLE").as_deref(), Some("x"));
        assert_eq!(loader.get("EMPTY").as_deref(), Some(""));
        assert_eq!(loader.len(), 4);
    }

    #[test]
    fn test_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "manual__weather_API_KEY=from-file").expect("write");

        let loader = DotEnvVariableLoader::from_path(file.path()).expect("load");
        assert_eq!(loader.get("manual__weather_API_KEY").as_deref(), Some("from-file"));
        assert_eq!(loader.path(), Some(file.path()));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let directory = tempfile::tempdir().expect("temp dir");
        let loader = DotEnvVariableLoader::from_path(directory.path().join(".env")).expect("load");
        assert!(loader.is_empty());
    }
}
