use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

const MAGIC_LEN: usize = 4;

/// What a model or tokenizer file looks like on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiagnostics {
    pub path: PathBuf,
    pub exists: bool,
    pub size: Option<u64>,
    /// First bytes in upper-case hex
    pub magic_hex: Option<String>,
    /// First bytes as text, when they are valid UTF-8
    pub magic_text: Option<String>,
}

impl FileDiagnostics {
    pub fn inspect(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut diagnostics = FileDiagnostics {
            path: path.to_path_buf(),
            exists: path.is_file(),
            size: None,
            magic_hex: None,
            magic_text: None,
        };
        if !diagnostics.exists {
            return diagnostics;
        }

        diagnostics.size = std::fs::metadata(path).ok().map(|m| m.len());

        let mut magic = Vec::with_capacity(MAGIC_LEN);
        let read = File::open(path).and_then(|f| f.take(MAGIC_LEN as u64).read_to_end(&mut magic));
        if read.is_ok() {
            diagnostics.magic_hex = Some(magic.iter().map(|b| format!("{b:02X}")).collect());
            diagnostics.magic_text = std::str::from_utf8(&magic).ok().map(str::to_owned);
        }
        diagnostics
    }

    /// Emit the diagnostics at debug level under `label`
    pub fn log(&self, label: &str) {
        debug!(
            label = label,
            path = %self.path.display(),
            exists = self.exists,
            size = ?self.size,
            magic = ?self.magic_hex,
            text = ?self.magic_text,
            "File diagnostics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_inspect_binary_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]).unwrap();

        let diagnostics = FileDiagnostics::inspect(file.path());
        assert!(diagnostics.exists);
        assert_eq!(diagnostics.size, Some(6));
        assert_eq!(diagnostics.magic_hex.as_deref(), Some("DEADBEEF"));
        assert_eq!(diagnostics.magic_text, None);
    }

    #[test]
    fn test_inspect_text_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"PTE1rest").unwrap();

        let diagnostics = FileDiagnostics::inspect(file.path());
        assert_eq!(diagnostics.magic_hex.as_deref(), Some("50544531"));
        assert_eq!(diagnostics.magic_text.as_deref(), Some("PTE1"));
    }

    #[test]
    fn test_inspect_short_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ab").unwrap();
        assert_eq!(
            FileDiagnostics::inspect(file.path()).magic_hex.as_deref(),
            Some("6162")
        );
    }

    #[test]
    fn test_inspect_missing() {
        let diagnostics = FileDiagnostics::inspect("/no/such/model.pte");
        assert!(!diagnostics.exists);
        assert_eq!(diagnostics.size, None);
        assert_eq!(diagnostics.magic_hex, None);
        diagnostics.log("Model");
    }
}
