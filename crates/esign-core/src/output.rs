//! Signed PDF output
//!
//! Output is written to a temporary file next to its destination and renamed
//! into place only once every byte is on disk. A failed write leaves nothing
//! at the final path.

use crate::error::StampError;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Where a signed document ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedArtifact {
    /// Generated name, `signed_<token>.pdf`
    pub file_name: String,
    pub path: PathBuf,
}

/// Fresh, collision-free output name
pub fn signed_file_name() -> String {
    format!("signed_{}.pdf", Uuid::new_v4().simple())
}

/// Write `bytes` to a newly named file in `output_dir`.
pub fn write_signed_pdf(output_dir: &Path, bytes: &[u8]) -> Result<SignedArtifact, StampError> {
    std::fs::create_dir_all(output_dir).map_err(|e| {
        StampError::OutputWrite(format!("create {}: {}", output_dir.display(), e))
    })?;

    let file_name = signed_file_name();
    let path = output_dir.join(&file_name);

    let mut temp = tempfile::Builder::new()
        .prefix(".signed-")
        .suffix(".part")
        .tempfile_in(output_dir)
        .map_err(|e| StampError::OutputWrite(e.to_string()))?;
    temp.write_all(bytes)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| StampError::OutputWrite(e.to_string()))?;

    // The temp file is deleted on drop if the rename fails
    temp.persist_noclobber(&path)
        .map_err(|e| StampError::OutputWrite(e.error.to_string()))?;

    Ok(SignedArtifact { file_name, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let a = signed_file_name();
        let b = signed_file_name();
        assert_ne!(a, b);
        assert!(a.starts_with("signed_"));
        assert!(a.ends_with(".pdf"));
    }

    #[test]
    fn test_write_leaves_only_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("documents");

        let artifact = write_signed_pdf(&out, b"%PDF-1.7 test").unwrap();

        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"%PDF-1.7 test");
        let names: Vec<String> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![artifact.file_name]);
    }

    #[test]
    fn test_unwritable_directory_is_output_error() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the output directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"x").unwrap();

        let err = write_signed_pdf(&blocker, b"%PDF").unwrap_err();
        assert!(matches!(err, StampError::OutputWrite(_)));
    }
}
