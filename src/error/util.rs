//! Utility functions for error handling
//!
//! File access helpers that attach the path and the purpose of the access to
//! every failure, so a missing codelist or table is reported precisely.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{DatasetError, Result};

/// Safely open a file with rich error information
///
/// # Arguments
/// * `path` - The path to the file to open
/// * `purpose` - Why the file is being opened (for error context)
///
/// # Returns
/// * `Result<fs::File>` - The opened file or a detailed error
pub fn safe_open_file(path: &Path, purpose: &str) -> Result<fs::File> {
    if !path.exists() {
        return Err(DatasetError::io(
            format!("File not found (needed for: {purpose})"),
            path,
        ));
    }

    if !path.is_file() {
        return Err(DatasetError::io(
            format!("Path is not a file (expected a file for: {purpose})"),
            path,
        ));
    }

    fs::File::open(path).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::PermissionDenied => {
                "Permission denied - check file permissions".to_string()
            }
            _ => format!("Failed to open file for: {purpose}"),
        };
        DatasetError::io_with_source(context, path, e)
    })
}

/// Check if a directory exists and is readable, with rich error information
pub fn validate_directory(path: &Path, purpose: &str) -> Result<()> {
    if !path.exists() {
        return Err(DatasetError::io(
            format!("Directory not found (needed for: {purpose})"),
            path,
        ));
    }

    if !path.is_dir() {
        return Err(DatasetError::io(
            format!("Path is not a directory (expected a directory for: {purpose})"),
            path,
        ));
    }

    fs::read_dir(path).map(|_| ()).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::PermissionDenied => {
                "Permission denied - check directory permissions".to_string()
            }
            _ => format!("Failed to access directory for: {purpose}"),
        };
        DatasetError::io_with_source(context, path, e)
    })
}

/// Safely read a file to string with rich error information
pub fn safe_read_to_string(path: &Path, purpose: &str) -> Result<String> {
    let mut file = safe_open_file(path, purpose)?;

    let mut content = String::new();
    io::Read::read_to_string(&mut file, &mut content).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::InvalidData => {
                "File contains invalid UTF-8 data - cannot read as text".to_string()
            }
            _ => format!("Failed to read file content for: {purpose}"),
        };
        DatasetError::io_with_source(context, path, e)
    })?;

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_names_purpose() {
        let err = safe_open_file(Path::new("/definitely/not/here.csv"), "prostate codelist")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("prostate codelist"));
        assert!(message.contains("/definitely/not/here.csv"));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("table.parquet");
        fs::write(&file, b"x").unwrap();

        assert!(validate_directory(dir.path(), "tables").is_ok());
        assert!(validate_directory(&file, "tables").is_err());
    }
}
