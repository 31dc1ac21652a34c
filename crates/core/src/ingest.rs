use crate::{IngestError, SourceDocument};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if is_pdf(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Reads a single PDF, or every PDF below a folder, into memory.
pub fn load_documents(path: &Path) -> Result<Vec<SourceDocument>, IngestError> {
    let files = if path.is_dir() {
        discover_pdf_files(path)
    } else if is_pdf(path) {
        vec![path.to_path_buf()]
    } else {
        Vec::new()
    };

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            path.display()
        )));
    }

    files
        .into_iter()
        .map(|file| {
            let bytes = fs::read(&file)?;
            let filename = file
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| {
                    IngestError::InvalidArgument(format!(
                        "path missing filename: {}",
                        file.display()
                    ))
                })?;
            Ok(SourceDocument::new(filename, bytes))
        })
        .collect()
}
