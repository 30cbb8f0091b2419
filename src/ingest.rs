//! `docsift ingest`: push local files through the pipeline.
//!
//! Arguments may be files or directories; directories are walked
//! recursively (hidden entries skipped). Each file's bytes are copied to
//! `[storage].upload_dir` as `<hash16>-<filename>` before ingestion, which
//! is also how the HTTP upload endpoint stores files.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use docsift_core::chunk::sha256_hex;
use docsift_core::error::PipelineError;
use docsift_core::pipeline::Upload;

use crate::config::Config;
use crate::extract::content_type_for_path;
use crate::services::AppContext;

/// Copy upload bytes into the upload directory; returns the stored path.
pub async fn store_upload(upload_dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", upload_dir.display()))?;
    let hash = sha256_hex(bytes);
    let path = upload_dir.join(format!("{}-{}", &hash[..16], sanitize_filename(filename)));
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Keep only the final path component and replace separators.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload".to_string()
    } else {
        base.to_string()
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            anyhow::bail!("No such file or directory: {}", path.display());
        }
        for entry in WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    Ok(files)
}

pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    content_type: Option<&str>,
) -> Result<()> {
    let files = collect_files(paths)?;
    let ctx = AppContext::from_config(config).await?;

    let mut ingested = 0u64;
    let mut degraded = 0u64;
    let mut failed = 0u64;
    let mut links = 0usize;

    for file in &files {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let declared = content_type.unwrap_or_else(|| content_type_for_path(file));
        let stored = store_upload(&config.storage.upload_dir, &filename, &bytes).await?;
        let storage_path = stored.to_string_lossy();

        let upload = Upload {
            bytes: &bytes,
            filename: &filename,
            content_type: declared,
            storage_path: &storage_path,
        };
        match ctx.pipeline.ingest(upload).await {
            Ok(report) => {
                ingested += 1;
                let newly: usize = report.duplicates.iter().filter(|d| d.newly_linked).count();
                links += newly;
                if !report.document.warnings.is_empty() {
                    degraded += 1;
                }
                println!(
                    "{}  {}  {}  chunks={} embedded={} duplicates={}",
                    report.document.id,
                    report.document.status,
                    filename,
                    report.chunks,
                    report.embedded_chunks,
                    report.duplicates.len()
                );
                for warning in &report.document.warnings {
                    println!("    warning: {}", warning);
                }
            }
            Err(PipelineError::Extraction {
                document_id,
                source,
            }) => {
                failed += 1;
                eprintln!("{}  failed  {}  {}", document_id, filename, source);
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("ingest");
    println!("  files found: {}", files.len());
    println!("  ingested: {}", ingested);
    println!("  with warnings: {}", degraded);
    println!("  failed: {}", failed);
    println!("  duplicate links: {}", links);
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\a.txt"), "a.txt");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[tokio::test]
    async fn test_store_upload_names_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_upload(dir.path(), "a/b.txt", b"hello").await.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("-b.txt"));
        assert_eq!(name.len(), 16 + 1 + "b.txt".len());
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_collect_files_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.md"), "b").unwrap();

        let files = collect_files(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(collect_files(&[dir.path().join("missing")]).is_err());
    }
}
