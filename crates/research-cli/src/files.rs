//! Source documents: local files, downloads and PDF conversion

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use research_core::text::replace_special_chars_with_ascii;
use tracing::{debug, warn};

/// Whole file as a string; a missing file is reported to `out` and yields `None`
pub fn read_file_contents(path: &Path, out: &mut String) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            out.push_str(&format!("Error: File '{}' not found.\n", path.display()));
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Save the body of `url` to `filepath`.
///
/// Failures are reported to `out` and yield `None`.
pub async fn download_file(
    http: &reqwest::Client,
    url: &str,
    filepath: &Path,
    out: &mut String,
) -> Option<PathBuf> {
    match fetch_to(http, url, filepath).await {
        Ok(()) => Some(filepath.to_path_buf()),
        Err(e) => {
            warn!(url, error = %e, "Download failed");
            out.push_str(&format!("Error downloading file from {}: {:#}\n", url, e));
            None
        }
    }
}

async fn fetch_to(http: &reqwest::Client, url: &str, filepath: &Path) -> Result<()> {
    let response = http.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    tokio::fs::write(filepath, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", filepath.display()))?;
    debug!(url, bytes = bytes.len(), "Downloaded file");
    Ok(())
}

/// Convert `<directory>/<filestem>.pdf` to ASCII text in `<directory>/<filestem>.txt`
pub async fn convert_pdf_to_text(filestem: &str, directory: &Path, out: &mut String) -> Option<PathBuf> {
    let pdf_path = directory.join(format!("{filestem}.pdf"));
    let txt_path = directory.join(format!("{filestem}.txt"));

    if !pdf_path.exists() {
        out.push_str(&format!("PDF file '{}' does not exist.\n", pdf_path.display()));
        return None;
    }

    let source = pdf_path.clone();
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&source))
        .await
        .context("PDF extraction task failed")
        .and_then(|result| result.context("Failed to extract text"));

    let written = match extracted {
        Ok(text) => std::fs::write(&txt_path, replace_special_chars_with_ascii(&text))
            .with_context(|| format!("Failed to write {}", txt_path.display())),
        Err(e) => Err(e),
    };

    match written {
        Ok(()) => {
            out.push_str(&format!(
                "Successfully converted '{}' to '{}'.\n",
                pdf_path.display(),
                txt_path.display()
            ));
            Some(txt_path)
        }
        Err(e) => {
            out.push_str(&format!("An error occurred while converting the PDF: {:#}\n", e));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_read_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "OLMo notes\n").unwrap();

        let mut out = String::new();
        assert_eq!(read_file_contents(&file, &mut out).unwrap().as_deref(), Some("OLMo notes\n"));
        assert!(out.is_empty());

        let missing = dir.path().join("missing.txt");
        assert_eq!(read_file_contents(&missing, &mut out).unwrap(), None);
        assert_eq!(out, format!("Error: File '{}' not found.\n", missing.display()));
    }

    #[tokio::test]
    async fn test_download_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("paper.pdf");
        let http = reqwest::Client::new();

        let mut out = String::new();
        let saved = download_file(&http, &format!("{}/paper.pdf", server.uri()), &target, &mut out).await;
        assert_eq!(saved, Some(target.clone()));
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.4");

        let missing = download_file(
            &http,
            &format!("{}/missing.pdf", server.uri()),
            &dir.path().join("missing.pdf"),
            &mut out,
        )
        .await;
        assert!(missing.is_none());
        assert!(out.starts_with("Error downloading file from "));
    }

    #[tokio::test]
    async fn test_convert_missing_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = String::new();
        assert!(convert_pdf_to_text("absent", dir.path(), &mut out).await.is_none());
        assert!(out.ends_with("absent.pdf' does not exist.\n"));
    }

    #[tokio::test]
    async fn test_convert_corrupt_pdf_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"not a pdf").unwrap();
        let mut out = String::new();
        assert!(convert_pdf_to_text("broken", dir.path(), &mut out).await.is_none());
        assert!(!dir.path().join("broken.txt").exists());
        assert!(out.starts_with("An error occurred while converting the PDF"));
    }
}
