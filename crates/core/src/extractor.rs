use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    /// Returns the readable pages of a document in page order. A page that
    /// fails to decode is logged and skipped; only an unreadable file is an error.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        page = page_no,
                        error = %error,
                        "skipping unreadable page"
                    );
                    continue;
                }
            };

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(path)
}

#[cfg(test)]
mod tests {
    use super::extract_page_texts;
    use crate::IngestError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn broken_file_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_page_texts(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(extract_page_texts(std::path::Path::new("/nonexistent/LKAS_1.pdf")).is_err());
    }
}
