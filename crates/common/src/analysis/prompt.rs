//! Prompt construction

use crate::domain::UploadRecord;
use lopdf::Document;
use tracing::debug;

/// Builds the text-generation prompt for one source document.
///
/// The prompt always carries the file metadata. When the bytes are plain
/// text or a PDF with a text layer, a bounded excerpt of the content is
/// appended so the model sees more than the file name.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    excerpt_chars: usize,
}

impl PromptBuilder {
    pub fn new(excerpt_chars: usize) -> Self {
        Self { excerpt_chars }
    }

    pub fn build(&self, upload: &UploadRecord, content: &[u8]) -> String {
        let extension = upload.extension().unwrap_or_else(|| "unknown".to_string());

        let mut prompt = format!(
            "You are assisting clinicians who are reviewing a patient document.\n\
             Document name: {}\n\
             Document type: {}\n\
             Size: {} bytes\n",
            upload.file_name,
            extension,
            content.len()
        );

        match self.excerpt(&extension, content) {
            Some(excerpt) => {
                prompt.push_str("\nDocument text (excerpt):\n");
                prompt.push_str(&excerpt);
                prompt.push('\n');
            }
            None => prompt.push_str("\nThe document content is not available as text.\n"),
        }

        prompt.push_str(
            "\nWrite a short clinical summary. State each key finding as a sentence \
             starting with \"Finding:\" and each recommendation as a sentence starting \
             with \"Recommend\".",
        );
        prompt
    }

    fn excerpt(&self, extension: &str, content: &[u8]) -> Option<String> {
        if self.excerpt_chars == 0 {
            return None;
        }

        let raw = match extension {
            "txt" => Some(String::from_utf8_lossy(content).into_owned()),
            "pdf" => pdf_text(content),
            _ => None,
        }?;

        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return None;
        }
        Some(normalized.chars().take(self.excerpt_chars).collect())
    }
}

/// Text layer of a PDF, `None` when unreadable or image-only
fn pdf_text(content: &[u8]) -> Option<String> {
    let document = match Document::load_mem(content) {
        Ok(document) => document,
        Err(e) => {
            debug!(error = %e, "PDF could not be parsed for text");
            return None;
        }
    };
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    document.extract_text(&pages).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn upload(name: &str, content_type: &str) -> UploadRecord {
        UploadRecord::pending(
            Uuid::new_v4(),
            "patients/x/documents/y.bin".into(),
            name,
            content_type,
            10,
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_text_excerpt_is_bounded() {
        let builder = PromptBuilder::new(12);
        let prompt = builder.build(&upload("notes.txt", "text/plain"), b"Patient   reports\nmild pain since Monday");
        assert!(prompt.contains("Document name: notes.txt"));
        assert!(prompt.contains("Document type: txt"));
        assert!(prompt.contains("Patient repo"));
        assert!(!prompt.contains("Monday"));
    }

    #[test]
    fn test_image_gets_metadata_only() {
        let builder = PromptBuilder::new(100);
        let prompt = builder.build(&upload("scan.png", "image/png"), &[0x89, 0x50, 0x4e, 0x47]);
        assert!(prompt.contains("Size: 4 bytes"));
        assert!(prompt.contains("not available as text"));
    }

    #[test]
    fn test_garbage_pdf_falls_back() {
        let builder = PromptBuilder::new(100);
        let prompt = builder.build(&upload("lab.pdf", "application/pdf"), b"not a pdf");
        assert!(prompt.contains("not available as text"));
    }
}
