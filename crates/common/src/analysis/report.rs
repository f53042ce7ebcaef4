//! PDF report rendering

use crate::domain::{AiAnalysis, AnalysisResult, Patient, User};
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const FONT_SIZE: i64 = 10;
const LEADING: i64 = 14;
const WRAP_COLUMNS: usize = 92;

/// Display data a report is rendered from
#[derive(Debug, Clone)]
pub struct ReportContext<'a> {
    pub analysis: &'a AiAnalysis,
    pub result: &'a AnalysisResult,
    pub patient: &'a Patient,
    pub requested_by: &'a User,
    pub source_file_name: &'a str,
    pub generated_at: DateTime<Utc>,
}

pub trait ReportRenderer: Send + Sync {
    /// Rendered file bytes
    fn render(&self, context: &ReportContext<'_>) -> Result<Vec<u8>>;
}

/// Plain single-font A4 report
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfReportRenderer;

impl PdfReportRenderer {
    fn lines(context: &ReportContext<'_>) -> Vec<String> {
        let analysis = context.analysis;
        let result = context.result;
        let mut lines = vec![
            "MedVault AI Analysis Report".to_string(),
            String::new(),
            format!("Analysis: {}", analysis.analysis_id),
            format!(
                "Patient: {} ({})",
                context.patient.full_name(),
                context.patient.patient_number
            ),
            format!("Source document: {}", context.source_file_name),
            format!(
                "Requested by: {} ({})",
                context.requested_by.name, context.requested_by.role
            ),
            format!("Model: {}", analysis.model),
            format!("Confidence: {:.0}%", result.confidence * 100.0),
            format!("Generated: {}", context.generated_at.format("%Y-%m-%d %H:%M UTC")),
            String::new(),
            "Summary".to_string(),
        ];
        lines.extend(wrap(&result.summary, WRAP_COLUMNS));

        lines.push(String::new());
        lines.push("Key findings".to_string());
        for finding in &result.key_findings {
            lines.extend(wrap(&format!("- {}", finding), WRAP_COLUMNS));
        }

        lines.push(String::new());
        lines.push("Recommendations".to_string());
        for recommendation in &result.recommendations {
            lines.extend(wrap(&format!("- {}", recommendation), WRAP_COLUMNS));
        }

        lines.push(String::new());
        lines.push(
            "Generated automatically. Not a diagnosis; review with a qualified clinician."
                .to_string(),
        );
        lines
    }
}

impl ReportRenderer for PdfReportRenderer {
    fn render(&self, context: &ReportContext<'_>) -> Result<Vec<u8>> {
        let lines = Self::lines(context);
        let lines_per_page = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING).max(1) as usize;

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for chunk in lines.chunks(lines_per_page) {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
                Operation::new("TL", vec![LEADING.into()]),
                Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()]),
            ];
            for line in chunk {
                operations.push(Operation::new("Tj", vec![Object::string_literal(ascii(line))]));
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new("ET", vec![]));

            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(|e| AppError::ReportRender {
            message: format!("Failed to serialize report: {}", e),
        })?;
        Ok(bytes)
    }
}

/// Base-14 fonts only cover Latin-1; keep the output printable
fn ascii(line: &str) -> String {
    line.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}
