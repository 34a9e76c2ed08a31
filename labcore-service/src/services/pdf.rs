//! Report PDF rendering.
//!
//! Pure function over `printpdf`: the caller assembles a `ReportPdfData`
//! snapshot and gets bytes back, no side effects.

use chrono::{DateTime, Utc};
use printpdf::*;
use service_core::error::AppError;
use std::io::BufWriter;

/// Everything the renderer needs, denormalized.
#[derive(Debug, Clone)]
pub struct ReportPdfData {
    pub lab_name: String,
    pub lab_gstin: Option<String>,
    pub report_code: String,
    pub version: i32,
    pub is_amended: bool,
    pub amendment_reason: Option<String>,
    pub patient_name: String,
    pub patient_code: String,
    pub order_code: String,
    pub priority: String,
    pub tests: Vec<ReportTestSection>,
}

#[derive(Debug, Clone)]
pub struct ReportTestSection {
    pub test_name: String,
    pub specimen_type: String,
    pub authorised_utc: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub rows: Vec<ReportValueRow>,
}

#[derive(Debug, Clone)]
pub struct ReportValueRow {
    pub parameter: String,
    pub value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
}

/// Start a fresh page when the cursor runs off the bottom.
fn ensure_room(doc: &PdfDocumentReference, layer: &mut PdfLayerReference, y: &mut Mm) {
    if *y < Mm(20.0) {
        let (page, new_layer) = doc.add_page(Mm(210.0), Mm(297.0), "Layer 1");
        *layer = doc.get_page(page).get_layer(new_layer);
        *y = Mm(280.0);
    }
}

/// Render a report snapshot to PDF bytes.
pub fn build_report_pdf(data: &ReportPdfData) -> Result<Vec<u8>, AppError> {
    let title = format!("{} {}", data.lab_name, data.report_code);
    let (doc, page1, layer1) = PdfDocument::new(&title, Mm(210.0), Mm(297.0), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("PDF font error: {}", e)))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("PDF font error: {}", e)))?;

    let mut layer = doc.get_page(page1).get_layer(layer1);
    let mut y = Mm(280.0);

    // Lab header
    layer.use_text(&data.lab_name, 16.0, Mm(20.0), y, &bold);
    y -= Mm(6.0);
    if let Some(gstin) = &data.lab_gstin {
        layer.use_text(format!("GSTIN: {}", gstin), 8.0, Mm(20.0), y, &font);
        y -= Mm(5.0);
    }
    y -= Mm(4.0);

    // Report identity
    layer.use_text(
        format!("LABORATORY REPORT  {}", data.report_code),
        12.0,
        Mm(20.0),
        y,
        &bold,
    );
    y -= Mm(6.0);
    if data.is_amended {
        let reason = data.amendment_reason.as_deref().unwrap_or("not recorded");
        layer.use_text(
            format!("AMENDED REPORT (version {}) - reason: {}", data.version, reason),
            9.0,
            Mm(20.0),
            y,
            &bold,
        );
        y -= Mm(6.0);
    }

    // Patient and order block
    layer.use_text(
        format!("Patient: {} ({})", data.patient_name, data.patient_code),
        10.0,
        Mm(20.0),
        y,
        &font,
    );
    y -= Mm(5.0);
    layer.use_text(
        format!("Order: {}   Priority: {}", data.order_code, data.priority),
        10.0,
        Mm(20.0),
        y,
        &font,
    );
    y -= Mm(10.0);

    // One section per test
    for section in &data.tests {
        ensure_room(&doc, &mut layer, &mut y);
        layer.use_text(
            format!("{} ({})", section.test_name, section.specimen_type),
            11.0,
            Mm(20.0),
            y,
            &bold,
        );
        y -= Mm(6.0);

        for row in &section.rows {
            ensure_room(&doc, &mut layer, &mut y);
            let unit = row.unit.as_deref().unwrap_or("");
            let range = row
                .reference_range
                .as_deref()
                .map(|r| format!("  [{}]", r))
                .unwrap_or_default();
            let line = format!("  {}: {} {}{}", row.parameter, row.value, unit, range);
            for wrapped in wrap_text(&line, 90) {
                layer.use_text(&wrapped, 9.0, Mm(25.0), y, &font);
                y -= Mm(4.5);
            }
        }

        if let Some(notes) = &section.notes {
            ensure_room(&doc, &mut layer, &mut y);
            for wrapped in wrap_text(&format!("Interpretation: {}", notes), 90) {
                layer.use_text(&wrapped, 9.0, Mm(25.0), y, &font);
                y -= Mm(4.5);
            }
        }

        if let Some(authorised) = section.authorised_utc {
            layer.use_text(
                format!("Authorised: {}", authorised.format("%Y-%m-%d %H:%M UTC")),
                8.0,
                Mm(25.0),
                y,
                &font,
            );
            y -= Mm(6.0);
        }
        y -= Mm(3.0);
    }

    // Footer
    layer.use_text(
        format!("{} v{}", data.report_code, data.version),
        8.0,
        Mm(20.0),
        Mm(12.0),
        &font,
    );

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("PDF save error: {}", e)))?;
    buf.into_inner()
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("PDF buffer error: {}", e)))
}

/// Greedy word wrap to a character budget.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(current);
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> ReportPdfData {
        ReportPdfData {
            lab_name: "City Diagnostics".to_string(),
            lab_gstin: Some("29ABCDE1234F1Z5".to_string()),
            report_code: "RPT-ORD-20260806-0001-v1".to_string(),
            version: 1,
            is_amended: false,
            amendment_reason: None,
            patient_name: "Asha Rao".to_string(),
            patient_code: "LC-20260806-0001".to_string(),
            order_code: "ORD-20260806-0001".to_string(),
            priority: "routine".to_string(),
            tests: vec![ReportTestSection {
                test_name: "Complete Blood Count".to_string(),
                specimen_type: "whole_blood".to_string(),
                authorised_utc: Some(Utc::now()),
                notes: Some("Within normal limits".to_string()),
                rows: vec![
                    ReportValueRow {
                        parameter: "Haemoglobin".to_string(),
                        value: "13.2".to_string(),
                        unit: Some("g/dL".to_string()),
                        reference_range: Some("12.0-15.5".to_string()),
                    },
                    ReportValueRow {
                        parameter: "WBC".to_string(),
                        value: "6.1".to_string(),
                        unit: Some("10^3/uL".to_string()),
                        reference_range: Some("4.0-11.0".to_string()),
                    },
                ],
            }],
        }
    }

    #[test]
    fn renders_a_pdf_document() {
        let bytes = build_report_pdf(&sample_data()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }

    #[test]
    fn renders_many_rows_across_page_breaks() {
        let mut data = sample_data();
        let section = &mut data.tests[0];
        for i in 0..120 {
            section.rows.push(ReportValueRow {
                parameter: format!("Parameter {}", i),
                value: format!("{}", i),
                unit: None,
                reference_range: None,
            });
        }
        let bytes = build_report_pdf(&data).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn wrap_text_respects_the_budget() {
        let lines = wrap_text("one two three four five six seven", 12);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.len() <= 12, "line too long: {:?}", line);
        }
    }

    #[test]
    fn wrap_text_keeps_overlong_words_whole() {
        let lines = wrap_text("supercalifragilisticexpialidocious", 10);
        assert_eq!(lines, vec!["supercalifragilisticexpialidocious".to_string()]);
    }

    #[test]
    fn wrap_text_of_empty_input_yields_one_empty_line() {
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }
}
