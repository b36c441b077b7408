//! Spreadsheet report: one row per image with thumbnail, name and analysis.
//!
//! Building is split in two so each half is testable on its own:
//!
//! * [`build_rows`] loads thumbnails and computes row heights. A thumbnail
//!   failure leaves that row's image cell as a text placeholder and never
//!   aborts the report.
//! * [`write_report`] lays the rows out in a fixed three-column sheet and
//!   saves it under a unique name.
//!
//! [`read_report_rows`] reads a saved report back; the document renderer
//! works from that persisted form rather than from in-memory results.
//!
//! All three functions do blocking I/O and image work. Call them from
//! `tokio::task::spawn_blocking` inside async code.

use crate::config::ReportConfig;
use crate::error::Img2ReportError;
use crate::output::{artifact_file_name, AnalysisResult};
use crate::pipeline::thumbnail::make_thumbnail;
use calamine::{open_workbook, Reader, Xlsx};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatPattern, Image, Workbook, XlsxError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SHEET_NAME: &str = "Analysis Results";
pub const HEADERS: [&str; 3] = ["Image", "Image Name", "Analysis"];
/// Text written in the image cell when no thumbnail could be produced.
pub const THUMBNAIL_PLACEHOLDER: &str = "Error processing image";

/// Column widths in character units: thumbnail, name, analysis.
const COLUMN_WIDTHS: [f64; 3] = [30.0, 20.0, 30.0];
const HEADER_FILL: u32 = 0xCCCCCC;
/// Excel caps row height at 409 points.
const MAX_ROW_HEIGHT_PX: f64 = 545.0;
/// Excel's per-cell string limit, in characters.
const MAX_CELL_CHARS: usize = 32_767;

/// One rendered row.
#[derive(Debug, Clone)]
pub struct ReportRow {
    /// PNG bytes, or `None` when the source image could not be processed.
    pub thumbnail: Option<Vec<u8>>,
    pub image_name: String,
    pub analysis_text: String,
    /// Row height in pixels.
    pub row_height: f64,
}

/// All rows of one batch, in result order.
#[derive(Debug, Clone, Default)]
pub struct TabularReport {
    pub rows: Vec<ReportRow>,
}

impl TabularReport {
    pub fn thumbnail_failures(&self) -> usize {
        self.rows.iter().filter(|r| r.thumbnail.is_none()).count()
    }
}

/// A row as read back from a saved report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub image_name: String,
    pub analysis_text: String,
}

/// Compute heights and thumbnails for every result.
pub fn build_rows(results: &[AnalysisResult], config: &ReportConfig) -> TabularReport {
    let rows = results
        .iter()
        .map(|result| {
            let row_height = config
                .layout
                .row_height(result.analysis_text.chars().count())
                .min(MAX_ROW_HEIGHT_PX);

            let thumbnail = match make_thumbnail(
                &result.image_path,
                config.thumbnail_max_width,
                row_height as u32,
            ) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            };

            ReportRow {
                thumbnail,
                image_name: result.image_name.clone(),
                analysis_text: result.analysis_text.clone(),
                row_height,
            }
        })
        .collect();

    TabularReport { rows }
}

/// Save `report` to a freshly named `.xlsx` in `output_dir`.
pub fn write_report(report: &TabularReport, output_dir: &Path) -> Result<PathBuf, Img2ReportError> {
    let path = output_dir.join(artifact_file_name("xlsx"));
    write_workbook(report, &path).map_err(|e| Img2ReportError::ReportBuildFailed {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    info!(
        "Report saved: {} ({} rows, {} thumbnail failures)",
        path.display(),
        report.rows.len(),
        report.thumbnail_failures()
    );
    Ok(path)
}

fn write_workbook(report: &TabularReport, path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_pattern(FormatPattern::Solid);
    let wrapped = Format::new().set_text_wrap().set_align(FormatAlign::Top);
    let top = Format::new().set_align(FormatAlign::Top);

    for (col, (title, width)) in HEADERS.iter().zip(COLUMN_WIDTHS).enumerate() {
        sheet.set_column_width(col as u16, width)?;
        sheet.write_string_with_format(0, col as u16, *title, &header)?;
    }

    for (i, row) in report.rows.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.set_row_height_pixels(r, row.row_height.round() as u16)?;

        let embedded = match &row.thumbnail {
            Some(bytes) => match Image::new_from_buffer(bytes) {
                Ok(image) => {
                    sheet.insert_image(r, 0, &image)?;
                    true
                }
                Err(e) => {
                    warn!("{}: thumbnail not embeddable: {}", row.image_name, e);
                    false
                }
            },
            None => false,
        };
        if !embedded {
            sheet.write_string_with_format(r, 0, THUMBNAIL_PLACEHOLDER, &top)?;
        }

        sheet.write_string_with_format(r, 1, cell_text(&row.image_name), &top)?;
        sheet.write_string_with_format(r, 2, cell_text(&row.analysis_text), &wrapped)?;
    }

    workbook.save(path)?;
    debug!("Wrote workbook {}", path.display());
    Ok(())
}

fn cell_text(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_CHARS {
        text.to_string()
    } else {
        text.chars().take(MAX_CELL_CHARS).collect()
    }
}

/// Read `(image name, analysis text)` for every data row of a saved report.
pub fn read_report_rows(path: &Path) -> Result<Vec<ReportEntry>, Img2ReportError> {
    let failed = |detail: String| Img2ReportError::DocumentRenderFailed {
        path: path.to_path_buf(),
        detail,
    };

    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e| failed(format!("Failed to open report: {e}")))?;
    let range = workbook
        .worksheet_range(SHEET_NAME)
        .map_err(|e| failed(format!("Failed to read sheet '{SHEET_NAME}': {e}")))?;

    let cell = |row: &[calamine::Data], col: usize| {
        row.get(col).map(|c| c.to_string()).unwrap_or_default()
    };

    Ok(range
        .rows()
        .skip(1)
        .map(|row| ReportEntry {
            image_name: cell(row, 1),
            analysis_text: cell(row, 2),
        })
        .collect())
}
