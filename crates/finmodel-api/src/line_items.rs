// Line-item entry: single items, spreadsheet uploads and the CSV template.
//
// Uploads and new items are checked before anything is sent, so a missing
// scenario or an unsupported file never reaches the backend.

use std::io;
use std::path::Path;

use finmodel_core::resources::LineItemCategory;
use serde::Serialize;
use thiserror::Error;

use crate::transport::{FilePart, MultipartForm};

/// Default output file of the template command.
pub const TEMPLATE_FILE_NAME: &str = "line_items_template.csv";

const TEMPLATE_HEADER: [&str; 3] = ["Name", "Category", "Amount"];
const TEMPLATE_ROWS: [[&str; 3]; 5] = [
    ["Revenue", "Income", "1000000"],
    ["Cost of Goods Sold", "Expense", "500000"],
    ["Operating Expenses", "Expense", "200000"],
    ["Interest Expense", "Expense", "50000"],
    ["Tax Expense", "Expense", "60000"],
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Please select a file to upload")]
    MissingFile,

    #[error("Please select both a scenario and period before uploading")]
    MissingSelection,

    #[error("Please upload an Excel file (.xlsx or .xls) or CSV file")]
    UnsupportedFile { file_name: String },

    #[error("Please select both a scenario and period before adding a line item")]
    MissingItemSelection,
}

// ---------------------------------------------------------------------------
// Spreadsheet upload
// ---------------------------------------------------------------------------

/// A spreadsheet read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl SpreadsheetFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { file_name, bytes })
    }

    /// MIME type by extension, or `None` when the format is not accepted.
    fn mime(&self) -> Option<&'static str> {
        let ext = Path::new(&self.file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            "xls" => Some("application/vnd.ms-excel"),
            "csv" => Some("text/csv"),
            _ => None,
        }
    }
}

/// A validated bulk upload of line items for one model, scenario and period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemUpload {
    model_id: i64,
    scenario_id: i64,
    period_id: i64,
    file: SpreadsheetFile,
    mime: &'static str,
}

impl LineItemUpload {
    pub fn new(
        model_id: i64,
        scenario_id: Option<i64>,
        period_id: Option<i64>,
        file: Option<SpreadsheetFile>,
    ) -> Result<Self, UploadError> {
        let file = file.ok_or(UploadError::MissingFile)?;
        let mime = file.mime().ok_or_else(|| UploadError::UnsupportedFile {
            file_name: file.file_name.clone(),
        })?;
        let (Some(scenario_id), Some(period_id)) = (scenario_id, period_id) else {
            return Err(UploadError::MissingSelection);
        };
        Ok(Self {
            model_id,
            scenario_id,
            period_id,
            file,
            mime,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file.file_name
    }

    /// Form with fields `file`, `model_id`, `scenario_id` and `period_id`.
    pub fn to_multipart(&self) -> MultipartForm {
        MultipartForm::default()
            .file(FilePart {
                field: "file".to_string(),
                file_name: self.file.file_name.clone(),
                mime: self.mime.to_string(),
                bytes: self.file.bytes.clone(),
            })
            .text("model_id", self.model_id)
            .text("scenario_id", self.scenario_id)
            .text("period_id", self.period_id)
    }
}

// ---------------------------------------------------------------------------
// Single line item
// ---------------------------------------------------------------------------

/// Body for `POST /line-item/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLineItem {
    pub name: String,
    pub category: LineItemCategory,
    pub amount: f64,
    pub model_id: i64,
    pub scenario_id: i64,
    pub period_id: i64,
}

impl NewLineItem {
    pub fn new(
        model_id: i64,
        scenario_id: Option<i64>,
        period_id: Option<i64>,
        name: impl Into<String>,
        category: LineItemCategory,
        amount: f64,
    ) -> Result<Self, UploadError> {
        let (Some(scenario_id), Some(period_id)) = (scenario_id, period_id) else {
            return Err(UploadError::MissingItemSelection);
        };
        Ok(Self {
            name: name.into(),
            category,
            amount,
            model_id,
            scenario_id,
            period_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// Write the example upload template: a header row and five sample items.
pub fn write_template<W: io::Write>(writer: W) -> csv::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(TEMPLATE_HEADER)?;
    for row in TEMPLATE_ROWS {
        csv.write_record(row)?;
    }
    csv.flush()?;
    Ok(())
}
