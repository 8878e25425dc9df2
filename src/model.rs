use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

const MISSING_SENTINELS: [&str; 4] = ["nan", "NaN", "None", "null"];

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Null,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Number(value) => !value.is_finite(),
            Self::Text(text) => {
                let trimmed = text.trim();
                trimmed.is_empty() || MISSING_SENTINELS.contains(&trimmed)
            }
        }
    }

    /// Collapses every missing representation into `Null`.
    pub fn into_output(self) -> Self {
        if self.is_missing() { Self::Null } else { self }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Number(value) => format_number(*value),
            Self::Text(text) => text.trim().to_string(),
            Self::Null => String::new(),
        }
    }
}

pub fn format_number(value: f64) -> String {
    if let Some(whole) = as_whole(value) {
        whole.to_string()
    } else {
        value.to_string()
    }
}

fn as_whole(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        Some(value as i64)
    } else {
        None
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(value) => match as_whole(*value) {
                Some(whole) => serializer.serialize_i64(whole),
                None if value.is_finite() => serializer.serialize_f64(*value),
                None => serializer.serialize_none(),
            },
            Self::Text(text) => serializer.serialize_str(text),
            Self::Null => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ColumnLabel {
    Single(String),
    Levels(Vec<String>),
}

impl ColumnLabel {
    pub fn from_levels(mut levels: Vec<String>) -> Self {
        if levels.len() == 1 {
            Self::Single(levels.remove(0))
        } else {
            Self::Levels(levels)
        }
    }

    pub fn levels(&self) -> Vec<&str> {
        match self {
            Self::Single(label) => vec![label.as_str()],
            Self::Levels(levels) => levels.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub key: String,
    pub value: Vec<CellValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<ColumnLabel>,
    pub data: Vec<TableRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_no: Option<Value>,
    #[serde(rename = "title_En", skip_serializing_if = "Option::is_none")]
    pub title_en: Option<String>,
    #[serde(rename = "title_Fa", skip_serializing_if = "Option::is_none")]
    pub title_fa: Option<String>,
}

impl Table {
    pub fn new(columns: Vec<ColumnLabel>, data: Vec<TableRow>) -> Self {
        Self {
            columns,
            data,
            version_no: None,
            title_en: None,
            title_fa: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sheet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_id: Option<i64>,
    #[serde(rename = "title_Fa", skip_serializing_if = "Option::is_none")]
    pub title_fa: Option<String>,
    #[serde(rename = "title_En", skip_serializing_if = "Option::is_none")]
    pub title_en: Option<String>,
    pub tables: Vec<Table>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_insert: Option<bool>,
}

impl Sheet {
    pub fn insert_only(self) -> Self {
        Self {
            tables: Vec::new(),
            to_insert: Some(true),
            ..self
        }
    }

    pub fn is_insert_only(&self) -> bool {
        self.to_insert.unwrap_or(false)
    }
}

/// Caller-owned identity fields, carried through to the output untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportIdentity(pub Map<String, Value>);

impl ReportIdentity {
    pub fn trace_no(&self) -> Option<String> {
        match self.0.get("trace_no")? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportMetadata {
    #[serde(rename = "title_Fa")]
    pub title_fa: Option<Value>,
    #[serde(rename = "title_En")]
    pub title_en: Option<Value>,
    pub period: Option<Value>,
    #[serde(rename = "yearEndToDate")]
    pub year_end_to_date: Option<Value>,
    pub kind: Option<Value>,
    #[serde(rename = "type")]
    pub report_type: Option<Value>,
    #[serde(rename = "isAudited")]
    pub is_audited: Option<Value>,
    pub state: Option<Value>,
    pub version: Vec<String>,
    pub title_info: Vec<String>,
}

/// Written as one flat object. Metadata and document fields replace identity
/// fields of the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    pub identity: ReportIdentity,
    pub metadata: Option<ReportMetadata>,
    pub sheets: Vec<Sheet>,
    pub to_insert: Option<bool>,
    pub no_file: Option<bool>,
}

impl Serialize for ReportDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut fields = self.identity.0.clone();
        if let Some(metadata) = &self.metadata {
            if let Value::Object(metadata) =
                serde_json::to_value(metadata).map_err(S::Error::custom)?
            {
                fields.extend(metadata);
            }
        }
        fields.insert(
            "sheets".to_string(),
            serde_json::to_value(&self.sheets).map_err(S::Error::custom)?,
        );
        if let Some(to_insert) = self.to_insert {
            fields.insert("to_insert".to_string(), Value::Bool(to_insert));
        }
        if let Some(no_file) = self.no_file {
            fields.insert("no_file".to_string(), Value::Bool(no_file));
        }
        fields.serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    SheetPage,
    Secondary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFileEntry {
    pub filename: String,
    pub role: SourceRole,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSourceEntry {
    pub trace_no: String,
    pub files: Vec<SourceFileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub download_root: String,
    pub report_count: usize,
    pub file_count: usize,
    pub reports: Vec<ReportSourceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPaths {
    pub download_root: String,
    pub reports_path: String,
    pub export_path: String,
    pub rules_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessCounts {
    pub report_count: usize,
    pub sheet_file_count: usize,
    pub sheet_count: usize,
    pub table_count: usize,
    pub structured_sheet_count: usize,
    pub rendered_sheet_count: usize,
    pub secondary_sheet_count: usize,
    pub insert_only_sheet_count: usize,
    pub insert_only_report_count: usize,
    pub no_file_report_count: usize,
    pub empty_report_count: usize,
    pub skipped_unit_count: usize,
    pub failed_unit_count: usize,
    pub formula_count: usize,
    pub formula_failure_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub paths: ProcessPaths,
    pub counts: ProcessCounts,
    pub reprocess_trace_nos: Vec<String>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}
