//! Code list export in CSV and JSON formats.
//!
//! The caller picks which columns to include, their order, the output format
//! and, for CSV, the field delimiter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::code::Code;

/// Error type for export operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("Unknown export field: {0}")]
    UnknownField(String),

    #[error("No export fields selected")]
    NoFields,

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid delimiter: {0:?}")]
    InvalidDelimiter(String),

    #[error("Failed to serialize export: {0}")]
    Serialization(String),
}

/// A column that can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportField {
    Id,
    Code,
    Role,
    GroupName,
    CourseId,
    MaxUses,
    UsedCount,
    IsUsed,
    UsedBy,
    UsedAt,
    ExpiryDate,
    CreatedBy,
    CreatedAt,
}

impl ExportField {
    pub const ALL: [ExportField; 13] = [
        ExportField::Id,
        ExportField::Code,
        ExportField::Role,
        ExportField::GroupName,
        ExportField::CourseId,
        ExportField::MaxUses,
        ExportField::UsedCount,
        ExportField::IsUsed,
        ExportField::UsedBy,
        ExportField::UsedAt,
        ExportField::ExpiryDate,
        ExportField::CreatedBy,
        ExportField::CreatedAt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExportField::Id => "id",
            ExportField::Code => "code",
            ExportField::Role => "role",
            ExportField::GroupName => "group_name",
            ExportField::CourseId => "course_id",
            ExportField::MaxUses => "max_uses",
            ExportField::UsedCount => "used_count",
            ExportField::IsUsed => "is_used",
            ExportField::UsedBy => "used_by",
            ExportField::UsedAt => "used_at",
            ExportField::ExpiryDate => "expiry_date",
            ExportField::CreatedBy => "created_by",
            ExportField::CreatedAt => "created_at",
        }
    }

    /// Parse a comma-separated field list such as `"code,role,is_used"`.
    ///
    /// Blank input selects every field. Duplicates are dropped, keeping the
    /// first occurrence.
    pub fn parse_list(input: &str) -> Result<Vec<ExportField>, ExportError> {
        if input.trim().is_empty() {
            return Ok(Self::ALL.to_vec());
        }

        let mut fields = Vec::new();
        for raw in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let field: ExportField = raw.parse()?;
            if !fields.contains(&field) {
                fields.push(field);
            }
        }

        if fields.is_empty() {
            return Err(ExportError::NoFields);
        }
        Ok(fields)
    }

    fn json_value(&self, code: &Code) -> Value {
        match self {
            ExportField::Id => Value::from(code.id()),
            ExportField::Code => Value::from(code.code()),
            ExportField::Role => Value::from(code.role()),
            ExportField::GroupName => code.group_name().map_or(Value::Null, Value::from),
            ExportField::CourseId => code.course_id().map_or(Value::Null, Value::from),
            ExportField::MaxUses => Value::from(code.max_uses()),
            ExportField::UsedCount => Value::from(code.used_count()),
            ExportField::IsUsed => Value::from(code.is_used()),
            ExportField::UsedBy => code.used_by().map_or(Value::Null, Value::from),
            ExportField::UsedAt => code
                .used_at()
                .map_or(Value::Null, |t| Value::from(t.to_rfc3339())),
            ExportField::ExpiryDate => code
                .expiry_date()
                .map_or(Value::Null, |t| Value::from(t.to_rfc3339())),
            ExportField::CreatedBy => code.created_by().map_or(Value::Null, Value::from),
            ExportField::CreatedAt => Value::from(code.created_at().to_rfc3339()),
        }
    }

    fn text_value(&self, code: &Code) -> String {
        match self.json_value(code) {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

impl std::str::FromStr for ExportField {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == lower)
            .ok_or_else(|| ExportError::UnknownField(s.to_string()))
    }
}

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv { delimiter: char },
    Json,
}

impl ExportFormat {
    /// Build a format from query-string style values.
    ///
    /// `delimiter` only applies to CSV and defaults to `,`. The literal
    /// string `"tab"` selects a tab.
    pub fn parse(format: Option<&str>, delimiter: Option<&str>) -> Result<Self, ExportError> {
        match format.map(|f| f.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("csv") => {
                let delimiter = match delimiter {
                    None | Some("") => ',',
                    Some("tab") | Some("\\t") => '\t',
                    Some(d) => {
                        let mut chars = d.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => c,
                            _ => return Err(ExportError::InvalidDelimiter(d.to_string())),
                        }
                    }
                };
                shared::validation::validate_delimiter(delimiter)
                    .map_err(|_| ExportError::InvalidDelimiter(delimiter.to_string()))?;
                Ok(ExportFormat::Csv { delimiter })
            }
            Some("json") => Ok(ExportFormat::Json),
            Some(other) => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv { .. } => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv { .. } => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// A complete export selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeExport {
    pub fields: Vec<ExportField>,
    pub format: ExportFormat,
}

impl CodeExport {
    pub fn new(fields: Vec<ExportField>, format: ExportFormat) -> Self {
        Self { fields, format }
    }

    /// Render the codes in the selected format.
    pub fn render(&self, codes: &[Code]) -> Result<String, ExportError> {
        if self.fields.is_empty() {
            return Err(ExportError::NoFields);
        }
        match self.format {
            ExportFormat::Csv { delimiter } => Ok(self.to_csv(codes, delimiter)),
            ExportFormat::Json => self.to_json(codes),
        }
    }

    fn to_csv(&self, codes: &[Code], delimiter: char) -> String {
        let sep = delimiter.to_string();
        let mut csv = String::new();

        let header: Vec<String> = self
            .fields
            .iter()
            .map(|f| escape_csv(f.name(), delimiter))
            .collect();
        csv.push_str(&header.join(&sep));
        csv.push('\n');

        for code in codes {
            let row: Vec<String> = self
                .fields
                .iter()
                .map(|f| escape_csv(&f.text_value(code), delimiter))
                .collect();
            csv.push_str(&row.join(&sep));
            csv.push('\n');
        }

        csv
    }

    fn to_json(&self, codes: &[Code]) -> Result<String, ExportError> {
        let rows: Vec<Value> = codes
            .iter()
            .map(|code| {
                let mut obj = Map::new();
                for field in &self.fields {
                    obj.insert(field.name().to_string(), field.json_value(code));
                }
                Value::Object(obj)
            })
            .collect();

        serde_json::to_string_pretty(&rows).map_err(|e| ExportError::Serialization(e.to_string()))
    }
}

/// Query parameters selecting an export's columns and format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportQuery {
    /// Comma-separated field names. Blank selects every field.
    pub fields: Option<String>,
    /// `csv` (default) or `json`.
    pub format: Option<String>,
    /// CSV delimiter: one character, or `tab`.
    pub delimiter: Option<String>,
}

impl ExportQuery {
    pub fn to_export(&self) -> Result<CodeExport, ExportError> {
        let fields = ExportField::parse_list(self.fields.as_deref().unwrap_or(""))?;
        let format = ExportFormat::parse(self.format.as_deref(), self.delimiter.as_deref())?;
        Ok(CodeExport::new(fields, format))
    }
}

/// Quote a CSV cell when it contains the delimiter, a quote or a line break.
fn escape_csv(value: &str, delimiter: char) -> String {
    if value.contains(delimiter) || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
