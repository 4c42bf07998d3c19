//! Extraction schema: the ordered field set the model must populate,
//! and by extension the output row's column set.
//!
//! Fields are loaded from a CSV file with `Field Name` and
//! `Description / Example` columns; a built-in registry covers runs
//! without one.

use std::path::Path;

use serde::Deserialize;

/// Column holding the source document's file name, always first.
pub const FILE_NAME_COLUMN: &str = "File Name";
/// Column holding raw model output when JSON parsing fails.
pub const RAW_RESPONSE_COLUMN: &str = "LLM Raw Response";
/// Derived column computed from start date and duration.
pub const END_DATE_COLUMN: &str = "End Date";

/// Field names with special handling downstream.
pub const START_DATE_FIELD: &str = "Start Date";
pub const DURATION_FIELD: &str = "Project Duration";
pub const LOCATION_FIELD: &str = "Location";

/// The three columns a nested Location value expands into.
pub const LOCATION_COLUMNS: [&str; 3] = [
    "Location - State",
    "Location - District",
    "Location - Towns covered",
];

/// One schema field: a name the model must key its output by, and a
/// human-readable description used in the prompt.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub description: String,
}

/// Ordered field registry driving both the prompt and the row schema.
#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct FieldRecord {
    #[serde(rename = "Field Name")]
    field_name: String,
    #[serde(rename = "Description / Example")]
    description: String,
}

impl ExtractionSchema {
    /// Load a schema from a field-definition CSV.
    pub fn from_csv(path: &Path) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| anyhow::anyhow!("cannot read schema file {}: {}", path.display(), e))?;

        let mut fields = Vec::new();
        for record in reader.deserialize() {
            let record: FieldRecord = record
                .map_err(|e| anyhow::anyhow!("bad row in {}: {}", path.display(), e))?;
            let name = record.field_name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            fields.push(Field {
                name,
                description: record.description.trim().to_string(),
            });
        }

        if fields.is_empty() {
            anyhow::bail!("schema file {} defines no fields", path.display());
        }
        Ok(Self { fields })
    }

    /// The built-in concession-agreement field set.
    pub fn builtin() -> Self {
        let fields = [
            ("Name of the Authority", "Party 1"),
            ("Name of the Contractor", "Party 2"),
            ("Project Name", ""),
            ("Start Date", "Agreement Date"),
            (
                "Project Duration",
                "Duration of the project from Schedule J (e.g., '730 days', '24 months')",
            ),
            ("Contract Value", "from Article 19"),
            ("Payment Schedule", "from Schedule H"),
            // Kept as a single field for the model, flattened on output.
            ("Location", "State, District, Towns covered"),
            (
                "Project Milestones List",
                "List all project milestones from Schedule J as a comma-separated list.",
            ),
        ];
        Self {
            fields: fields
                .into_iter()
                .map(|(name, description)| Field {
                    name: name.to_string(),
                    description: description.to_string(),
                })
                .collect(),
        }
    }

    /// Ordered fields, as enumerated in the prompt.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The fixed output column set for this run.
    ///
    /// `File Name` comes first; `Location` expands into its three
    /// columns; `End Date` follows `Project Duration` when not already
    /// a schema field; the raw-response fallback column comes last.
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = vec![FILE_NAME_COLUMN.to_string()];

        for field in &self.fields {
            if field.name == LOCATION_FIELD {
                continue;
            }
            columns.push(field.name.clone());
            if field.name == DURATION_FIELD && !self.has_field(END_DATE_COLUMN) {
                columns.push(END_DATE_COLUMN.to_string());
            }
        }

        if self.has_field(LOCATION_FIELD) {
            columns.extend(LOCATION_COLUMNS.iter().map(|c| c.to_string()));
        }

        columns.push(RAW_RESPONSE_COLUMN.to_string());
        columns
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}
