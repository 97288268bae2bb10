//! Spreadsheet rows, validated once at ingestion.

use serde::{Deserialize, Serialize};

use stockmove_core::{RelocationError, RelocationResult};

/// Spreadsheet row 1 holds the header, so data row `i` (0-based) is shown as `i + 2`.
const FIRST_DATA_ROW: u32 = 2;

/// Columns every input table must carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequiredField {
    /// Item identifier (`ID`).
    Id,
    /// Reference code (`Reference`).
    Reference,
    /// Where the item physically is now (`Actual_Location`).
    ActualLocation,
    /// Where the item was expected to be (`Location`).
    ExpectedLocation,
}

impl RequiredField {
    /// Order used when reporting blank fields of a row.
    pub const ROW_ORDER: [RequiredField; 4] = [
        RequiredField::Id,
        RequiredField::Reference,
        RequiredField::ActualLocation,
        RequiredField::ExpectedLocation,
    ];

    /// Order used when reporting missing columns of a table.
    pub const COLUMN_ORDER: [RequiredField; 4] = [
        RequiredField::ExpectedLocation,
        RequiredField::Reference,
        RequiredField::Id,
        RequiredField::ActualLocation,
    ];

    /// Column header as it appears in the spreadsheet.
    pub fn column(&self) -> &'static str {
        match self {
            RequiredField::Id => "ID",
            RequiredField::Reference => "Reference",
            RequiredField::ActualLocation => "Actual_Location",
            RequiredField::ExpectedLocation => "Location",
        }
    }
}

impl core::fmt::Display for RequiredField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.column())
    }
}

/// One relocation claim read from the input table. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRow {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Reference", default)]
    pub reference: String,
    #[serde(rename = "Actual_Location", default)]
    pub actual_location: String,
    #[serde(rename = "Location", default)]
    pub expected_location: String,
    /// 1-based row number as displayed by the spreadsheet. Not carried by
    /// the serialised form; [`number_rows`] assigns it.
    #[serde(skip)]
    pub source_row_number: u32,
}

impl InventoryRow {
    pub fn new(
        source_row_number: u32,
        id: impl Into<String>,
        reference: impl Into<String>,
        actual_location: impl Into<String>,
        expected_location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            reference: reference.into(),
            actual_location: actual_location.into(),
            expected_location: expected_location.into(),
            source_row_number,
        }
    }

    pub fn field(&self, field: RequiredField) -> &str {
        match field {
            RequiredField::Id => &self.id,
            RequiredField::Reference => &self.reference,
            RequiredField::ActualLocation => &self.actual_location,
            RequiredField::ExpectedLocation => &self.expected_location,
        }
    }

    /// Required fields that are empty or whitespace, in reporting order.
    pub fn blank_fields(&self) -> Vec<RequiredField> {
        RequiredField::ROW_ORDER
            .into_iter()
            .filter(|f| self.field(*f).trim().is_empty())
            .collect()
    }

    /// Prefix shared by every message about this row.
    pub fn label(&self) -> String {
        format!("Row {}", self.source_row_number)
    }
}

/// Rows of named fields, as handed over by whatever reads the spreadsheet.
///
/// Cells are `None` when the sheet has no value for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputTable {
    pub columns: Vec<String>,
    pub records: Vec<Vec<Option<String>>>,
}

impl InputTable {
    pub fn new(columns: Vec<String>, records: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, records }
    }

    /// Required columns not present in the header, in reporting order.
    pub fn missing_columns(&self) -> Vec<RequiredField> {
        RequiredField::COLUMN_ORDER
            .into_iter()
            .filter(|f| !self.columns.iter().any(|c| c.trim() == f.column()))
            .collect()
    }

    /// Build typed rows, failing fast when the header lacks a required column.
    ///
    /// Extra columns are ignored. Row numbers follow spreadsheet numbering.
    pub fn into_rows(self) -> RelocationResult<Vec<InventoryRow>> {
        if self.columns.is_empty() {
            return Err(RelocationError::input("Input table has no header row"));
        }

        let missing = self.missing_columns();
        if !missing.is_empty() {
            return Err(RelocationError::input(format!(
                "Missing columns: {}",
                join_fields(&missing)
            )));
        }

        let position = |field: RequiredField| {
            self.columns
                .iter()
                .position(|c| c.trim() == field.column())
        };
        let (Some(id), Some(reference), Some(actual), Some(expected)) = (
            position(RequiredField::Id),
            position(RequiredField::Reference),
            position(RequiredField::ActualLocation),
            position(RequiredField::ExpectedLocation),
        ) else {
            return Err(RelocationError::internal("column positions vanished"));
        };

        let rows = self.records.iter().map(|record| {
            let cell = |idx: usize| {
                record
                    .get(idx)
                    .and_then(|c| c.as_deref())
                    .unwrap_or_default()
                    .to_string()
            };
            InventoryRow::new(0, cell(id), cell(reference), cell(actual), cell(expected))
        });

        Ok(number_rows(rows))
    }
}

/// Stamp data rows with their spreadsheet row number and trim their fields.
///
/// Front-ends that deserialise [`InventoryRow`]s directly must pass them
/// through here, in sheet order, before running a batch.
pub fn number_rows(rows: impl IntoIterator<Item = InventoryRow>) -> Vec<InventoryRow> {
    rows.into_iter()
        .zip(FIRST_DATA_ROW..)
        .map(|(row, row_number)| {
            InventoryRow::new(
                row_number,
                row.id.trim(),
                row.reference.trim(),
                row.actual_location.trim(),
                row.expected_location.trim(),
            )
        })
        .collect()
}

pub(crate) fn join_fields(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(RequiredField::column)
        .collect::<Vec<_>>()
        .join(", ")
}
