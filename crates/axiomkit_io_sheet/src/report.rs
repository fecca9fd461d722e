//! Sheet build report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

use crate::spec::SheetExportError;

/// Per-sheet build summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpecSheetReport {
    /// Sheet index in input order.
    pub sheet_idx: usize,
    /// Final (sanitized, unique) sheet title.
    pub sheet_name: String,
    /// Number of header rows.
    pub cnt_header_rows: usize,
    /// Number of leaf columns.
    pub cnt_columns: usize,
    /// Number of flattened data records.
    pub cnt_records: usize,
    /// Number of header merge regions.
    pub cnt_header_merges: usize,
    /// Number of data merge regions computed.
    pub cnt_data_merges: usize,
    /// Whether data merge regions were applied to the sheet.
    pub if_data_merges_applied: bool,
}

/// Aggregate result of one `SheetExporter::build` run.
#[derive(Debug, Default)]
pub struct ReportSheetBuild {
    /// Successfully built sheets in index order.
    pub sheets: Vec<SpecSheetReport>,
    /// Per-sheet failures; each carries its sheet index.
    pub errors: Vec<SheetExportError>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl ReportSheetBuild {
    /// Number of collected hard errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_sheets".to_string(), self.sheets.len() as u64);
        dict_counts.insert(
            "cnt_records".to_string(),
            self.sheets.iter().map(|sheet| sheet.cnt_records as u64).sum(),
        );
        dict_counts.insert(
            "cnt_merges".to_string(),
            self.sheets
                .iter()
                .map(|sheet| (sheet.cnt_header_merges + sheet.cnt_data_merges) as u64)
                .sum(),
        );
        dict_counts.insert("cnt_errors".to_string(), self.error_count() as u64);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} sheets={} records={} merges={} errors={} warnings={}",
            dict_counts["cnt_sheets"],
            dict_counts["cnt_records"],
            dict_counts["cnt_merges"],
            dict_counts["cnt_errors"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportSheetBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[SHEET]"))
    }
}

/// Mutable accumulator for build results.
#[derive(Debug, Default)]
pub struct ReportSheetBuildBuilder {
    /// See [`ReportSheetBuild::sheets`].
    pub sheets: Vec<SpecSheetReport>,
    /// See [`ReportSheetBuild::errors`].
    pub errors: Vec<SheetExportError>,
    /// See [`ReportSheetBuild::warnings`].
    pub warnings: Vec<String>,
}

impl ReportSheetBuildBuilder {
    /// Add one sheet summary.
    pub fn add_sheet(&mut self, report: SpecSheetReport) {
        self.sheets.push(report);
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Add one sheet-scoped error.
    pub fn add_error(&mut self, error: SheetExportError) {
        self.errors.push(error);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportSheetBuild {
        ReportSheetBuild {
            sheets: self.sheets,
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_sheet_build_format_sums_sheets() {
        let mut builder = ReportSheetBuildBuilder::default();
        builder.add_sheet(SpecSheetReport {
            sheet_idx: 0,
            sheet_name: "Sheet".to_string(),
            cnt_header_rows: 2,
            cnt_columns: 7,
            cnt_records: 10,
            cnt_header_merges: 3,
            cnt_data_merges: 7,
            if_data_merges_applied: true,
        });
        builder.add_sheet(SpecSheetReport {
            sheet_idx: 2,
            sheet_name: "Sheet__2".to_string(),
            cnt_records: 1,
            ..Default::default()
        });
        builder.add_error(
            SheetExportError::structural("data[0]", "data group has an empty children list")
                .with_sheet_idx(1),
        );
        builder.add_warning("w".to_string());
        let report = builder.build();

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_sheets"], 2);
        assert_eq!(dict_counts["cnt_records"], 11);
        assert_eq!(dict_counts["cnt_merges"], 10);

        let txt = report.format("[SHEET]");
        assert_eq!(
            txt,
            "[SHEET] sheets=2 records=11 merges=10 errors=1 warnings=1"
        );
        assert_eq!(report.to_string(), txt);
    }
}
