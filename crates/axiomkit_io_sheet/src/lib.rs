//! `axiomkit_io_sheet` v1:
//! Rust-side hierarchical sheet export kernel.
//!
//! Multi-level column headers and grouped row data are flattened into a grid
//! with explicit merge regions, then saved as xlsx or csv.
//!
//! Architecture:
//! - `conf`    : constants and default presets
//! - `spec`    : specs/models/options/errors
//! - `resolve` : span/depth resolution over header and data trees
//! - `flatten` : leaf columns, header layout, flat records, merge regions
//! - `grid`    : canvas contract, in-memory sheet, workbook persistence
//! - `report`  : build report model
//! - `util`    : pure helper functions (naming, JSON input, export paths)
//! - `writer`  : grid assembly and multi-sheet exporter
pub mod conf;
pub mod flatten;
pub mod grid;
pub mod report;
pub mod resolve;
pub mod spec;
pub mod util;
pub mod writer;

pub use conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
    derive_default_export_options, derive_default_sheet_config,
};
pub use flatten::{flatten_data, flatten_header_columns, flatten_header_layout, plan_header_merges};
pub use grid::{GridSheet, GridWorkbook, SheetCanvas, SpecGridCell};
pub use report::{ReportSheetBuild, ReportSheetBuildBuilder, SpecSheetReport};
pub use resolve::{calculate_header_height, resolve_data_forest, resolve_header_forest};
pub use spec::{
    EnumAlignHorizontal, EnumAlignVertical, EnumCellValue, EnumColumnWidth, EnumDataNode,
    EnumDatePolicy, EnumFileNamePolicy, EnumSheetFileType, FnCellCustom, FnCellFormatter,
    FnTextProvider, SheetExportError, SpecCellFormat, SpecColumnConfig, SpecDataSpan,
    SpecExportPath, SpecFlatColumn, SpecFlatData, SpecHeaderCell, SpecHeaderNode, SpecHeaderSpan,
    SpecMergeRegion, SpecSheet, SpecSheetConfig, SpecSheetExportOptions, TypeFlatRecord,
    TypeHeaderLayout,
};
pub use util::{
    derive_export_path, parse_data_forest, parse_header_forest, parse_sheet, parse_sheet_config,
    sanitize_sheet_name,
};
pub use writer::{SheetExporter, SpecSheetBuildContext, build_sheet, plan_sheet, render_sheet};
