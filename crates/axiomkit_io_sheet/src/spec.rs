//! Shared sheet export models, options, and errors.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::conf::{C_COLUMN_WIDTH_AUTO, derive_default_sheet_config};
use crate::grid::SheetCanvas;

////////////////////////////////////////////////////////////////////////////////
// #region CellValue

/// Scalar value carried by data records and written to grid cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EnumCellValue {
    /// Missing/blank value.
    #[default]
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Boolean(bool),
}

impl EnumCellValue {
    /// Display text used by delimited output and width estimation.
    ///
    /// Integral numbers are rendered without a decimal point.
    pub fn to_text(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::String(val) => val.clone(),
            Self::Number(val) => {
                if val.is_finite() && val.fract() == 0.0 && val.abs() < 1e15 {
                    format!("{}", *val as i64)
                } else {
                    val.to_string()
                }
            }
            Self::Boolean(val) => if *val { "TRUE" } else { "FALSE" }.to_string(),
        }
    }
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for EnumCellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for EnumCellValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for EnumCellValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// One flattened data row: field key -> value.
pub type TypeFlatRecord = BTreeMap<String, EnumCellValue>;

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellFormat

/// Cell format aligned with Python `SpecCellFormat`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }

    /// Whether no property is set.
    pub fn is_empty(&self) -> bool {
        *self == SpecCellFormat::default()
    }
}

/// Sheet-wide horizontal alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAlignHorizontal {
    /// Spreadsheet default alignment.
    General,
    /// Left aligned.
    Left,
    /// Centered (default).
    #[default]
    Center,
    /// Right aligned.
    Right,
    /// Justified.
    Justify,
    /// Distributed.
    Distributed,
}

impl EnumAlignHorizontal {
    /// Format-property spelling understood by the xlsx format builder.
    pub fn as_format_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "justify",
            Self::Distributed => "distributed",
        }
    }
}

impl FromStr for EnumAlignHorizontal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Self::General),
            "left" => Ok(Self::Left),
            "center" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            "justify" => Ok(Self::Justify),
            "distributed" => Ok(Self::Distributed),
            _ => Err(format!(
                "alignment_horizontal must be one of: 'general', 'left', 'center', 'right', \
                 'justify', 'distributed'; got {s:?}."
            )),
        }
    }
}

/// Sheet-wide vertical alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAlignVertical {
    /// Top aligned.
    Top,
    /// Vertically centered (default).
    #[default]
    Center,
    /// Bottom aligned.
    Bottom,
    /// Vertically justified.
    Justify,
    /// Vertically distributed.
    Distributed,
}

impl EnumAlignVertical {
    /// Format-property spelling understood by the xlsx format builder.
    pub fn as_format_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Center => "vcenter",
            Self::Bottom => "bottom",
            Self::Justify => "vjustify",
            Self::Distributed => "vdistributed",
        }
    }
}

impl FromStr for EnumAlignVertical {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "center" | "vcenter" => Ok(Self::Center),
            "bottom" => Ok(Self::Bottom),
            "justify" | "vjustify" => Ok(Self::Justify),
            "distributed" | "vdistributed" => Ok(Self::Distributed),
            _ => Err(format!(
                "alignment_vertical must be one of: 'top', 'center', 'bottom', 'justify', \
                 'distributed'; got {s:?}."
            )),
        }
    }
}

/// Column width rule.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EnumColumnWidth {
    /// Estimate width from cell contents.
    #[default]
    Auto,
    /// Fixed width in character units.
    Fixed(f64),
}

impl FromStr for EnumColumnWidth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let c_value = s.trim();
        if c_value.eq_ignore_ascii_case(C_COLUMN_WIDTH_AUTO) {
            return Ok(Self::Auto);
        }
        match c_value.parse::<f64>() {
            Ok(n_width) if n_width.is_finite() && n_width > 0.0 => Ok(Self::Fixed(n_width)),
            _ => Err(format!(
                "column width must be a positive number or {C_COLUMN_WIDTH_AUTO:?}; got {s:?}."
            )),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Header

/// Display-value hook: `(raw value, record, sheet) -> displayed value`.
pub type FnCellFormatter = Arc<
    dyn Fn(&EnumCellValue, &TypeFlatRecord, &dyn SheetCanvas) -> Result<EnumCellValue, String>
        + Send
        + Sync,
>;

/// Side-effect hook: `(sheet, raw value, record, row, col)`; row/col are absolute and 1-based.
pub type FnCellCustom = Arc<
    dyn Fn(&mut dyn SheetCanvas, &EnumCellValue, &TypeFlatRecord, usize, usize) -> Result<(), String>
        + Send
        + Sync,
>;

/// Per-column configuration attached to a header node.
#[derive(Clone, Default)]
pub struct SpecColumnConfig {
    /// Column width override; falls back to the sheet default when `None`.
    pub width: Option<EnumColumnWidth>,
    /// Value formatter for data cells of this column.
    pub formatter: Option<FnCellFormatter>,
    /// Custom per-cell callback for data cells of this column.
    pub custom: Option<FnCellCustom>,
}

impl SpecColumnConfig {
    /// Set column width override.
    pub fn with_width(mut self, width: EnumColumnWidth) -> Self {
        self.width = Some(width);
        self
    }

    /// Set value formatter.
    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&EnumCellValue, &TypeFlatRecord, &dyn SheetCanvas) -> Result<EnumCellValue, String>
            + Send
            + Sync
            + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Set custom per-cell callback.
    pub fn with_custom<F>(mut self, custom: F) -> Self
    where
        F: Fn(&mut dyn SheetCanvas, &EnumCellValue, &TypeFlatRecord, usize, usize) -> Result<(), String>
            + Send
            + Sync
            + 'static,
    {
        self.custom = Some(Arc::new(custom));
        self
    }
}

impl fmt::Debug for SpecColumnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecColumnConfig")
            .field("width", &self.width)
            .field("formatter", &self.formatter.is_some())
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl PartialEq for SpecColumnConfig {
    fn eq(&self, other: &Self) -> bool {
        let if_formatter_eq = match (&self.formatter, &other.formatter) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        let if_custom_eq = match (&self.custom, &other.custom) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.width == other.width && if_formatter_eq && if_custom_eq
    }
}

/// One node of the caller-supplied header tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecHeaderNode {
    /// Column key; required on leaves.
    pub field: Option<String>,
    /// Display label.
    pub name: String,
    /// Child columns; `Some` marks a group node.
    pub children: Option<Vec<SpecHeaderNode>>,
    /// Per-column configuration.
    pub config: SpecColumnConfig,
}

impl SpecHeaderNode {
    /// Create a leaf column.
    pub fn leaf(field: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            name: name.into(),
            children: None,
            config: SpecColumnConfig::default(),
        }
    }

    /// Create a column group.
    pub fn group(
        field: impl Into<String>,
        name: impl Into<String>,
        children: Vec<SpecHeaderNode>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            name: name.into(),
            children: Some(children),
            config: SpecColumnConfig::default(),
        }
    }

    /// Replace per-column configuration.
    pub fn with_config(mut self, config: SpecColumnConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether this node has no child list.
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Header node annotated with computed spans.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecHeaderSpan<'a> {
    /// Source node.
    pub node: &'a SpecHeaderNode,
    /// Number of leaf columns covered.
    pub col_span: usize,
    /// Number of header rows covered.
    pub row_span: usize,
    /// Subtree depth (leaf = 1).
    pub depth: usize,
    /// Annotated children in input order.
    pub children: Vec<SpecHeaderSpan<'a>>,
}

/// Leaf-column projection of a header tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecFlatColumn {
    /// Column key.
    pub field: String,
    /// Display label.
    pub name: String,
    /// Per-column configuration.
    pub config: SpecColumnConfig,
    /// Always 1 for a leaf.
    pub col_span: usize,
    /// Header rows covered by the leaf cell.
    pub row_span: usize,
    /// Leaf depth (always 1).
    pub depth: usize,
}

/// One header cell placed in the header layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecHeaderCell {
    /// Column key (may be absent on group nodes).
    pub field: Option<String>,
    /// Display label.
    pub name: String,
    /// Per-column configuration.
    pub config: SpecColumnConfig,
    /// Zero-based column offset inside the header block.
    pub col_idx: usize,
    /// Number of columns covered.
    pub col_span: usize,
    /// Number of rows covered.
    pub row_span: usize,
}

/// Header row index (zero-based) -> cells of that row in column order.
pub type TypeHeaderLayout = BTreeMap<usize, Vec<SpecHeaderCell>>;

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Data

/// One node of the caller-supplied data tree.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumDataNode {
    /// Leaf record.
    Record(TypeFlatRecord),
    /// Row group labelled by `label`.
    Group {
        /// Group label written into the grouping column.
        label: EnumCellValue,
        /// Child nodes in input order.
        children: Vec<EnumDataNode>,
    },
}

impl EnumDataNode {
    /// Create a record from `(field, value)` pairs.
    pub fn record<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<EnumCellValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Record(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Create a group node.
    pub fn group(label: impl Into<EnumCellValue>, children: Vec<EnumDataNode>) -> Self {
        Self::Group {
            label: label.into(),
            children,
        }
    }
}

/// Data node annotated with its vertical merge span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecDataSpan<'a> {
    /// Source node.
    pub node: &'a EnumDataNode,
    /// Number of record leaves in the subtree.
    pub merge_span: usize,
    /// Annotated children in input order.
    pub children: Vec<SpecDataSpan<'a>>,
}

/// Rectangular merge instruction, 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecMergeRegion {
    /// First column.
    pub col_start: usize,
    /// First row.
    pub row_start: usize,
    /// Last column.
    pub col_end: usize,
    /// Last row.
    pub row_end: usize,
}

impl SpecMergeRegion {
    /// Create a region from its corners.
    pub fn new(col_start: usize, row_start: usize, col_end: usize, row_end: usize) -> Self {
        Self {
            col_start,
            row_start,
            col_end,
            row_end,
        }
    }

    /// Number of rows covered.
    pub fn height(&self) -> usize {
        self.row_end + 1 - self.row_start
    }

    /// Number of columns covered.
    pub fn width(&self) -> usize {
        self.col_end + 1 - self.col_start
    }

    /// Whether the region covers exactly one cell.
    pub fn is_single_cell(&self) -> bool {
        self.col_start == self.col_end && self.row_start == self.row_end
    }
}

impl fmt::Display for SpecMergeRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}]:[{},{}]",
            self.col_start, self.row_start, self.col_end, self.row_end
        )
    }
}

/// Output of data flattening.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecFlatData {
    /// Flattened records in depth-first order.
    pub records: Vec<TypeFlatRecord>,
    /// Vertical merges of grouping columns, parents before children.
    pub merges: Vec<SpecMergeRegion>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetOptions

/// Per-sheet configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSheetConfig {
    /// Sheet title.
    pub sheet_name: String,
    /// Key marking a data group's child list.
    pub data_children_key: String,
    /// Key holding a data group's label.
    pub data_children_text_key: String,
    /// Apply computed data merges to the sheet.
    pub if_data_children_cell_merge: bool,
    /// First grid row used (1-based).
    pub start_row: usize,
    /// First grid column used (1-based).
    pub start_column: usize,
    /// Sheet default horizontal alignment.
    pub alignment_horizontal: EnumAlignHorizontal,
    /// Sheet default vertical alignment.
    pub alignment_vertical: EnumAlignVertical,
    /// Header font size in points.
    pub header_font_size: i64,
    /// Header font weight.
    pub if_header_font_bold: bool,
    /// Column width used when a header node has no width override.
    pub default_column_width: EnumColumnWidth,
    /// Default row height in points.
    pub default_row_height: f64,
}

impl Default for SpecSheetConfig {
    fn default() -> Self {
        derive_default_sheet_config()
    }
}

/// One export sheet: header tree, data tree and configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecSheet {
    /// Header forest.
    pub header: Vec<SpecHeaderNode>,
    /// Data forest.
    pub data: Vec<EnumDataNode>,
    /// Sheet configuration.
    pub config: SpecSheetConfig,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportOptions

/// Output artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumSheetFileType {
    /// Office Open XML workbook.
    #[default]
    Xlsx,
    /// Legacy BIFF workbook.
    Xls,
    /// Delimited text.
    Csv,
}

impl EnumSheetFileType {
    /// Lowercase file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for EnumSheetFileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "xls" => Ok(Self::Xls),
            "csv" => Ok(Self::Csv),
            _ => Err(format!(
                "file_type must be one of: 'xlsx', 'xls', 'csv'; got {s:?}."
            )),
        }
    }
}

impl fmt::Display for EnumSheetFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Zero-argument text provider used by path policies.
pub type FnTextProvider = Arc<dyn Fn() -> Result<String, String> + Send + Sync>;

/// Date directory segment policy.
#[derive(Clone, Default)]
pub enum EnumDatePolicy {
    /// No date segment.
    None,
    /// Current local date as `%Y%m%d`.
    #[default]
    Today,
    /// Current local date rendered with a strftime pattern.
    Pattern(String),
    /// Caller-computed segment.
    Custom(FnTextProvider),
}

impl fmt::Debug for EnumDatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Today => write!(f, "Today"),
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(pattern).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// File stem policy.
#[derive(Clone, Default)]
pub enum EnumFileNamePolicy {
    /// Current UNIX time in microseconds.
    #[default]
    Timestamp,
    /// Explicit file stem.
    Name(String),
    /// Caller-computed file stem.
    Custom(FnTextProvider),
}

impl fmt::Debug for EnumFileNamePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp => write!(f, "Timestamp"),
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Export-wide options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetExportOptions {
    /// Output artifact format.
    pub file_type: EnumSheetFileType,
    /// Maximum worker threads for sheet builds; `None` builds serially.
    pub num_workers_max: Option<usize>,
    /// Field delimiter for delimited output.
    pub csv_delimiter: u8,
}

impl Default for SpecSheetExportOptions {
    fn default() -> Self {
        Self {
            file_type: EnumSheetFileType::Xlsx,
            num_workers_max: None,
            csv_delimiter: b',',
        }
    }
}

/// Resolved artifact location returned by an export call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecExportPath {
    /// Root directory as supplied.
    pub root: PathBuf,
    /// Date segment (may be empty).
    pub date: String,
    /// File stem.
    pub file: String,
    /// Output format.
    pub file_type: EnumSheetFileType,
    /// `root/date/file.ext`.
    pub full_path: PathBuf,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

fn derive_sheet_prefix(sheet_idx: &Option<usize>) -> String {
    match sheet_idx {
        Some(n_idx) => format!("sheet {n_idx}: "),
        None => String::new(),
    }
}

/// Sheet build/export failure.
#[derive(Debug, Error)]
pub enum SheetExportError {
    /// Malformed header or data tree.
    #[error("{}structural error at {location}: {message}", derive_sheet_prefix(.sheet_idx))]
    Structural {
        /// Index of the offending sheet.
        sheet_idx: Option<usize>,
        /// Node path or grid position.
        location: String,
        /// User-facing error text.
        message: String,
    },
    /// Invalid option value or unsupported operation.
    #[error("{}configuration error: {message}", derive_sheet_prefix(.sheet_idx))]
    Configuration {
        /// Index of the offending sheet.
        sheet_idx: Option<usize>,
        /// User-facing error text.
        message: String,
    },
    /// A caller-supplied hook failed.
    #[error(
        "{}callback error at row={row} col={col}: {message}",
        derive_sheet_prefix(.sheet_idx)
    )]
    Callback {
        /// Index of the offending sheet.
        sheet_idx: Option<usize>,
        /// Absolute 1-based row (0 when not cell-bound).
        row: usize,
        /// Absolute 1-based column (0 when not cell-bound).
        col: usize,
        /// Error text returned by the hook.
        message: String,
    },
    /// Filesystem failure.
    #[error("io error at {}: {source}", .path.display())]
    Io {
        /// Path being created or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Rendering backend rejected an operation.
    #[error("{}write error: {message}", derive_sheet_prefix(.sheet_idx))]
    Write {
        /// Index of the offending sheet.
        sheet_idx: Option<usize>,
        /// Backend error text.
        message: String,
    },
}

impl SheetExportError {
    /// Structural error without sheet context.
    pub fn structural(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structural {
            sheet_idx: None,
            location: location.into(),
            message: message.into(),
        }
    }

    /// Configuration error without sheet context.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            sheet_idx: None,
            message: message.into(),
        }
    }

    /// Write error without sheet context.
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            sheet_idx: None,
            message: message.into(),
        }
    }

    /// Attach sheet index when absent.
    pub fn with_sheet_idx(mut self, n_idx: usize) -> Self {
        match &mut self {
            Self::Structural { sheet_idx, .. }
            | Self::Configuration { sheet_idx, .. }
            | Self::Callback { sheet_idx, .. }
            | Self::Write { sheet_idx, .. } => {
                sheet_idx.get_or_insert(n_idx);
            }
            Self::Io { .. } => {}
        }
        self
    }

    /// Sheet index carried by the error, if any.
    pub fn sheet_idx(&self) -> Option<usize> {
        match self {
            Self::Structural { sheet_idx, .. }
            | Self::Configuration { sheet_idx, .. }
            | Self::Callback { sheet_idx, .. }
            | Self::Write { sheet_idx, .. } => *sheet_idx,
            Self::Io { .. } => None,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
