//! In-memory grid canvas and workbook persistence.
//!
//! [`SheetCanvas`] is the primitive surface the assembler and user callbacks draw on.
//! [`GridSheet`] records those calls; [`GridWorkbook`] orders sheets and saves them
//! through `rust_xlsxwriter` or `csv`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use tracing::warn;

use crate::conf::{N_WIDTH_AUTO_MAX, N_WIDTH_AUTO_MIN, N_WIDTH_AUTO_PADDING};
use crate::spec::{
    EnumCellValue, EnumColumnWidth, EnumSheetFileType, SheetExportError, SpecCellFormat,
    SpecMergeRegion,
};
use crate::util::{
    cast_col_num, cast_row_num, derive_unique_sheet_name, estimate_unicode_string_width,
    validate_cell_coordinate,
};

////////////////////////////////////////////////////////////////////////////////
// #region CanvasContract

/// Primitive grid operations; `col`/`row` are 1-based.
pub trait SheetCanvas {
    /// Sheet title.
    fn title(&self) -> &str;

    /// Write one cell value.
    fn set_cell_value(&mut self, col: usize, row: usize, value: EnumCellValue)
    -> Result<(), String>;

    /// Read one cell value, if written.
    fn cell_value(&self, col: usize, row: usize) -> Option<&EnumCellValue>;

    /// Overlay a format patch on one cell.
    fn set_cell_format(
        &mut self,
        col: usize,
        row: usize,
        patch: &SpecCellFormat,
    ) -> Result<(), String>;

    /// Join a rectangular block of cells.
    fn merge_cells(&mut self, region: &SpecMergeRegion) -> Result<(), String>;

    /// Set fixed column width in character units.
    fn set_column_width(&mut self, col: usize, width: f64) -> Result<(), String>;

    /// Mark a column for content-based width estimation.
    fn set_column_auto_size(&mut self, col: usize) -> Result<(), String>;

    /// Set default row height in points.
    fn set_default_row_height(&mut self, height: f64) -> Result<(), String>;

    /// Set the sheet-wide base cell format.
    fn set_default_format(&mut self, format: SpecCellFormat);
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridSheet

/// One recorded cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecGridCell {
    /// Cell value.
    pub value: EnumCellValue,
    /// Format patch layered on the sheet default format.
    pub format: SpecCellFormat,
}

/// In-memory sheet recording canvas calls.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridSheet {
    title: String,
    sheet_idx: Option<usize>,
    dict_cells: BTreeMap<(usize, usize), SpecGridCell>,
    l_merges: Vec<SpecMergeRegion>,
    /// col -> region row_start -> index into `l_merges`; regions never overlap per column.
    dict_merge_index: BTreeMap<usize, BTreeMap<usize, usize>>,
    dict_column_widths: BTreeMap<usize, EnumColumnWidth>,
    n_row_height_default: Option<f64>,
    fmt_default: SpecCellFormat,
}

impl GridSheet {
    /// Create an empty sheet.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Tag the sheet with its input index, used in write errors.
    pub fn with_sheet_idx(mut self, sheet_idx: usize) -> Self {
        self.sheet_idx = Some(sheet_idx);
        self
    }

    /// Input index of the sheet, if tagged.
    pub fn sheet_idx(&self) -> Option<usize> {
        self.sheet_idx
    }

    pub(crate) fn set_title(&mut self, title: String) {
        self.title = title;
    }

    /// Recorded cell at `(col, row)`.
    pub fn cell(&self, col: usize, row: usize) -> Option<&SpecGridCell> {
        self.dict_cells.get(&(row, col))
    }

    /// Recorded cells in row-major order as `((row, col), cell)`.
    pub fn cells(&self) -> impl Iterator<Item = (&(usize, usize), &SpecGridCell)> {
        self.dict_cells.iter()
    }

    /// Applied merge regions in application order.
    pub fn merges(&self) -> &[SpecMergeRegion] {
        &self.l_merges
    }

    /// Column width rules keyed by 1-based column.
    pub fn column_widths(&self) -> &BTreeMap<usize, EnumColumnWidth> {
        &self.dict_column_widths
    }

    /// Default row height, if set.
    pub fn default_row_height(&self) -> Option<f64> {
        self.n_row_height_default
    }

    /// Sheet-wide base cell format.
    pub fn default_format(&self) -> &SpecCellFormat {
        &self.fmt_default
    }

    /// Used range as `(max row, max col)`; `None` when no cell was written.
    pub fn dimension(&self) -> Option<(usize, usize)> {
        let n_row_max = self.dict_cells.keys().map(|(row, _)| *row).max()?;
        let n_col_max = self.dict_cells.keys().map(|(_, col)| *col).max()?;
        Some((n_row_max, n_col_max))
    }

    /// Merge region containing `(col, row)`, if any.
    pub fn find_merge(&self, col: usize, row: usize) -> Option<&SpecMergeRegion> {
        self.find_merge_in_column(col, row, row)
    }

    /// Merge region in `col` intersecting rows `row_start..=row_end`, if any.
    fn find_merge_in_column(
        &self,
        col: usize,
        row_start: usize,
        row_end: usize,
    ) -> Option<&SpecMergeRegion> {
        let (_, n_merge_idx) = self
            .dict_merge_index
            .get(&col)?
            .range(..=row_end)
            .next_back()?;
        self.l_merges
            .get(*n_merge_idx)
            .filter(|region| region.row_end >= row_start)
    }

    /// Whether `(col, row)` lies inside a merge region but is not its anchor.
    pub fn is_covered(&self, col: usize, row: usize) -> bool {
        self.find_merge(col, row)
            .is_some_and(|region| (col, row) != (region.col_start, region.row_start))
    }

    /// Display text of one cell; covered and unwritten cells are blank.
    pub fn display_text(&self, col: usize, row: usize) -> String {
        if self.is_covered(col, row) {
            return String::new();
        }
        self.cell(col, row)
            .map(|cell| cell.value.to_text())
            .unwrap_or_default()
    }

    /// Estimate an auto-sized width from recorded text of one column.
    ///
    /// Anchors of horizontal merges are skipped since their text spans several columns.
    pub fn derive_auto_column_width(&self, col: usize) -> f64 {
        let dict_text_widths = self.derive_text_widths();
        clamp_auto_width(dict_text_widths.get(&col).copied().unwrap_or(0))
    }

    /// Resolve every column width rule to a concrete width.
    pub fn derive_column_widths(&self) -> BTreeMap<usize, f64> {
        let dict_text_widths = self.derive_text_widths();
        self.dict_column_widths
            .iter()
            .map(|(col, width)| match width {
                EnumColumnWidth::Fixed(n_width) => (*col, *n_width),
                EnumColumnWidth::Auto => (
                    *col,
                    clamp_auto_width(dict_text_widths.get(col).copied().unwrap_or(0)),
                ),
            })
            .collect()
    }

    /// Widest recorded text per column, in one pass over the cells.
    fn derive_text_widths(&self) -> BTreeMap<usize, usize> {
        let mut dict_text_widths = BTreeMap::new();
        for ((n_row, n_col), cell) in &self.dict_cells {
            if self
                .find_merge(*n_col, *n_row)
                .is_some_and(|region| region.width() > 1)
            {
                continue;
            }
            let n_width = estimate_unicode_string_width(&cell.value.to_text());
            let n_width_max = dict_text_widths.entry(*n_col).or_insert(0);
            *n_width_max = (*n_width_max).max(n_width);
        }
        dict_text_widths
    }
}

impl SheetCanvas for GridSheet {
    fn title(&self) -> &str {
        &self.title
    }

    fn set_cell_value(
        &mut self,
        col: usize,
        row: usize,
        value: EnumCellValue,
    ) -> Result<(), String> {
        validate_cell_coordinate(col, row)?;
        self.dict_cells.entry((row, col)).or_default().value = value;
        Ok(())
    }

    fn cell_value(&self, col: usize, row: usize) -> Option<&EnumCellValue> {
        self.cell(col, row).map(|cell| &cell.value)
    }

    fn set_cell_format(
        &mut self,
        col: usize,
        row: usize,
        patch: &SpecCellFormat,
    ) -> Result<(), String> {
        validate_cell_coordinate(col, row)?;
        let cell = self.dict_cells.entry((row, col)).or_default();
        cell.format = cell.format.merge(patch);
        Ok(())
    }

    fn merge_cells(&mut self, region: &SpecMergeRegion) -> Result<(), String> {
        validate_cell_coordinate(region.col_start, region.row_start)?;
        validate_cell_coordinate(region.col_end, region.row_end)?;
        if region.col_end < region.col_start || region.row_end < region.row_start {
            return Err(format!("merge region {region} is inverted"));
        }
        if region.is_single_cell() {
            return Ok(());
        }
        for n_col in region.col_start..=region.col_end {
            if let Some(existing) =
                self.find_merge_in_column(n_col, region.row_start, region.row_end)
            {
                return Err(format!(
                    "merge region {region} overlaps existing region {existing}"
                ));
            }
        }

        let anchor = (region.row_start, region.col_start);
        for n_row in region.row_start..=region.row_end {
            let l_keys_covered: Vec<(usize, usize)> = self
                .dict_cells
                .range((n_row, region.col_start)..=(n_row, region.col_end))
                .map(|(key, _)| *key)
                .filter(|key| *key != anchor)
                .collect();
            for key in l_keys_covered {
                self.dict_cells.remove(&key);
            }
        }

        let n_merge_idx = self.l_merges.len();
        for n_col in region.col_start..=region.col_end {
            self.dict_merge_index
                .entry(n_col)
                .or_default()
                .insert(region.row_start, n_merge_idx);
        }
        self.l_merges.push(*region);
        Ok(())
    }

    fn set_column_width(&mut self, col: usize, width: f64) -> Result<(), String> {
        validate_cell_coordinate(col, 1)?;
        if !width.is_finite() || width <= 0.0 {
            return Err(format!("column width must be positive; got {width}"));
        }
        self.dict_column_widths
            .insert(col, EnumColumnWidth::Fixed(width));
        Ok(())
    }

    fn set_column_auto_size(&mut self, col: usize) -> Result<(), String> {
        validate_cell_coordinate(col, 1)?;
        self.dict_column_widths.insert(col, EnumColumnWidth::Auto);
        Ok(())
    }

    fn set_default_row_height(&mut self, height: f64) -> Result<(), String> {
        if !height.is_finite() || height <= 0.0 {
            return Err(format!("row height must be positive; got {height}"));
        }
        self.n_row_height_default = Some(height);
        Ok(())
    }

    fn set_default_format(&mut self, format: SpecCellFormat) {
        self.fmt_default = format;
    }
}

fn clamp_auto_width(n_width_text: usize) -> f64 {
    (n_width_text + N_WIDTH_AUTO_PADDING).clamp(N_WIDTH_AUTO_MIN, N_WIDTH_AUTO_MAX) as f64
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridWorkbook

/// Ordered sheet collection with unique, sanitized titles.
#[derive(Debug, Clone, Default)]
pub struct GridWorkbook {
    l_sheets: Vec<GridSheet>,
    set_sheet_names_existing: BTreeSet<String>,
}

impl GridWorkbook {
    /// Create an empty workbook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sheet and return its final (unique) title.
    pub fn insert_sheet(&mut self, mut sheet: GridSheet) -> String {
        let c_title = derive_unique_sheet_name(sheet.title(), &mut self.set_sheet_names_existing);
        sheet.set_title(c_title.clone());
        self.l_sheets.push(sheet);
        c_title
    }

    /// Sheets in insertion order.
    pub fn sheets(&self) -> &[GridSheet] {
        &self.l_sheets
    }

    /// Number of sheets.
    pub fn len(&self) -> usize {
        self.l_sheets.len()
    }

    /// Whether no sheet was inserted.
    pub fn is_empty(&self) -> bool {
        self.l_sheets.is_empty()
    }

    /// Persist the workbook to `path` in the requested format.
    pub fn save(
        &self,
        path: &Path,
        file_type: EnumSheetFileType,
        csv_delimiter: u8,
    ) -> Result<(), SheetExportError> {
        match file_type {
            EnumSheetFileType::Xlsx => self.save_xlsx(path),
            EnumSheetFileType::Csv => self.save_csv(path, csv_delimiter),
            EnumSheetFileType::Xls => Err(SheetExportError::configuration(
                "output format 'xls' (legacy BIFF) has no built-in writer; use 'xlsx' or 'csv'",
            )),
        }
    }

    fn save_xlsx(&self, path: &Path) -> Result<(), SheetExportError> {
        let mut workbook = Workbook::new();
        for (n_idx, sheet) in self.l_sheets.iter().enumerate() {
            let worksheet = workbook.add_worksheet();
            write_xlsx_sheet(worksheet, sheet).map_err(|message| SheetExportError::Write {
                sheet_idx: Some(sheet.sheet_idx().unwrap_or(n_idx)),
                message,
            })?;
        }
        if self.l_sheets.is_empty() {
            workbook.add_worksheet();
        }
        workbook.save(path).map_err(|err| match err {
            XlsxError::IoError(source) => SheetExportError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => SheetExportError::write(derive_xlsx_error_text(other)),
        })
    }

    fn save_csv(&self, path: &Path, csv_delimiter: u8) -> Result<(), SheetExportError> {
        if self.l_sheets.len() > 1 {
            warn!(
                n_sheets = self.l_sheets.len(),
                "delimited output holds one sheet; only the first sheet is written"
            );
        }
        let file = File::create(path).map_err(|source| SheetExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(csv_delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);

        if let Some(sheet) = self.l_sheets.first()
            && let Some((n_row_max, n_col_max)) = sheet.dimension()
        {
            for n_row in 1..=n_row_max {
                let l_record: Vec<String> = (1..=n_col_max)
                    .map(|n_col| sheet.display_text(n_col, n_row))
                    .collect();
                writer
                    .write_record(&l_record)
                    .map_err(|err| SheetExportError::Write {
                        sheet_idx: Some(sheet.sheet_idx().unwrap_or(0)),
                        message: format!("csv write error: {err}"),
                    })?;
            }
        }
        writer.flush().map_err(|source| SheetExportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XlsxRendering

fn write_xlsx_sheet(worksheet: &mut Worksheet, sheet: &GridSheet) -> Result<(), String> {
    worksheet
        .set_name(sheet.title())
        .map_err(derive_xlsx_error_text)?;
    if let Some(n_height) = sheet.default_row_height() {
        worksheet.set_default_row_height(n_height);
    }
    for (n_col, n_width) in sheet.derive_column_widths() {
        worksheet
            .set_column_width(cast_col_num(n_col - 1)?, n_width)
            .map_err(derive_xlsx_error_text)?;
    }

    let fmt_default = sheet.default_format();
    for region in sheet.merges() {
        let fmt_anchor = sheet
            .cell(region.col_start, region.row_start)
            .map(|cell| fmt_default.merge(&cell.format))
            .unwrap_or_else(|| fmt_default.clone());
        worksheet
            .merge_range(
                cast_row_num(region.row_start - 1)?,
                cast_col_num(region.col_start - 1)?,
                cast_row_num(region.row_end - 1)?,
                cast_col_num(region.col_end - 1)?,
                "",
                &derive_rust_xlsx_format(&fmt_anchor),
            )
            .map_err(derive_xlsx_error_text)?;
    }

    for ((n_row, n_col), cell) in sheet.cells() {
        if sheet.is_covered(*n_col, *n_row) {
            continue;
        }
        let format = derive_rust_xlsx_format(&fmt_default.merge(&cell.format));
        write_cell_with_format(worksheet, *n_row - 1, *n_col - 1, &cell.value, &format)?;
    }
    Ok(())
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), String> {
    let n_row = cast_row_num(row_idx)?;
    let n_col = cast_col_num(col_idx)?;
    match value {
        EnumCellValue::None => {
            worksheet
                .write_blank(n_row, n_col, format)
                .map_err(derive_xlsx_error_text)?;
        }
        EnumCellValue::String(val) => {
            worksheet
                .write_string_with_format(n_row, n_col, val, format)
                .map_err(derive_xlsx_error_text)?;
        }
        EnumCellValue::Number(val) => {
            worksheet
                .write_number_with_format(n_row, n_col, *val, format)
                .map_err(derive_xlsx_error_text)?;
        }
        EnumCellValue::Boolean(val) => {
            worksheet
                .write_boolean_with_format(n_row, n_col, *val, format)
                .map_err(derive_xlsx_error_text)?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }

    for val in [&spec.align, &spec.valign].into_iter().flatten() {
        if let Some(align) = derive_format_align(val) {
            format = format.set_align(align);
        }
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }
    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    match align.trim().to_ascii_lowercase().as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "justify" => Some(FormatAlign::Justify),
        "distributed" => Some(FormatAlign::Distributed),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" => Some(FormatAlign::VerticalCenter),
        "vjustify" => Some(FormatAlign::VerticalJustify),
        "vdistributed" => Some(FormatAlign::VerticalDistributed),
        _ => None,
    }
}

fn derive_xlsx_error_text(err: XlsxError) -> String {
    format!("xlsx write error: {err}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
