//! Grid assembly and multi-sheet export orchestration.

use std::fs;
use std::path::Path;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::conf::{
    N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, derive_default_format, derive_header_format,
};
use crate::flatten::{
    flatten_data, flatten_header_columns, flatten_header_layout, plan_header_merges,
};
use crate::grid::{GridSheet, GridWorkbook, SheetCanvas};
use crate::report::{ReportSheetBuild, ReportSheetBuildBuilder, SpecSheetReport};
use crate::resolve::{
    calculate_header_height, calculate_header_width, calculate_record_count, resolve_data_forest,
    resolve_header_forest,
};
use crate::spec::{
    EnumCellValue, EnumColumnWidth, EnumDatePolicy, EnumFileNamePolicy, EnumSheetFileType,
    SheetExportError, SpecExportPath, SpecFlatColumn, SpecFlatData, SpecMergeRegion, SpecSheet,
    SpecSheetConfig, SpecSheetExportOptions, TypeHeaderLayout,
};
use crate::util::{
    calculate_worker_limit, derive_date_segment, derive_export_path, derive_file_name,
    sanitize_sheet_name, validate_cell_coordinate,
};

////////////////////////////////////////////////////////////////////////////////
// #region SheetAssembly

/// Per-sheet build state; created fresh for every sheet.
#[derive(Debug, Clone)]
pub struct SpecSheetBuildContext<'a> {
    /// Sheet index in input order.
    pub sheet_idx: usize,
    /// Effective sheet configuration.
    pub config: &'a SpecSheetConfig,
    /// Leaf columns in grid order.
    pub columns: Vec<SpecFlatColumn>,
    /// Row-indexed header cells.
    pub header_layout: TypeHeaderLayout,
    /// Number of header rows.
    pub n_rows_header: usize,
    /// Header merge regions (always applied).
    pub header_merges: Vec<SpecMergeRegion>,
    /// First grid row holding data.
    pub n_row_data_start: usize,
    /// Flattened records and data merge regions.
    pub flat_data: SpecFlatData,
}

/// Check that the sheet origin and its full extent fit the worksheet limits.
///
/// Returns the first data row.
fn derive_data_row_start(
    config: &SpecSheetConfig,
    n_rows_header: usize,
    n_cols: usize,
    n_records: usize,
) -> Result<usize, SheetExportError> {
    validate_cell_coordinate(config.start_column, config.start_row).map_err(|message| {
        SheetExportError::configuration(format!("invalid sheet origin: {message}"))
    })?;

    let n_row_data_start = config
        .start_row
        .checked_add(n_rows_header)
        .ok_or_else(|| SheetExportError::write("first data row overflows"))?;
    let n_row_end = n_row_data_start
        .checked_add(n_records)
        .map(|n_row| n_row - 1)
        .ok_or_else(|| SheetExportError::write("last data row overflows"))?;
    let n_col_end = config
        .start_column
        .checked_add(n_cols)
        .map(|n_col| n_col - 1)
        .ok_or_else(|| SheetExportError::write("last column overflows"))?;

    if n_row_end > N_NROWS_EXCEL_MAX {
        return Err(SheetExportError::write(format!(
            "sheet needs rows {}..={n_row_end}; worksheet holds {N_NROWS_EXCEL_MAX}",
            config.start_row
        )));
    }
    if n_col_end > N_NCOLS_EXCEL_MAX {
        return Err(SheetExportError::write(format!(
            "sheet needs columns {}..={n_col_end}; worksheet holds {N_NCOLS_EXCEL_MAX}",
            config.start_column
        )));
    }
    Ok(n_row_data_start)
}

/// Resolve and flatten one sheet into grid coordinates.
pub fn plan_sheet(
    sheet: &SpecSheet,
    sheet_idx: usize,
) -> Result<SpecSheetBuildContext<'_>, SheetExportError> {
    let config = &sheet.config;
    let l_header_spans =
        resolve_header_forest(&sheet.header).map_err(|err| err.with_sheet_idx(sheet_idx))?;
    let l_data_spans =
        resolve_data_forest(&sheet.data).map_err(|err| err.with_sheet_idx(sheet_idx))?;

    let n_rows_header = calculate_header_height(&l_header_spans);
    let n_row_data_start = derive_data_row_start(
        config,
        n_rows_header,
        calculate_header_width(&l_header_spans),
        calculate_record_count(&l_data_spans),
    )
    .map_err(|err| err.with_sheet_idx(sheet_idx))?;

    let columns = flatten_header_columns(&l_header_spans);
    let header_layout = flatten_header_layout(&l_header_spans);
    let header_merges = plan_header_merges(&header_layout, config.start_row, config.start_column);
    let flat_data = flatten_data(&l_data_spans, &columns, n_row_data_start, config.start_column)
        .map_err(|err| err.with_sheet_idx(sheet_idx))?;

    debug!(
        sheet_idx,
        n_rows_header,
        n_columns = columns.len(),
        n_records = flat_data.records.len(),
        n_header_merges = header_merges.len(),
        n_data_merges = flat_data.merges.len(),
        "planned sheet"
    );

    Ok(SpecSheetBuildContext {
        sheet_idx,
        config,
        columns,
        header_layout,
        n_rows_header,
        header_merges,
        n_row_data_start,
        flat_data,
    })
}

/// Issue canvas calls for one planned sheet: header, data, then data merges.
pub fn render_sheet(
    ctx: &SpecSheetBuildContext<'_>,
    canvas: &mut dyn SheetCanvas,
) -> Result<(), SheetExportError> {
    let config = ctx.config;
    let map_write_err = |message: String| SheetExportError::Write {
        sheet_idx: Some(ctx.sheet_idx),
        message,
    };

    canvas
        .set_default_row_height(config.default_row_height)
        .map_err(map_write_err)?;
    canvas.set_default_format(derive_default_format(config));

    let fmt_header = derive_header_format(config);
    for (n_row, l_cells) in &ctx.header_layout {
        let n_row_abs = config.start_row + n_row;
        for cell in l_cells {
            let n_col = config.start_column + cell.col_idx;
            canvas
                .set_cell_value(n_col, n_row_abs, EnumCellValue::String(cell.name.clone()))
                .map_err(map_write_err)?;
            canvas
                .set_cell_format(n_col, n_row_abs, &fmt_header)
                .map_err(map_write_err)?;
            let res_width = match cell.config.width.unwrap_or(config.default_column_width) {
                EnumColumnWidth::Auto => canvas.set_column_auto_size(n_col),
                EnumColumnWidth::Fixed(n_width) => canvas.set_column_width(n_col, n_width),
            };
            res_width.map_err(map_write_err)?;
        }
    }
    for region in &ctx.header_merges {
        canvas.merge_cells(region).map_err(map_write_err)?;
    }

    let n_row_data = ctx.n_row_data_start;
    for (n_offset, record) in ctx.flat_data.records.iter().enumerate() {
        let n_row = n_row_data + n_offset;
        for (n_col_offset, column) in ctx.columns.iter().enumerate() {
            let n_col = config.start_column + n_col_offset;
            let value_raw = record.get(&column.field).cloned().unwrap_or_default();
            let map_callback_err = |message: String| SheetExportError::Callback {
                sheet_idx: Some(ctx.sheet_idx),
                row: n_row,
                col: n_col,
                message,
            };

            let value = match &column.config.formatter {
                Some(formatter) => {
                    formatter(&value_raw, record, &*canvas).map_err(map_callback_err)?
                }
                None => value_raw.clone(),
            };
            canvas
                .set_cell_value(n_col, n_row, value)
                .map_err(map_write_err)?;

            if let Some(custom) = &column.config.custom {
                custom(&mut *canvas, &value_raw, record, n_row, n_col)
                    .map_err(map_callback_err)?;
            }
        }
    }

    if config.if_data_children_cell_merge {
        for region in &ctx.flat_data.merges {
            canvas.merge_cells(region).map_err(map_write_err)?;
        }
    }
    Ok(())
}

/// Plan and render one sheet into a fresh in-memory grid.
///
/// The returned report's `sheet_name` is provisional until the sheet is committed.
pub fn build_sheet(
    sheet: &SpecSheet,
    sheet_idx: usize,
) -> Result<(GridSheet, SpecSheetReport), SheetExportError> {
    let ctx = plan_sheet(sheet, sheet_idx)?;
    let mut grid = GridSheet::new(sanitize_sheet_name(&sheet.config.sheet_name, "_"))
        .with_sheet_idx(sheet_idx);
    render_sheet(&ctx, &mut grid)?;

    let report = SpecSheetReport {
        sheet_idx,
        sheet_name: grid.title().to_string(),
        cnt_header_rows: ctx.n_rows_header,
        cnt_columns: ctx.columns.len(),
        cnt_records: ctx.flat_data.records.len(),
        cnt_header_merges: ctx.header_merges.len(),
        cnt_data_merges: ctx.flat_data.merges.len(),
        if_data_merges_applied: sheet.config.if_data_children_cell_merge,
    };
    Ok((grid, report))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetExporter

type TypeSheetBuildResult = Result<(GridSheet, SpecSheetReport), SheetExportError>;

/// Multi-sheet exporter: collects sheets, builds them into a workbook, and saves it.
#[derive(Debug, Default)]
pub struct SheetExporter {
    options: SpecSheetExportOptions,
    l_sheets: Vec<SpecSheet>,
    workbook: Option<GridWorkbook>,
    report: ReportSheetBuild,
}

impl SheetExporter {
    /// Create an exporter with export-wide options.
    pub fn new(options: SpecSheetExportOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Append one sheet. Invalidates any previous build.
    pub fn add_sheet(&mut self, sheet: SpecSheet) -> &mut Self {
        self.l_sheets.push(sheet);
        self.workbook = None;
        self
    }

    /// Select xlsx output.
    pub fn xlsx(&mut self) -> &mut Self {
        self.options.file_type = EnumSheetFileType::Xlsx;
        self
    }

    /// Select legacy xls output.
    pub fn xls(&mut self) -> &mut Self {
        self.options.file_type = EnumSheetFileType::Xls;
        self
    }

    /// Select delimited output.
    pub fn csv(&mut self) -> &mut Self {
        self.options.file_type = EnumSheetFileType::Csv;
        self
    }

    /// Export-wide options.
    pub fn options(&self) -> &SpecSheetExportOptions {
        &self.options
    }

    /// Sheets added so far.
    pub fn sheets(&self) -> &[SpecSheet] {
        &self.l_sheets
    }

    /// Report of the last build.
    pub fn report(&self) -> &ReportSheetBuild {
        &self.report
    }

    /// Workbook of the last build, if any.
    pub fn workbook(&self) -> Option<&GridWorkbook> {
        self.workbook.as_ref()
    }

    /// Build every sheet and commit the successful ones in index order.
    ///
    /// A failing sheet is recorded in the report and never reaches the workbook.
    pub fn build(&mut self) -> &ReportSheetBuild {
        let mut builder_report = ReportSheetBuildBuilder::default();
        let l_results = self.build_sheets(&mut builder_report);

        let mut workbook = GridWorkbook::new();
        for res_sheet in l_results {
            match res_sheet {
                Ok((grid, mut report)) => {
                    report.sheet_name = workbook.insert_sheet(grid);
                    builder_report.add_sheet(report);
                }
                Err(err) => {
                    warn!(sheet_idx = ?err.sheet_idx(), error = %err, "sheet build failed");
                    builder_report.add_error(err);
                }
            }
        }

        self.workbook = Some(workbook);
        self.report = builder_report.build();
        &self.report
    }

    fn build_sheets(
        &self,
        builder_report: &mut ReportSheetBuildBuilder,
    ) -> Vec<TypeSheetBuildResult> {
        let n_workers = match self.options.num_workers_max {
            None => 1,
            Some(_) => calculate_worker_limit(self.options.num_workers_max),
        };
        let build_serial = || -> Vec<TypeSheetBuildResult> {
            self.l_sheets
                .iter()
                .enumerate()
                .map(|(n_idx, sheet)| build_sheet(sheet, n_idx))
                .collect()
        };
        if n_workers <= 1 || self.l_sheets.len() <= 1 {
            return build_serial();
        }

        let Ok(thread_pool) = ThreadPoolBuilder::new().num_threads(n_workers).build() else {
            let c_warning = format!(
                "Failed to initialize thread pool (workers={n_workers}); fallback to serial build."
            );
            warn!("{c_warning}");
            builder_report.add_warning(c_warning);
            return build_serial();
        };
        thread_pool.install(|| {
            self.l_sheets
                .par_iter()
                .enumerate()
                .map(|(n_idx, sheet)| build_sheet(sheet, n_idx))
                .collect()
        })
    }

    /// Save the built workbook to `root/date/file.ext`.
    ///
    /// Requires a prior [`Self::build`]; only successfully built sheets are written.
    pub fn export(
        &self,
        root: impl AsRef<Path>,
        date_policy: EnumDatePolicy,
        file_name_policy: EnumFileNamePolicy,
    ) -> Result<SpecExportPath, SheetExportError> {
        let Some(workbook) = &self.workbook else {
            return Err(SheetExportError::configuration(
                "export requires a prior build",
            ));
        };

        let c_date = derive_date_segment(&date_policy)?;
        let c_file = derive_file_name(&file_name_policy)?;
        let spec_path = derive_export_path(root.as_ref(), c_date, c_file, self.options.file_type);

        if let Some(path_dir) = spec_path.full_path.parent() {
            fs::create_dir_all(path_dir).map_err(|source| SheetExportError::Io {
                path: path_dir.to_path_buf(),
                source,
            })?;
        }
        workbook.save(
            &spec_path.full_path,
            self.options.file_type,
            self.options.csv_delimiter,
        )?;

        info!(
            path = %spec_path.full_path.display(),
            file_type = %spec_path.file_type,
            n_sheets = workbook.len(),
            "exported workbook"
        );
        Ok(spec_path)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{EnumDataNode, SpecCellFormat, SpecColumnConfig, SpecHeaderNode};
    use crate::util::parse_sheet;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::io::Read;

    fn derive_fixture_json(config: Value) -> Value {
        let person = |name: &str, sex: i64| {
            json!({
                "name": name,
                "sex": sex,
                "birthday": "1990-01-01",
                "created_at": "2022-01-01 00:00:00"
            })
        };
        json!({
            "config": config,
            "header": [
                {"field": "address", "name": "地址", "children": [
                    {"field": "province", "name": "省"},
                    {"field": "city", "name": "市"},
                    {"field": "district", "name": "区"}
                ]},
                {"field": "userinfo", "name": "用户信息", "children": [
                    {"field": "name", "name": "姓名"},
                    {"field": "sex", "name": "性别"},
                    {"field": "birthday", "name": "生日"}
                ]},
                {"field": "created_at", "name": "创建时间", "config": {"width": 40}}
            ],
            "data": [
                {"province": "北京", "city": "北京", "district": "东城区", "name": "张三", "sex": 1,
                 "birthday": "2022-01-01", "created_at": "2022-01-01 00:00:00"},
                {"name": "湖北", "children": [
                    {"name": "武汉市", "children": [
                        {"name": "武昌区", "children": [person("李四", 1), person("王五", 2), person("赵六", 1)]},
                        {"name": "汉口区", "children": [person("周七", 1), person("王八", 1)]},
                        {"name": "江夏区", "children": [person("王九", 1)]}
                    ]},
                    {"name": "咸宁市", "children": [
                        {"name": "咸安区", "children": [person("张六", 1), person("王七", 1)]}
                    ]}
                ]},
                {"province": "广州", "city": "深圳", "district": "宝安区", "name": "小丽", "sex": 2,
                 "birthday": "2008-08-08", "created_at": "2021-01-01 00:00:00"}
            ]
        })
    }

    fn derive_fixture_sheet(config: Value) -> SpecSheet {
        parse_sheet(&derive_fixture_json(config)).unwrap()
    }

    fn derive_text(grid: &GridSheet, col: usize, row: usize) -> Option<String> {
        grid.cell_value(col, row).map(|value| value.to_text())
    }

    #[test]
    fn build_sheet_renders_grouped_fixture() {
        let sheet = derive_fixture_sheet(json!({"sheet_name": "sheet"}));
        let (grid, report) = build_sheet(&sheet, 0).unwrap();

        assert_eq!(derive_text(&grid, 1, 1).as_deref(), Some("地址"));
        assert_eq!(derive_text(&grid, 4, 1).as_deref(), Some("用户信息"));
        assert_eq!(derive_text(&grid, 7, 1).as_deref(), Some("创建时间"));
        assert_eq!(derive_text(&grid, 5, 2).as_deref(), Some("性别"));
        assert!(grid.is_covered(7, 2));

        assert_eq!(derive_text(&grid, 1, 3).as_deref(), Some("北京"));
        assert_eq!(derive_text(&grid, 1, 4).as_deref(), Some("湖北"));
        assert_eq!(grid.cell_value(1, 5), None);
        assert_eq!(derive_text(&grid, 4, 5).as_deref(), Some("王五"));
        assert_eq!(derive_text(&grid, 5, 5).as_deref(), Some("2"));
        assert_eq!(derive_text(&grid, 1, 12).as_deref(), Some("广州"));

        assert!(grid.merges().contains(&SpecMergeRegion::new(1, 4, 1, 11)));
        assert!(!grid.merges().contains(&SpecMergeRegion::new(3, 9, 3, 9)));
        assert_eq!(grid.merges().len(), 3 + 6);

        let cell_header = grid.cell(1, 1).unwrap();
        assert_eq!(cell_header.format.font_size, Some(16));
        assert_eq!(grid.default_format().valign.as_deref(), Some("vcenter"));
        assert_eq!(grid.default_row_height(), Some(25.0));
        assert_eq!(grid.column_widths()[&7], EnumColumnWidth::Fixed(40.0));
        assert_eq!(grid.column_widths()[&1], EnumColumnWidth::Auto);

        assert_eq!(
            report,
            SpecSheetReport {
                sheet_idx: 0,
                sheet_name: "sheet".to_string(),
                cnt_header_rows: 2,
                cnt_columns: 7,
                cnt_records: 10,
                cnt_header_merges: 3,
                cnt_data_merges: 7,
                if_data_merges_applied: true,
            }
        );
    }

    #[test]
    fn build_sheet_honors_start_offsets() {
        let sheet = derive_fixture_sheet(json!({"start_row": 3, "start_column": 2}));
        let (grid, _) = build_sheet(&sheet, 0).unwrap();

        assert_eq!(grid.cell_value(1, 3), None);
        assert_eq!(derive_text(&grid, 2, 3).as_deref(), Some("地址"));
        assert_eq!(derive_text(&grid, 2, 4).as_deref(), Some("省"));
        assert_eq!(derive_text(&grid, 2, 5).as_deref(), Some("北京"));
        assert_eq!(derive_text(&grid, 2, 6).as_deref(), Some("湖北"));
        assert!(grid.merges().contains(&SpecMergeRegion::new(2, 3, 4, 3)));
        assert!(grid.merges().contains(&SpecMergeRegion::new(8, 3, 8, 4)));
        assert!(grid.merges().contains(&SpecMergeRegion::new(2, 6, 2, 13)));
    }

    #[test]
    fn build_sheet_without_data_merges_keeps_repeated_labels() {
        let sheet = derive_fixture_sheet(json!({"data_children_cell_merge": false}));
        let (grid, report) = build_sheet(&sheet, 0).unwrap();

        assert_eq!(report.cnt_data_merges, 7);
        assert!(!report.if_data_merges_applied);
        assert_eq!(grid.merges().len(), 3);
        for n_row in 4..=11 {
            assert_eq!(derive_text(&grid, 1, n_row).as_deref(), Some("湖北"));
        }
    }

    #[test]
    fn build_sheet_rejects_extent_outside_worksheet() {
        let mut sheet = derive_fixture_sheet(Value::Null);
        sheet.config.start_row = usize::MAX;
        let err = build_sheet(&sheet, 3).unwrap_err();
        assert!(
            matches!(err, SheetExportError::Configuration { sheet_idx: Some(3), .. }),
            "{err}"
        );

        let mut sheet = derive_fixture_sheet(Value::Null);
        sheet.config.start_column = N_NCOLS_EXCEL_MAX - 2;
        let err = build_sheet(&sheet, 3).unwrap_err();
        assert!(
            matches!(err, SheetExportError::Write { sheet_idx: Some(3), .. }),
            "{err}"
        );

        let mut sheet = derive_fixture_sheet(Value::Null);
        sheet.config.start_row = N_NROWS_EXCEL_MAX - 10;
        let err = build_sheet(&sheet, 3).unwrap_err();
        assert!(
            matches!(err, SheetExportError::Write { sheet_idx: Some(3), .. }),
            "{err}"
        );

        // 2 header rows + 10 records end exactly on the last worksheet row.
        sheet.config.start_row = N_NROWS_EXCEL_MAX - 11;
        let (grid, _) = build_sheet(&sheet, 3).unwrap();
        assert_eq!(grid.dimension().map(|(n_row, _)| n_row), Some(N_NROWS_EXCEL_MAX));
    }

    #[test]
    fn build_sheet_handles_many_groups() {
        let n_groups = 10_000;
        let l_fields = ["a", "b", "c", "d", "e", "f"];
        let sheet = SpecSheet {
            header: l_fields
                .iter()
                .map(|field| SpecHeaderNode::leaf(*field, field.to_uppercase()))
                .collect(),
            data: (0..n_groups)
                .map(|n_group| {
                    EnumDataNode::group(
                        format!("g{n_group}"),
                        vec![
                            EnumDataNode::record([("b", n_group as i64), ("c", 1_i64)]),
                            EnumDataNode::record([("b", n_group as i64), ("c", 2_i64)]),
                        ],
                    )
                })
                .collect(),
            config: SpecSheetConfig::default(),
        };

        let (grid, report) = build_sheet(&sheet, 0).unwrap();
        assert_eq!(report.cnt_records, 2 * n_groups);
        assert_eq!(report.cnt_data_merges, n_groups);
        assert_eq!(grid.merges().len(), n_groups);

        let n_row_last = 1 + 2 * n_groups;
        assert_eq!(
            derive_text(&grid, 1, n_row_last - 1).as_deref(),
            Some(format!("g{}", n_groups - 1).as_str())
        );
        assert!(grid.is_covered(1, n_row_last));
        assert_eq!(derive_text(&grid, 3, n_row_last).as_deref(), Some("2"));
        assert_eq!(grid.derive_column_widths().len(), l_fields.len());
    }

    #[test]
    fn formatter_and_custom_hooks_apply_per_cell() {
        let mut sheet = derive_fixture_sheet(Value::Null);
        let l_userinfo = sheet.header[1].children.as_mut().unwrap();
        l_userinfo[1].config = SpecColumnConfig::default()
            .with_formatter(|value, _record, _sheet| {
                Ok(EnumCellValue::from(if *value == EnumCellValue::Number(1.0) {
                    "男"
                } else {
                    "女"
                }))
            })
            .with_custom(|sheet, value, _record, row, col| {
                let c_color = if *value == EnumCellValue::Number(1.0) {
                    "#0000FF"
                } else {
                    "#FF0000"
                };
                sheet.set_cell_format(
                    col,
                    row,
                    &SpecCellFormat {
                        font_color: Some(c_color.to_string()),
                        ..Default::default()
                    },
                )
            });

        let (grid, _) = build_sheet(&sheet, 0).unwrap();
        assert_eq!(derive_text(&grid, 5, 3).as_deref(), Some("男"));
        assert_eq!(derive_text(&grid, 5, 5).as_deref(), Some("女"));
        assert_eq!(
            grid.cell(5, 5).unwrap().format.font_color.as_deref(),
            Some("#FF0000")
        );
        assert_eq!(
            grid.cell(5, 3).unwrap().format.font_color.as_deref(),
            Some("#0000FF")
        );
    }

    #[test]
    fn failing_formatter_reports_cell_position() {
        let sheet = SpecSheet {
            header: vec![SpecHeaderNode::leaf("k", "K").with_config(
                SpecColumnConfig::default()
                    .with_formatter(|_value, _record, _sheet| Err("bad value".to_string())),
            )],
            data: vec![EnumDataNode::record([("k", "v")])],
            config: SpecSheetConfig::default(),
        };
        match build_sheet(&sheet, 4).unwrap_err() {
            SheetExportError::Callback {
                sheet_idx,
                row,
                col,
                message,
            } => {
                assert_eq!((sheet_idx, row, col), (Some(4), 2, 1));
                assert_eq!(message, "bad value");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn header_only_sheet_builds() {
        let sheet = SpecSheet {
            header: vec![SpecHeaderNode::leaf("a", "A"), SpecHeaderNode::leaf("b", "B")],
            ..Default::default()
        };
        let (grid, report) = build_sheet(&sheet, 0).unwrap();
        assert_eq!(report.cnt_records, 0);
        assert_eq!(grid.dimension(), Some((1, 2)));
    }

    #[test]
    fn exporter_isolates_failing_sheets() {
        let mut exporter = SheetExporter::new(SpecSheetExportOptions::default());
        exporter
            .add_sheet(derive_fixture_sheet(Value::Null))
            .add_sheet(SpecSheet {
                header: vec![SpecHeaderNode::leaf("k", "K")],
                data: vec![EnumDataNode::group("g", Vec::new())],
                config: SpecSheetConfig::default(),
            })
            .add_sheet(derive_fixture_sheet(Value::Null));

        let report = exporter.build();
        assert_eq!(report.sheets.len(), 2);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.errors[0].sheet_idx(), Some(1));
        assert_eq!(
            report
                .sheets
                .iter()
                .map(|sheet| (sheet.sheet_idx, sheet.sheet_name.as_str()))
                .collect::<Vec<_>>(),
            vec![(0, "Sheet"), (2, "Sheet__2")]
        );
        assert_eq!(exporter.workbook().unwrap().len(), 2);
    }

    #[test]
    fn parallel_build_matches_serial_build() {
        let l_sheets: Vec<SpecSheet> = (0..6)
            .map(|n_idx| {
                derive_fixture_sheet(json!({
                    "sheet_name": format!("s{n_idx}"),
                    "start_row": n_idx + 1
                }))
            })
            .collect();

        let mut exporter_serial = SheetExporter::new(SpecSheetExportOptions::default());
        let mut exporter_parallel = SheetExporter::new(SpecSheetExportOptions {
            num_workers_max: Some(4),
            ..Default::default()
        });
        for sheet in l_sheets {
            exporter_serial.add_sheet(sheet.clone());
            exporter_parallel.add_sheet(sheet);
        }
        exporter_serial.build();
        exporter_parallel.build();

        assert_eq!(
            exporter_serial.workbook().unwrap().sheets(),
            exporter_parallel.workbook().unwrap().sheets()
        );
        assert_eq!(
            exporter_serial.report().sheets,
            exporter_parallel.report().sheets
        );
    }

    #[test]
    fn export_requires_build_and_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = SheetExporter::new(SpecSheetExportOptions::default());
        exporter.add_sheet(derive_fixture_sheet(Value::Null));

        let err = exporter
            .export(
                dir.path(),
                EnumDatePolicy::None,
                EnumFileNamePolicy::Name("users".to_string()),
            )
            .unwrap_err();
        assert!(matches!(err, SheetExportError::Configuration { .. }));

        exporter.build();
        let spec_path = exporter
            .export(
                dir.path(),
                EnumDatePolicy::Pattern("%Y%m".to_string()),
                EnumFileNamePolicy::Name("users".to_string()),
            )
            .unwrap();
        assert_eq!(spec_path.date.len(), 6);
        assert_eq!(spec_path.file, "users");
        assert_eq!(
            spec_path.full_path,
            dir.path().join(&spec_path.date).join("users.xlsx")
        );
        assert!(spec_path.full_path.is_file());
    }

    #[test]
    fn export_xlsx_writes_header_and_data_merges() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = SheetExporter::new(SpecSheetExportOptions::default());
        exporter.add_sheet(derive_fixture_sheet(Value::Null));
        exporter.build();
        let spec_path = exporter
            .export(
                dir.path(),
                EnumDatePolicy::None,
                EnumFileNamePolicy::Name("merged".to_string()),
            )
            .unwrap();

        let file = fs::File::open(&spec_path.full_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut c_sheet_xml = String::new();
        archive
            .by_name("xl/worksheets/sheet1.xml")
            .unwrap()
            .read_to_string(&mut c_sheet_xml)
            .unwrap();
        let mut c_strings_xml = String::new();
        archive
            .by_name("xl/sharedStrings.xml")
            .unwrap()
            .read_to_string(&mut c_strings_xml)
            .unwrap();

        assert!(c_sheet_xml.contains(r#"<mergeCells count="9">"#), "{c_sheet_xml}");
        for c_ref in [
            "A1:C1", "D1:F1", "G1:G2", "A4:A11", "B4:B9", "C4:C6", "C7:C8", "B10:B11",
            "C10:C11",
        ] {
            assert!(
                c_sheet_xml.contains(&format!(r#"<mergeCell ref="{c_ref}"/>"#)),
                "missing merge {c_ref}"
            );
        }

        // Merge anchors keep their text after the merge is written.
        for c_anchor in ["A1", "A4", "B4", "C4"] {
            let n_start = c_sheet_xml
                .find(&format!(r#"<c r="{c_anchor}""#))
                .unwrap();
            let n_end = n_start + c_sheet_xml[n_start..].find("</c>").unwrap();
            assert!(
                c_sheet_xml[n_start..n_end].contains(r#"t="s""#),
                "anchor {c_anchor} lost its value"
            );
        }
        for c_text in ["地址", "湖北", "武汉市", "武昌区"] {
            assert!(c_strings_xml.contains(c_text), "missing text {c_text}");
        }
    }

    #[test]
    fn export_csv_and_reject_xls() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = SheetExporter::new(SpecSheetExportOptions::default());
        exporter.add_sheet(SpecSheet {
            header: vec![SpecHeaderNode::group(
                "g",
                "Group",
                vec![SpecHeaderNode::leaf("a", "A"), SpecHeaderNode::leaf("b", "B")],
            )],
            data: vec![EnumDataNode::group(
                "x",
                vec![
                    EnumDataNode::record([("b", 1_i64)]),
                    EnumDataNode::record([("b", 2_i64)]),
                ],
            )],
            config: SpecSheetConfig::default(),
        });
        exporter.csv().build();

        let spec_path = exporter
            .export(
                dir.path(),
                EnumDatePolicy::None,
                EnumFileNamePolicy::Name("plain".to_string()),
            )
            .unwrap();
        assert_eq!(spec_path.full_path, dir.path().join("plain.csv"));
        assert_eq!(
            fs::read_to_string(&spec_path.full_path).unwrap(),
            "Group,\nA,B\nx,1\n,2\n"
        );

        let err = exporter
            .xls()
            .export(
                dir.path(),
                EnumDatePolicy::None,
                EnumFileNamePolicy::Name("legacy".to_string()),
            )
            .unwrap_err();
        assert!(matches!(err, SheetExportError::Configuration { .. }));
    }
}
