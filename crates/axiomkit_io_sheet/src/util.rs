//! Stateless helper utilities used by the sheet export kernel.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::conf::{
    C_DATE_PATTERN_DEFAULT, C_SHEET_NAME_DEFAULT, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX,
    N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
use crate::spec::{
    EnumAlignHorizontal, EnumAlignVertical, EnumCellValue, EnumColumnWidth, EnumDataNode,
    EnumDatePolicy, EnumFileNamePolicy, EnumSheetFileType, SheetExportError, SpecColumnConfig,
    SpecExportPath, SpecHeaderNode, SpecSheet, SpecSheetConfig, TypeFlatRecord,
};

////////////////////////////////////////////////////////////////////////////////
// #region SheetNaming

/// Replace Excel-illegal characters, trim, and cap to the sheet-name length limit.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    let c_name = c_name.trim().trim_matches('\'');
    if c_name.is_empty() {
        return C_SHEET_NAME_DEFAULT.to_string();
    }
    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Sanitize `name` and de-duplicate it against `set_names_existing` (`name__2`, `name__3`, ...).
///
/// The returned name is recorded in `set_names_existing`.
pub fn derive_unique_sheet_name(name: &str, set_names_existing: &mut BTreeSet<String>) -> String {
    let c_name = sanitize_sheet_name(name, "_");
    if set_names_existing.insert(c_name.clone()) {
        return c_name;
    }

    let base_name: String = c_name
        .chars()
        .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 3))
        .collect();
    let mut n_idx = 2usize;
    loop {
        let candidate: String = format!("{base_name}__{n_idx}")
            .chars()
            .take(N_LEN_EXCEL_SHEET_NAME_MAX)
            .collect();
        if set_names_existing.insert(candidate.clone()) {
            return candidate;
        }
        n_idx += 1;
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridCoordinates

/// Check a 1-based `(col, row)` against Excel worksheet limits.
pub fn validate_cell_coordinate(col: usize, row: usize) -> Result<(), String> {
    if !(1..=N_NCOLS_EXCEL_MAX).contains(&col) {
        return Err(format!(
            "column {col} is outside the worksheet range 1..={N_NCOLS_EXCEL_MAX}"
        ));
    }
    if !(1..=N_NROWS_EXCEL_MAX).contains(&row) {
        return Err(format!(
            "row {row} is outside the worksheet range 1..={N_NROWS_EXCEL_MAX}"
        ));
    }
    Ok(())
}

/// Cast a zero-based row index to the xlsx backend row type.
pub fn cast_row_num(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("row index overflow: {value}"))
}

/// Cast a zero-based column index to the xlsx backend column type.
pub fn cast_col_num(value: usize) -> Result<u16, String> {
    u16::try_from(value).map_err(|_| format!("column index overflow: {value}"))
}

/// Estimate display width: ASCII counts 1, other characters about 1.6.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

/// Clamp requested worker count to `[1, available_parallelism]`; default `min(cpu, 8)`.
pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region JsonInput

/// Convert one JSON scalar to a cell value.
pub fn parse_cell_value(value: &Value, c_path: &str) -> Result<EnumCellValue, SheetExportError> {
    match value {
        Value::Null => Ok(EnumCellValue::None),
        Value::Bool(val) => Ok(EnumCellValue::Boolean(*val)),
        Value::Number(val) => val.as_f64().map(EnumCellValue::Number).ok_or_else(|| {
            SheetExportError::structural(c_path, format!("number {val} is not representable"))
        }),
        Value::String(val) => Ok(EnumCellValue::String(val.clone())),
        Value::Array(_) | Value::Object(_) => Err(SheetExportError::structural(
            c_path,
            "record values must be scalars (null, bool, number, string)",
        )),
    }
}

fn parse_column_width(value: &Value, c_key: &str) -> Result<EnumColumnWidth, SheetExportError> {
    match value {
        Value::Number(val) => match val.as_f64() {
            Some(n_width) if n_width.is_finite() && n_width > 0.0 => {
                Ok(EnumColumnWidth::Fixed(n_width))
            }
            _ => Err(SheetExportError::configuration(format!(
                "{c_key} must be a positive number or \"auto\"; got {val}"
            ))),
        },
        Value::String(val) => val
            .parse::<EnumColumnWidth>()
            .map_err(|err| SheetExportError::configuration(format!("{c_key}: {err}"))),
        other => Err(SheetExportError::configuration(format!(
            "{c_key} must be a positive number or \"auto\"; got {other}"
        ))),
    }
}

fn parse_optional_text(
    dict_node: &Map<String, Value>,
    c_key: &str,
    c_path: &str,
) -> Result<Option<String>, SheetExportError> {
    match dict_node.get(c_key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(val)) => Ok(Some(val.clone())),
        Some(Value::Number(val)) => Ok(Some(val.to_string())),
        Some(other) => Err(SheetExportError::structural(
            c_path,
            format!("`{c_key}` must be a string; got {other}"),
        )),
    }
}

/// Parse a header forest from a JSON array of `{field?, name?, children?, config?}` objects.
pub fn parse_header_forest(value: &Value) -> Result<Vec<SpecHeaderNode>, SheetExportError> {
    parse_header_siblings(value, "header")
}

fn parse_header_siblings(
    value: &Value,
    c_path: &str,
) -> Result<Vec<SpecHeaderNode>, SheetExportError> {
    let Value::Array(l_values) = value else {
        return Err(SheetExportError::structural(
            c_path,
            "header list must be an array",
        ));
    };
    l_values
        .iter()
        .enumerate()
        .map(|(n_idx, node)| parse_header_node(node, &format!("{c_path}[{n_idx}]")))
        .collect()
}

fn parse_header_node(value: &Value, c_path: &str) -> Result<SpecHeaderNode, SheetExportError> {
    let Value::Object(dict_node) = value else {
        return Err(SheetExportError::structural(
            c_path,
            "header node must be an object",
        ));
    };

    let field = parse_optional_text(dict_node, "field", c_path)?;
    let name = parse_optional_text(dict_node, "name", c_path)?
        .or_else(|| field.clone())
        .unwrap_or_default();
    let children = match dict_node.get("children") {
        None | Some(Value::Null) => None,
        Some(val) => Some(parse_header_siblings(val, &format!("{c_path}.children"))?),
    };

    let mut config = SpecColumnConfig::default();
    match dict_node.get("config") {
        None | Some(Value::Null) => {}
        Some(Value::Object(dict_config)) => {
            for (key, val) in dict_config {
                match key.as_str() {
                    "width" => {
                        let width = parse_column_width(val, &format!("{c_path}.config.width"))?;
                        config = config.with_width(width);
                    }
                    _ => debug!(path = c_path, key = key.as_str(), "ignored header config key"),
                }
            }
        }
        Some(other) => {
            return Err(SheetExportError::structural(
                c_path,
                format!("`config` must be an object; got {other}"),
            ));
        }
    }

    Ok(SpecHeaderNode {
        field,
        name,
        children,
        config,
    })
}

/// Parse a data forest from a JSON array.
///
/// An object whose `children_key` holds an array is a group labelled by `text_key`;
/// any other object is a record of all its keys except `children_key`.
pub fn parse_data_forest(
    value: &Value,
    children_key: &str,
    text_key: &str,
) -> Result<Vec<EnumDataNode>, SheetExportError> {
    parse_data_siblings(value, children_key, text_key, "data")
}

fn parse_data_siblings(
    value: &Value,
    children_key: &str,
    text_key: &str,
    c_path: &str,
) -> Result<Vec<EnumDataNode>, SheetExportError> {
    let Value::Array(l_values) = value else {
        return Err(SheetExportError::structural(
            c_path,
            "data list must be an array",
        ));
    };
    l_values
        .iter()
        .enumerate()
        .map(|(n_idx, node)| {
            parse_data_node(node, children_key, text_key, &format!("{c_path}[{n_idx}]"))
        })
        .collect()
}

fn parse_data_node(
    value: &Value,
    children_key: &str,
    text_key: &str,
    c_path: &str,
) -> Result<EnumDataNode, SheetExportError> {
    let Value::Object(dict_node) = value else {
        return Err(SheetExportError::structural(
            c_path,
            "data node must be an object",
        ));
    };

    match dict_node.get(children_key) {
        Some(val @ Value::Array(_)) => {
            let label = match dict_node.get(text_key) {
                Some(val_label) => parse_cell_value(val_label, &format!("{c_path}.{text_key}"))?,
                None => EnumCellValue::None,
            };
            let children = parse_data_siblings(
                val,
                children_key,
                text_key,
                &format!("{c_path}.{children_key}"),
            )?;
            Ok(EnumDataNode::Group { label, children })
        }
        None | Some(Value::Null) => {
            let mut dict_record = TypeFlatRecord::new();
            for (key, val) in dict_node.iter().filter(|(key, _)| *key != children_key) {
                dict_record.insert(key.clone(), parse_cell_value(val, &format!("{c_path}.{key}"))?);
            }
            Ok(EnumDataNode::Record(dict_record))
        }
        Some(other) => Err(SheetExportError::structural(
            c_path,
            format!("`{children_key}` must be an array; got {other}"),
        )),
    }
}

fn parse_config_bool(value: &Value, c_key: &str) -> Result<bool, SheetExportError> {
    value
        .as_bool()
        .ok_or_else(|| SheetExportError::configuration(format!("{c_key} must be a bool; got {value}")))
}

fn parse_config_text(value: &Value, c_key: &str) -> Result<String, SheetExportError> {
    match value.as_str() {
        Some(val) if !val.trim().is_empty() => Ok(val.to_string()),
        _ => Err(SheetExportError::configuration(format!(
            "{c_key} must be a non-empty string; got {value}"
        ))),
    }
}

fn parse_config_index(
    value: &Value,
    c_key: &str,
    n_max: usize,
) -> Result<usize, SheetExportError> {
    match value.as_u64() {
        Some(n_val) if n_val >= 1 => match usize::try_from(n_val) {
            Ok(n_idx) if n_idx <= n_max => Ok(n_idx),
            _ => Err(SheetExportError::configuration(format!(
                "{c_key} must be <= {n_max}; got {n_val}"
            ))),
        },
        _ => Err(SheetExportError::configuration(format!(
            "{c_key} must be an integer >= 1; got {value}"
        ))),
    }
}

fn parse_config_positive(value: &Value, c_key: &str) -> Result<f64, SheetExportError> {
    match value.as_f64() {
        Some(n_val) if n_val.is_finite() && n_val > 0.0 => Ok(n_val),
        _ => Err(SheetExportError::configuration(format!(
            "{c_key} must be a positive number; got {value}"
        ))),
    }
}

/// Overlay a JSON config object onto the default sheet configuration.
///
/// `null` yields the defaults; unknown keys are ignored.
pub fn parse_sheet_config(value: &Value) -> Result<SpecSheetConfig, SheetExportError> {
    let mut config = SpecSheetConfig::default();
    let dict_config = match value {
        Value::Null => return Ok(config),
        Value::Object(dict_config) => dict_config,
        other => {
            return Err(SheetExportError::configuration(format!(
                "sheet config must be an object; got {other}"
            )));
        }
    };

    for (key, val) in dict_config {
        let c_key = key.as_str();
        match c_key {
            "sheet_name" => config.sheet_name = parse_config_text(val, c_key)?,
            "data_children_key" => config.data_children_key = parse_config_text(val, c_key)?,
            "data_children_text_key" => {
                config.data_children_text_key = parse_config_text(val, c_key)?
            }
            "data_children_cell_merge" => {
                config.if_data_children_cell_merge = parse_config_bool(val, c_key)?
            }
            "start_row" => {
                config.start_row = parse_config_index(val, c_key, N_NROWS_EXCEL_MAX)?
            }
            "start_column" => {
                config.start_column = parse_config_index(val, c_key, N_NCOLS_EXCEL_MAX)?
            }
            "alignment_horizontal" => {
                config.alignment_horizontal = parse_config_text(val, c_key)?
                    .parse::<EnumAlignHorizontal>()
                    .map_err(SheetExportError::configuration)?
            }
            "alignment_vertical" => {
                config.alignment_vertical = parse_config_text(val, c_key)?
                    .parse::<EnumAlignVertical>()
                    .map_err(SheetExportError::configuration)?
            }
            "header_font_size" => {
                config.header_font_size = parse_config_positive(val, c_key)?.round() as i64
            }
            "header_font_bold" => config.if_header_font_bold = parse_config_bool(val, c_key)?,
            "default_column_width" => {
                config.default_column_width = parse_column_width(val, c_key)?
            }
            "default_row_height" => config.default_row_height = parse_config_positive(val, c_key)?,
            _ => debug!(key = c_key, "ignored sheet config key"),
        }
    }
    Ok(config)
}

/// Parse one `{header, data, config?}` sheet object.
///
/// The data tree is parsed with the structural keys of the sheet's own config.
pub fn parse_sheet(value: &Value) -> Result<SpecSheet, SheetExportError> {
    let Value::Object(dict_sheet) = value else {
        return Err(SheetExportError::structural(
            "sheet",
            "sheet must be an object with `header` and `data`",
        ));
    };

    let config = parse_sheet_config(dict_sheet.get("config").unwrap_or(&Value::Null))?;
    let header = match dict_sheet.get("header") {
        Some(val) => parse_header_forest(val)?,
        None => {
            return Err(SheetExportError::structural(
                "sheet",
                "sheet is missing its `header` list",
            ));
        }
    };
    let data = match dict_sheet.get("data") {
        None | Some(Value::Null) => Vec::new(),
        Some(val) => parse_data_forest(
            val,
            &config.data_children_key,
            &config.data_children_text_key,
        )?,
    };

    Ok(SpecSheet {
        header,
        data,
        config,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportPath

fn derive_policy_callback_error(message: String) -> SheetExportError {
    SheetExportError::Callback {
        sheet_idx: None,
        row: 0,
        col: 0,
        message,
    }
}

/// Render the date directory segment for one export.
pub fn derive_date_segment(policy: &EnumDatePolicy) -> Result<String, SheetExportError> {
    let c_date = match policy {
        EnumDatePolicy::None => String::new(),
        EnumDatePolicy::Today => Local::now().format(C_DATE_PATTERN_DEFAULT).to_string(),
        EnumDatePolicy::Pattern(pattern) => {
            let l_items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
            if l_items.iter().any(|item| matches!(item, Item::Error)) {
                return Err(SheetExportError::configuration(format!(
                    "invalid date pattern {pattern:?}"
                )));
            }
            Local::now().format_with_items(l_items.iter()).to_string()
        }
        EnumDatePolicy::Custom(provider) => provider().map_err(derive_policy_callback_error)?,
    };
    Ok(c_date.trim_end_matches(['/', '\\']).to_string())
}

/// Render the file stem for one export.
pub fn derive_file_name(policy: &EnumFileNamePolicy) -> Result<String, SheetExportError> {
    let c_file = match policy {
        EnumFileNamePolicy::Timestamp => Utc::now().timestamp_micros().to_string(),
        EnumFileNamePolicy::Name(name) => name.clone(),
        EnumFileNamePolicy::Custom(provider) => provider().map_err(derive_policy_callback_error)?,
    };
    let c_file = c_file.trim_matches(['/', '\\']).to_string();
    if c_file.is_empty() {
        return Err(SheetExportError::configuration("file name must not be empty"));
    }
    Ok(c_file)
}

/// Compose `root/date/file.ext`; an empty date segment is omitted.
pub fn derive_export_path(
    root: &Path,
    date: String,
    file: String,
    file_type: EnumSheetFileType,
) -> SpecExportPath {
    let mut full_path = root.to_path_buf();
    if !date.is_empty() {
        full_path.push(&date);
    }
    full_path.push(format!("{file}.{}", file_type.extension()));
    SpecExportPath {
        root: root.to_path_buf(),
        date,
        file,
        file_type,
        full_path,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
