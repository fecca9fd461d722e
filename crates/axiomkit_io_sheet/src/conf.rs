//! Sheet export constants and default preset factories.

use crate::spec::{
    EnumAlignHorizontal, EnumAlignVertical, EnumColumnWidth, SpecCellFormat, SpecSheetConfig,
    SpecSheetExportOptions,
};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Default sheet title.
pub const C_SHEET_NAME_DEFAULT: &str = "Sheet";
/// Default key holding the child list of a data group.
pub const C_DATA_CHILDREN_KEY_DEFAULT: &str = "children";
/// Default key holding the label of a data group.
pub const C_DATA_CHILDREN_TEXT_KEY_DEFAULT: &str = "name";
/// Sentinel accepted by `default_column_width` and `config.width`.
pub const C_COLUMN_WIDTH_AUTO: &str = "auto";
/// Default header font size in points.
pub const N_HEADER_FONT_SIZE_DEFAULT: i64 = 16;
/// Default row height in points.
pub const N_ROW_HEIGHT_DEFAULT: f64 = 25.0;
/// Date segment pattern used by [`crate::spec::EnumDatePolicy::Today`].
pub const C_DATE_PATTERN_DEFAULT: &str = "%Y%m%d";

/// Lower bound of an auto-sized column width.
pub const N_WIDTH_AUTO_MIN: usize = 8;
/// Upper bound of an auto-sized column width.
pub const N_WIDTH_AUTO_MAX: usize = 60;
/// Padding added to the widest estimated cell text.
pub const N_WIDTH_AUTO_PADDING: usize = 2;

/// Build default per-sheet configuration.
pub fn derive_default_sheet_config() -> SpecSheetConfig {
    SpecSheetConfig {
        sheet_name: C_SHEET_NAME_DEFAULT.to_string(),
        data_children_key: C_DATA_CHILDREN_KEY_DEFAULT.to_string(),
        data_children_text_key: C_DATA_CHILDREN_TEXT_KEY_DEFAULT.to_string(),
        if_data_children_cell_merge: true,
        start_row: 1,
        start_column: 1,
        alignment_horizontal: EnumAlignHorizontal::Center,
        alignment_vertical: EnumAlignVertical::Center,
        header_font_size: N_HEADER_FONT_SIZE_DEFAULT,
        if_header_font_bold: false,
        default_column_width: EnumColumnWidth::Auto,
        default_row_height: N_ROW_HEIGHT_DEFAULT,
    }
}

/// Build default export-wide options.
pub fn derive_default_export_options() -> SpecSheetExportOptions {
    SpecSheetExportOptions::default()
}

/// Build the header cell format for one sheet configuration.
pub fn derive_header_format(config: &SpecSheetConfig) -> SpecCellFormat {
    SpecCellFormat {
        font_size: Some(config.header_font_size),
        bold: Some(config.if_header_font_bold),
        ..Default::default()
    }
}

/// Build the sheet-wide default cell format (alignment) for one sheet configuration.
pub fn derive_default_format(config: &SpecSheetConfig) -> SpecCellFormat {
    SpecCellFormat {
        align: Some(config.alignment_horizontal.as_format_str().to_string()),
        valign: Some(config.alignment_vertical.as_format_str().to_string()),
        ..Default::default()
    }
}
