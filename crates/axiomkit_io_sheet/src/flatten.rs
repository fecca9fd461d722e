//! Flattening of resolved header/data trees into grid coordinates.

use crate::spec::{
    EnumDataNode, SheetExportError, SpecDataSpan, SpecFlatColumn, SpecFlatData, SpecHeaderCell,
    SpecHeaderSpan, SpecMergeRegion, TypeFlatRecord, TypeHeaderLayout,
};

////////////////////////////////////////////////////////////////////////////////
// #region HeaderFlattening

/// Extract leaf columns in depth-first, left-to-right order.
///
/// This order is authoritative for data columns.
pub fn flatten_header_columns(spans: &[SpecHeaderSpan<'_>]) -> Vec<SpecFlatColumn> {
    let mut l_columns = Vec::new();
    collect_header_columns(spans, &mut l_columns);
    l_columns
}

fn collect_header_columns(spans: &[SpecHeaderSpan<'_>], l_columns: &mut Vec<SpecFlatColumn>) {
    for span in spans {
        if span.children.is_empty() {
            l_columns.push(SpecFlatColumn {
                field: span.node.field.clone().unwrap_or_default(),
                name: span.node.name.clone(),
                config: span.node.config.clone(),
                col_span: span.col_span,
                row_span: span.row_span,
                depth: span.depth,
            });
        } else {
            collect_header_columns(&span.children, l_columns);
        }
    }
}

/// Place every header node (groups and leaves) at its header row.
///
/// Rows are zero-based; `col_idx` is the zero-based column offset inside the header block.
pub fn flatten_header_layout(spans: &[SpecHeaderSpan<'_>]) -> TypeHeaderLayout {
    let mut dict_layout = TypeHeaderLayout::new();
    collect_header_layout(spans, 0, 0, &mut dict_layout);
    dict_layout
}

fn collect_header_layout(
    spans: &[SpecHeaderSpan<'_>],
    n_row: usize,
    n_col_offset: usize,
    dict_layout: &mut TypeHeaderLayout,
) {
    let mut n_col_idx = n_col_offset;
    for span in spans {
        dict_layout.entry(n_row).or_default().push(SpecHeaderCell {
            field: span.node.field.clone(),
            name: span.node.name.clone(),
            config: span.node.config.clone(),
            col_idx: n_col_idx,
            col_span: span.col_span,
            row_span: span.row_span,
        });
        if !span.children.is_empty() {
            collect_header_layout(&span.children, n_row + 1, n_col_idx, dict_layout);
        }
        n_col_idx += span.col_span;
    }
}

/// Plan one merge region per header cell spanning more than one cell.
///
/// `row_start`/`col_start` are the 1-based grid coordinates of the header block.
pub fn plan_header_merges(
    layout: &TypeHeaderLayout,
    row_start: usize,
    col_start: usize,
) -> Vec<SpecMergeRegion> {
    layout
        .iter()
        .flat_map(|(n_row, l_cells)| {
            l_cells
                .iter()
                .filter(|cell| cell.col_span > 1 || cell.row_span > 1)
                .map(move |cell| {
                    let n_col = col_start + cell.col_idx;
                    let n_row_abs = row_start + n_row;
                    SpecMergeRegion::new(
                        n_col,
                        n_row_abs,
                        n_col + cell.col_span - 1,
                        n_row_abs + cell.row_span - 1,
                    )
                })
        })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DataFlattening

/// Flatten a resolved data forest into records and grouping-column merges.
///
/// `row_start`/`col_start` are the 1-based grid coordinates of the first data cell.
/// A group at depth `d` labels the column `columns[d]` and merges it vertically over
/// its `merge_span` rows.
pub fn flatten_data(
    spans: &[SpecDataSpan<'_>],
    columns: &[SpecFlatColumn],
    row_start: usize,
    col_start: usize,
) -> Result<SpecFlatData, SheetExportError> {
    let mut flat_data = SpecFlatData::default();
    let mut n_cursor = row_start;
    let dict_context = TypeFlatRecord::new();
    for span in spans {
        flatten_data_node(
            span,
            columns,
            col_start,
            0,
            &dict_context,
            &mut n_cursor,
            &mut flat_data,
        )?;
    }
    Ok(flat_data)
}

fn flatten_data_node(
    span: &SpecDataSpan<'_>,
    columns: &[SpecFlatColumn],
    col_start: usize,
    n_depth: usize,
    dict_context: &TypeFlatRecord,
    n_cursor: &mut usize,
    flat_data: &mut SpecFlatData,
) -> Result<(), SheetExportError> {
    match span.node {
        EnumDataNode::Record(dict_fields) => {
            let mut dict_record = dict_context.clone();
            dict_record.extend(
                dict_fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone())),
            );
            flat_data.records.push(dict_record);
            *n_cursor += 1;
        }
        EnumDataNode::Group { label, .. } => {
            let n_col = col_start + n_depth;
            let Some(column) = columns.get(n_depth) else {
                return Err(SheetExportError::structural(
                    format!("row={} col={}", *n_cursor, n_col),
                    format!(
                        "data group nesting depth {} exceeds {} leaf column(s)",
                        n_depth + 1,
                        columns.len()
                    ),
                ));
            };

            let n_row_begin = *n_cursor;
            flat_data.merges.push(SpecMergeRegion::new(
                n_col,
                n_row_begin,
                n_col,
                n_row_begin + span.merge_span - 1,
            ));

            let mut dict_child_context = dict_context.clone();
            dict_child_context.insert(column.field.clone(), label.clone());

            let mut n_child_cursor = n_row_begin;
            for child in &span.children {
                flatten_data_node(
                    child,
                    columns,
                    col_start,
                    n_depth + 1,
                    &dict_child_context,
                    &mut n_child_cursor,
                    flat_data,
                )?;
            }
            debug_assert_eq!(n_child_cursor, n_row_begin + span.merge_span);
            *n_cursor = n_row_begin + span.merge_span;
        }
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
