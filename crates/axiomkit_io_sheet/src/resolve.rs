//! Span/depth resolution over header and data trees.
//!
//! Resolution never mutates the caller's trees; it returns borrowed span trees instead.

use crate::spec::{EnumDataNode, SheetExportError, SpecDataSpan, SpecHeaderNode, SpecHeaderSpan};

////////////////////////////////////////////////////////////////////////////////
// #region HeaderResolution

/// Resolve column span, row span and depth for every node of a header forest.
///
/// Leaves inherit `row_span = max(depth)` of their sibling list, so a leaf
/// next to a two-level group covers both header rows.
pub fn resolve_header_forest(
    nodes: &[SpecHeaderNode],
) -> Result<Vec<SpecHeaderSpan<'_>>, SheetExportError> {
    if nodes.is_empty() {
        return Err(SheetExportError::structural(
            "header",
            "header tree must contain at least one column",
        ));
    }
    resolve_header_siblings(nodes, "header")
}

fn resolve_header_siblings<'a>(
    nodes: &'a [SpecHeaderNode],
    c_path: &str,
) -> Result<Vec<SpecHeaderSpan<'a>>, SheetExportError> {
    let mut l_spans = Vec::with_capacity(nodes.len());
    for (n_idx, node) in nodes.iter().enumerate() {
        let c_node_path = format!("{c_path}[{n_idx}]");
        l_spans.push(resolve_header_node(node, &c_node_path)?);
    }

    let n_depth_max = l_spans.iter().map(|span| span.depth).max().unwrap_or(1);
    for span in l_spans.iter_mut().filter(|span| span.children.is_empty()) {
        span.row_span = n_depth_max;
    }
    Ok(l_spans)
}

fn resolve_header_node<'a>(
    node: &'a SpecHeaderNode,
    c_path: &str,
) -> Result<SpecHeaderSpan<'a>, SheetExportError> {
    match &node.children {
        None => {
            let if_field_ok = node
                .field
                .as_deref()
                .is_some_and(|field| !field.trim().is_empty());
            if !if_field_ok {
                return Err(SheetExportError::structural(
                    c_path,
                    "leaf header is missing its field key",
                ));
            }
            Ok(SpecHeaderSpan {
                node,
                col_span: 1,
                row_span: 1,
                depth: 1,
                children: Vec::new(),
            })
        }
        Some(l_children) if l_children.is_empty() => Err(SheetExportError::structural(
            c_path,
            "header group has an empty children list",
        )),
        Some(l_children) => {
            let l_child_spans = resolve_header_siblings(l_children, &format!("{c_path}.children"))?;
            let n_col_span = l_child_spans.iter().map(|span| span.col_span).sum();
            let n_depth = l_child_spans
                .iter()
                .map(|span| span.depth)
                .max()
                .unwrap_or(0)
                + 1;
            Ok(SpecHeaderSpan {
                node,
                col_span: n_col_span,
                row_span: 1,
                depth: n_depth,
                children: l_child_spans,
            })
        }
    }
}

/// Number of header rows: maximum depth over the top-level nodes.
pub fn calculate_header_height(spans: &[SpecHeaderSpan<'_>]) -> usize {
    spans.iter().map(|span| span.depth).max().unwrap_or(0)
}

/// Number of leaf columns: sum of top-level column spans.
pub fn calculate_header_width(spans: &[SpecHeaderSpan<'_>]) -> usize {
    spans.iter().map(|span| span.col_span).sum()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DataResolution

/// Resolve the vertical merge span (record-leaf count) for every node of a data forest.
///
/// An empty forest is valid and yields no spans.
pub fn resolve_data_forest(
    nodes: &[EnumDataNode],
) -> Result<Vec<SpecDataSpan<'_>>, SheetExportError> {
    resolve_data_siblings(nodes, "data")
}

fn resolve_data_siblings<'a>(
    nodes: &'a [EnumDataNode],
    c_path: &str,
) -> Result<Vec<SpecDataSpan<'a>>, SheetExportError> {
    nodes
        .iter()
        .enumerate()
        .map(|(n_idx, node)| resolve_data_node(node, &format!("{c_path}[{n_idx}]")))
        .collect()
}

fn resolve_data_node<'a>(
    node: &'a EnumDataNode,
    c_path: &str,
) -> Result<SpecDataSpan<'a>, SheetExportError> {
    match node {
        EnumDataNode::Record(_) => Ok(SpecDataSpan {
            node,
            merge_span: 1,
            children: Vec::new(),
        }),
        EnumDataNode::Group { children, .. } => {
            if children.is_empty() {
                return Err(SheetExportError::structural(
                    c_path,
                    "data group has an empty children list",
                ));
            }
            let l_child_spans = resolve_data_siblings(children, &format!("{c_path}.children"))?;
            Ok(SpecDataSpan {
                node,
                merge_span: l_child_spans.iter().map(|span| span.merge_span).sum(),
                children: l_child_spans,
            })
        }
    }
}

/// Number of record leaves in a resolved data forest.
pub fn calculate_record_count(spans: &[SpecDataSpan<'_>]) -> usize {
    spans.iter().map(|span| span.merge_span).sum()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn derive_address_header() -> Vec<SpecHeaderNode> {
        vec![
            SpecHeaderNode::group(
                "address",
                "地址",
                vec![
                    SpecHeaderNode::leaf("province", "省"),
                    SpecHeaderNode::leaf("city", "市"),
                    SpecHeaderNode::leaf("district", "区"),
                ],
            ),
            SpecHeaderNode::group(
                "userinfo",
                "用户信息",
                vec![
                    SpecHeaderNode::leaf("name", "姓名"),
                    SpecHeaderNode::leaf("sex", "性别"),
                    SpecHeaderNode::leaf("birthday", "生日"),
                ],
            ),
            SpecHeaderNode::leaf("created_at", "创建时间"),
        ]
    }

    fn summarize(span: &SpecHeaderSpan<'_>) -> (usize, usize, usize) {
        (span.col_span, span.row_span, span.depth)
    }

    #[test]
    fn test_resolve_header_grouped_scenario() {
        let l_header = derive_address_header();
        let l_spans = resolve_header_forest(&l_header).unwrap();

        assert_eq!(l_spans.len(), 3);
        assert_eq!(summarize(&l_spans[0]), (3, 1, 2));
        assert_eq!(summarize(&l_spans[1]), (3, 1, 2));
        assert_eq!(summarize(&l_spans[2]), (1, 2, 1));
        assert_eq!(calculate_header_width(&l_spans), 7);
        assert_eq!(calculate_header_height(&l_spans), 2);

        for span in &l_spans[0].children {
            assert_eq!(summarize(span), (1, 1, 1));
        }
    }

    #[test]
    fn test_resolve_header_all_leaves_get_single_row() {
        let l_header = vec![
            SpecHeaderNode::leaf("a", "A"),
            SpecHeaderNode::leaf("b", "B"),
        ];
        let l_spans = resolve_header_forest(&l_header).unwrap();

        assert!(l_spans.iter().all(|span| summarize(span) == (1, 1, 1)));
        assert_eq!(calculate_header_height(&l_spans), 1);
    }

    #[test]
    fn test_resolve_header_mixed_depth_siblings() {
        let l_header = vec![SpecHeaderNode::group(
            "root",
            "Root",
            vec![
                SpecHeaderNode::group(
                    "deep",
                    "Deep",
                    vec![SpecHeaderNode::group(
                        "deeper",
                        "Deeper",
                        vec![SpecHeaderNode::leaf("x", "X")],
                    )],
                ),
                SpecHeaderNode::leaf("y", "Y"),
            ],
        )];
        let l_spans = resolve_header_forest(&l_header).unwrap();

        assert_eq!(summarize(&l_spans[0]), (2, 1, 4));
        assert_eq!(summarize(&l_spans[0].children[0]), (1, 1, 3));
        assert_eq!(summarize(&l_spans[0].children[1]), (1, 3, 1));
        assert_eq!(l_spans[0].children[0].children[0].children[0].row_span, 1);
    }

    #[test]
    fn test_resolve_header_is_idempotent() {
        let l_header = derive_address_header();
        let l_first = resolve_header_forest(&l_header).unwrap();
        let l_second = resolve_header_forest(&l_header).unwrap();
        assert_eq!(l_first, l_second);
    }

    #[test]
    fn test_resolve_header_rejects_malformed_nodes() {
        let err_empty = resolve_header_forest(&[]).unwrap_err();
        assert!(matches!(err_empty, SheetExportError::Structural { .. }));

        let l_empty_group = vec![
            SpecHeaderNode::leaf("a", "A"),
            SpecHeaderNode::group("g", "G", Vec::new()),
        ];
        match resolve_header_forest(&l_empty_group).unwrap_err() {
            SheetExportError::Structural { location, .. } => assert_eq!(location, "header[1]"),
            other => panic!("unexpected error: {other}"),
        }

        let mut node_no_field = SpecHeaderNode::leaf("", "Nameless");
        node_no_field.field = None;
        let l_missing_field = vec![SpecHeaderNode::group("g", "G", vec![
            SpecHeaderNode::leaf("a", "A"),
            node_no_field,
        ])];
        match resolve_header_forest(&l_missing_field).unwrap_err() {
            SheetExportError::Structural { location, .. } => {
                assert_eq!(location, "header[0].children[1]")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_data_merge_spans() {
        let l_data = vec![
            EnumDataNode::record([("name", "solo")]),
            EnumDataNode::group(
                "湖北",
                vec![
                    EnumDataNode::group(
                        "武汉市",
                        vec![
                            EnumDataNode::record([("name", "a")]),
                            EnumDataNode::record([("name", "b")]),
                        ],
                    ),
                    EnumDataNode::group("咸宁市", vec![EnumDataNode::record([("name", "c")])]),
                ],
            ),
        ];
        let l_spans = resolve_data_forest(&l_data).unwrap();

        assert_eq!(l_spans[0].merge_span, 1);
        assert_eq!(l_spans[1].merge_span, 3);
        assert_eq!(l_spans[1].children[0].merge_span, 2);
        assert_eq!(l_spans[1].children[1].merge_span, 1);
        assert_eq!(calculate_record_count(&l_spans), 4);
    }

    #[test]
    fn test_resolve_data_empty_forest_and_empty_group() {
        assert!(resolve_data_forest(&[]).unwrap().is_empty());

        let l_data = vec![EnumDataNode::group(
            "湖北",
            vec![EnumDataNode::group("武汉市", Vec::new())],
        )];
        match resolve_data_forest(&l_data).unwrap_err() {
            SheetExportError::Structural { location, .. } => {
                assert_eq!(location, "data[0].children[0]")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
