//! Query responses and result post-processing.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value as Json;

use crate::request::SortDirection;

/// A finished query result, ready for encoding.
#[derive(Debug, Default)]
pub struct Response {
    /// Wire status code, 200 on success.
    pub code: u16,
    /// Result rows; one JSON cell per projected column.
    pub result: Vec<Vec<Json>>,
    /// Per-backend error messages for peers that could not contribute.
    pub failed: HashMap<String, String>,
    /// Output column names, for `ColumnHeaders` and wrapped_json metadata.
    pub columns: Vec<String>,
    /// Row count before offset and limit were applied.
    pub total: usize,
}

impl Response {
    /// An empty OK response.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: 200,
            ..Self::default()
        }
    }
}

/// One resolved sort key: position within the internal projection plus
/// direction; `args` carries the variable name for custom-variable sorts.
#[derive(Debug, Clone)]
pub struct SortKey {
    /// Cell position within the internal projection.
    pub pos: usize,
    /// Sort direction.
    pub direction: SortDirection,
    /// Custom-variable name, uppercase, empty otherwise.
    pub args: String,
}

/// Sorts, slices and strips a result set: multi-key stable sort, then
/// offset/limit, then truncation of the appended sort-only cells. Returns
/// the rows and the pre-limit total.
#[must_use]
pub fn post_process(
    mut rows: Vec<Vec<Json>>,
    sort: &[SortKey],
    requested: usize,
    limit: Option<usize>,
    offset: usize,
) -> (Vec<Vec<Json>>, usize) {
    if !sort.is_empty() {
        rows.sort_by(|a, b| {
            for key in sort {
                let ordering = compare_cells(
                    a.get(key.pos).unwrap_or(&Json::Null),
                    b.get(key.pos).unwrap_or(&Json::Null),
                    &key.args,
                );
                let ordering = match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let total = rows.len();
    let mut rows: Vec<Vec<Json>> = rows
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    for row in &mut rows {
        row.truncate(requested);
    }
    (rows, total)
}

/// Compares two result cells: numbers numerically, everything else by its
/// string rendering. Custom-variable sorts extract the tagged entry first.
fn compare_cells(a: &Json, b: &Json, args: &str) -> Ordering {
    if !args.is_empty() {
        let a = custom_var_entry(a, args);
        let b = custom_var_entry(b, args);
        return a.cmp(&b);
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => cell_string(a).cmp(&cell_string(b)),
    }
}

fn custom_var_entry(cell: &Json, tag: &str) -> String {
    cell.get(tag)
        .and_then(Json::as_str)
        .unwrap_or("")
        .to_string()
}

fn cell_string(cell: &Json) -> String {
    match cell {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Vec<Json>> {
        vec![
            vec![json!("b"), json!(2.0)],
            vec![json!("a"), json!(3.0)],
            vec![json!("c"), json!(1.0)],
        ]
    }

    #[test]
    fn test_sort_by_number() {
        let sort = vec![SortKey {
            pos: 1,
            direction: SortDirection::Asc,
            args: String::new(),
        }];
        let (sorted, total) = post_process(rows(), &sort, 2, None, 0);
        assert_eq!(total, 3);
        assert_eq!(sorted[0][0], json!("c"));
        assert_eq!(sorted[2][0], json!("a"));
    }

    #[test]
    fn test_sort_desc_by_string() {
        let sort = vec![SortKey {
            pos: 0,
            direction: SortDirection::Desc,
            args: String::new(),
        }];
        let (sorted, _) = post_process(rows(), &sort, 2, None, 0);
        assert_eq!(sorted[0][0], json!("c"));
    }

    #[test]
    fn test_offset_limit_law() {
        let all = (0..10)
            .map(|i| vec![Json::from(i)])
            .collect::<Vec<_>>();
        for k in 0..=10usize {
            let (head, _) = post_process(all.clone(), &[], 1, Some(k), 0);
            let (tail, _) = post_process(all.clone(), &[], 1, Some(10 - k), k);
            let (full, total) = post_process(all.clone(), &[], 1, Some(10), 0);
            let mut combined = head;
            combined.extend(tail);
            assert_eq!(combined, full);
            assert_eq!(total, 10);
        }
    }

    #[test]
    fn test_truncates_sort_only_columns() {
        let rows = vec![vec![json!("a"), json!(5)], vec![json!("b"), json!(1)]];
        let sort = vec![SortKey {
            pos: 1,
            direction: SortDirection::Asc,
            args: String::new(),
        }];
        let (sorted, _) = post_process(rows, &sort, 1, None, 0);
        assert_eq!(sorted, vec![vec![json!("b")], vec![json!("a")]]);
    }

    #[test]
    fn test_custom_variable_sort() {
        let rows = vec![
            vec![json!({"TEST": "z"})],
            vec![json!({"TEST": "a"})],
            vec![json!({})],
        ];
        let sort = vec![SortKey {
            pos: 0,
            direction: SortDirection::Asc,
            args: "TEST".to_string(),
        }];
        let (sorted, _) = post_process(rows, &sort, 1, None, 0);
        assert_eq!(sorted[0][0], json!({}));
        assert_eq!(sorted[1][0], json!({"TEST": "a"}));
        assert_eq!(sorted[2][0], json!({"TEST": "z"}));
    }

    #[test]
    fn test_stable_sort_keeps_scan_order() {
        let rows = vec![
            vec![json!("first"), json!(1)],
            vec![json!("second"), json!(1)],
        ];
        let sort = vec![SortKey {
            pos: 1,
            direction: SortDirection::Asc,
            args: String::new(),
        }];
        let (sorted, _) = post_process(rows, &sort, 2, None, 0);
        assert_eq!(sorted[0][0], json!("first"));
    }
}
