//! Validation error formatting: flatten, deduplicate, group.

use indexmap::IndexMap;

use super::{PathSegment, SchemaIssue};
use crate::core::error::FieldError;
use crate::core::types::Facet;

/// Separator between messages reported for the same path
pub const MESSAGE_SEPARATOR: &str = " | ";

/// Render a path as `a.b[2].c`; the root renders as an empty string
pub fn format_path(path: &[PathSegment]) -> String {
    let mut rendered = String::new();
    for segment in path {
        match segment {
            PathSegment::Index(index) => {
                rendered.push('[');
                rendered.push_str(&index.to_string());
                rendered.push(']');
            }
            PathSegment::Key(key) => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(key);
            }
        }
    }
    rendered
}

/// Flatten nested issues into field errors for one facet.
///
/// An issue carrying nested issues is replaced by them, recursively.
pub fn flatten_issues(issues: &[SchemaIssue], facet: Facet) -> Vec<FieldError> {
    let mut errors = Vec::new();
    flatten_into(issues, facet, &mut errors);
    errors
}

fn flatten_into(issues: &[SchemaIssue], facet: Facet, errors: &mut Vec<FieldError>) {
    for issue in issues {
        if issue.nested.is_empty() {
            errors.push(FieldError::new(format_path(&issue.path), &issue.message, facet));
        } else {
            flatten_into(&issue.nested, facet, errors);
        }
    }
}

/// Remove exact duplicates, then merge the messages of each path.
///
/// Paths keep the order in which they were first seen. Applying this twice yields the
/// same list as applying it once.
pub fn aggregate(errors: Vec<FieldError>) -> Vec<FieldError> {
    let mut grouped: IndexMap<(String, Facet), Vec<String>> = IndexMap::new();

    for error in errors {
        let messages = grouped.entry((error.path, error.facet)).or_default();
        if !messages.contains(&error.message) {
            messages.push(error.message);
        }
    }

    grouped
        .into_iter()
        .map(|((path, facet), messages)| FieldError::new(path, messages.join(MESSAGE_SEPARATOR), facet))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> PathSegment {
        PathSegment::from(k)
    }

    #[test]
    fn test_path_rendering() {
        assert_eq!(format_path(&[]), "");
        assert_eq!(format_path(&[key("a")]), "a");
        assert_eq!(
            format_path(&[key("a"), key("b"), PathSegment::Index(2), key("c")]),
            "a.b[2].c"
        );
        assert_eq!(format_path(&[PathSegment::Index(0), key("id")]), "[0].id");
    }

    #[test]
    fn test_nested_issues_replace_their_parent() {
        let issues = vec![
            SchemaIssue::new(vec![key("v")], "Invalid input").with_nested(vec![
                SchemaIssue::new(vec![key("v")], "Expected string, received number"),
                SchemaIssue::new(vec![key("v"), key("x")], "Required"),
            ]),
            SchemaIssue::new(vec![key("w")], "Required"),
        ];

        let errors = flatten_issues(&issues, Facet::Body);
        let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["v", "v.x", "w"]);
        assert!(errors.iter().all(|e| e.message != "Invalid input"));
    }

    #[test]
    fn test_dedup_and_grouping() {
        let errors = vec![
            FieldError::new("a", "first", Facet::Body),
            FieldError::new("b", "other", Facet::Body),
            FieldError::new("a", "first", Facet::Body),
            FieldError::new("a", "second", Facet::Body),
        ];

        let aggregated = aggregate(errors);
        assert_eq!(
            aggregated,
            vec![
                FieldError::new("a", "first | second", Facet::Body),
                FieldError::new("b", "other", Facet::Body),
            ]
        );
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let errors = vec![
            FieldError::new("a", "x", Facet::Query),
            FieldError::new("a", "y", Facet::Query),
            FieldError::new("a", "x", Facet::Query),
            FieldError::new("", "root", Facet::Query),
        ];

        let once = aggregate(errors);
        let twice = aggregate(once.clone());
        assert_eq!(once, twice);
    }
}
