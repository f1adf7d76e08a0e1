//! Static detection of which upstream labels a logic body reads.

use canvasscript::{member_references, ParseError};
use std::collections::BTreeSet;

/// Identifier through which logic bodies reach upstream results.
pub const NODE_REFERENCE: &str = "$node";

/// Labels referenced as `$node["Label"]` or `$node.Label` anywhere in
/// `source`. Parse failures are surfaced to the caller.
pub fn try_extract_dependencies(source: &str) -> Result<BTreeSet<String>, ParseError> {
    member_references(source, NODE_REFERENCE)
}

/// Like [`try_extract_dependencies`], but a body that does not parse simply
/// has no dependencies.
pub fn extract_dependencies(source: &str) -> BTreeSet<String> {
    match try_extract_dependencies(source) {
        Ok(labels) => labels,
        Err(err) => {
            tracing::warn!("Dependency analysis skipped: {}", err);
            BTreeSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(source: &str) -> Vec<String> {
        extract_dependencies(source).into_iter().collect()
    }

    #[test]
    fn combined_bracket_and_dot_access() {
        assert_eq!(labels("return $node[\"A\"].data + $node.B"), vec!["A", "B"]);
    }

    #[test]
    fn bracket_and_dot_forms() {
        assert_eq!(labels("return $node[\"Fetch\"].data"), vec!["Fetch"]);
        assert_eq!(labels("return $node.Fetch.data"), vec!["Fetch"]);
        assert_eq!(labels("return $node['Single'].data"), vec!["Single"]);
    }

    #[test]
    fn references_inside_nested_functions() {
        let source = r#"
            const items = [1, 2].map(i => $node["A"].data[i]);
            function total() { return $node.B.data.total; }
            return { items, total: total() };
        "#;
        assert_eq!(labels(source), vec!["A", "B"]);
    }

    #[test]
    fn repeated_references_collapse() {
        let source = "$node['A'].data + $node.A.data + $node[\"A\"].data";
        assert_eq!(labels(source), vec!["A"]);
    }

    #[test]
    fn optional_chaining_matches() {
        assert_eq!(labels("$node?.A.data ?? $node?.['B']"), vec!["A", "B"]);
    }

    #[test]
    fn template_literal_keys_do_not_match() {
        assert!(labels("return $node[`A`].data").is_empty());
        let source = "const key = 'A'; return $node[key].data";
        assert!(labels(source).is_empty());
    }

    #[test]
    fn aliases_do_not_match() {
        assert!(labels("const n = $node; return n.A.data").is_empty());
        assert!(labels("return other.A").is_empty());
    }

    #[test]
    fn references_in_templates_and_conditions() {
        let source = "if ($node.Flag.data) { return `${$node['Name'].data}!` }";
        assert_eq!(labels(source), vec!["Flag", "Name"]);
    }

    #[test]
    fn parse_failure_means_no_dependencies() {
        assert!(labels("return $node['A'].data +").is_empty());
        assert!(try_extract_dependencies("return (").is_err());
    }

    #[test]
    fn unparsable_text_has_no_dependencies() {
        assert!(labels("not valid js (((").is_empty());
    }

    #[test]
    fn destructured_reads_still_count_the_direct_access() {
        let source = "const { x } = $node[\"Fetch\"].data; return x * 2";
        assert_eq!(labels(source), vec!["Fetch"]);
    }

    #[test]
    fn deeply_nested_bodies_are_skipped_not_fatal() {
        let source = format!("return {}$node.A{}", "(".repeat(2_000), ")".repeat(2_000));
        assert!(labels(&source).is_empty());
        assert!(try_extract_dependencies(&source).is_err());
    }

    #[test]
    fn parenthesized_object_still_matches() {
        assert_eq!(labels("return ($node).A.data"), vec!["A"]);
    }

    #[test]
    fn empty_source() {
        assert!(labels("").is_empty());
    }
}
