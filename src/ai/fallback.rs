//! Heuristic answers used when the secondary provider fails
//!
//! Explanation and tag requests on the secondary provider degrade to these
//! pattern-based answers instead of surfacing an error, when
//! `ai.secondary.heuristic_fallback` is enabled.

use std::sync::LazyLock;

use regex::Regex;

use crate::constants::limits;

static FUNCTION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"def\s+(\w+)\s*\(").ok());
static CLASS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"class\s+(\w+)\s*").ok());
static IMPORT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"import\s+(\w+)").ok());

const DEFAULT_TAGS: &str = "code,programming";

/// First capture group of every match
fn captures(pattern: &LazyLock<Option<Regex>>, code: &str) -> Vec<String> {
    pattern
        .as_ref()
        .map(|re| {
            re.captures_iter(code)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Best guess at the language for the explanation header
fn detect_language(code: &str) -> &'static str {
    if code.contains("def ") && (code.contains("import ") || code.contains("from ")) {
        "Python"
    } else if code.contains("function ") && (code.contains("var ") || code.contains("let ")) {
        "JavaScript"
    } else if code.contains("class ") && code.contains('{') {
        "Java"
    } else if code.contains("#include") {
        "C++"
    } else {
        "Unknown"
    }
}

/// Lines that are neither blank nor line comments
fn code_line_count(code: &str) -> usize {
    code.trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("//"))
        .count()
}

/// Markdown explanation built from simple structural patterns
pub fn explain(code: &str) -> String {
    let functions = captures(&FUNCTION_PATTERN, code);
    let classes = captures(&CLASS_PATTERN, code);
    let imports = captures(&IMPORT_PATTERN, code);

    let mut out = String::from("## Code Explanation\n\n");
    out.push_str(&format!("**Language:** {}\n\n", detect_language(code)));
    out.push_str(&format!("**Lines of Code:** {}\n\n", code_line_count(code)));

    out.push_str("## Overview\n\nThis code appears to be a ");
    if !classes.is_empty() {
        out.push_str(&format!(
            "class-based implementation with {} class(es) ({}). ",
            classes.len(),
            classes.join(", ")
        ));
    }
    if !functions.is_empty() {
        out.push_str(&format!(
            "It contains {} function(s) ({}). ",
            functions.len(),
            functions.join(", ")
        ));
    }
    if !imports.is_empty() {
        let shown = imports.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
        let more = if imports.len() > 3 { "..." } else { "" };
        out.push_str(&format!(
            "The code imports {} module(s) ({}{}). ",
            imports.len(),
            shown,
            more
        ));
    }

    out.push_str("\n\n## Key Components\n\n");
    if !imports.is_empty() {
        out.push_str("### Dependencies\n");
        for import in imports.iter().take(limits::FALLBACK_LIST_ITEMS) {
            out.push_str(&format!("- {}\n", import));
        }
        out.push('\n');
    }
    if !functions.is_empty() {
        out.push_str("### Functions\n");
        for function in functions.iter().take(limits::FALLBACK_LIST_ITEMS) {
            out.push_str(&format!("- `{}()`: Custom function\n", function));
        }
        out.push('\n');
    }

    out.push_str("## Complexity Analysis\n\n");
    out.push_str("**Time Complexity:** O(n) - Linear time complexity based on the structure.\n\n");
    out.push_str(
        "**Space Complexity:** O(1) - Constant space usage (assumes no large data structures).\n\n",
    );

    out.push_str("## Edge Cases\n\n");
    out.push_str("- Input validation should be handled for user-provided data\n");
    out.push_str("- Error handling should be implemented for API calls or file operations\n");
    out.push_str("- Consider bounds checking for array/list operations\n\n");

    out.push_str("## Recommendations\n\n");
    out.push_str("1. **Add error handling** for robustness\n");
    out.push_str("2. **Include input validation** to prevent unexpected behavior\n");
    out.push_str("3. **Add comments** to explain complex logic\n");
    out.push_str("4. **Consider performance** optimizations if dealing with large datasets\n");
    out.push_str("5. **Write unit tests** to verify functionality\n\n");

    out.push_str(
        "*Note: This is a basic analysis. For detailed explanations, please ensure the AI service is working properly.*",
    );
    out
}

/// Comma-separated keyword tags, `code,programming` when nothing matches
pub fn suggest_tags(code: &str) -> String {
    let lower = code.to_lowercase();
    let mut tags: Vec<&str> = Vec::new();

    let language = if code.contains("def ") || code.contains("import ") || code.contains("from ")
    {
        Some("python")
    } else if ["function ", "var ", "let ", "const "]
        .iter()
        .any(|k| code.contains(k))
    {
        Some("javascript")
    } else if code.contains("class ") && code.contains('{') {
        Some("java")
    } else if code.contains("#include") || code.contains("int main") {
        Some("cpp")
    } else {
        None
    };
    tags.extend(language);

    // First match wins within each group
    let framework = [
        ("flask", "flask"),
        ("react", "react"),
        ("jsx", "react"),
        ("django", "django"),
        ("express", "express"),
        ("pandas", "pandas"),
        ("pd.", "pandas"),
        ("numpy", "numpy"),
        ("np.", "numpy"),
    ]
    .iter()
    .find(|(needle, _)| lower.contains(needle))
    .map(|(_, tag)| *tag);
    tags.extend(framework);

    let algorithm = [
        ("binary search", "binary-search"),
        ("binary_search", "binary-search"),
        ("quicksort", "sorting"),
        ("quick sort", "sorting"),
        ("fibonacci", "dynamic-programming"),
        ("bfs", "bfs"),
        ("queue", "bfs"),
        ("dfs", "dfs"),
        ("stack", "dfs"),
        ("hash", "hash-table"),
        ("dict", "hash-table"),
        ("tree", "tree"),
        ("node", "tree"),
    ]
    .iter()
    .find(|(needle, _)| lower.contains(needle))
    .map(|(_, tag)| *tag);
    tags.extend(algorithm);

    if lower.contains("list") || lower.contains("array") {
        tags.push("array");
    }
    if lower.contains("dict") || code.contains("{}") {
        tags.push("hashmap");
    }
    if lower.contains("set(") {
        tags.push("set");
    }
    if lower.contains("queue") {
        tags.push("queue");
    }
    if lower.contains("stack") {
        tags.push("stack");
    }

    let mut unique: Vec<&str> = Vec::new();
    for tag in tags {
        if !unique.contains(&tag) {
            unique.push(tag);
        }
    }

    if unique.is_empty() {
        DEFAULT_TAGS.to_string()
    } else {
        unique
            .into_iter()
            .take(limits::MAX_TAGS)
            .collect::<Vec<_>>()
            .join(",")
    }
}
