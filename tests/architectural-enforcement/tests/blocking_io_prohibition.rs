//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the core library and the CLI MUST NOT use
//! blocking I/O. A blocked runtime thread stalls every in-flight answer stream.
//! **Required**: `tokio::fs`, `tokio::net`, `tokio::io::stdin()`, not their
//! `std` counterparts.

use std::path::Path;

use architectural_enforcement::{
    code_part, enclosing_fn, is_test_code, rust_files, workspace_root, FnKind, PRODUCTION_DIRS,
};

/// Test that production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }

        eprintln!("\nFORBIDDEN in async code:");
        eprintln!("  - std::fs::read(), std::fs::write(), std::fs::File");
        eprintln!("  - std::net::TcpStream, std::net::TcpListener");
        eprintln!("  - std::io::stdin(), std::io::stdout()");
        eprintln!("  - std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("\nACCEPTABLE:");
        eprintln!("  - Non-async functions (config loading before the runtime is busy)");
        eprintln!("  - Test code");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}

/// Find all blocking I/O calls in production code
fn find_blocking_io_violations() -> Vec<String> {
    let root = workspace_root();
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        for file in rust_files(&root.join(dir)) {
            check_file(&file, &mut violations);
        }
    }
    violations
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let lines: Vec<&str> = content.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        if let Some(reason) = blocking_call(&lines, idx) {
            violations.push(format!(
                "{}:{} - {reason}: {}",
                path.display(),
                idx + 1,
                line.trim()
            ));
        }
    }
}

/// Reason the line is a violation, if it is one
fn blocking_call(lines: &[&str], idx: usize) -> Option<&'static str> {
    let code = code_part(lines[idx]);

    if is_test_code(lines, idx) || enclosing_fn(lines, idx) == Some(FnKind::Sync) {
        return None;
    }

    if code.contains("std::fs::") || code.trim_start().starts_with("use std::fs") {
        return Some("Blocking file I/O");
    }
    if code.contains("std::net::") || code.trim_start().starts_with("use std::net") {
        return Some("Blocking network I/O");
    }
    if code.contains("std::process::Command") {
        return Some("Blocking process I/O");
    }
    if code.contains("reqwest::blocking") {
        return Some("Blocking HTTP client");
    }
    if (code.contains("std::io::stdin()") || code.contains("std::io::stdout()"))
        && enclosing_fn(lines, idx) == Some(FnKind::Async)
    {
        return Some("Blocking stdin/stdout in async");
    }
    None
}

#[test]
fn test_blocking_io_detection() {
    let code = [
        "    pub async fn load(&self) {",
        "        let contents = std::fs::read_to_string(\"file.txt\");",
        "    }",
    ];
    assert_eq!(blocking_call(&code, 1), Some("Blocking file I/O"));

    let code = [
        "async fn prompt() {",
        "    let stdin = std::io::stdin();",
        "}",
    ];
    assert_eq!(blocking_call(&code, 1), Some("Blocking stdin/stdout in async"));
}

#[test]
fn test_non_async_function_allowed() {
    let code = [
        "pub fn load_config_from_path(path: &Path) -> Result<Config> {",
        "    let contents = std::fs::read_to_string(path)?;",
        "}",
    ];
    assert_eq!(blocking_call(&code, 1), None);
}

#[test]
fn test_test_function_allowed() {
    let code = [
        "#[tokio::test]",
        "async fn test_something() {",
        "    let contents = std::fs::read_to_string(\"test.txt\");",
        "}",
    ];
    assert_eq!(blocking_call(&code, 2), None);
}
