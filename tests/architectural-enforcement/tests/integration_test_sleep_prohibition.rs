//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Code MUST NOT call sleep methods. Streams are driven by I/O
//! readiness, cancellation by tokens, and tests synchronise on channels and
//! task joins rather than on elapsed time.
//! **Exceptions**: periodic work through `tokio::time::interval`.

use std::path::Path;

use architectural_enforcement::{code_part, rust_files, workspace_root, PRODUCTION_DIRS};

/// Integration test directories, relative to the workspace root
const TEST_DIRS: &[&str] = &["docchat/core/tests"];

/// Test that production and integration test code contain no sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\nSleep calls found:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }

        eprintln!("\nACCEPTABLE:");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("\nFORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - Sleep to 'wait' for a stream event (await the channel instead)");

        panic!("\nFound {} sleep violation(s).", violations.len());
    }
}

/// Find all sleep() calls in production code and integration tests
fn find_sleep_violations() -> Vec<String> {
    let root = workspace_root();
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS.iter().chain(TEST_DIRS) {
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
        if is_sleep_call(&lines, idx) {
            violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
        }
    }
}

fn is_sleep_call(lines: &[&str], idx: usize) -> bool {
    let code = code_part(lines[idx]);
    (code.contains("::sleep(") || code.contains(".sleep(")) && !is_interval_pattern(lines, idx)
}

/// Check if this is the `tokio::time::interval` pattern (acceptable for periodic tasks)
fn is_interval_pattern(lines: &[&str], current_idx: usize) -> bool {
    let start = current_idx.saturating_sub(20);
    let end = std::cmp::min(current_idx + 5, lines.len());
    lines[start..end]
        .iter()
        .any(|line| line.contains("interval.tick()") || line.contains("tokio::time::interval"))
}

#[test]
fn test_sleep_violation_detection() {
    let code = [
        "async fn wait_for_answer() {",
        "    tokio::time::sleep(Duration::from_millis(10)).await;",
        "}",
    ];
    assert!(is_sleep_call(&code, 1));

    let code = ["    // tokio::time::sleep(d) would hide a race", "    rx.recv().await;"];
    assert!(!is_sleep_call(&code, 0));
}

#[test]
fn test_interval_detection() {
    let code = [
        "let mut interval = tokio::time::interval(period);",
        "loop {",
        "    interval.tick().await;",
        "    std::thread::sleep(d);",
        "}",
    ];
    assert!(!is_sleep_call(&code, 3));
}
