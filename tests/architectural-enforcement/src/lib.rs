//! Architectural Enforcement Integration Tests
//!
//! Source scanners shared by the enforcement tests:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//!
//! The scanners are line based. They resolve the enclosing function of a
//! line by scanning upwards, which is enough for rustfmt-formatted code.

use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["docchat/core/src", "docchat/cli/src"];

/// Workspace root (two levels above this crate)
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files under `dir`, sorted for stable reports
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Code part of a line, with any `//` comment removed
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Strip visibility and qualifiers so `pub(crate) async fn` reads `async fn`
fn strip_visibility(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("pub(") {
        return rest.split_once(')').map_or(line, |(_, r)| r.trim_start());
    }
    line.strip_prefix("pub ").unwrap_or(line)
}

/// Kind of function declared on a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    /// `async fn`
    Async,
    /// plain `fn`
    Sync,
}

/// Parse a function declaration line
pub fn fn_kind(line: &str) -> Option<FnKind> {
    let decl = strip_visibility(line);
    if decl.starts_with("async fn ") {
        Some(FnKind::Async)
    } else if decl.starts_with("fn ") || decl.starts_with("const fn ") {
        Some(FnKind::Sync)
    } else {
        None
    }
}

/// Whether a line opens a module or impl block (scan boundary)
fn is_boundary(line: &str) -> bool {
    let decl = strip_visibility(line);
    decl.starts_with("mod ") || (decl.starts_with("impl") && decl.contains('{'))
}

/// Kind of the function enclosing `lines[current_idx]`, if any
pub fn enclosing_fn(lines: &[&str], current_idx: usize) -> Option<FnKind> {
    for i in (0..current_idx).rev() {
        if let Some(kind) = fn_kind(lines[i]) {
            return Some(kind);
        }
        if is_boundary(lines[i]) {
            return None;
        }
    }
    None
}

/// Whether `lines[current_idx]` sits in test code
///
/// True inside a `#[cfg(test)]` module or a `#[test]`/`#[tokio::test]`
/// function.
pub fn is_test_code(lines: &[&str], current_idx: usize) -> bool {
    let in_test_module = lines[..current_idx].iter().enumerate().any(|(i, line)| {
        line.trim().starts_with("#[cfg(test)]")
            && lines
                .get(i + 1)
                .is_some_and(|next| strip_visibility(next).starts_with("mod "))
    });
    if in_test_module {
        return true;
    }

    let Some(fn_idx) = (0..current_idx).rev().find(|&i| fn_kind(lines[i]).is_some()) else {
        return false;
    };
    for line in lines[..fn_idx].iter().rev() {
        let line = line.trim();
        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }
        if !line.starts_with("#[") && !line.starts_with("///") {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_kind() {
        assert_eq!(fn_kind("    pub async fn submit(&mut self) {"), Some(FnKind::Async));
        assert_eq!(fn_kind("pub(crate) async fn run() {"), Some(FnKind::Async));
        assert_eq!(fn_kind("fn decode_line(raw: &[u8]) -> String {"), Some(FnKind::Sync));
        assert_eq!(fn_kind("    pub fn new() -> Self {"), Some(FnKind::Sync));
        assert_eq!(fn_kind("let f = foo();"), None);
    }

    #[test]
    fn test_enclosing_fn() {
        let code = [
            "impl Repl {",
            "    pub async fn run(self) {",
            "        let x = 1;",
            "    }",
            "    fn helper() {",
            "        let y = 2;",
            "    }",
            "}",
        ];
        assert_eq!(enclosing_fn(&code, 2), Some(FnKind::Async));
        assert_eq!(enclosing_fn(&code, 5), Some(FnKind::Sync));
        assert_eq!(enclosing_fn(&code, 0), None);
    }

    #[test]
    fn test_test_code_detection() {
        let code = [
            "fn production() {}",
            "#[cfg(test)]",
            "mod tests {",
            "    fn helper() {",
            "        std::thread::sleep(d);",
            "    }",
            "}",
        ];
        assert!(!is_test_code(&code, 0));
        assert!(is_test_code(&code, 4));

        let code = ["#[tokio::test]", "async fn test_x() {", "    call();", "}"];
        assert!(is_test_code(&code, 2));
    }

    #[test]
    fn test_workspace_root_has_sources() {
        for dir in PRODUCTION_DIRS {
            assert!(
                workspace_root().join(dir).is_dir(),
                "missing production dir {dir}"
            );
        }
    }
}
