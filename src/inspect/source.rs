//! Source-text analysis
//!
//! When a registrant attaches source text, the inspector derives
//! dependencies (imports, called names, approximate globals), performance
//! hints (recursion, loops, cyclomatic complexity, LOC), security hints,
//! and a content hash used for cache invalidation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Names the function body reaches for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyInfo {
    /// `use` paths, in order of appearance
    pub imports: Vec<String>,
    /// Called identifiers (bare or trailing path segment)
    pub calls: Vec<String>,
    /// Read-side SCREAMING_CASE references, approximating globals
    pub globals: Vec<String>,
}

/// Structural cost signals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceHints {
    /// Body references its own name
    pub recursive: bool,
    /// Body contains a loop construct
    pub has_loops: bool,
    /// 1 + branches + boolean operators
    pub cyclomatic_complexity: u32,
    /// Non-blank lines
    pub loc: u32,
}

/// Patterns worth a second look before hijacking in production
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityHints {
    /// Spawns subprocesses (`process::Command`)
    pub spawns_processes: bool,
    /// Contains `unsafe`
    pub uses_unsafe: bool,
    /// Calls `transmute`
    pub uses_transmute: bool,
    /// Mutates the environment (`env::set_var`, `env::remove_var`)
    pub mutates_env: bool,
    /// Removes files or directories (`fs::remove_*`)
    pub removes_files: bool,
}

impl SecurityHints {
    /// Any flag set
    pub fn any(&self) -> bool {
        self.spawns_processes
            || self.uses_unsafe
            || self.uses_transmute
            || self.mutates_env
            || self.removes_files
    }
}

/// Hex digest over whitespace-normalized source, for change detection
pub fn source_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    for token in source.split_whitespace() {
        hasher.update(token.as_bytes());
        hasher.update(b" ");
    }
    hex::encode(hasher.finalize())
}

/// Analyze source text for a function named `qualified_name`
pub fn analyze(
    qualified_name: &str,
    source: &str,
) -> (DependencyInfo, PerformanceHints, SecurityHints) {
    let mut deps = DependencyInfo::default();
    let mut perf = PerformanceHints::default();
    let mut complexity: u32 = 1;

    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        perf.loc += 1;
        if let Some(rest) = trimmed.strip_prefix("use ") {
            deps.imports.push(rest.trim_end_matches(';').trim().to_string());
        }
    }

    let tokens = tokenize(source);
    for (i, token) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1).map(String::as_str);
        match token.as_str() {
            "if" => complexity += 1,
            "while" | "for" | "loop" => {
                complexity += 1;
                perf.has_loops = true;
            }
            "&&" | "||" => complexity += 1,
            _ => {}
        }
        if next == Some("(") && is_identifier(token) && !is_keyword(token) {
            // `fn name(` is the definition, not a call site.
            let is_definition = i >= 1 && tokens[i - 1] == "fn";
            let callee = token.rsplit("::").next().unwrap_or(token).to_string();
            if !is_definition {
                if callee == qualified_name {
                    perf.recursive = true;
                }
                if !deps.calls.contains(&callee) {
                    deps.calls.push(callee);
                }
            }
        }
        if is_screaming_case(token) && !deps.globals.contains(token) {
            deps.globals.push(token.clone());
        }
    }
    perf.cyclomatic_complexity = complexity;

    let security = SecurityHints {
        spawns_processes: source.contains("process::Command") || source.contains("Command::new"),
        uses_unsafe: tokens.iter().any(|t| t == "unsafe"),
        uses_transmute: source.contains("transmute"),
        mutates_env: source.contains("env::set_var") || source.contains("env::remove_var"),
        removes_files: source.contains("fs::remove_file") || source.contains("fs::remove_dir"),
    };

    (deps, perf, security)
}

fn tokenize(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == '_' {
            current.push(c);
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            match c {
                '&' | '|' if chars.peek() == Some(&c) => {
                    chars.next();
                    tokens.push(format!("{c}{c}"));
                }
                ':' if chars.peek() == Some(&':') => {
                    chars.next();
                    // Merge path segments: a::b stays one token.
                    if let Some(last) = tokens.pop() {
                        let mut path = format!("{last}::");
                        while let Some(&n) = chars.peek() {
                            if n.is_alphanumeric() || n == '_' {
                                path.push(n);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        tokens.push(path);
                    }
                }
                c if !c.is_whitespace() => tokens.push(c.to_string()),
                _ => {}
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_identifier(token: &str) -> bool {
    token
        .chars()
        .next()
        .map(|c| c.is_alphabetic() || c == '_')
        .unwrap_or(false)
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "if" | "while" | "for" | "loop" | "match" | "fn" | "return" | "let" | "else" | "unsafe"
    )
}

fn is_screaming_case(token: &str) -> bool {
    token.len() > 1
        && token.chars().any(|c| c.is_ascii_uppercase())
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
