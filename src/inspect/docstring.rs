//! Doc-text parsing
//!
//! Recognizes Google/NumPy-style sections: `Args:`/`Arguments:`/
//! `Parameters:`, `Returns:`, `Raises:`, `Example:`/`Examples:`, `Notes:`.
//! The first non-blank line is the summary; lines before any section header
//! extend the description. Parameter lines match `NAME: DESC` (a NumPy-style
//! `NAME : TYPE` line is treated the same way).

use serde::{Deserialize, Serialize};

/// Parsed doc text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocInfo {
    /// First non-blank line
    pub summary: String,
    /// Free text before the first section header (summary excluded)
    pub description: String,
    /// `NAME -> DESC` entries from the Args section, in order
    pub params: Vec<(String, String)>,
    /// Returns section text
    pub returns: Option<String>,
    /// `KIND -> DESC` entries from the Raises section
    pub raises: Vec<(String, String)>,
    /// Example section bodies, verbatim
    pub examples: Vec<String>,
    /// Notes section body
    pub notes: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Args,
    Returns,
    Raises,
    Examples,
    Notes,
}

fn section_for(line: &str) -> Option<Section> {
    match line.trim().trim_end_matches(':') {
        "Args" | "Arguments" | "Parameters" => Some(Section::Args),
        "Returns" => Some(Section::Returns),
        "Raises" => Some(Section::Raises),
        "Example" | "Examples" => Some(Section::Examples),
        "Notes" => Some(Section::Notes),
        _ => None,
    }
}

/// Parse doc text into its sections. Empty or absent docs yield empty
/// fields; the parser never fails.
pub fn parse(doc: &str) -> DocInfo {
    let mut info = DocInfo::default();
    let mut section = Section::Preamble;
    let mut description_lines: Vec<String> = Vec::new();
    let mut returns_lines: Vec<String> = Vec::new();
    let mut notes_lines: Vec<String> = Vec::new();
    let mut example_lines: Vec<String> = Vec::new();
    let mut summary_seen = false;

    for raw in doc.lines() {
        if let Some(next) = section_for(raw) {
            if section == Section::Examples && !example_lines.is_empty() {
                info.examples.push(example_lines.join("\n").trim().to_string());
                example_lines.clear();
            }
            section = next;
            continue;
        }
        let line = raw.trim();
        match section {
            Section::Preamble => {
                if !summary_seen {
                    if !line.is_empty() {
                        info.summary = line.to_string();
                        summary_seen = true;
                    }
                } else if !line.is_empty() {
                    description_lines.push(line.to_string());
                }
            }
            Section::Args => push_named_entry(&mut info.params, line),
            Section::Raises => push_named_entry(&mut info.raises, line),
            Section::Returns => {
                if !line.is_empty() {
                    returns_lines.push(line.to_string());
                }
            }
            Section::Examples => example_lines.push(raw.to_string()),
            Section::Notes => {
                if !line.is_empty() {
                    notes_lines.push(line.to_string());
                }
            }
        }
    }

    if !example_lines.is_empty() {
        info.examples.push(example_lines.join("\n").trim().to_string());
    }
    info.description = description_lines.join(" ");
    if !returns_lines.is_empty() {
        info.returns = Some(returns_lines.join(" "));
    }
    if !notes_lines.is_empty() {
        info.notes = Some(notes_lines.join(" "));
    }
    info
}

/// `NAME: DESC` lines open an entry; indented or bare lines continue the
/// previous one.
fn push_named_entry(entries: &mut Vec<(String, String)>, line: &str) {
    if line.is_empty() {
        return;
    }
    if let Some((name, desc)) = line.split_once(':') {
        let name = name.trim();
        let is_name =
            !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '*');
        if is_name {
            entries.push((name.to_string(), desc.trim().to_string()));
            return;
        }
    }
    if let Some(last) = entries.last_mut() {
        if !last.1.is_empty() {
            last.1.push(' ');
        }
        last.1.push_str(line);
    }
}
