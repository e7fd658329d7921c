//! Terminal rendering of query results and store status.

use std::path::Path;

use serde::Serialize;

use crate::semantic::{BuildReport, RankedSection, StatusReport};

/// Type shown for notes at the vault root
const ROOT_NOTE_TYPE: &str = "Atom";

/// One line of the results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub id: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub note: String,
    pub document: String,
    pub section: String,
    pub similarity: f32,
    pub uri: String,
}

impl ResultRow {
    pub fn new(id: usize, ranked: &RankedSection, vault_name: &str) -> Self {
        let document = &ranked.key.document;
        Self {
            id,
            kind: note_type(document),
            note: note_name(document),
            document: document.clone(),
            section: ranked.key.section.clone(),
            similarity: round3(ranked.similarity),
            uri: obsidian_uri(vault_name, document, &ranked.key.section),
        }
    }

    /// Short label used by the interactive picker.
    pub fn label(&self) -> String {
        if self.section.is_empty() {
            format!("{:.3}  {}", self.similarity, self.note)
        } else {
            format!("{:.3}  {} > {}", self.similarity, self.note, self.section)
        }
    }
}

pub fn rows(ranked: &[RankedSection], vault_name: &str) -> Vec<ResultRow> {
    ranked
        .iter()
        .enumerate()
        .map(|(id, r)| ResultRow::new(id, r, vault_name))
        .collect()
}

/// Top-level folder without its plural `s`, e.g. `Molecules/x.md` -> `Molecule`.
fn note_type(document: &str) -> String {
    match document.split_once('/') {
        Some((folder, _)) => {
            let mut chars = folder.chars();
            chars.next_back();
            chars.as_str().to_string()
        }
        None => ROOT_NOTE_TYPE.to_string(),
    }
}

fn note_name(document: &str) -> String {
    Path::new(document)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| document.to_string())
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// Deep link opening the note (and heading) through the Advanced URI plugin.
pub fn obsidian_uri(vault_name: &str, document: &str, section: &str) -> String {
    let mut uri = format!(
        "obsidian://advanced-uri?vault={}&filepath={}",
        urlencoding::encode(vault_name),
        urlencoding::encode(document)
    );
    if !section.is_empty() {
        uri.push_str("&heading=");
        uri.push_str(&urlencoding::encode(section));
    }
    uri
}

/// psql-style table: `id | Type | Note | Section | Similarity`.
pub fn render_table(rows: &[ResultRow]) -> String {
    let header = ["id", "Type", "Note", "Section", "Similarity"];
    let body: Vec<[String; 5]> = rows
        .iter()
        .map(|r| {
            [
                r.id.to_string(),
                r.kind.clone(),
                r.note.clone(),
                r.section.clone(),
                format!("{:.3}", r.similarity),
            ]
        })
        .collect();

    let mut widths = header.map(|h| h.chars().count());
    for row in &body {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    // id and Similarity are right-aligned
    let right = [true, false, false, false, true];

    let rule = |left: char, mid: char, end: char| -> String {
        let mut line = String::new();
        line.push(left);
        for (i, width) in widths.iter().enumerate() {
            if i > 0 {
                line.push(mid);
            }
            line.push_str(&"-".repeat(width + 2));
        }
        line.push(end);
        line
    };
    let line = |cells: &[String]| -> String {
        let mut line = String::from("|");
        for (i, cell) in cells.iter().enumerate() {
            let pad = " ".repeat(widths[i] - cell.chars().count());
            if right[i] {
                line.push_str(&format!(" {pad}{cell} |"));
            } else {
                line.push_str(&format!(" {cell}{pad} |"));
            }
        }
        line
    };

    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(rule('+', '+', '+'));
    out.push(line(&header.map(String::from)[..]));
    out.push(rule('|', '+', '|'));
    for row in &body {
        out.push(line(&row[..]));
    }
    out.push(rule('+', '+', '+'));
    out.join("\n")
}

pub fn render_report(report: &BuildReport) -> String {
    let mut out = format!(
        "embedded {} of {} sections, store holds {}",
        report.embedded, report.candidates, report.total
    );
    if !report.truncated.is_empty() {
        out.push_str(&format!("\ntruncated to the context window ({}):", report.truncated.len()));
        for key in &report.truncated {
            out.push_str(&format!("\n  {key}"));
        }
    }
    if !report.failed.is_empty() {
        out.push_str(&format!("\nfailed ({}), rerun `nmr update` to retry:", report.failed.len()));
        for key in &report.failed {
            out.push_str(&format!("\n  {key}"));
        }
    }
    out
}

pub fn render_status(status: &StatusReport) -> String {
    if !status.store_present {
        return format!(
            "no store at {}\n{} sections pending, run `nmr build`\n{} cached queries",
            status.store_path.display(),
            status.pending,
            status.cache_entries
        );
    }

    let mut out = vec![
        format!("store:      {}", status.store_path.display()),
        format!("model:      {}", status.model.as_deref().unwrap_or("-")),
        format!(
            "sections:   {} in {} notes ({} dims)",
            status.sections,
            status.documents,
            status.dimensions.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
        ),
        format!(
            "updated:    {}",
            status
                .updated_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        ),
        format!("cache:      {} queries", status.cache_entries),
        format!("pending:    {} sections", status.pending),
        format!("orphaned:   {} sections", status.orphaned),
    ];
    if !status.stale_documents.is_empty() {
        out.push(format!(
            "stale:      {} notes changed since the last run, `nmr build` refreshes them",
            status.stale_documents.len()
        ));
        for doc in &status.stale_documents {
            out.push(format!("  {doc}"));
        }
    }
    out.join("\n")
}
