//! Splits a change set into bounded, offset-tracked analysis chunks.

use crate::changeset::{ChangedFile, LineRange};
use crate::finding::content_checksum;

/// Context lines pulled in around each changed range.
const CONTEXT_LINES: usize = 20;

/// Overlap between sequential chunks of an oversized region, so findings on
/// a boundary are seen by at least one full window. Overlap duplicates are
/// collapsed later by finding key, never by skipping analysis.
const OVERLAP_LINES: usize = 10;

/// How far back from a hard cut we look for a blank line to break on.
const BREAK_SCAN: usize = 25;

/// A bounded slice of changed source content submitted for analysis.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Repository-relative file path
    pub file: String,

    /// Absolute 1-indexed line number of `lines[0]`
    pub start_line: usize,

    pub lines: Vec<String>,

    /// Checksum of the chunk content, for idempotent re-run detection
    pub checksum: String,
}

impl Chunk {
    pub fn new(file: &str, start_line: usize, lines: Vec<String>) -> Self {
        let checksum = content_checksum(&lines.join("\n"));
        Self {
            file: file.to_string(),
            start_line,
            lines,
            checksum,
        }
    }

    /// Absolute line number one past the last line.
    pub fn end_line(&self) -> usize {
        self.start_line + self.lines.len()
    }

    /// Source text at an absolute line number, if inside this chunk.
    pub fn line_text(&self, absolute_line: usize) -> Option<&str> {
        absolute_line
            .checked_sub(self.start_line)
            .and_then(|idx| self.lines.get(idx))
            .map(String::as_str)
    }

    /// Chunk content with absolute line numbers, as sent to the provider.
    pub fn numbered_content(&self) -> String {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, l)| format!("{:5}: {}", self.start_line + i, l))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Produce the ordered chunk sequence for a change set.
///
/// Each chunk is at most `max_lines` lines. Changed ranges are expanded by a
/// fixed context window and merged; oversized regions are split into
/// sequential chunks with `OVERLAP_LINES` of shared context, breaking at a
/// nearby blank line when one exists (best effort only).
pub fn chunk_files(files: &[ChangedFile], max_lines: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for file in files {
        chunk_file(file, max_lines, &mut chunks);
    }
    chunks
}

fn chunk_file(file: &ChangedFile, max_lines: usize, out: &mut Vec<Chunk>) {
    if file.lines.is_empty() {
        return;
    }
    let path = file.path.display().to_string();

    for region in analysis_regions(file) {
        let mut start = region.start;
        loop {
            let remaining = region.end - start + 1;
            if remaining <= max_lines {
                out.push(slice_chunk(&path, &file.lines, start, region.end));
                break;
            }

            let hard_end = start + max_lines - 1;
            let end = soft_break(&file.lines, start, hard_end);
            out.push(slice_chunk(&path, &file.lines, start, end));

            // Next chunk re-covers the overlap window
            start = end.saturating_sub(OVERLAP_LINES).max(start + 1);
        }
    }
}

/// Changed ranges expanded by context and merged, clamped to the file.
fn analysis_regions(file: &ChangedFile) -> Vec<LineRange> {
    let last_line = file.lines.len();
    let mut regions: Vec<LineRange> = Vec::new();
    for range in &file.changed_lines {
        let start = range.start.saturating_sub(CONTEXT_LINES).max(1);
        let end = (range.end + CONTEXT_LINES).min(last_line);
        match regions.last_mut() {
            Some(last) if start <= last.end + 1 => last.end = last.end.max(end),
            _ => regions.push(LineRange { start, end }),
        }
    }
    regions
}

/// Prefer cutting at a blank line shortly before the hard boundary, so we
/// avoid splitting mid-statement where we can cheaply detect it.
fn soft_break(lines: &[String], start: usize, hard_end: usize) -> usize {
    let lowest = hard_end.saturating_sub(BREAK_SCAN).max(start + 1);
    for candidate in (lowest..=hard_end).rev() {
        if lines[candidate - 1].trim().is_empty() {
            return candidate;
        }
    }
    hard_end
}

fn slice_chunk(path: &str, lines: &[String], start: usize, end: usize) -> Chunk {
    Chunk::new(path, start, lines[start - 1..end].to_vec())
}
