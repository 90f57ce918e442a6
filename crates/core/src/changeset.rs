//! Change-set ingestion — a thin git wrapper with no decision logic.
//!
//! Diffs a base ref against a head ref (or the working tree), collecting the
//! changed files, their new content, and the changed line ranges the chunker
//! slices into analysis units.

use crate::error::PipelineError;
use git2::{Delta, DiffOptions, Repository};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A closed range of 1-indexed lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

/// A changed file with its post-change content.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    /// Path relative to the repository root
    pub path: PathBuf,

    /// Full post-change content, split into lines
    pub lines: Vec<String>,

    /// Added/modified line ranges (new-side line numbers), merged and sorted
    pub changed_lines: Vec<LineRange>,
}

/// The change set under review.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Change-set identifier (e.g. "main..HEAD" or a PR ref)
    pub id: String,

    /// Head commit id
    pub commit: String,

    pub files: Vec<ChangedFile>,
}

/// Reads change sets out of a git repository.
pub struct ChangeSetReader {
    repo: Repository,
}

impl ChangeSetReader {
    pub fn open(repo_path: &Path) -> Result<Self, PipelineError> {
        let repo = Repository::open(repo_path)
            .map_err(|e| PipelineError::ChangeSet(format!("failed to open repository: {}", e)))?;
        Ok(Self { repo })
    }

    /// Collect the changed files between `base` and `head` (HEAD when absent).
    ///
    /// Deleted files carry no new-side content and are skipped; paths
    /// matching any exclude glob are dropped before chunking.
    pub fn read(
        &self,
        base: &str,
        head: Option<&str>,
        excludes: &[glob::Pattern],
    ) -> Result<ChangeSet, PipelineError> {
        let base_tree = self.resolve_tree(base)?;
        let head_spec = head.unwrap_or("HEAD");
        let head_tree = self.resolve_tree(head_spec)?;
        let head_commit = self.resolve_commit_id(head_spec)?;

        let mut opts = DiffOptions::new();
        opts.ignore_whitespace(false).context_lines(0);

        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), Some(&mut opts))
            .map_err(|e| PipelineError::ChangeSet(format!("diff failed: {}", e)))?;

        // path → new-side changed line numbers
        let mut changed: BTreeMap<PathBuf, Vec<usize>> = BTreeMap::new();

        // Only the line callback touches the map; files without added lines
        // (pure deletions, renames) produce no reviewable ranges anyway.
        diff.foreach(
            &mut |_delta, _progress| true,
            None,
            None,
            Some(&mut |delta, _hunk, line| {
                if line.origin() == '+' && delta.status() != Delta::Deleted {
                    if let (Some(path), Some(lineno)) =
                        (delta.new_file().path(), line.new_lineno())
                    {
                        changed
                            .entry(path.to_path_buf())
                            .or_default()
                            .push(lineno as usize);
                    }
                }
                true
            }),
        )
        .map_err(|e| PipelineError::ChangeSet(format!("diff walk failed: {}", e)))?;

        let mut files = Vec::new();
        for (path, mut line_numbers) in changed {
            if excludes.iter().any(|p| p.matches_path(&path)) {
                continue;
            }
            let content = match self.read_blob(&head_tree, &path) {
                Some(c) => c,
                None => continue, // binary or unreadable
            };
            line_numbers.sort_unstable();
            line_numbers.dedup();
            files.push(ChangedFile {
                path,
                lines: content.lines().map(String::from).collect(),
                changed_lines: merge_ranges(&line_numbers),
            });
        }

        Ok(ChangeSet {
            id: format!("{}..{}", base, head_spec),
            commit: head_commit,
            files,
        })
    }

    fn resolve_tree(&self, spec: &str) -> Result<git2::Tree<'_>, PipelineError> {
        let obj = self
            .repo
            .revparse_single(spec)
            .map_err(|e| PipelineError::ChangeSet(format!("cannot resolve `{}`: {}", spec, e)))?;
        let commit = obj
            .peel_to_commit()
            .map_err(|e| PipelineError::ChangeSet(format!("`{}` is not a commit: {}", spec, e)))?;
        commit
            .tree()
            .map_err(|e| PipelineError::ChangeSet(format!("no tree for `{}`: {}", spec, e)))
    }

    fn resolve_commit_id(&self, spec: &str) -> Result<String, PipelineError> {
        let obj = self
            .repo
            .revparse_single(spec)
            .map_err(|e| PipelineError::ChangeSet(format!("cannot resolve `{}`: {}", spec, e)))?;
        let commit = obj
            .peel_to_commit()
            .map_err(|e| PipelineError::ChangeSet(format!("`{}` is not a commit: {}", spec, e)))?;
        Ok(commit.id().to_string())
    }

    fn read_blob(&self, tree: &git2::Tree, path: &Path) -> Option<String> {
        let entry = tree.get_path(path).ok()?;
        let blob = self.repo.find_blob(entry.id()).ok()?;
        if blob.is_binary() {
            return None;
        }
        std::str::from_utf8(blob.content())
            .ok()
            .map(ToString::to_string)
    }
}

/// Merge consecutive/adjacent line numbers into closed ranges.
pub fn merge_ranges(sorted_lines: &[usize]) -> Vec<LineRange> {
    let mut ranges: Vec<LineRange> = Vec::new();
    for &line in sorted_lines {
        match ranges.last_mut() {
            Some(last) if line <= last.end + 1 => last.end = line,
            _ => ranges.push(LineRange {
                start: line,
                end: line,
            }),
        }
    }
    ranges
}
