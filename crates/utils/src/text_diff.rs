//! Line-oriented text diffs.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LineChangeKind {
    Equal,
    Insert,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct LineChange {
    pub kind: LineChangeKind,
    /// 1-based line number in the old text
    pub old_line: Option<usize>,
    /// 1-based line number in the new text
    pub new_line: Option<usize>,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, PartialEq)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct LineDiff {
    pub unified: String,
    pub changes: Vec<LineChange>,
    pub stats: DiffStats,
}

impl LineDiff {
    pub fn is_unchanged(&self) -> bool {
        self.stats.additions == 0 && self.stats.deletions == 0
    }
}

/// Diff `old` against `new` line by line. Labels name the two sides in the unified header.
pub fn diff_lines(old: &str, new: &str, old_label: &str, new_label: &str) -> LineDiff {
    let diff = TextDiff::from_lines(old, new);

    let mut stats = DiffStats::default();
    let changes = diff
        .iter_all_changes()
        .map(|change| {
            let kind = match change.tag() {
                ChangeTag::Equal => LineChangeKind::Equal,
                ChangeTag::Insert => {
                    stats.additions += 1;
                    LineChangeKind::Insert
                }
                ChangeTag::Delete => {
                    stats.deletions += 1;
                    LineChangeKind::Delete
                }
            };
            LineChange {
                kind,
                old_line: change.old_index().map(|i| i + 1),
                new_line: change.new_index().map(|i| i + 1),
                content: change.value().trim_end_matches(['\r', '\n']).to_string(),
            }
        })
        .collect();

    let unified = diff
        .unified_diff()
        .context_radius(3)
        .header(old_label, new_label)
        .to_string();

    LineDiff {
        unified,
        changes,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_inserted_and_deleted_lines() {
        let diff = diff_lines("a\nb\nc\n", "a\nB\nc\nd\n", "r1", "r2");
        assert_eq!(diff.stats.additions, 2);
        assert_eq!(diff.stats.deletions, 1);
        assert!(diff.unified.contains("--- r1"));
        assert!(diff.unified.contains("+++ r2"));
        assert!(diff.unified.contains("-b"));
        assert!(diff.unified.contains("+B"));
    }

    #[test]
    fn line_numbers_are_one_based() {
        let diff = diff_lines("x\n", "x\ny\n", "a", "b");
        let inserted = diff
            .changes
            .iter()
            .find(|c| c.kind == LineChangeKind::Insert)
            .unwrap();
        assert_eq!(inserted.new_line, Some(2));
        assert_eq!(inserted.old_line, None);
        assert_eq!(inserted.content, "y");
    }

    #[test]
    fn identical_texts_are_unchanged() {
        let diff = diff_lines("same\n", "same\n", "a", "b");
        assert!(diff.is_unchanged());
    }
}
