use similar::{ChangeTag, TextDiff};

use crate::RequestFile;

/// Role of a line in a unified diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Added,
    Removed,
}

impl LineKind {
    pub fn prefix(self) -> char {
        match self {
            LineKind::Context => ' ',
            LineKind::Added => '+',
            LineKind::Removed => '-',
        }
    }
}

/// One line of a unified diff, with 1-based line numbers on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
}

/// Line diff between two template bodies.
pub fn diff_lines(previous: &str, current: &str) -> Vec<DiffLine> {
    TextDiff::from_lines(previous, current)
        .iter_all_changes()
        .map(|change| DiffLine {
            kind: match change.tag() {
                ChangeTag::Equal => LineKind::Context,
                ChangeTag::Insert => LineKind::Added,
                ChangeTag::Delete => LineKind::Removed,
            },
            old_line: change.old_index().map(|i| i + 1),
            new_line: change.new_index().map(|i| i + 1),
            text: change.value().trim_end_matches(['\n', '\r']).to_string(),
        })
        .collect()
}

pub fn diff_stats(lines: &[DiffLine]) -> DiffStats {
    lines.iter().fold(DiffStats::default(), |mut stats, line| {
        match line.kind {
            LineKind::Added => stats.added += 1,
            LineKind::Removed => stats.removed += 1,
            LineKind::Context => {}
        }
        stats
    })
}

/// Editable diff view of one request file.
///
/// Edits go to a local buffer; the parent only sees them through [`ChangeViewer::modify`].
/// A read-only viewer has no modify control and ignores edits.
#[derive(Debug, Clone)]
pub struct ChangeViewer {
    file: RequestFile,
    read_only: bool,
    modified_template: String,
    /// Byte offset into `modified_template`, always on a char boundary.
    cursor: usize,
}

impl ChangeViewer {
    pub fn new(file: RequestFile, read_only: bool) -> Self {
        let modified_template = file.template_body.clone();
        Self {
            file,
            read_only,
            modified_template,
            cursor: 0,
        }
    }

    /// The last confirmed version of the file.
    pub fn file(&self) -> &RequestFile {
        &self.file
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn modified_template(&self) -> &str {
        &self.modified_template
    }

    /// Whether the edit buffer diverges from the last confirmed body.
    pub fn has_changed(&self) -> bool {
        self.modified_template != self.file.template_body
    }

    /// Whether the modify action should be rendered at all.
    pub fn shows_modify_control(&self) -> bool {
        !self.read_only
    }

    /// Confirm the buffer. Returns the new file to hand to the parent, or
    /// `None` for a read-only viewer.
    pub fn modify(&mut self) -> Option<RequestFile> {
        if self.read_only {
            return None;
        }
        let stats = diff_stats(&diff_lines(&self.file.previous_body, &self.modified_template));
        let updated = RequestFile {
            template_body: self.modified_template.clone(),
            additions: stats.added as u32,
            ..self.file.clone()
        };
        tracing::debug!(file = %updated.file_path, additions = updated.additions, "template modified");
        self.file = updated.clone();
        Some(updated)
    }

    /// Discard local edits.
    pub fn revert(&mut self) {
        self.modified_template = self.file.template_body.clone();
        self.cursor = self.cursor.min(self.modified_template.len());
        while !self.modified_template.is_char_boundary(self.cursor) {
            self.cursor -= 1;
        }
    }

    /// Replace the whole buffer.
    pub fn set_buffer(&mut self, text: impl Into<String>) {
        if self.read_only {
            return;
        }
        self.modified_template = text.into();
        self.cursor = self.modified_template.len();
    }

    /// Diff from `previous_body` to the edit buffer.
    pub fn diff(&self) -> Vec<DiffLine> {
        diff_lines(&self.file.previous_body, &self.modified_template)
    }

    /// `repo/path` link target, when the file belongs to a repository.
    pub fn source_link(&self) -> Option<String> {
        self.file
            .repo_name
            .as_ref()
            .map(|repo| format!("{}/{}", repo, self.file.file_path))
    }

    // Line editor

    pub fn insert_char(&mut self, c: char) {
        if self.read_only {
            return;
        }
        self.modified_template.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    pub fn backspace(&mut self) {
        if self.read_only {
            return;
        }
        if let Some(prev) = self.modified_template[..self.cursor].chars().next_back() {
            self.cursor -= prev.len_utf8();
            self.modified_template.remove(self.cursor);
        }
    }

    pub fn delete(&mut self) {
        if self.read_only || self.cursor >= self.modified_template.len() {
            return;
        }
        self.modified_template.remove(self.cursor);
    }

    pub fn move_left(&mut self) {
        if let Some(prev) = self.modified_template[..self.cursor].chars().next_back() {
            self.cursor -= prev.len_utf8();
        }
    }

    pub fn move_right(&mut self) {
        if let Some(next) = self.modified_template[self.cursor..].chars().next() {
            self.cursor += next.len_utf8();
        }
    }

    pub fn move_home(&mut self) {
        self.cursor = self.line_start(self.cursor);
    }

    pub fn move_end(&mut self) {
        self.cursor = self.line_end(self.cursor);
    }

    pub fn move_up(&mut self) {
        let (row, col) = self.cursor_position();
        if row > 0 {
            self.cursor = self.offset_for(row - 1, col);
        }
    }

    pub fn move_down(&mut self) {
        let (row, col) = self.cursor_position();
        let last_row = self.modified_template.matches('\n').count();
        if row < last_row {
            self.cursor = self.offset_for(row + 1, col);
        }
    }

    /// Zero-based (row, column in chars) of the cursor.
    pub fn cursor_position(&self) -> (usize, usize) {
        let before = &self.modified_template[..self.cursor];
        let row = before.matches('\n').count();
        let col = before[self.line_start(self.cursor)..].chars().count();
        (row, col)
    }

    fn line_start(&self, offset: usize) -> usize {
        self.modified_template[..offset]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    fn line_end(&self, offset: usize) -> usize {
        self.modified_template[offset..]
            .find('\n')
            .map(|i| offset + i)
            .unwrap_or(self.modified_template.len())
    }

    fn offset_for(&self, row: usize, col: usize) -> usize {
        let start = self
            .modified_template
            .split_inclusive('\n')
            .take(row)
            .map(str::len)
            .sum::<usize>();
        let end = self.line_end(start);
        self.modified_template[start..end]
            .char_indices()
            .nth(col)
            .map(|(i, _)| start + i)
            .unwrap_or(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(previous: &str, template: &str) -> RequestFile {
        RequestFile {
            file_path: "resources/aws/s3/logs.yaml".to_string(),
            repo_name: Some("noq-templates".to_string()),
            previous_body: previous.to_string(),
            template_body: template.to_string(),
            additions: 0,
        }
    }

    #[test]
    fn unchanged_until_buffer_differs() {
        let mut viewer = ChangeViewer::new(file("a", "a"), false);
        assert!(!viewer.has_changed());

        viewer.set_buffer("a");
        assert!(!viewer.has_changed());

        viewer.insert_char('b');
        assert!(viewer.has_changed());

        viewer.backspace();
        assert!(!viewer.has_changed());
    }

    #[test]
    fn read_only_has_no_modify_control() {
        let mut viewer = ChangeViewer::new(file("a", "b"), true);
        assert!(!viewer.shows_modify_control());
        viewer.insert_char('x');
        viewer.set_buffer("changed");
        assert!(!viewer.has_changed());
        assert_eq!(viewer.modify(), None);
    }

    #[test]
    fn modify_commits_buffer_and_resets_change_flag() {
        let mut viewer = ChangeViewer::new(file("a\n", "a\n"), false);
        viewer.set_buffer("a\nb\n");
        assert!(viewer.has_changed());

        let updated = viewer.modify().unwrap();
        assert_eq!(updated.template_body, "a\nb\n");
        assert_eq!(updated.previous_body, "a\n");
        assert_eq!(updated.additions, 1);
        assert_eq!(updated.repo_name.as_deref(), Some("noq-templates"));

        // Compared against the last confirmed body, not the original.
        assert!(!viewer.has_changed());
        viewer.insert_char('c');
        assert!(viewer.has_changed());
    }

    #[test]
    fn revert_discards_edits() {
        let mut viewer = ChangeViewer::new(file("", "name: logs"), false);
        viewer.set_buffer("name: archive");
        viewer.revert();
        assert!(!viewer.has_changed());
        assert_eq!(viewer.modified_template(), "name: logs");
    }

    #[test]
    fn diff_marks_added_and_removed_lines() {
        let lines = diff_lines("a\nb\n", "a\nc\n");
        let kinds: Vec<LineKind> = lines.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![LineKind::Context, LineKind::Removed, LineKind::Added]
        );
        assert_eq!(lines[1].text, "b");
        assert_eq!(lines[1].old_line, Some(2));
        assert_eq!(lines[2].new_line, Some(2));
        assert_eq!(diff_stats(&lines), DiffStats { added: 1, removed: 1 });
    }

    #[test]
    fn new_file_is_all_additions() {
        let lines = diff_lines("", "a\nb\n");
        assert!(lines.iter().all(|l| l.kind == LineKind::Added));
    }

    #[test]
    fn cursor_moves_across_lines() {
        let mut viewer = ChangeViewer::new(file("", "abc\nde\nfghi"), false);
        assert_eq!(viewer.cursor_position(), (0, 0));

        viewer.move_end();
        assert_eq!(viewer.cursor_position(), (0, 3));
        viewer.move_down();
        assert_eq!(viewer.cursor_position(), (1, 2));
        viewer.move_down();
        assert_eq!(viewer.cursor_position(), (2, 2));
        viewer.move_down();
        assert_eq!(viewer.cursor_position(), (2, 2));
        viewer.move_home();
        assert_eq!(viewer.cursor_position(), (2, 0));
        viewer.move_up();
        viewer.move_up();
        assert_eq!(viewer.cursor_position(), (0, 0));
        viewer.move_left();
        assert_eq!(viewer.cursor_position(), (0, 0));
    }

    #[test]
    fn editing_multibyte_text() {
        let mut viewer = ChangeViewer::new(file("", "é"), false);
        viewer.move_right();
        viewer.insert_char('ß');
        assert_eq!(viewer.modified_template(), "éß");
        viewer.move_left();
        viewer.delete();
        assert_eq!(viewer.modified_template(), "é");
        viewer.insert_newline();
        assert_eq!(viewer.cursor_position(), (1, 0));
    }

    #[test]
    fn source_link_requires_repo() {
        let viewer = ChangeViewer::new(file("", ""), true);
        assert_eq!(
            viewer.source_link().as_deref(),
            Some("noq-templates/resources/aws/s3/logs.yaml")
        );

        let mut bare = file("", "");
        bare.repo_name = None;
        assert_eq!(ChangeViewer::new(bare, true).source_link(), None);
    }
}
