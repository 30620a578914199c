//! Cursor and viewport over the visible text.
//!
//! The editor holds a copy of the replica's visible string plus a cursor
//! offset into it. It classifies raw key events, computes screen
//! coordinates from newlines and East-Asian widths, and redraws through
//! crossterm. All replica mutation happens in the engine; the editor only
//! ever receives the resulting text.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::cursor::MoveTo;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use unicode_width::UnicodeWidthChar;

/// How long a transient status message stays on screen.
const STATUS_TTL: Duration = Duration::from_secs(5);

/// A key event after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorEvent {
    Insert(char),
    Delete,
    CursorMove(isize, isize),
    Home,
    End,
    Save,
    Load,
    Quit,
}

/// Map a raw key event to editor events.
///
/// Tab expands to four spaces, so a single keystroke may classify into
/// several inserts.
pub fn classify(key: &KeyEvent) -> Vec<EditorEvent> {
    if key.kind != KeyEventKind::Press {
        return Vec::new();
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => vec![EditorEvent::Quit],
        KeyCode::Char('c') if ctrl => vec![EditorEvent::Quit],
        KeyCode::Char('s') if ctrl => vec![EditorEvent::Save],
        KeyCode::Char('l') if ctrl => vec![EditorEvent::Load],
        KeyCode::Char('b') if ctrl => vec![EditorEvent::CursorMove(-1, 0)],
        KeyCode::Char('f') if ctrl => vec![EditorEvent::CursorMove(1, 0)],
        KeyCode::Char('p') if ctrl => vec![EditorEvent::CursorMove(0, -1)],
        KeyCode::Char('n') if ctrl => vec![EditorEvent::CursorMove(0, 1)],
        KeyCode::Left => vec![EditorEvent::CursorMove(-1, 0)],
        KeyCode::Right => vec![EditorEvent::CursorMove(1, 0)],
        KeyCode::Up => vec![EditorEvent::CursorMove(0, -1)],
        KeyCode::Down => vec![EditorEvent::CursorMove(0, 1)],
        KeyCode::Home => vec![EditorEvent::Home],
        KeyCode::End => vec![EditorEvent::End],
        KeyCode::Backspace | KeyCode::Delete => vec![EditorEvent::Delete],
        KeyCode::Tab => vec![EditorEvent::Insert(' '); 4],
        KeyCode::Enter => vec![EditorEvent::Insert('\n')],
        KeyCode::Char(ch) if !ctrl => vec![EditorEvent::Insert(ch)],
        _ => Vec::new(),
    }
}

struct Status {
    text: String,
    shown_at: Instant,
}

/// The buffer view.
pub struct Editor {
    text: Vec<char>,
    cursor: usize,
    width: u16,
    height: u16,
    row_offset: usize,
    col_offset: usize,
    status: Option<Status>,
    users: String,
}

impl Editor {
    pub fn new(width: u16, height: u16) -> Self {
        Editor {
            text: Vec::new(),
            cursor: 0,
            width,
            height,
            row_offset: 0,
            col_offset: 0,
            status: None,
            users: String::new(),
        }
    }

    pub fn set_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
    }

    pub fn text(&self) -> String {
        self.text.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Replace the text, clamping the cursor into the new bounds.
    pub fn set_text(&mut self, text: &str) {
        self.text = text.chars().collect();
        self.cursor = self.cursor.min(self.text.len());
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.text.len());
    }

    /// Insert into the view at the cursor and advance past it.
    pub fn insert_char(&mut self, ch: char) {
        self.text.insert(self.cursor, ch);
        self.cursor += 1;
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(Status {
            text: text.into(),
            shown_at: Instant::now(),
        });
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status.as_ref().map(|s| s.text.as_str())
    }

    pub fn set_users(&mut self, users: String) {
        self.users = users;
    }

    pub fn users(&self) -> &str {
        &self.users
    }

    /// Move the cursor `dx` characters and `dy` lines. Vertical moves
    /// keep the column, snapping to the end of shorter lines.
    pub fn move_cursor(&mut self, dx: isize, dy: isize) {
        if dx != 0 {
            let moved = self.cursor as isize + dx;
            self.cursor = moved.clamp(0, self.text.len() as isize) as usize;
        }
        for _ in 0..dy.max(0) {
            self.move_down();
        }
        for _ in 0..(-dy).max(0) {
            self.move_up();
        }
    }

    /// Index of the first character of the line containing `index`.
    fn line_start(&self, index: usize) -> usize {
        self.text[..index]
            .iter()
            .rposition(|&c| c == '\n')
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Index of the newline ending the line containing `index`, or the
    /// end of the text.
    fn line_end(&self, index: usize) -> usize {
        self.text[index..]
            .iter()
            .position(|&c| c == '\n')
            .map(|i| index + i)
            .unwrap_or(self.text.len())
    }

    fn move_down(&mut self) {
        let start = self.line_start(self.cursor);
        let column = self.cursor - start;
        let end = self.line_end(self.cursor);
        if end == self.text.len() {
            // Already on the last line.
            self.cursor = self.text.len();
            return;
        }
        let next_start = end + 1;
        let next_end = self.line_end(next_start);
        self.cursor = (next_start + column).min(next_end);
    }

    fn move_up(&mut self) {
        let start = self.line_start(self.cursor);
        if start == 0 {
            // Already on the first line.
            self.cursor = 0;
            return;
        }
        let column = self.cursor - start;
        let prev_start = self.line_start(start - 1);
        let prev_end = start - 1;
        self.cursor = (prev_start + column).min(prev_end);
    }

    /// Screen coordinates of a text offset, 0-based, before viewport
    /// translation. Wide characters advance x by their display width.
    pub fn cursor_xy(&self, index: usize) -> (usize, usize) {
        let mut x = 0;
        let mut y = 0;
        for &ch in self.text.iter().take(index.min(self.text.len())) {
            if ch == '\n' {
                x = 0;
                y += 1;
            } else {
                x += ch.width().unwrap_or(1);
            }
        }
        (x, y)
    }

    fn scroll_to_cursor(&mut self) {
        let (x, y) = self.cursor_xy(self.cursor);
        let rows = self.text_rows();
        let cols = self.width.max(1) as usize;

        if y < self.row_offset {
            self.row_offset = y;
        } else if y >= self.row_offset + rows {
            self.row_offset = y + 1 - rows;
        }
        if x < self.col_offset {
            self.col_offset = x;
        } else if x >= self.col_offset + cols {
            self.col_offset = x + 1 - cols;
        }
    }

    /// Rows available for text; the bottom row is the status bar.
    fn text_rows(&self) -> usize {
        self.height.saturating_sub(1).max(1) as usize
    }

    /// Redraw the whole view.
    pub fn draw(&mut self, out: &mut impl Write) -> io::Result<()> {
        self.scroll_to_cursor();
        queue!(out, Clear(ClearType::All))?;

        let rows = self.text_rows();
        let cols = self.width.max(1) as usize;
        let (mut x, mut y) = (0usize, 0usize);
        for &ch in &self.text {
            if ch == '\n' {
                x = 0;
                y += 1;
                continue;
            }
            let w = ch.width().unwrap_or(1);
            let visible_row = y >= self.row_offset && y < self.row_offset + rows;
            let visible_col = x >= self.col_offset && x + w <= self.col_offset + cols;
            if visible_row && visible_col {
                queue!(
                    out,
                    MoveTo((x - self.col_offset) as u16, (y - self.row_offset) as u16),
                    Print(ch)
                )?;
            }
            x += w;
        }

        self.draw_status_line(out)?;

        let (cx, cy) = self.cursor_xy(self.cursor);
        queue!(
            out,
            MoveTo(
                cx.saturating_sub(self.col_offset) as u16,
                cy.saturating_sub(self.row_offset) as u16
            )
        )?;
        out.flush()
    }

    fn draw_status_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if let Some(status) = &self.status {
            if status.shown_at.elapsed() >= STATUS_TTL {
                self.status = None;
            }
        }
        let line = match &self.status {
            Some(status) => status.text.clone(),
            None => {
                let (x, y) = self.cursor_xy(self.cursor);
                let mut line = format!(
                    "x={x} y={y} cursor={} len={}",
                    self.cursor,
                    self.text.len()
                );
                if !self.users.is_empty() {
                    line.push_str("  [");
                    line.push_str(&self.users);
                    line.push(']');
                }
                line
            }
        };

        let row = self.height.saturating_sub(1);
        queue!(out, MoveTo(0, row))?;
        for ch in line.chars().take(self.width as usize) {
            queue!(out, Print(ch))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor_with(text: &str) -> Editor {
        let mut editor = Editor::new(80, 24);
        editor.set_text(text);
        editor
    }

    #[test]
    fn insert_char_advances_the_cursor() {
        let mut editor = Editor::new(80, 24);
        for ch in "hi".chars() {
            editor.insert_char(ch);
        }
        assert_eq!(editor.text(), "hi");
        assert_eq!(editor.cursor(), 2);

        editor.set_cursor(1);
        editor.insert_char('e');
        assert_eq!(editor.text(), "hei");
        assert_eq!(editor.cursor(), 2);
    }

    #[test]
    fn set_text_clamps_the_cursor() {
        let mut editor = editor_with("hello");
        editor.set_cursor(5);
        editor.set_text("hi");
        assert_eq!(editor.cursor(), 2);
    }

    #[test]
    fn horizontal_moves_stop_at_the_edges() {
        let mut editor = editor_with("ab");
        editor.move_cursor(-1, 0);
        assert_eq!(editor.cursor(), 0);
        editor.move_cursor(5, 0);
        assert_eq!(editor.cursor(), 2);
    }

    #[test]
    fn vertical_moves_keep_the_column() {
        let mut editor = editor_with("hello\nhi\nworld");
        editor.set_cursor(4); // column 4 of "hello"

        editor.move_cursor(0, 1);
        // "hi" is shorter; snap to its end (offset 6 + len 2).
        assert_eq!(editor.cursor(), 8);

        editor.move_cursor(0, 1);
        // Column carries over into "world".
        assert_eq!(editor.cursor(), 11);

        editor.move_cursor(0, -1);
        assert_eq!(editor.cursor(), 8);
    }

    #[test]
    fn vertical_moves_at_the_boundaries() {
        let mut editor = editor_with("one\ntwo");
        editor.set_cursor(1);
        editor.move_cursor(0, -1);
        assert_eq!(editor.cursor(), 0);

        editor.set_cursor(5);
        editor.move_cursor(0, 1);
        assert_eq!(editor.cursor(), editor.len());
    }

    #[test]
    fn cursor_xy_counts_newlines_and_wide_characters() {
        let editor = editor_with("ab\n界c");
        assert_eq!(editor.cursor_xy(0), (0, 0));
        assert_eq!(editor.cursor_xy(2), (2, 0));
        assert_eq!(editor.cursor_xy(3), (0, 1));
        // '界' is two columns wide.
        assert_eq!(editor.cursor_xy(4), (2, 1));
        assert_eq!(editor.cursor_xy(5), (3, 1));
    }

    #[test]
    fn viewport_follows_the_cursor() {
        let mut editor = Editor::new(10, 4);
        editor.set_text("a\nb\nc\nd\ne\nf");
        editor.set_cursor(editor.len());
        let mut sink = Vec::new();
        editor.draw(&mut sink).unwrap();
        // Five text lines, three visible rows: the top must have scrolled.
        assert_eq!(editor.row_offset, 3);
    }

    #[test]
    fn status_messages_expire() {
        let mut editor = editor_with("hi");
        editor.set_status("saved");
        assert_eq!(editor.status_text(), Some("saved"));

        editor.status = Some(Status {
            text: "old".into(),
            shown_at: Instant::now() - STATUS_TTL,
        });
        let mut sink = Vec::new();
        editor.draw(&mut sink).unwrap();
        assert_eq!(editor.status_text(), None);
    }

    #[test]
    fn classify_maps_the_documented_bindings() {
        let press = |code, modifiers| KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: crossterm::event::KeyEventState::NONE,
        };

        assert_eq!(
            classify(&press(KeyCode::Esc, KeyModifiers::NONE)),
            vec![EditorEvent::Quit]
        );
        assert_eq!(
            classify(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            vec![EditorEvent::Quit]
        );
        assert_eq!(
            classify(&press(KeyCode::Char('s'), KeyModifiers::CONTROL)),
            vec![EditorEvent::Save]
        );
        assert_eq!(
            classify(&press(KeyCode::Char('n'), KeyModifiers::CONTROL)),
            vec![EditorEvent::CursorMove(0, 1)]
        );
        assert_eq!(
            classify(&press(KeyCode::Tab, KeyModifiers::NONE)),
            vec![EditorEvent::Insert(' '); 4]
        );
        assert_eq!(
            classify(&press(KeyCode::Enter, KeyModifiers::NONE)),
            vec![EditorEvent::Insert('\n')]
        );
        assert_eq!(
            classify(&press(KeyCode::Backspace, KeyModifiers::NONE)),
            vec![EditorEvent::Delete]
        );
        assert_eq!(
            classify(&press(KeyCode::Char('q'), KeyModifiers::NONE)),
            vec![EditorEvent::Insert('q')]
        );

        // Key releases never classify.
        let release = KeyEvent {
            code: KeyCode::Char('a'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: crossterm::event::KeyEventState::NONE,
        };
        assert!(classify(&release).is_empty());
    }
}
