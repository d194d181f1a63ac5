//! Line-addressed instruction buffer
//!
//! Lines can be edited after they were emitted. A [`Mark`] names a line and
//! keeps pointing at it when other lines are spliced in above it.

/// Handle to a recorded line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

/// Growable list of owned instruction lines
#[derive(Debug, Default)]
pub struct InstrBuffer {
    lines: Vec<String>,
    /// Current line index of every mark, indexed by `Mark.0`
    marks: Vec<usize>,
}

impl InstrBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Push a line and remember where it is
    pub fn push_marked(&mut self, line: impl Into<String>) -> Mark {
        self.push(line);
        self.marks.push(self.lines.len() - 1);
        Mark(self.marks.len() - 1)
    }

    /// Current index of a marked line
    pub fn position(&self, mark: Mark) -> usize {
        self.marks[mark.0]
    }

    pub fn line(&self, mark: Mark) -> &str {
        &self.lines[self.position(mark)]
    }

    /// Append text to the end of a marked line
    pub fn append(&mut self, mark: Mark, text: &str) {
        let at = self.position(mark);
        self.lines[at].push_str(text);
    }

    /// Insert a line directly below a marked line, moving later marks down
    pub fn insert_after(&mut self, mark: Mark, line: impl Into<String>) {
        let at = self.position(mark) + 1;
        self.lines.insert(at, line.into());
        for pos in self.marks.iter_mut() {
            if *pos >= at {
                *pos += 1;
            }
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_moves_later_marks() {
        let mut buf = InstrBuffer::new();
        let header = buf.push_marked("(func $f");
        let block = buf.push_marked("(block $funcleave");
        buf.push("i32.const 1");

        buf.insert_after(header, "(local $x i32)");
        buf.insert_after(header, "(local $y i32)");

        assert_eq!(buf.position(header), 0);
        assert_eq!(buf.position(block), 3);
        assert_eq!(buf.line(block), "(block $funcleave");
        assert_eq!(
            buf.lines(),
            &["(func $f", "(local $y i32)", "(local $x i32)", "(block $funcleave", "i32.const 1"]
        );
    }

    #[test]
    fn test_append_to_marked_line() {
        let mut buf = InstrBuffer::new();
        buf.push("(module");
        let header = buf.push_marked("(func $f");
        buf.insert_after(header, "(local $x i32)");
        buf.append(header, " (result i32)");
        assert_eq!(buf.lines()[1], "(func $f (result i32)");
        assert_eq!(buf.len(), 3);
    }
}
