//! Source text bookkeeping for diagnostics.

/// One unit of declaration text with a precomputed line table.
///
/// Line numbers are 1-based everywhere, matching what C programmers expect
/// from diagnostics.
#[derive(Debug, Clone)]
pub struct SourceText {
    text: String,
    line_starts: Vec<u32>,
}

impl SourceText {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0u32];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        SourceText { text, line_starts }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// Line containing the given byte offset.
    pub fn line_of(&self, offset: u32) -> u32 {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line as u32 + 1,
            Err(line) => line as u32,
        }
    }

    /// Text of the given line, without its terminating newline and with
    /// surrounding whitespace trimmed, for use in error messages.
    pub fn line_text(&self, line: u32) -> &str {
        let line = line.max(1) - 1;
        let start = match self.line_starts.get(line as usize) {
            Some(&s) => s as usize,
            None => return "",
        };
        let end = self
            .line_starts
            .get(line as usize + 1)
            .map(|&e| e as usize)
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end_matches('\n').trim()
    }
}
