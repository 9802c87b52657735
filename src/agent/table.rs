//! Minimal delimited-text record reader for `preview_table`.
//!
//! Handles quoted fields with doubled quotes and embedded delimiters or line
//! breaks. Invalid UTF-8 is replaced rather than rejected.

use std::io::BufRead;

use crate::error::Result;

pub struct RecordReader<R> {
    inner: R,
    delimiter: char,
    line: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R, delimiter: char) -> Self {
        Self {
            inner,
            delimiter,
            line: Vec::new(),
        }
    }

    /// Reads the next non-blank record, or `None` at end of input.
    pub fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut started = false;

        loop {
            self.line.clear();
            if self.inner.read_until(b'\n', &mut self.line)? == 0 {
                if !started {
                    return Ok(None);
                }
                fields.push(field);
                return Ok(Some(fields));
            }

            let line = String::from_utf8_lossy(&self.line);
            if !started && is_blank(&line) {
                continue;
            }
            started = true;

            let mut chars = line.chars().peekable();
            while let Some(c) = chars.next() {
                if in_quotes {
                    if c == '"' {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            field.push('"');
                        } else {
                            in_quotes = false;
                        }
                    } else {
                        field.push(c);
                    }
                } else if c == '"' && field.is_empty() {
                    in_quotes = true;
                } else if c == self.delimiter {
                    fields.push(std::mem::take(&mut field));
                } else if c == '\n' {
                    fields.push(field);
                    return Ok(Some(fields));
                } else if c == '\r' && matches!(chars.peek(), Some('\n') | None) {
                    // line terminator
                } else {
                    field.push(c);
                }
            }

            if !in_quotes {
                fields.push(field);
                return Ok(Some(fields));
            }
        }
    }
}

fn is_blank(line: &str) -> bool {
    line.trim_end_matches(['\r', '\n']).is_empty()
}
