//! Incremental reader of a top-level JSON array.
//!
//! Elements are cut out of the byte stream one at a time and decoded on
//! their own, so memory stays bounded by the largest element rather than
//! the whole changelog.

use std::io::{self, BufRead};

use serde_json::Value;

use crate::error::ChangeValidationError;

const NOT_AN_ARRAY: &str = "Change log should be a JSON array.";
const UTF8_BOM: [u8; 3] = [0xef, 0xbb, 0xbf];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Elements,
    Closed,
    Done,
}

/// Iterator over the elements of a JSON array read from `R`.
///
/// A structural error is yielded once and ends the iteration; an element
/// that is not valid JSON on its own does the same, since the reader cannot
/// resynchronize after it.
pub struct ArrayElements<R> {
    reader: R,
    state: State,
    index: usize,
}

impl<R: BufRead> ArrayElements<R> {
    /// Wraps `reader`; nothing is read until the first call to `next`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: State::Start,
            index: 0,
        }
    }

    /// Index of the element the next call to `next` yields.
    pub fn position(&self) -> usize {
        self.index
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        Ok(self.reader.fill_buf()?.first().copied())
    }

    fn bump(&mut self) {
        self.reader.consume(1);
    }

    fn skip_whitespace(&mut self) -> io::Result<Option<u8>> {
        while let Some(byte) = self.peek()? {
            if !byte.is_ascii_whitespace() {
                return Ok(Some(byte));
            }
            self.bump();
        }
        Ok(None)
    }

    fn skip_bom(&mut self) -> io::Result<()> {
        let buf = self.reader.fill_buf()?;
        if buf.starts_with(&UTF8_BOM) {
            self.reader.consume(UTF8_BOM.len());
        }
        Ok(())
    }

    /// Consumes the opening bracket; `false` when the array is empty.
    fn open(&mut self) -> Result<bool, ChangeValidationError> {
        self.skip_bom().map_err(io_error)?;
        if self.skip_whitespace().map_err(io_error)? != Some(b'[') {
            return Err(ChangeValidationError::new(NOT_AN_ARRAY));
        }
        self.bump();
        if self.skip_whitespace().map_err(io_error)? == Some(b']') {
            self.bump();
            return Ok(false);
        }
        Ok(true)
    }

    /// Cuts the raw bytes of the next value, leaving the separator unread.
    fn cut_value(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        while let Some(byte) = self.peek()? {
            if in_string {
                buf.push(byte);
                self.bump();
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                    if depth == 0 {
                        break;
                    }
                }
                continue;
            }
            match byte {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' if depth == 0 => break,
                b'}' | b']' => depth -= 1,
                b',' if depth == 0 => break,
                b if depth == 0 && b.is_ascii_whitespace() => break,
                _ => {}
            }
            buf.push(byte);
            self.bump();
            if depth == 0 && matches!(byte, b'}' | b']') {
                break;
            }
        }
        Ok(buf)
    }

    fn next_element(&mut self) -> Result<Value, ChangeValidationError> {
        let index = self.index;
        let raw = self.cut_value().map_err(io_error)?;
        let value = serde_json::from_slice(&raw).map_err(|err| {
            ChangeValidationError::with_cause(format!("changeSet[{index}] is not valid JSON: {err}."), err)
        })?;
        self.index += 1;

        match self.skip_whitespace().map_err(io_error)? {
            Some(b',') => self.bump(),
            Some(b']') => {
                self.bump();
                self.state = State::Closed;
            }
            Some(other) => {
                return Err(ChangeValidationError::new(format!(
                    "Change log is not valid JSON: expected ',' or ']' after changeSet[{index}], found '{}'.",
                    char::from(other)
                )));
            }
            None => {
                return Err(ChangeValidationError::new(
                    "Change log is not valid JSON: unexpected end of input, expected ']'.",
                ));
            }
        }
        Ok(value)
    }

    /// Only whitespace may follow the closing bracket.
    fn check_trailing(&mut self) -> Result<(), ChangeValidationError> {
        match self.skip_whitespace().map_err(io_error)? {
            None => Ok(()),
            Some(_) => Err(ChangeValidationError::new(
                "Change log is not valid JSON: trailing content after ']'.",
            )),
        }
    }
}

impl<R: BufRead> Iterator for ArrayElements<R> {
    type Item = Result<Value, ChangeValidationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Start {
            match self.open() {
                Ok(true) => self.state = State::Elements,
                Ok(false) => self.state = State::Closed,
                Err(err) => {
                    self.state = State::Done;
                    return Some(Err(err));
                }
            }
        }
        if self.state == State::Closed {
            self.state = State::Done;
            return self.check_trailing().err().map(Err);
        }
        if self.state == State::Done {
            return None;
        }
        let element = self.next_element();
        if element.is_err() {
            self.state = State::Done;
        }
        Some(element)
    }
}

fn io_error(err: io::Error) -> ChangeValidationError {
    ChangeValidationError::with_cause(format!("Change log could not be read: {err}."), err)
}
