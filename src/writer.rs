use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::str;

use memchr::{memchr2, memchr3};

use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// A CSV writer whose output always re-parses to the values it was given.
///
/// Fields that contain nothing special are written verbatim. Anything the
/// parser would misread — the delimiter, the quote character, a backslash, a
/// line terminator, leading or trailing whitespace, or a comment start at
/// the head of a row — gets the field quoted, or backslash-escaped when
/// quoting is disabled in the [`Dialect`].
///
/// The writer shares its dialect the same way the reader does: mutations
/// through any handle affect the very next field written.
///
/// # Example
///
/// ```
/// use csvdialect::Writer;
///
/// let mut wtr = Writer::from_memory();
/// wtr.write_row(&["a", "b,c"]).unwrap();
/// assert_eq!(wtr.as_string(), "a,\"b,c\"\n");
/// ```
#[derive(Debug)]
pub struct Writer<W: io::Write> {
    wtr: io::BufWriter<W>,
    dialect: Dialect,
    term: String,
}

impl<W: io::Write> Writer<W> {
    /// Creates a writer over `wtr` with a fresh default dialect.
    pub fn from_writer(wtr: W) -> Writer<W> {
        Writer::from_writer_with(wtr, &Dialect::new())
    }

    /// Creates a writer over `wtr` sharing the given dialect.
    pub fn from_writer_with(wtr: W, dialect: &Dialect) -> Writer<W> {
        Writer {
            wtr: io::BufWriter::new(wtr),
            dialect: dialect.clone(),
            term: "\n".to_string(),
        }
    }

    /// Sets the string written at the end of every row and comment. The
    /// default is `"\n"`.
    ///
    /// Output only re-parses to the written values when this is `"\n"`,
    /// `"\r"` or `"\r\n"`; any other string is for sinks whose output is
    /// not fed back through a [`Reader`](crate::Reader).
    pub fn terminator<S: Into<String>>(mut self, term: S) -> Writer<W> {
        self.term = term.into();
        self
    }
}

impl Writer<fs::File> {
    /// Creates a writer for the file at the given path, truncating it if it
    /// exists.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Writer<fs::File>> {
        Ok(Writer::from_writer(fs::File::create(path)?))
    }
}

impl Writer<Vec<u8>> {
    /// Creates a writer that accumulates into memory. Retrieve the output
    /// with [`as_string`](Writer::as_string) or
    /// [`as_bytes`](Writer::as_bytes).
    pub fn from_memory() -> Writer<Vec<u8>> {
        Writer::from_writer(Vec::with_capacity(1024 * 64))
    }

    /// Like [`from_memory`](Writer::from_memory), sharing the given
    /// dialect.
    pub fn from_memory_with(dialect: &Dialect) -> Writer<Vec<u8>> {
        Writer::from_writer_with(Vec::with_capacity(1024 * 64), dialect)
    }

    /// Returns everything written so far as raw bytes.
    pub fn as_bytes(&mut self) -> &[u8] {
        match self.wtr.flush() {
            Ok(()) => self.wtr.get_ref(),
            Err(err) => panic!("error flushing to memory buffer: {}", err),
        }
    }

    /// Returns everything written so far as a string.
    pub fn as_string(&mut self) -> &str {
        match str::from_utf8(self.as_bytes()) {
            Ok(s) => s,
            Err(err) => panic!("memory buffer is not valid UTF-8: {}", err),
        }
    }
}

impl<W: io::Write> Writer<W> {
    /// Returns a handle to the dialect this writer encodes under.
    pub fn dialect(&self) -> Dialect {
        self.dialect.clone()
    }

    /// Writes one row. Each field is encoded so the parser gives it back
    /// exactly; an empty iterator writes a blank line.
    ///
    /// A row of exactly one empty field is written as a quoted empty string
    /// rather than a blank line, since blank lines parse to nothing. With
    /// quoting disabled that row has no representation and the call fails
    /// with [`Error::InvalidDialect`].
    pub fn write_row<I, S>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut count = 0;
        let mut last_empty = false;
        for field in row {
            let field = field.as_ref();
            if count > 0 {
                self.write_char(self.dialect.delimiter())?;
            }
            self.write_field(field, count == 0)?;
            last_empty = field.is_empty();
            count += 1;
        }
        if count == 1 && last_empty {
            // The lone empty field wrote no bytes, so the quoted form can
            // still be emitted here.
            if !self.dialect.quoting_enabled() {
                return Err(Error::InvalidDialect(
                    "a row holding a single empty field cannot be written \
                     with quoting disabled"
                        .to_string(),
                ));
            }
            let quote = self.dialect.quote();
            self.write_char(quote)?;
            self.write_char(quote)?;
        }
        self.wtr.write_all(self.term.as_bytes())?;
        Ok(())
    }

    /// Writes a comment line: the first configured comment start character,
    /// the escaped text, and a terminator. Fails with
    /// [`Error::InvalidDialect`] when no comment start is configured, or
    /// when the text contains a raw line terminator with no escape letter
    /// mapped to it.
    pub fn write_comment(&mut self, text: &str) -> Result<()> {
        let start = match self.dialect.comment_starts().first() {
            Some(&c) => c,
            None => {
                return Err(Error::InvalidDialect(
                    "no comment start character is configured".to_string(),
                ));
            }
        };
        let mut out = String::with_capacity(text.len() + 1);
        out.push(start);
        for c in text.chars() {
            if c == '\r' || c == '\n' {
                out.push('\\');
                out.push(self.escape_letter_for(c)?);
            } else if c == '\\' {
                out.push('\\');
                out.push('\\');
            } else {
                out.push(c);
            }
        }
        out.push_str(&self.term);
        self.wtr.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Writes just a line terminator. The parser produces no tokens for the
    /// resulting blank line.
    pub fn write_blank_line(&mut self) -> Result<()> {
        self.wtr.write_all(self.term.as_bytes())?;
        Ok(())
    }

    /// Flushes buffered output to the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.wtr.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.wtr.into_inner().map_err(|err| Error::Io(err.into_error()))
    }

    fn write_field(&mut self, field: &str, first_in_row: bool) -> Result<()> {
        if !self.needs_encoding(field, first_in_row) {
            self.wtr.write_all(field.as_bytes())?;
        } else if self.dialect.quoting_enabled() {
            self.write_quoted(field)?;
        } else {
            let out = self.escape_field(field, first_in_row)?;
            self.wtr.write_all(out.as_bytes())?;
        }
        Ok(())
    }

    /// True if writing `field` verbatim would not re-parse to `field`.
    fn needs_encoding(&self, field: &str, first_in_row: bool) -> bool {
        if field.starts_with(' ')
            || field.starts_with('\t')
            || field.ends_with(' ')
            || field.ends_with('\t')
        {
            // The parser trims unquoted leading and trailing whitespace.
            return true;
        }
        if first_in_row {
            if let Some(c) = field.chars().next() {
                if self.dialect.is_comment_start(c) {
                    // The whole line would parse as a comment.
                    return true;
                }
            }
        }
        let delimiter = self.dialect.delimiter();
        let quote = self.dialect.quote();
        if delimiter.is_ascii() && quote.is_ascii() {
            let bytes = field.as_bytes();
            memchr3(delimiter as u8, quote as u8, b'\\', bytes).is_some()
                || memchr2(b'\r', b'\n', bytes).is_some()
        } else {
            field.chars().any(|c| {
                c == delimiter
                    || c == quote
                    || c == '\\'
                    || c == '\r'
                    || c == '\n'
            })
        }
    }

    /// Quoted rendition: delimiters, whitespace and raw line terminators
    /// are safe inside quotes; only the quote character and the backslash
    /// need a backslash in front.
    fn write_quoted(&mut self, field: &str) -> Result<()> {
        let quote = self.dialect.quote();
        let mut out = String::with_capacity(field.len() + 2);
        out.push(quote);
        for c in field.chars() {
            if c == quote || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push(quote);
        self.wtr.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Escaped rendition for disabled quoting. Built fully before any byte
    /// is written, so a field with no valid rendition fails without
    /// emitting a corrupt prefix.
    fn escape_field(
        &self,
        field: &str,
        first_in_row: bool,
    ) -> Result<String> {
        let delimiter = self.dialect.delimiter();
        let quote = self.dialect.quote();
        let chars: Vec<char> = field.chars().collect();
        let is_ws = |c: char| c == ' ' || c == '\t';
        let lead = chars.iter().take_while(|&&c| is_ws(c)).count();
        let trail = if lead == chars.len() {
            0
        } else {
            chars.iter().rev().take_while(|&&c| is_ws(c)).count()
        };
        let mut out = String::with_capacity(field.len());
        for (i, &c) in chars.iter().enumerate() {
            if c == '\r' || c == '\n' {
                // No quotes to hide a raw terminator in: it must go
                // through the escape letter table.
                out.push('\\');
                out.push(self.escape_letter_for(c)?);
            } else if c == '\\'
                || c == delimiter
                || c == quote
                || i < lead
                || i >= chars.len() - trail
                || (first_in_row
                    && i == 0
                    && self.dialect.is_comment_start(c))
            {
                out.push('\\');
                out.push(c);
            } else {
                out.push(c);
            }
        }
        Ok(out)
    }

    fn escape_letter_for(&self, c: char) -> Result<char> {
        match self.dialect.encode_escape(c) {
            Some(letter) => Ok(letter),
            None => Err(Error::InvalidDialect(format!(
                "cannot write {:?} here: no escape letter is mapped to it",
                c
            ))),
        }
    }

    fn write_char(&mut self, c: char) -> Result<()> {
        let mut buf = [0; 4];
        self.wtr.write_all(c.encode_utf8(&mut buf).as_bytes())?;
        Ok(())
    }
}
