use std::fs;
use std::io;
use std::path::Path;
use std::str;

use crate::dialect::Dialect;
use crate::error::{Error, Result};

const BUF_SIZE: usize = 1024 * 128;

/// One unit of parser output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    /// One field's decoded content and the 1-based physical line on which
    /// it started. A quoted field with embedded raw newlines spans several
    /// physical lines but is still a single `Value`.
    Value {
        /// The decoded field content.
        text: String,
        /// The line on which the field's first character was read.
        line: u64,
    },
    /// The body of a comment line: everything after the comment start
    /// character, with escape sequences decoded.
    Comment {
        /// The decoded comment content.
        text: String,
        /// The line the comment appeared on.
        line: u64,
    },
    /// The end of the input. Terminal: every subsequent call returns it
    /// again.
    EndOfStream,
}

/// The parser's position in the grammar. Dialect characters are looked up
/// fresh for every input character, so none of these states bake in the
/// configuration that was current when they were entered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    LineStart,
    UnquotedField,
    QuotedField,
    AfterClosingQuote,
    InComment,
    Eof,
}

/// A streaming CSV reader.
///
/// The reader pulls characters out of any `io::Read`, decodes them under
/// the current [`Dialect`] and produces [`Token`]s one at a time. It is
/// strictly forward-only and single-pass: there is no seeking and no way to
/// restart other than constructing a new reader.
///
/// The dialect is shared, not copied: mutations made through the handle
/// returned by [`dialect`](Reader::dialect) govern parsing from the next
/// character onward, even mid-stream.
///
/// # Example
///
/// ```
/// use csvdialect::Reader;
///
/// let mut rdr = Reader::from_string("a,\"b,c\"\nd,e\n");
/// let rows = rdr.read_all_rows().unwrap();
/// assert_eq!(rows, vec![vec!["a", "b,c"], vec!["d", "e"]]);
/// ```
#[derive(Debug)]
pub struct Reader<R> {
    rdr: R,
    dialect: Dialect,
    buf: Vec<u8>,
    bufi: usize,
    buflen: usize,
    peeked: Option<char>,
    state: State,
    /// The current physical line, 1-based. Incremented once per raw line
    /// terminator consumed, including terminators inside quoted fields.
    line: u64,
    /// The line the token currently being assembled started on.
    tok_line: u64,
    /// The line of the most recently returned token.
    last_line: u64,
    /// The line on which the most recent `Value` ended. Differs from its
    /// starting line only for quoted fields with embedded newlines.
    value_end_line: u64,
    /// One token of lookahead held back by `read_row` when it sees the
    /// first value of the next row.
    pending: Option<(Token, u64)>,
    /// Set when a quoted field hit end of input; the error is sticky.
    failed_at: Option<u64>,
    used: bool,
}

impl<R: io::Read> Reader<R> {
    /// Creates a reader over `rdr` with a fresh default dialect.
    pub fn from_reader(rdr: R) -> Reader<R> {
        Reader::from_reader_with(rdr, &Dialect::new())
    }

    /// Creates a reader over `rdr` sharing the given dialect. The reader
    /// keeps a handle, not a copy: later mutations through any handle are
    /// visible immediately.
    pub fn from_reader_with(rdr: R, dialect: &Dialect) -> Reader<R> {
        Reader {
            rdr,
            dialect: dialect.clone(),
            buf: vec![0; BUF_SIZE],
            bufi: 0,
            buflen: 0,
            peeked: None,
            state: State::LineStart,
            line: 1,
            tok_line: 1,
            last_line: 1,
            value_end_line: 1,
            pending: None,
            failed_at: None,
            used: false,
        }
    }
}

impl Reader<fs::File> {
    /// Creates a reader for the file at the given path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Reader<fs::File>> {
        Ok(Reader::from_reader(fs::File::open(path)?))
    }
}

impl Reader<io::Cursor<Vec<u8>>> {
    /// Creates a reader for an in-memory string.
    pub fn from_string<S: Into<String>>(s: S) -> Reader<io::Cursor<Vec<u8>>> {
        Reader::from_bytes(s.into().into_bytes())
    }

    /// Creates a reader for an in-memory buffer of bytes.
    pub fn from_bytes<V: Into<Vec<u8>>>(v: V) -> Reader<io::Cursor<Vec<u8>>> {
        Reader::from_reader(io::Cursor::new(v.into()))
    }
}

impl<R: io::Read> Reader<R> {
    /// Returns a handle to the dialect this reader parses under.
    pub fn dialect(&self) -> Dialect {
        self.dialect.clone()
    }

    /// The current physical line number, 1-based.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// The line number of the most recently returned token: the line its
    /// first character was read on.
    pub fn last_line(&self) -> u64 {
        self.last_line
    }

    /// Produces the next token: a field value, a comment, or
    /// [`Token::EndOfStream`].
    ///
    /// Unquoted fields are trimmed of unescaped leading and trailing spaces
    /// and tabs. Quoted content is taken verbatim, embedded raw newlines
    /// included. A line whose very first character is a comment start
    /// yields a [`Token::Comment`]; the same character after leading
    /// whitespace is ordinary field data.
    pub fn next_token(&mut self) -> Result<Token> {
        self.used = true;
        if let Some(line) = self.failed_at {
            return Err(Error::MalformedQuote { line });
        }
        let mut buf = String::new();
        // Bytes of `buf` below this mark came from escapes or quoted
        // content and are never trimmed as whitespace.
        let mut hard_len = 0;
        // True once the field has seen anything other than leading
        // whitespace; quoting is only recognized before this point.
        let mut seen_content = false;
        loop {
            match self.state {
                State::Eof => {
                    self.last_line = self.line;
                    return Ok(Token::EndOfStream);
                }
                State::LineStart => {
                    let c = match self.peek_char()? {
                        None => {
                            self.state = State::Eof;
                            continue;
                        }
                        Some(c) => c,
                    };
                    if is_term(c) {
                        // Blank physical lines produce no tokens.
                        self.next_char()?;
                        self.consume_term(c)?;
                    } else if self.dialect.is_comment_start(c) {
                        self.next_char()?;
                        self.tok_line = self.line;
                        self.state = State::InComment;
                    } else {
                        // Not consumed here; the field states read it.
                        self.tok_line = self.line;
                        self.state = State::UnquotedField;
                    }
                }
                State::InComment => {
                    let c = match self.next_char()? {
                        None => {
                            self.state = State::Eof;
                            return self.emit_comment(buf);
                        }
                        Some(c) => c,
                    };
                    if is_term(c) {
                        self.consume_term(c)?;
                        self.state = State::LineStart;
                        return self.emit_comment(buf);
                    } else if c == '\\' {
                        if !self.decode_escape(&mut buf)? {
                            buf.push('\\');
                        }
                    } else {
                        buf.push(c);
                    }
                }
                State::UnquotedField => {
                    let c = match self.next_char()? {
                        None => {
                            self.state = State::Eof;
                            let end = self.line;
                            return self.emit_value(buf, hard_len, end);
                        }
                        Some(c) => c,
                    };
                    if c == self.dialect.delimiter() {
                        let end = self.line;
                        return self.emit_value(buf, hard_len, end);
                    } else if is_term(c) {
                        let end = self.line;
                        self.consume_term(c)?;
                        self.state = State::LineStart;
                        return self.emit_value(buf, hard_len, end);
                    } else if c == '\\' {
                        if !self.decode_escape(&mut buf)? {
                            buf.push('\\');
                        }
                        hard_len = buf.len();
                        seen_content = true;
                    } else if !seen_content
                        && self.dialect.quoting_enabled()
                        && c == self.dialect.quote()
                    {
                        seen_content = true;
                        self.state = State::QuotedField;
                    } else if !seen_content && (c == ' ' || c == '\t') {
                        // Leading whitespace of an unquoted field is
                        // dropped.
                    } else {
                        buf.push(c);
                        seen_content = true;
                    }
                }
                State::QuotedField => {
                    let c = match self.next_char()? {
                        None => return self.fail_quote(),
                        Some(c) => c,
                    };
                    if c == '\\' {
                        if !self.decode_escape(&mut buf)? {
                            return self.fail_quote();
                        }
                    } else if c == self.dialect.quote() {
                        hard_len = buf.len();
                        self.state = State::AfterClosingQuote;
                    } else if is_term(c) {
                        // Raw newlines are content inside quotes, but
                        // still count as physical lines.
                        self.line += 1;
                        buf.push(c);
                        if c == '\r' {
                            if let Some('\n') = self.peek_char()? {
                                self.next_char()?;
                                buf.push('\n');
                            }
                        }
                    } else {
                        buf.push(c);
                    }
                }
                State::AfterClosingQuote => {
                    let c = match self.next_char()? {
                        None => {
                            self.state = State::Eof;
                            let end = self.line;
                            return self.emit_value(buf, hard_len, end);
                        }
                        Some(c) => c,
                    };
                    if c == self.dialect.delimiter() {
                        let end = self.line;
                        self.state = State::UnquotedField;
                        return self.emit_value(buf, hard_len, end);
                    } else if is_term(c) {
                        let end = self.line;
                        self.consume_term(c)?;
                        self.state = State::LineStart;
                        return self.emit_value(buf, hard_len, end);
                    } else if c == ' ' || c == '\t' {
                        // Padding after the closing quote is tolerated.
                    } else {
                        // A quoted segment immediately followed by bare
                        // text: keep accumulating into the same field.
                        self.unread(c);
                        self.state = State::UnquotedField;
                    }
                }
            }
        }
    }

    /// Returns the next row, skipping comment tokens, or `None` at end of
    /// stream.
    ///
    /// A row ends when the next value begins on a line later than the one
    /// on which the previous value ended, so a quoted field spanning
    /// several physical lines stays in its row, and a field starting on
    /// the line such a field ended on joins it.
    pub fn read_row(&mut self) -> Result<Option<Vec<String>>> {
        self.used = true;
        let mut row: Vec<String> = Vec::new();
        let mut prev_end = 0;
        loop {
            let (token, end) = match self.pending.take() {
                Some(pending) => pending,
                None => {
                    let token = self.next_token()?;
                    (token, self.value_end_line)
                }
            };
            match token {
                Token::Comment { .. } => {}
                Token::EndOfStream => {
                    return Ok(if row.is_empty() { None } else { Some(row) });
                }
                Token::Value { text, line } => {
                    if !row.is_empty() && line > prev_end {
                        self.pending = Some((Token::Value { text, line }, end));
                        return Ok(Some(row));
                    }
                    row.push(text);
                    prev_end = end;
                }
            }
        }
    }

    /// Drains the reader and returns every row. This is a one-pass
    /// convenience: it fails with [`Error::ReaderUsed`] if any token or row
    /// has already been consumed.
    pub fn read_all_rows(&mut self) -> Result<Vec<Vec<String>>> {
        if self.used {
            return Err(Error::ReaderUsed);
        }
        let mut rows = Vec::new();
        while let Some(row) = self.read_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Returns an iterator over rows. Iteration stops after the first
    /// error.
    pub fn rows(&mut self) -> Rows<R> {
        Rows { rdr: self, errored: false }
    }

    fn emit_value(
        &mut self,
        mut buf: String,
        hard_len: usize,
        end_line: u64,
    ) -> Result<Token> {
        while buf.len() > hard_len
            && (buf.ends_with(' ') || buf.ends_with('\t'))
        {
            buf.pop();
        }
        let line = self.tok_line;
        self.last_line = line;
        self.value_end_line = end_line;
        // The next field of the same row, if any, starts wherever the
        // stream is now.
        self.tok_line = self.line;
        Ok(Token::Value { text: buf, line })
    }

    fn emit_comment(&mut self, buf: String) -> Result<Token> {
        let line = self.tok_line;
        self.last_line = line;
        Ok(Token::Comment { text: buf, line })
    }

    fn fail_quote(&mut self) -> Result<Token> {
        let line = self.tok_line;
        self.failed_at = Some(line);
        Err(Error::MalformedQuote { line })
    }

    /// Decodes one backslash escape into `out`; the backslash itself has
    /// already been consumed. Returns false if the input ended right after
    /// it.
    ///
    /// `\\`, `\<delimiter>` and `\<quote>` decode to the character itself,
    /// as does any other non-alphanumeric character (including a raw line
    /// terminator, which stays in the value instead of ending the line). A
    /// letter decodes through the dialect's escape table when it has an
    /// entry; otherwise both the backslash and the letter are kept.
    fn decode_escape(&mut self, out: &mut String) -> Result<bool> {
        let c = match self.next_char()? {
            None => return Ok(false),
            Some(c) => c,
        };
        if is_term(c) {
            self.line += 1;
            out.push(c);
            if c == '\r' {
                if let Some('\n') = self.peek_char()? {
                    self.next_char()?;
                    out.push('\n');
                }
            }
        } else if c == '\\'
            || c == self.dialect.delimiter()
            || c == self.dialect.quote()
        {
            out.push(c);
        } else if let Some(decoded) = self.dialect.decode_escape(c) {
            out.push(decoded);
        } else if c.is_ascii_alphanumeric() {
            out.push('\\');
            out.push(c);
        } else {
            out.push(c);
        }
        Ok(true)
    }

    /// Consumes the rest of a line terminator whose first character `c`
    /// has already been read, counting `\r\n` as a single terminator.
    fn consume_term(&mut self, c: char) -> Result<()> {
        self.line += 1;
        if c == '\r' {
            if let Some('\n') = self.peek_char()? {
                self.next_char()?;
            }
        }
        Ok(())
    }

    fn peek_char(&mut self) -> Result<Option<char>> {
        if self.peeked.is_none() {
            self.peeked = self.next_char_raw()?;
        }
        Ok(self.peeked)
    }

    fn next_char(&mut self) -> Result<Option<char>> {
        match self.peeked.take() {
            Some(c) => Ok(Some(c)),
            None => self.next_char_raw(),
        }
    }

    fn unread(&mut self, c: char) {
        debug_assert!(self.peeked.is_none());
        self.peeked = Some(c);
    }

    fn next_char_raw(&mut self) -> Result<Option<char>> {
        if self.bufi == self.buflen && self.refill()? == 0 {
            return Ok(None);
        }
        let width = match utf8_width(self.buf[self.bufi]) {
            Some(width) => width,
            None => return Err(Error::Utf8 { line: self.line }),
        };
        while self.buflen - self.bufi < width {
            if self.refill()? == 0 {
                return Err(Error::Utf8 { line: self.line });
            }
        }
        let bytes = &self.buf[self.bufi..self.bufi + width];
        let c = match str::from_utf8(bytes).ok().and_then(|s| s.chars().next())
        {
            Some(c) => c,
            None => return Err(Error::Utf8 { line: self.line }),
        };
        self.bufi += width;
        Ok(Some(c))
    }

    fn refill(&mut self) -> Result<usize> {
        // At most 3 bytes of a split UTF-8 sequence are carried over.
        if self.bufi > 0 {
            self.buf.copy_within(self.bufi..self.buflen, 0);
            self.buflen -= self.bufi;
            self.bufi = 0;
        }
        let n = self.rdr.read(&mut self.buf[self.buflen..])?;
        self.buflen += n;
        Ok(n)
    }
}

fn is_term(c: char) -> bool {
    c == '\r' || c == '\n'
}

fn utf8_width(b: u8) -> Option<usize> {
    match b {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

/// An iterator over the rows of a [`Reader`], yielding
/// `Result<Vec<String>>`.
pub struct Rows<'r, R: 'r> {
    rdr: &'r mut Reader<R>,
    errored: bool,
}

impl<'r, R: io::Read> Iterator for Rows<'r, R> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Result<Vec<String>>> {
        if self.errored {
            return None;
        }
        match self.rdr.read_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(err) => {
                self.errored = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::dialect::Dialect;
    use crate::error::Error;

    use super::{Reader, Token};

    fn parse(data: &str, config: impl Fn(&Dialect)) -> Vec<Vec<String>> {
        let mut rdr = Reader::from_string(data);
        config(&rdr.dialect());
        rdr.read_all_rows().unwrap()
    }

    macro_rules! parses_to {
        ($name:ident, $data:expr, $expected:expr) => {
            parses_to!($name, $data, $expected, |_d: &Dialect| {});
        };
        ($name:ident, $data:expr, $expected:expr, $config:expr) => {
            #[test]
            fn $name() {
                let got = parse($data, $config);
                let expected: Vec<Vec<String>> = $expected
                    .iter()
                    .map(|row: &Vec<&str>| {
                        row.iter().map(|s| s.to_string()).collect()
                    })
                    .collect();
                assert_eq!(expected, got);
            }
        };
    }

    parses_to!(one_row_one_field, "a", vec![vec!["a"]]);
    parses_to!(one_row_many_fields, "a,b,c", vec![vec!["a", "b", "c"]]);
    parses_to!(one_row_trailing_comma, "a,b,", vec![vec!["a", "b", ""]]);
    parses_to!(one_row_lf, "a,b,c\n", vec![vec!["a", "b", "c"]]);
    parses_to!(one_row_crlf, "a,b,c\r\n", vec![vec!["a", "b", "c"]]);
    parses_to!(one_row_cr, "a,b,c\r", vec![vec!["a", "b", "c"]]);
    parses_to!(
        many_rows,
        "a,b\nx,y\n",
        vec![vec!["a", "b"], vec!["x", "y"]]
    );
    parses_to!(
        many_rows_crlf,
        "a,b\r\nx,y\r\n",
        vec![vec!["a", "b"], vec!["x", "y"]]
    );
    parses_to!(empty, "", Vec::new());
    parses_to!(blank_lines_only, "\n\n\n", Vec::new());
    parses_to!(
        blank_lines_interspersed,
        "\n\na,b\n\n\nx,y\n\n",
        vec![vec!["a", "b"], vec!["x", "y"]]
    );

    parses_to!(
        trims_whitespace,
        "field1,field2 ,    field3",
        vec![vec!["field1", "field2", "field3"]]
    );
    parses_to!(
        whitespace_only_field_is_empty,
        "a,   ,b",
        vec![vec!["a", "", "b"]]
    );
    parses_to!(inner_whitespace_kept, "a b ,c", vec![vec!["a b", "c"]]);

    parses_to!(quote_empty, "\"\"", vec![vec![""]]);
    parses_to!(quote_space, "\" \"", vec![vec![" "]]);
    parses_to!(quote_inner_space, "\" a \"", vec![vec![" a "]]);
    // Quoting is recognized after leading whitespace, which is discarded;
    // padding after the closing quote is skipped too.
    parses_to!(quote_padded, "  \"a\"  ,b", vec![vec!["a", "b"]]);
    parses_to!(
        quote_resume_bare_text,
        "\"a\"b,c",
        vec![vec!["ab", "c"]]
    );
    parses_to!(
        quote_mid_field_is_literal,
        "a\"b\"c",
        vec![vec!["a\"b\"c"]]
    );
    parses_to!(
        quote_embedded_newline,
        "\"a\nb\",c",
        vec![vec!["a\nb", "c"]]
    );
    parses_to!(
        quote_embedded_delimiter,
        ",\"a\",\",\t'\\\"\"",
        vec![vec!["", "a", ",\t'\""]]
    );
    parses_to!(
        quote_trailing_double_backslash,
        "\"test\\\\\",test",
        vec![vec!["test\\", "test"]]
    );
    parses_to!(
        quoting_disabled_quote_is_literal,
        "\"a\",b",
        vec![vec!["\"a\"", "b"]],
        |d: &Dialect| d.disable_quoting()
    );

    parses_to!(escaped_delimiter, "a\\,b,c", vec![vec!["a,b", "c"]]);
    parses_to!(escaped_backslash, "a\\\\b", vec![vec!["a\\b"]]);
    parses_to!(escaped_quote_unquoted, "\\\"a", vec![vec!["\"a"]]);
    parses_to!(unmapped_letter_kept, "a\\qb", vec![vec!["a\\qb"]]);
    parses_to!(
        mapped_letter_decodes,
        "a\\nb",
        vec![vec!["a\nb"]],
        |d: &Dialect| d.set_escapes(&[('n', '\n')]).unwrap()
    );
    parses_to!(
        escaped_whitespace_survives_trim,
        "a\\ \\ ,b",
        vec![vec!["a  ", "b"]]
    );
    parses_to!(
        escaped_newline_joins_lines,
        "a\\\nb,c",
        vec![vec!["a\nb", "c"]]
    );
    parses_to!(trailing_backslash_kept, "a\\", vec![vec!["a\\"]]);

    parses_to!(
        delimiter_tab,
        "a\tb",
        vec![vec!["a", "b"]],
        |d: &Dialect| d.set_delimiter('\t').unwrap()
    );
    parses_to!(
        quote_char_change,
        "zaz,b",
        vec![vec!["a", "b"]],
        |d: &Dialect| d.set_quote('z').unwrap()
    );
    // Swapping delimiter and quote requires an intermediate value, since
    // each mutation is validated against the other setting.
    parses_to!(
        delimiter_and_quote_swapped,
        ",a,\"b",
        vec![vec!["a", "b"]],
        |d: &Dialect| {
            d.set_delimiter(';').unwrap();
            d.set_quote(',').unwrap();
            d.set_delimiter('"').unwrap();
        }
    );
    parses_to!(
        multibyte_content,
        "héllo,日本\n\"é,ç\",x",
        vec![vec!["héllo", "日本"], vec!["é,ç", "x"]]
    );

    parses_to!(
        comment_lines_skipped_in_rows,
        "#one\na,b\n#two\nc,d\n",
        vec![vec!["a", "b"], vec!["c", "d"]],
        |d: &Dialect| d.set_comment_starts("#").unwrap()
    );
    parses_to!(
        comment_char_after_whitespace_is_data,
        "!comment\n !field1",
        vec![vec!["!field1"]],
        |d: &Dialect| d.set_comment_starts("#;!").unwrap()
    );

    // Row grouping: a quoted field spanning physical lines stays in its
    // row, and a field starting on the line it ended on joins it.
    parses_to!(
        multiline_field_row_grouping,
        "\"a\nb\",c\nd",
        vec![vec!["a\nb", "c"], vec!["d"]]
    );

    #[test]
    fn comment_tokens() {
        let mut rdr = Reader::from_string("!comment\n !field1");
        rdr.dialect().set_comment_starts("#;!").unwrap();
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Comment { text: "comment".to_string(), line: 1 }
        );
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "!field1".to_string(), line: 2 }
        );
        assert_eq!(rdr.next_token().unwrap(), Token::EndOfStream);
        assert_eq!(rdr.next_token().unwrap(), Token::EndOfStream);
    }

    #[test]
    fn comment_escaped_newline_decodes() {
        let mut rdr = Reader::from_string("#one\\ntwo\na,b\n");
        let dialect = rdr.dialect();
        dialect.set_comment_starts("#").unwrap();
        dialect.set_escapes(&[('n', '\n')]).unwrap();
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Comment { text: "one\ntwo".to_string(), line: 1 }
        );
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "a".to_string(), line: 2 }
        );
    }

    #[test]
    fn comment_body_not_trimmed() {
        let mut rdr = Reader::from_string("#  padded  \n");
        rdr.dialect().set_comment_starts("#").unwrap();
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Comment { text: "  padded  ".to_string(), line: 1 }
        );
    }

    #[test]
    fn line_numbers() {
        let mut rdr = Reader::from_string("a,b\n\"c\nd\",e\nf");
        assert_eq!(rdr.line(), 1);
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "a".to_string(), line: 1 }
        );
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "b".to_string(), line: 1 }
        );
        // The quoted field starts on line 2 and ends on line 3.
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "c\nd".to_string(), line: 2 }
        );
        assert_eq!(rdr.last_line(), 2);
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "e".to_string(), line: 3 }
        );
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "f".to_string(), line: 4 }
        );
        assert_eq!(rdr.last_line(), 4);
    }

    #[test]
    fn escaped_newline_still_counts_lines() {
        let mut rdr = Reader::from_string("a\\\nb,c");
        // The escaped terminator becomes content but advances the line
        // counter, so the next field starts on line 2.
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "a\nb".to_string(), line: 1 }
        );
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "c".to_string(), line: 2 }
        );
        assert_eq!(rdr.last_line(), 2);
    }

    #[test]
    fn crlf_counts_as_one_line() {
        let mut rdr = Reader::from_string("a\r\nb\r\nc");
        for expected in &[("a", 1), ("b", 2), ("c", 3)] {
            assert_eq!(
                rdr.next_token().unwrap(),
                Token::Value {
                    text: expected.0.to_string(),
                    line: expected.1,
                }
            );
        }
    }

    #[test]
    fn malformed_quote_is_terminal() {
        let mut rdr = Reader::from_string("a\n\"never closed");
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "a".to_string(), line: 1 }
        );
        match rdr.next_token() {
            Err(Error::MalformedQuote { line: 2 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        // The reader stays failed rather than resuming.
        match rdr.next_token() {
            Err(Error::MalformedQuote { line: 2 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn backslash_then_eof_in_quotes_is_malformed() {
        let mut rdr = Reader::from_string("\"abc\\");
        match rdr.next_token() {
            Err(Error::MalformedQuote { line: 1 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn read_all_rows_requires_fresh_reader() {
        let mut rdr = Reader::from_string("a,b\nc,d\n");
        rdr.next_token().unwrap();
        match rdr.read_all_rows() {
            Err(Error::ReaderUsed) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn mid_stream_delimiter_change() {
        let mut rdr = Reader::from_string("a,b;c\n");
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "a".to_string(), line: 1 }
        );
        rdr.dialect().set_delimiter(';').unwrap();
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "b".to_string(), line: 1 }
        );
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "c".to_string(), line: 1 }
        );
    }

    #[test]
    fn rows_iterator() {
        let mut rdr = Reader::from_string("a,b\nc,d\n");
        let rows: Vec<_> = rdr.rows().map(|r| r.unwrap()).collect();
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn rows_iterator_stops_after_error() {
        let mut rdr = Reader::from_string("a,b\n\"oops");
        let mut it = rdr.rows();
        assert!(it.next().map(|r| r.is_ok()).unwrap_or(false));
        assert!(it.next().map(|r| r.is_err()).unwrap_or(false));
        assert!(it.next().is_none());
    }

    #[test]
    fn invalid_utf8_reports_line() {
        let mut rdr = Reader::from_bytes(&b"ok\n\xff"[..]);
        assert_eq!(
            rdr.next_token().unwrap(),
            Token::Value { text: "ok".to_string(), line: 1 }
        );
        match rdr.next_token() {
            Err(Error::Utf8 { line: 2 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
