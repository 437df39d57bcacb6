use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};

/// The configuration governing one parse or print session: the delimiter,
/// the quote character, the comment start characters and the escape letter
/// table.
///
/// A `Dialect` is a cheap handle to shared, mutable state. Cloning it
/// produces another handle to the *same* configuration, which is how a
/// caller, a [`Reader`](crate::Reader) and a [`Writer`](crate::Writer) all
/// observe mutations at the same time. Both components re-read the dialect
/// for every character they process, so a mutation takes effect with the
/// next character and never retroactively.
///
/// Every mutator validates the whole configuration before committing it: a
/// failing call returns an error and leaves the dialect exactly as it was.
///
/// # Example
///
/// ```
/// use csvdialect::Dialect;
///
/// let dialect = Dialect::new();
/// dialect.set_delimiter(';').unwrap();
/// dialect.set_comment_starts("#").unwrap();
/// // The quote character is already `"`; making the delimiter collide
/// // with it fails and changes nothing.
/// assert!(dialect.set_delimiter('"').is_err());
/// assert_eq!(dialect.delimiter(), ';');
/// ```
#[derive(Clone, Debug)]
pub struct Dialect {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Clone, Debug)]
struct Inner {
    delimiter: char,
    quote: char,
    quoting: bool,
    comment_starts: Vec<char>,
    escapes: Vec<(char, char)>,
}

impl Default for Inner {
    fn default() -> Inner {
        Inner {
            delimiter: ',',
            quote: '"',
            quoting: true,
            comment_starts: vec![],
            escapes: vec![],
        }
    }
}

impl Default for Dialect {
    fn default() -> Dialect {
        Dialect::new()
    }
}

impl Dialect {
    /// Creates a dialect with the default configuration: comma delimiter,
    /// double quote, quoting enabled, no comment starts and an empty escape
    /// table.
    pub fn new() -> Dialect {
        Dialect { inner: Rc::new(RefCell::new(Inner::default())) }
    }

    /// The field delimiter. The default is `,`.
    pub fn delimiter(&self) -> char {
        self.inner.borrow().delimiter
    }

    /// The quote character. The default is `"`.
    pub fn quote(&self) -> char {
        self.inner.borrow().quote
    }

    /// Whether quoted fields are recognized when parsing and produced when
    /// printing.
    pub fn quoting_enabled(&self) -> bool {
        self.inner.borrow().quoting
    }

    /// The configured comment start characters, in the order they were
    /// given. The first one is the character the writer emits.
    pub fn comment_starts(&self) -> Vec<char> {
        self.inner.borrow().comment_starts.clone()
    }

    /// Returns true if `c` starts a comment when it is the first character
    /// of a physical line.
    pub fn is_comment_start(&self, c: char) -> bool {
        self.inner.borrow().comment_starts.contains(&c)
    }

    /// Looks up the character a backslash-prefixed `letter` decodes to,
    /// e.g. `'n'` to `'\n'` if so configured.
    pub fn decode_escape(&self, letter: char) -> Option<char> {
        self.inner
            .borrow()
            .escapes
            .iter()
            .find(|&&(l, _)| l == letter)
            .map(|&(_, c)| c)
    }

    /// The reverse direction of [`decode_escape`](Dialect::decode_escape):
    /// the letter that encodes `c`. The single table serves both the reader
    /// and the writer, which is what makes escaped output re-parseable.
    pub fn encode_escape(&self, c: char) -> Option<char> {
        self.inner
            .borrow()
            .escapes
            .iter()
            .find(|&&(_, d)| d == c)
            .map(|&(l, _)| l)
    }

    /// Sets the field delimiter.
    ///
    /// Fails if the delimiter would collide with the quote character, a
    /// comment start, an escape letter, or one of the structural characters
    /// (`\`, `\n`, `\r`).
    pub fn set_delimiter(&self, delimiter: char) -> Result<()> {
        self.try_update(|inner| inner.delimiter = delimiter)
    }

    /// Sets the quote character, with the same collision rules as
    /// [`set_delimiter`](Dialect::set_delimiter).
    pub fn set_quote(&self, quote: char) -> Result<()> {
        self.try_update(|inner| inner.quote = quote)
    }

    /// Sets the characters that start a comment line. Duplicates are
    /// dropped; the empty string disables comments. The first character is
    /// the one [`Writer::write_comment`](crate::Writer::write_comment)
    /// emits.
    pub fn set_comment_starts(&self, starts: &str) -> Result<()> {
        let mut chars: Vec<char> = Vec::new();
        for c in starts.chars() {
            if !chars.contains(&c) {
                chars.push(c);
            }
        }
        self.try_update(|inner| inner.comment_starts = chars)
    }

    /// Replaces the escape letter table. Each pair maps a letter to the
    /// literal character it decodes to, e.g. `('n', '\n')`.
    ///
    /// Letters must be ASCII alphanumeric, and the mapping must be
    /// injective in both directions so that encoding and decoding are exact
    /// inverses.
    pub fn set_escapes(&self, pairs: &[(char, char)]) -> Result<()> {
        let pairs = pairs.to_vec();
        self.try_update(|inner| inner.escapes = pairs)
    }

    /// Disables quoting. The quote character loses all special meaning when
    /// parsing, and the writer falls back to backslash escaping for every
    /// field that needs protection.
    pub fn disable_quoting(&self) {
        self.inner.borrow_mut().quoting = false;
    }

    /// Applies `f` to a copy of the configuration, validates the result and
    /// commits it only if validation passes.
    fn try_update(&self, f: impl FnOnce(&mut Inner)) -> Result<()> {
        let mut candidate = self.inner.borrow().clone();
        f(&mut candidate);
        validate(&candidate)?;
        *self.inner.borrow_mut() = candidate;
        Ok(())
    }
}

fn validate(inner: &Inner) -> Result<()> {
    let special = |c: char| -> Option<&'static str> {
        match c {
            '\\' => Some("the escape introducer `\\`"),
            '\n' | '\r' => Some("a line terminator"),
            _ => None,
        }
    };
    for &c in [inner.delimiter, inner.quote]
        .iter()
        .chain(inner.comment_starts.iter())
    {
        if let Some(what) = special(c) {
            return Err(Error::InvalidDialect(format!(
                "{} cannot be used as a delimiter, quote or comment start",
                what
            )));
        }
    }
    if inner.delimiter == inner.quote {
        return Err(Error::InvalidDialect(format!(
            "delimiter and quote are both {:?}",
            inner.delimiter
        )));
    }
    for &c in &inner.comment_starts {
        if c == inner.delimiter || c == inner.quote {
            return Err(Error::InvalidDialect(format!(
                "comment start {:?} collides with the delimiter or quote",
                c
            )));
        }
    }
    for (i, &(letter, _)) in inner.escapes.iter().enumerate() {
        if !letter.is_ascii_alphanumeric() {
            return Err(Error::InvalidDialect(format!(
                "escape letter {:?} is not ASCII alphanumeric",
                letter
            )));
        }
        if letter == inner.delimiter
            || letter == inner.quote
            || inner.comment_starts.contains(&letter)
        {
            return Err(Error::InvalidDialect(format!(
                "escape letter {:?} collides with the delimiter, quote or \
                 a comment start",
                letter
            )));
        }
        for &(other_letter, other_char) in &inner.escapes[i + 1..] {
            if other_letter == letter {
                return Err(Error::InvalidDialect(format!(
                    "escape letter {:?} is mapped twice",
                    letter
                )));
            }
            if other_char == inner.escapes[i].1 {
                return Err(Error::InvalidDialect(format!(
                    "character {:?} has two escape letters",
                    other_char
                )));
            }
        }
    }
    Ok(())
}
