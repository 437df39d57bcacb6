use std::error;
use std::fmt;
use std::io;
use std::result;

/// A type alias for `Result<T, csvdialect::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// An error that can occur when reading or writing CSV data.
///
/// Parsing errors carry the 1-based physical line number at which they were
/// detected. I/O errors are propagated from the underlying reader or writer
/// without reinterpretation.
#[derive(Debug)]
pub enum Error {
    /// An I/O error that occurred while reading or writing CSV data.
    Io(io::Error),
    /// The input contained bytes that are not valid UTF-8.
    Utf8 {
        /// The line on which decoding failed.
        line: u64,
    },
    /// A quoted field was opened but the stream ended before an unescaped
    /// closing quote was found. This error is terminal: the reader that
    /// produced it keeps returning it rather than resume parsing.
    MalformedQuote {
        /// The line on which the quoted field started.
        line: u64,
    },
    /// The dialect configuration is unusable, either because a mutation
    /// would make its special characters collide or because the configured
    /// dialect cannot represent a value that was asked to be written.
    InvalidDialect(String),
    /// `read_all_rows` was called on a reader that has already produced
    /// tokens or rows. The one-pass row API is only available on a fresh
    /// reader.
    ReaderUsed,
    /// A by-name field lookup was attempted on a labeled reader that has
    /// no current row, either because no row has been fetched yet or
    /// because the data is exhausted.
    NoCurrentRow,
}

impl Error {
    /// Returns the line number attached to this error, if it has one.
    pub fn line(&self) -> Option<u64> {
        match *self {
            Error::Utf8 { line } | Error::MalformedQuote { line } => Some(line),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => err.fmt(f),
            Error::Utf8 { line } => {
                write!(f, "CSV parse error: invalid UTF-8 on line {}", line)
            }
            Error::MalformedQuote { line } => {
                write!(
                    f,
                    "CSV parse error: quoted field starting on line {} \
                     is never closed",
                    line
                )
            }
            Error::InvalidDialect(ref msg) => {
                write!(f, "invalid dialect configuration: {}", msg)
            }
            Error::ReaderUsed => {
                write!(
                    f,
                    "CSV error: cannot collect all rows after the reader \
                     has already produced tokens"
                )
            }
            Error::NoCurrentRow => {
                write!(
                    f,
                    "CSV error: no current row to look up fields in \
                     (fetch a row first)"
                )
            }
        }
    }
}
