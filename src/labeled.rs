use std::io;

use crate::error::{Error, Result};
use crate::reader::Reader;

/// A [`Reader`] adapter that treats the first row as column headers and
/// offers by-name field lookup on the current row.
///
/// Only the header list and the most recent row are held in memory; the
/// underlying data is still streamed.
///
/// # Example
///
/// ```
/// use csvdialect::{LabeledReader, Reader};
///
/// let rdr = Reader::from_string("name,age\nalice,34\nbob,29\n");
/// let mut labeled = LabeledReader::new(rdr).unwrap();
/// assert_eq!(labeled.headers(), ["name", "age"]);
///
/// labeled.next_row().unwrap();
/// assert_eq!(labeled.field("age").unwrap(), Some("34"));
/// assert_eq!(labeled.field("salary").unwrap(), None);
/// ```
#[derive(Debug)]
pub struct LabeledReader<R> {
    rdr: Reader<R>,
    headers: Vec<String>,
    current: Option<Vec<String>>,
}

impl<R: io::Read> LabeledReader<R> {
    /// Wraps `rdr`, immediately consuming its first row as the headers. An
    /// empty input yields an empty header list.
    pub fn new(mut rdr: Reader<R>) -> Result<LabeledReader<R>> {
        let headers = rdr.read_row()?.unwrap_or_default();
        Ok(LabeledReader { rdr, headers, current: None })
    }

    /// The column names read from the first row.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Advances to the next data row and returns it, or `None` when the
    /// data is exhausted. After `None`, [`field`](LabeledReader::field)
    /// reports there is no current row.
    pub fn next_row(&mut self) -> Result<Option<&[String]>> {
        self.current = self.rdr.read_row()?;
        Ok(self.current.as_deref())
    }

    /// Looks up a field of the current row by column name. Returns
    /// `Ok(None)` when the name is not a known header, or when the current
    /// row is too short to have that column. Fails with
    /// [`Error::NoCurrentRow`] when no row has been fetched yet or the data
    /// is exhausted, which is distinct from a missing column.
    pub fn field(&self, name: &str) -> Result<Option<&str>> {
        let row = match self.current.as_ref() {
            Some(row) => row,
            None => return Err(Error::NoCurrentRow),
        };
        let idx = match self.headers.iter().position(|h| h == name) {
            Some(idx) => idx,
            None => return Ok(None),
        };
        Ok(row.get(idx).map(|s| s.as_str()))
    }

    /// Returns the underlying reader, positioned after the last row
    /// consumed.
    pub fn into_inner(self) -> Reader<R> {
        self.rdr
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::reader::Reader;

    use super::LabeledReader;

    fn labeled(data: &str) -> LabeledReader<std::io::Cursor<Vec<u8>>> {
        LabeledReader::new(Reader::from_string(data)).unwrap()
    }

    #[test]
    fn headers_come_from_first_row() {
        let labeled = labeled("name,age\nalice,34\n");
        assert_eq!(labeled.headers(), ["name", "age"]);
    }

    #[test]
    fn lookup_by_name() {
        let mut labeled = labeled("name,age\nalice,34\nbob,29\n");
        assert_eq!(
            labeled.next_row().unwrap(),
            Some(&["alice".to_string(), "34".to_string()][..])
        );
        assert_eq!(labeled.field("name").unwrap(), Some("alice"));
        labeled.next_row().unwrap();
        assert_eq!(labeled.field("age").unwrap(), Some("29"));
    }

    #[test]
    fn unknown_header_is_none() {
        let mut labeled = labeled("name,age\nalice,34\n");
        labeled.next_row().unwrap();
        assert_eq!(labeled.field("salary").unwrap(), None);
    }

    #[test]
    fn short_row_is_none() {
        let mut labeled = labeled("name,age\nalice\n");
        labeled.next_row().unwrap();
        assert_eq!(labeled.field("age").unwrap(), None);
    }

    #[test]
    fn lookup_before_first_row_fails() {
        let labeled = labeled("name,age\nalice,34\n");
        match labeled.field("name") {
            Err(Error::NoCurrentRow) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn lookup_after_exhaustion_fails() {
        let mut labeled = labeled("name\nalice\n");
        labeled.next_row().unwrap();
        assert_eq!(labeled.next_row().unwrap(), None);
        match labeled.field("name") {
            Err(Error::NoCurrentRow) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn comments_skipped_for_headers() {
        let rdr = Reader::from_string("#generated\nname\nalice\n");
        rdr.dialect().set_comment_starts("#").unwrap();
        let mut labeled = LabeledReader::new(rdr).unwrap();
        assert_eq!(labeled.headers(), ["name"]);
        labeled.next_row().unwrap();
        assert_eq!(labeled.field("name").unwrap(), Some("alice"));
    }

    #[test]
    fn into_inner_resumes_where_it_left_off() {
        let mut labeled = labeled("name\nalice\nbob\n");
        labeled.next_row().unwrap();
        let mut rdr = labeled.into_inner();
        assert_eq!(rdr.read_row().unwrap().unwrap(), vec!["bob"]);
    }

    #[test]
    fn empty_input_has_no_headers() {
        let mut labeled = labeled("");
        assert!(labeled.headers().is_empty());
        assert_eq!(labeled.next_row().unwrap(), None);
    }
}
