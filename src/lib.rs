/*!
This crate provides streaming CSV reading and writing under a mutable,
runtime-configurable dialect.

A [`Dialect`] bundles everything that makes one CSV flavor different from
another: the field delimiter, the quote character, the set of characters
that start comment lines, an escape letter table, and whether quoting is
recognized at all. It is a shared handle, so a [`Reader`], a [`Writer`] and
the caller can all hold it at once, and a mutation made mid-stream governs
the very next character processed.

Escaping is backslash-based rather than RFC 4180 quote doubling: `\\`
decodes to a backslash, a backslash before the delimiter or quote strips
its special meaning, and letters decode through the dialect's table (for
example `\n` to a line feed, when so configured). The [`Writer`] uses the
same table in reverse, which is what makes its output round-trip: printing
any values and parsing the result under the same dialect yields the values
back exactly.

# Reading

[`Reader`] streams [`Token`]s (field values, comments, end of stream), each
tagged with the 1-based line it started on. Row-level access sits on top:
[`read_row`](Reader::read_row), [`rows`](Reader::rows), and the one-pass
[`read_all_rows`](Reader::read_all_rows).

```
use csvdialect::Reader;

let data = "\
## population snapshot
name,pop
\"Dune, West\",1923
";
let mut rdr = Reader::from_string(data);
rdr.dialect().set_comment_starts("#").unwrap();
let rows = rdr.read_all_rows().unwrap();
assert_eq!(rows[1], vec!["Dune, West", "1923"]);
```

When the first row carries column names, [`LabeledReader`] adds lookup by
header:

```
use csvdialect::{LabeledReader, Reader};

let rdr = Reader::from_string("city,pop\nOslo,717710\n");
let mut labeled = LabeledReader::new(rdr).unwrap();
labeled.next_row().unwrap();
assert_eq!(labeled.field("pop").unwrap(), Some("717710"));
```

# Writing

[`Writer`] quotes or escapes exactly the fields that need it, so its output
is always re-parseable:

```
use csvdialect::{Reader, Writer};

let mut wtr = Writer::from_memory();
wtr.write_row(&["plain", "has,delim", " padded "]).unwrap();
assert_eq!(wtr.as_string(), "plain,\"has,delim\",\" padded \"\n");

let rows =
    Reader::from_string(wtr.as_string()).read_all_rows().unwrap();
assert_eq!(rows, vec![vec!["plain", "has,delim", " padded "]]);
```
*/

#![deny(missing_docs)]

pub use crate::dialect::Dialect;
pub use crate::error::{Error, Result};
pub use crate::labeled::LabeledReader;
pub use crate::reader::{Reader, Rows, Token};
pub use crate::writer::Writer;

mod dialect;
mod error;
mod labeled;
mod reader;
mod writer;
