//! Field splitting, quoting and row level failures, checked against the
//! `csv` crate where the input is well formed.

use anyhow::Result;
use ironcsv::config::ReaderOptions;
use ironcsv::error::CsvError;
use ironcsv::io::{CsvReader, escape_csv_field, unescape_csv_field};
use std::io::Cursor;

fn reader(data: &str, opts: &ReaderOptions) -> CsvReader {
    CsvReader::from_reader("test", Box::new(Cursor::new(data.as_bytes().to_vec())), opts)
}

fn all_rows(data: &str, opts: &ReaderOptions) -> Result<Vec<Vec<String>>> {
    let mut rdr = reader(data, opts);
    let mut rows = Vec::new();
    while let Some(mut row) = rdr.next_row() {
        rows.push(row.parse_line()?);
    }
    Ok(rows)
}

fn oracle(data: &str) -> Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data.as_bytes());
    let mut rows = Vec::new();
    for record in rdr.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

const WELL_FORMED: &str = "id,text,n\n\
1,\"hello, world\",3\n\
2,\"say \"\"hi\"\"\",4\n\
3,\"multi\nline\",5\n\
4,,6\n\
5,plain,\"\"\n";

#[test]
fn matches_csv_crate_on_well_formed_input() -> Result<()> {
    let ours = all_rows(WELL_FORMED, &ReaderOptions::default())?;
    assert_eq!(ours, oracle(WELL_FORMED)?);
    assert_eq!(ours.len(), 6);
    Ok(())
}

#[test]
fn separators_inside_quotes_do_not_split() -> Result<()> {
    let mut rdr = reader("a,\"b,c\",d,\"e,,f\"\n", &ReaderOptions::default());
    let mut row = rdr.next_row().expect("one row");
    let mut count = 0;
    while let Some(field) = row.read_csv_field() {
        field?;
        count += 1;
    }
    assert_eq!(count, 4);
    Ok(())
}

#[test]
fn multi_line_field_consumes_exactly_the_needed_lines() -> Result<()> {
    let data = "k,v\nx,\"one\ntwo\nthree\"\ny,after\n";
    let mut rdr = reader(data, &ReaderOptions::default());
    assert!(rdr.fetch_line());

    let mut row = rdr.next_row().expect("multi-line row");
    let key = row.read_csv_field().expect("key")?;
    assert_eq!(row.get(key), b"x");
    let value = row.read_csv_field().expect("value")?;
    assert_eq!(&*row.unescape(value), b"one\ntwo\nthree");
    // earlier spans stay valid after the row was extended
    assert_eq!(row.get(key), b"x");
    assert!(row.read_csv_field().is_none());
    assert_eq!(row.line_number(), 4);

    let mut row = rdr.next_row().expect("row after");
    assert_eq!(row.parse_line()?, vec!["y", "after"]);
    assert!(rdr.next_row().is_none());
    Ok(())
}

#[test]
fn custom_separator_and_quote() -> Result<()> {
    let opts = ReaderOptions::default().with_separator(b';').with_quote(b'\'');
    let rows = all_rows("a;'b;c';'it''s'\n", &opts)?;
    assert_eq!(rows, vec![vec!["a", "b;c", "it's"]]);
    Ok(())
}

#[test]
fn quote_syntax_error_is_recoverable() {
    let mut rdr = reader("\"ab\"x,c\nnext\n", &ReaderOptions::default());
    let mut row = rdr.next_row().expect("row");
    let err = row.parse_line().unwrap_err();
    assert!(matches!(err, CsvError::QuoteSyntax { found: 'x', .. }));
    assert!(err.is_recoverable());

    let mut row = rdr.next_row().expect("reader keeps going");
    assert_eq!(row.parse_line().unwrap(), vec!["next"]);
}

#[test]
fn row_too_long_fails_the_reader() {
    let opts = ReaderOptions::default().with_max_row_len(16);
    let mut rdr = reader("a,\"0123456789\n0123456789\"\nnext\n", &opts);
    let mut row = rdr.next_row().expect("row");
    let err = row.parse_line().unwrap_err();
    assert!(matches!(err, CsvError::RowTooLong { .. }));
    assert!(!err.is_recoverable());
    assert!(rdr.fatal_error().is_some());
    assert!(rdr.next_row().is_none());
    assert!(rdr.eos());
}

#[test]
fn unterminated_quote_at_end_of_input() {
    let opts = ReaderOptions::default().with_max_row_len(16);
    let mut rdr = reader("a,\"b,c\n", &opts);
    let mut row = rdr.next_row().expect("row");
    let first = row.read_csv_field().expect("first field").unwrap();
    assert_eq!(row.get(first), b"a");
    let err = row.read_csv_field().expect("second field").unwrap_err();
    assert!(matches!(err, CsvError::UnterminatedQuote { .. }));
    assert!(rdr.next_row().is_none());
}

#[test]
fn escape_and_unescape_are_inverse() {
    for s in ["plain", "with,comma", "say \"hi\"", "\"", "line\nbreak", " x "] {
        let escaped = escape_csv_field(s.as_bytes(), b'"');
        assert_eq!(&*unescape_csv_field(&escaped, b'"'), s.as_bytes(), "{s:?}");
    }
}

#[test]
fn empty_value_escapes_to_nothing() {
    // the empty value is written unquoted, so it cannot be told apart from a quoted empty field
    assert_eq!(escape_csv_field(b"", b'"'), b"");
    assert_eq!(&*unescape_csv_field(b"\"\"", b'"'), b"");
    assert_eq!(&*unescape_csv_field(b"", b'"'), b"");
}

#[test]
fn blank_lines_and_crlf() -> Result<()> {
    let rows = all_rows("a,b\r\n\r\nc,d\r\n", &ReaderOptions::default())?;
    assert_eq!(rows, vec![vec!["a", "b"], vec![""], vec!["c", "d"]]);
    Ok(())
}
