//! Line splitting, byte order marks and oversized lines.

use ironcsv::io::{Encoding, LineReader};
use std::io::Cursor;

fn reader(data: &[u8], capacity: usize) -> LineReader {
    LineReader::new(Box::new(Cursor::new(data.to_vec())), capacity)
}

fn collect(mut r: LineReader) -> Vec<String> {
    let mut out = Vec::new();
    while !r.eos() {
        if let Some(line) = r.read_line() {
            out.push(String::from_utf8_lossy(line).into_owned());
        }
    }
    out
}

#[test]
fn lines_keep_their_terminators() {
    let r = reader(b"a,b\r\nc,d\nlast", 64);
    assert_eq!(r.encoding(), Encoding::Plain);
    assert_eq!(collect(r), vec!["a,b\r\n", "c,d\n", "last"]);
}

#[test]
fn utf8_bom_is_skipped() {
    let r = reader(b"\xef\xbb\xbfname\nx\n", 64);
    assert_eq!(r.encoding(), Encoding::Utf8Bom);
    assert_eq!(collect(r), vec!["name\n", "x\n"]);
}

#[test]
fn utf16_is_narrowed_lossily() {
    let mut be = vec![0xfe, 0xff];
    for unit in "h\u{e9}\u{263a}\n".encode_utf16() {
        be.extend_from_slice(&unit.to_be_bytes());
    }
    let mut r = reader(&be, 64);
    assert_eq!(r.encoding(), Encoding::Utf16Be);
    // U+00E9 has a zero high byte and survives as 0xE9, U+263A becomes '?'
    assert_eq!(r.read_line(), Some(&b"h\xe9?\n"[..]));

    let mut le = vec![0xff, 0xfe];
    for unit in "ab\ncd".encode_utf16() {
        le.extend_from_slice(&unit.to_le_bytes());
    }
    let r = reader(&le, 64);
    assert_eq!(r.encoding(), Encoding::Utf16Le);
    assert_eq!(collect(r), vec!["ab\n", "cd"]);
}

#[test]
fn oversized_line_is_dropped_and_reader_resyncs() {
    let mut r = reader(b"0123456789abcdef\nok\nfine\n", 8);
    assert_eq!(r.read_line(), None);
    assert!(!r.eos());
    assert_eq!(r.read_line(), Some(&b"ok\n"[..]));
    assert_eq!(r.read_line(), Some(&b"fine\n"[..]));
    assert_eq!(r.read_line(), None);
    assert!(r.eos());
}

#[test]
fn line_exactly_filling_the_buffer_is_returned() {
    let r = reader(b"1234567\nab\n", 8);
    assert_eq!(collect(r), vec!["1234567\n", "ab\n"]);
}

#[test]
fn empty_source_is_immediately_exhausted() {
    let mut r = reader(b"", 16);
    assert!(r.eos());
    assert_eq!(r.read_line(), None);
}
