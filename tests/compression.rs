#[cfg(feature = "compression-gzip")]
mod gzip_tests {
    use anyhow::Result;
    use flate2::Compression;
    use flate2::read::GzDecoder;
    use flate2::write::GzEncoder;
    use ironcsv::config::{EngineOptions, ReaderOptions};
    use ironcsv::engine::{AggregSpec, Aggregation};
    use ironcsv::error::AggregError;
    use ironcsv::io::compression::{CompressionCodec, detect_from_extension, detect_from_magic};
    use ironcsv::io::{CsvReader, Input};
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn gzip(data: &[u8]) -> Result<Vec<u8>> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data)?;
        Ok(enc.finish()?)
    }

    #[test]
    fn detects_gzip() {
        assert_eq!(detect_from_magic(&[0x1f, 0x8b, 8, 0]).map(|c| c.name()), Some("gzip"));
        assert!(detect_from_magic(b"name,score").is_none());
        assert_eq!(detect_from_extension("out.CSV.GZ").map(|c| c.name()), Some("gzip"));
    }

    #[test]
    fn gzip_input_is_read_transparently() -> Result<()> {
        let dir = TempDir::new()?;
        // the extension says nothing, the content decides
        let path = dir.path().join("scores.dat");
        std::fs::write(&path, gzip(b"name,score\nalice,3\nbob,5\nalice,7\n")?)?;

        let mut rdr = CsvReader::open(&Input::from(path.as_path()), &ReaderOptions::default())?;
        assert_eq!(rdr.compression(), Some("gzip"));
        let mut rows = Vec::new();
        while let Some(mut row) = rdr.next_row() {
            rows.push(row.parse_line()?);
        }
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3], vec!["alice", "7"]);
        Ok(())
    }

    #[test]
    fn trailing_bytes_after_the_stream_are_ignored() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("trailing.csv.gz");
        let mut bytes = gzip(b"k,v\na,1\n")?;
        bytes.extend_from_slice(b"not gzip at all");
        std::fs::write(&path, bytes)?;

        let mut engine = Aggregation::new(AggregSpec::parse("k,count()")?, EngineOptions::default());
        let summary = engine.aggregate(&Input::from(path.as_path()))?;
        assert_eq!(summary.compression, Some("gzip"));
        assert_eq!(summary.rows_folded, 1);
        Ok(())
    }

    #[test]
    fn gz_output_is_compressed() -> Result<()> {
        let dir = TempDir::new()?;
        let input = dir.path().join("in.csv");
        std::fs::write(&input, "k\na\nb\na\n")?;
        let out = dir.path().join("out.csv.gz");

        let mut engine = Aggregation::new(AggregSpec::parse("k,count()")?, EngineOptions::default());
        engine.aggregate(&Input::from(input.as_path()))?;
        assert_eq!(engine.write_output(Some(out.as_path()))?, 2);

        let mut text = String::new();
        GzDecoder::new(std::fs::File::open(&out)?).read_to_string(&mut text)?;
        assert!(text.starts_with("\"k\",\"count()\"\r\n"));
        assert!(text.contains("\"a\",2\r\n"));
        assert!(text.contains("\"b\",1\r\n"));
        Ok(())
    }

    #[test]
    fn truncated_stream_fails_the_file() -> Result<()> {
        let dir = TempDir::new()?;
        let mut data = String::from("k,v\n");
        for i in 0..20_000u64 {
            data.push_str(&format!("key{},{}\n", i % 97, i.wrapping_mul(7919) % 100_003));
        }
        let bytes = gzip(data.as_bytes())?;
        let path = dir.path().join("cut.csv.gz");
        std::fs::write(&path, &bytes[..bytes.len() / 2])?;

        let mut engine = Aggregation::new(AggregSpec::parse("k,count()")?, EngineOptions::default());
        let err = engine
            .aggregate(&Input::from(path.as_path()))
            .expect_err("a truncated stream must not count as complete");
        assert!(matches!(err, AggregError::Read { .. }), "{err}");
        assert!(!err.is_fatal());

        let stats = engine.stats();
        assert_eq!((stats.files_ok, stats.files_failed), (0, 1));
        assert!(stats.rows_folded < 20_000);
        Ok(())
    }
}

/// Aggregate a compressed input, write the result through the same codec and
/// read it back by magic bytes alone.
#[cfg(any(
    feature = "compression-zstd",
    feature = "compression-bzip2",
    feature = "compression-xz"
))]
mod codec_round_trip {
    use anyhow::Result;
    use ironcsv::config::{EngineOptions, ReaderOptions};
    use ironcsv::engine::{AggregSpec, Aggregation};
    use ironcsv::io::compression::{detect_from_extension, detect_from_magic};
    use ironcsv::io::{CsvReader, Input};
    use tempfile::TempDir;

    pub const SCORES: &[u8] = b"name,score\nalice,3\nbob,5\nalice,7\n";

    pub fn check(compressed: &[u8], codec: &str, ext: &str) -> Result<()> {
        assert_eq!(detect_from_magic(compressed).map(|c| c.name()), Some(codec));
        assert_eq!(
            detect_from_extension(format!("out.csv{ext}")).map(|c| c.name()),
            Some(codec)
        );

        let dir = TempDir::new()?;
        let input = dir.path().join("scores.dat");
        std::fs::write(&input, compressed)?;
        let mut engine =
            Aggregation::new(AggregSpec::parse("name,max(score),count()")?, EngineOptions::default());
        let summary = engine.aggregate(&Input::from(input.as_path()))?;
        assert_eq!(summary.compression, Some(codec));
        assert_eq!(summary.rows_folded, 3);

        let out = dir.path().join(format!("out.csv{ext}"));
        assert_eq!(engine.write_output(Some(out.as_path()))?, 2);
        assert_ne!(std::fs::read(&out)?.first(), Some(&b'"'));

        let mut rdr = CsvReader::open(&Input::from(out.as_path()), &ReaderOptions::default())?;
        assert_eq!(rdr.compression(), Some(codec));
        let mut rows = Vec::new();
        while let Some(mut row) = rdr.next_row() {
            rows.push(row.parse_line()?);
        }
        assert_eq!(rows[0], vec!["name", "max(score)", "count()"]);
        let mut data = rows.split_off(1);
        data.sort();
        assert_eq!(data, vec![vec!["alice", "7", "2"], vec!["bob", "5", "1"]]);
        Ok(())
    }
}

#[cfg(feature = "compression-zstd")]
mod zstd_tests {
    use super::codec_round_trip::{SCORES, check};
    use anyhow::Result;

    #[test]
    fn zstd_input_and_output() -> Result<()> {
        check(&zstd::encode_all(SCORES, 3)?, "zstd", ".zst")
    }
}

#[cfg(feature = "compression-bzip2")]
mod bzip2_tests {
    use super::codec_round_trip::{SCORES, check};
    use anyhow::Result;
    use bzip2::Compression;
    use bzip2::write::BzEncoder;
    use std::io::Write;

    #[test]
    fn bzip2_input_and_output() -> Result<()> {
        let mut enc = BzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(SCORES)?;
        check(&enc.finish()?, "bzip2", ".bz2")
    }
}

#[cfg(feature = "compression-xz")]
mod xz_tests {
    use super::codec_round_trip::{SCORES, check};
    use anyhow::Result;
    use std::io::Write;
    use xz2::write::XzEncoder;

    #[test]
    fn xz_input_and_output() -> Result<()> {
        let mut enc = XzEncoder::new(Vec::new(), 6);
        enc.write_all(SCORES)?;
        check(&enc.finish()?, "xz", ".xz")
    }
}
