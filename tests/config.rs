//! Loading engine options from JSON files.

use anyhow::Result;
use ironcsv::config::{ArenaOptions, DEFAULT_MAX_ROW_LEN, EngineOptions};
use std::path::PathBuf;
use tempfile::TempDir;

fn write(dir: &TempDir, content: &str) -> Result<PathBuf> {
    let path = dir.path().join("opts.json");
    std::fs::write(&path, content)?;
    Ok(path)
}

#[test]
fn options_load_from_file() -> Result<()> {
    let dir = TempDir::new()?;
    let spill = dir.path().to_string_lossy().replace('\\', "\\\\");
    let path = write(
        &dir,
        &format!(
            r#"{{ "reader": {{ "separator": ";", "has_headers": false }},
                 "arena": {{ "min_chunk": 4096, "spill_dir": "{spill}" }} }}"#
        ),
    )?;

    let opts = EngineOptions::from_json_file(&path)?;
    assert_eq!(opts.reader.separator, b';');
    assert_eq!(opts.reader.quote, b'"');
    assert!(!opts.reader.has_headers);
    assert_eq!(opts.reader.max_row_len, DEFAULT_MAX_ROW_LEN);
    assert_eq!(opts.arena.min_chunk, 4096);
    assert_eq!(opts.arena.max_chunk, ArenaOptions::default().max_chunk);
    assert_eq!(opts.arena.spill_dir.as_deref(), Some(dir.path()));
    Ok(())
}

#[test]
fn empty_object_is_the_default() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write(&dir, "{}")?;
    assert_eq!(EngineOptions::from_json_file(&path)?, EngineOptions::default());
    Ok(())
}

#[test]
fn invalid_reader_options_are_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write(&dir, r#"{ "reader": { "separator": "\"" } }"#)?;
    let err = EngineOptions::from_json_file(&path).expect_err("separator equals quote");
    assert!(format!("{err:#}").contains("separator and quote must differ"));

    let path = write(&dir, r#"{ "reader": { "max_row_len": 2 } }"#)?;
    assert!(EngineOptions::from_json_file(&path).is_err());
    Ok(())
}

#[test]
fn malformed_or_missing_files_are_errors() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write(&dir, r#"{ "reader": { "separator": ";" "#)?;
    let err = EngineOptions::from_json_file(&path).expect_err("truncated JSON");
    assert!(format!("{err:#}").contains("parse config"));

    assert!(EngineOptions::from_json_file(dir.path().join("absent.json")).is_err());
    Ok(())
}
