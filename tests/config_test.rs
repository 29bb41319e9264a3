// Tests for Config::from_env
// Environment variables are process-wide, so every test runs serially

use plant_quality_etl::config::{Config, ConfigError};
use plant_quality_etl::output::TableCompression;
use serial_test::serial;
use std::env;
use std::path::PathBuf;

const VARS: &[&str] = &[
    "SPREADSHEET_SOURCE",
    "SERIES_OUTPUT_PATH",
    "BATCH_OUTPUT_PATH",
    "SPEC_CATALOG_PATH",
    "PARQUET_COMPRESSION",
    "SUPABASE_URL",
    "SUPABASE_KEY",
    "SUPABASE_SERIES_TABLE",
    "SUPABASE_BATCH_TABLE",
    "UPLOAD_CHUNK_SIZE",
    "LOG_DIR",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults() {
    clear_env();
    let config = Config::from_env().unwrap();

    assert_eq!(config.spreadsheet_source, None);
    assert_eq!(config.series_output_path, PathBuf::from("consolidado.parquet"));
    assert_eq!(
        config.batch_output_path,
        PathBuf::from("consolidado_batelada.parquet")
    );
    assert_eq!(config.compression, TableCompression::Snappy);
    assert_eq!(config.upload_chunk_size, 500);
    assert_eq!(config.log_dir, PathBuf::from("logs"));
    assert!(matches!(
        config.require_source(),
        Err(ConfigError::Missing("SPREADSHEET_SOURCE"))
    ));
    assert!(matches!(
        config.require_remote(),
        Err(ConfigError::Missing("SUPABASE_URL"))
    ));
}

#[test]
#[serial]
fn test_values_from_env() {
    clear_env();
    env::set_var("SPREADSHEET_SOURCE", "https://example.com/plant.xlsx");
    env::set_var("PARQUET_COMPRESSION", "zstd");
    env::set_var("UPLOAD_CHUNK_SIZE", "250");
    env::set_var("SUPABASE_URL", "https://project.supabase.co");
    env::set_var("SUPABASE_KEY", "key");
    env::set_var("SPEC_CATALOG_PATH", "specs.json");

    let config = Config::from_env().unwrap();
    assert_eq!(
        config.require_source().unwrap(),
        "https://example.com/plant.xlsx"
    );
    assert_eq!(config.compression, TableCompression::Zstd);
    assert_eq!(config.upload_chunk_size, 250);
    assert_eq!(
        config.require_remote().unwrap(),
        ("https://project.supabase.co", "key")
    );
    assert_eq!(config.spec_catalog_path, Some(PathBuf::from("specs.json")));
    clear_env();
}

#[test]
#[serial]
fn test_blank_values_count_as_unset() {
    clear_env();
    env::set_var("SERIES_OUTPUT_PATH", "  ");
    let config = Config::from_env().unwrap();
    assert_eq!(config.series_output_path, PathBuf::from("consolidado.parquet"));
    clear_env();
}

#[test]
#[serial]
fn test_invalid_chunk_size() {
    clear_env();
    env::set_var("UPLOAD_CHUNK_SIZE", "0");
    match Config::from_env().unwrap_err() {
        ConfigError::Invalid { name, value } => {
            assert_eq!(name, "UPLOAD_CHUNK_SIZE");
            assert_eq!(value, "0");
        }
        other => panic!("Expected Invalid error, got {other:?}"),
    }
    clear_env();
}

#[test]
#[serial]
fn test_unknown_compression() {
    clear_env();
    env::set_var("PARQUET_COMPRESSION", "lz5");
    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::Compression(_))
    ));
    clear_env();
}
