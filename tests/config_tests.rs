//! Tests for Config
//!
//! These tests verify:
//! - Defaults and the builder
//! - Budget validation
//! - YAML loading, including partial files and the legacy key name

use std::fs;
use std::path::PathBuf;

use chunkstore::{Config, StoreError};
use tempfile::TempDir;

// =============================================================================
// Defaults / Builder Tests
// =============================================================================

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.parts_directory, PathBuf::from("./parts"));
    assert_eq!(config.part_size, 1024);
    assert_eq!(config.max_memory, 10 * 1024 * 1024);
    assert_eq!(config.io_worker_count, 4);
    assert!(config.validate().is_ok());
}

#[test]
fn test_builder_overrides() {
    let config = Config::builder()
        .parts_directory("/tmp/somewhere")
        .part_size(512)
        .max_memory(4096)
        .io_worker_count(2)
        .build();

    assert_eq!(config.parts_directory, PathBuf::from("/tmp/somewhere"));
    assert_eq!(config.part_size, 512);
    assert_eq!(config.max_memory, 4096);
    assert_eq!(config.io_worker_count, 2);
    assert_eq!(config.max_in_flight(), 8);
}

#[test]
fn test_max_in_flight_rounds_down() {
    let config = Config::builder().part_size(1000).max_memory(2999).build();

    assert_eq!(config.max_in_flight(), 2);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_zero_part_size_rejected() {
    let config = Config::builder().part_size(0).build();

    assert!(matches!(config.validate(), Err(StoreError::Capacity(_))));
    assert_eq!(config.max_in_flight(), 0);
}

#[test]
fn test_zero_workers_rejected() {
    let config = Config::builder().io_worker_count(0).build();

    assert!(matches!(config.validate(), Err(StoreError::Capacity(_))));
}

#[test]
fn test_memory_below_one_part_rejected() {
    let config = Config::builder().part_size(2048).max_memory(2047).build();

    assert!(matches!(config.validate(), Err(StoreError::Capacity(_))));
}

#[test]
fn test_memory_of_exactly_one_part_accepted() {
    let config = Config::builder().part_size(2048).max_memory(2048).build();

    assert!(config.validate().is_ok());
    assert_eq!(config.max_in_flight(), 1);
}

// =============================================================================
// YAML Tests
// =============================================================================

#[test]
fn test_yaml_full() {
    let config = Config::from_yaml_str(
        "parts_directory: /data/parts\npart_size: 4096\nmax_memory: 65536\nio_worker_count: 3\n",
    )
    .unwrap();

    assert_eq!(config.parts_directory, PathBuf::from("/data/parts"));
    assert_eq!(config.part_size, 4096);
    assert_eq!(config.max_memory, 65536);
    assert_eq!(config.io_worker_count, 3);
}

#[test]
fn test_yaml_missing_keys_use_defaults() {
    let config = Config::from_yaml_str("part_size: 64\n").unwrap();

    assert_eq!(config.part_size, 64);
    assert_eq!(config.parts_directory, PathBuf::from("./parts"));
    assert_eq!(config.io_worker_count, 4);
}

#[test]
fn test_yaml_accepts_io_processes_alias() {
    let config = Config::from_yaml_str("io_processes: 6\n").unwrap();

    assert_eq!(config.io_worker_count, 6);
}

#[test]
fn test_yaml_invalid_is_config_error() {
    let result = Config::from_yaml_str("part_size: [not, a, number]\n");

    assert!(matches!(result, Err(StoreError::Config(_))));
}

#[test]
fn test_yaml_file_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");
    fs::write(&path, "part_size: 128\nmax_memory: 1024\n").unwrap();

    let config = Config::from_yaml_file(&path).unwrap();

    assert_eq!(config.part_size, 128);
    assert_eq!(config.max_in_flight(), 8);
}

#[test]
fn test_yaml_file_missing_is_config_error() {
    let temp_dir = TempDir::new().unwrap();

    let result = Config::from_yaml_file(&temp_dir.path().join("absent.yaml"));

    assert!(matches!(result, Err(StoreError::Config(_))));
}
