// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::fs;
use std::sync::Once;

use anyhow::Result;
use ezo_modbus_gateway::config::{self, BusKind, Config};
use tempfile::tempdir;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

#[test]
fn test_config_load_and_save() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let mut config = Config::default();
    config.modbus.port = 5020;
    config.modbus.address = "192.168.1.20".to_string();
    config.acquisition.interval_ms = 250;
    config.acquisition.abort_on_sensor_error = true;
    config.sensors.bus = BusKind::Simulated;
    config.sensors.ph_address = 98;

    config.save_to_file(&config_path)?;
    let loaded = Config::from_file(&config_path)?;

    assert_eq!(loaded.modbus.port, 5020);
    assert_eq!(loaded.modbus.address, "192.168.1.20");
    assert_eq!(loaded.acquisition, config.acquisition);
    assert_eq!(loaded.sensors.bus, BusKind::Simulated);
    assert_eq!(loaded.sensors.ph_address, 98);
    assert_eq!(loaded.sensors.temperature_address, 102);
    Ok(())
}

#[test]
fn test_missing_file_creates_default() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("non_existent.yaml");

    let config = Config::from_file(&config_path)?;
    assert!(config_path.exists());

    assert!(config.modbus.enabled);
    assert_eq!(config.modbus.port, 502);
    assert_eq!(config.modbus.address, "0.0.0.0");
    assert_eq!(config.acquisition.interval_ms, 1000);
    assert_eq!(config.acquisition.compensation_threshold, 14);
    assert!(!config.acquisition.abort_on_sensor_error);
    assert_eq!(config.sensors.bus, BusKind::I2c);
    assert_eq!(config.sensors.i2c_device, "/dev/i2c-1");
    assert_eq!(
        (
            config.sensors.temperature_address,
            config.sensors.conductivity_address,
            config.sensors.ph_address
        ),
        (102, 100, 99)
    );

    // The written default loads back unchanged
    let reloaded = Config::from_file(&config_path)?;
    assert_eq!(reloaded.acquisition, config.acquisition);
    Ok(())
}

#[test]
fn test_empty_file_and_missing_sections_use_defaults() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;

    let empty_path = temp_dir.path().join("empty.yaml");
    fs::write(&empty_path, "")?;
    let config = Config::from_file(&empty_path)?;
    assert_eq!(config.modbus.port, 502);

    let partial_path = temp_dir.path().join("partial.yaml");
    fs::write(
        &partial_path,
        r#"
modbus:
  enabled: true
  port: 1502
  address: "127.0.0.1"
"#,
    )?;
    let config = Config::from_file(&partial_path)?;
    assert_eq!(config.modbus.port, 1502);
    assert_eq!(config.acquisition.interval_ms, 1000);
    assert_eq!(config.sensors.conductivity_address, 100);
    Ok(())
}

#[test]
fn test_validation_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Port out of range
    fs::write(
        &config_path,
        r#"
modbus:
  enabled: true
  port: 99999
  address: "0.0.0.0"
"#,
    )?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err(), "Config loading should have failed");

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(sample_path.exists(), "Sample config file was not created");

    let sample_config = Config::from_file(&sample_path)?;
    assert_eq!(sample_config.modbus.port, 502);
    Ok(())
}

#[test]
fn test_unknown_bus_is_rejected() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    fs::write(
        &config_path,
        r#"
sensors:
  bus: spi
  i2c_device: /dev/i2c-1
  temperature_address: 102
  conductivity_address: 100
  ph_address: 99
"#,
    )?;

    assert!(Config::from_file(&config_path).is_err());
    assert!(config_path.with_extension("sample.yaml").exists());
    Ok(())
}

#[test]
fn test_specific_rules_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Schema-valid, but two circuits share an address
    fs::write(
        &config_path,
        r#"
sensors:
  bus: i2c
  i2c_device: /dev/i2c-1
  temperature_address: 102
  conductivity_address: 99
  ph_address: 99
"#,
    )?;

    let err = Config::from_file(&config_path).unwrap_err();
    assert!(err.to_string().contains("more than one sensor"));
    assert!(config_path.with_extension("sample.yaml").exists());
    Ok(())
}

#[test]
fn test_apply_args() {
    let mut config = Config::default();

    config.apply_args(None, None, false);
    assert_eq!(config.modbus.port, 502);
    assert_eq!(config.modbus.address, "0.0.0.0");
    assert_eq!(config.sensors.bus, BusKind::I2c);

    config.apply_args(Some("127.0.0.1".to_string()), Some(5020), true);
    assert_eq!(config.modbus.port, 5020);
    assert_eq!(config.modbus.address, "127.0.0.1");
    assert_eq!(config.sensors.bus, BusKind::Simulated);
}

#[test]
fn test_config_schema_output() -> Result<()> {
    config::output_config_schema()?;
    Ok(())
}
