// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use palindeck::config::EngineConfig;
use palindeck::constants;

#[test]
fn test_config_default_is_valid() {
    let config = EngineConfig::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_default_grid_covers_every_layer() {
    let config = EngineConfig::default();
    assert_eq!(config.grid_layout.loop_cells.len(), constants::LAYER_COUNT);
    for layer in 0..constants::LAYER_COUNT as u8 {
        let cell = config.grid_layout.cell_for_layer(layer);
        assert!(cell.width > 0 && cell.height > 0);
    }
}

#[test]
fn test_config_rejects_mismatched_layer_count() {
    let mut config = EngineConfig::default();
    config.grid_layout.loop_cells.truncate(constants::LAYER_COUNT - 1);
    assert!(config.validate().is_err());
}
