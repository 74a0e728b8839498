//! Configuration Module
//!
//! Configuration loading for the recorder.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_ASSET_ID, DEFAULT_PRESET, DEFAULT_WS_URL, PresetTable, RecorderConfig,
    ReferenceSettings, ServerSettings, StorageSettings, VenueSettings,
};
