pub mod config;
pub mod driver;
pub mod engine;
pub mod handlers;
pub mod historical;
pub mod modes;

pub use config::{BuildingsConfig, ConfigError, EngineConfig, HistoricalConfig, TerrainConfig};
pub use driver::pump;
pub use engine::MapEngine;
pub use handlers::{CountryClick, CountryClickCallback, Handler, TimerTask};
pub use historical::HistoricalLayers;
pub use modes::VisualModes;
