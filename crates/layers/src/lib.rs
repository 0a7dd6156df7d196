pub mod choropleth;
pub mod expr;
pub mod headless;
pub mod map_runtime;
pub mod natural;
pub mod registry;
pub mod spec;

pub use choropleth::{
    ChoroplethConfig, ChoroplethManager, ChoroplethSpec, LegendEntry, Metric, UnknownMetric,
    build_choropleth,
};
pub use headless::HeadlessRuntime;
pub use map_runtime::*;
pub use natural::{LodBreakpoints, LodMode, NaturalConfig, NaturalManager};
pub use registry::{LayerRegistry, ReinitReport};
pub use spec::*;
