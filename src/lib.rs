#![doc = include_str!("../README.md")]

mod error;
pub use error::{DensityError, Result};

mod feature;
pub use feature::{
    AttributeDescriptor, AttributeType, AttributeValue, Feature, GeometryBinding, Schema,
};

mod snap;
pub use snap::{Envelope, GridSnap, Transform};

mod expr;
pub use expr::WeightExpr;

mod weigher;
pub use weigher::Weigher;

mod line;
mod poly;

mod grid;
pub use grid::{Rasterize, RenderingGrid, Sampling};

mod render;
pub use render::{GeometryRenderer, RendererKind};

pub mod codec;
pub use codec::{decode, decode_into, encode, DensityPoint, DensityPoints};

mod config;
pub use config::{
    DensityConfig, DensityOptions, DensityQuery, BATCH_OPT, BATCH_SIZE_ENV, DEFAULT_BATCH_SIZE,
    ENVELOPE_OPT, GRID_OPT, SAMPLING_OPT, WEIGHT_OPT,
};

mod scan;
pub use scan::{run_scan, AggregatingScan, DensityScan, ScanState};

pub mod carrier;
pub use carrier::{DensityCarrier, DensityFeatureType, DENSITY_KEY};

#[cfg(test)]
mod proptests;
