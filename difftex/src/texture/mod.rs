pub mod accum;
mod boundary;
mod cube;
pub mod grad;
mod kernel;
mod lod;
pub mod mip;
pub mod params;
pub mod sampler;

pub use accum::*;
pub use grad::*;
pub use mip::*;
pub use params::*;
pub use sampler::*;
