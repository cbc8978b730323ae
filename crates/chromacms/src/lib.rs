//! # chromacms
//!
//! Profile handling and the color-matching engine seam used by the
//! chroma link cache.
//!
//! ## Architecture
//! - **Profiles**: ICC profile bytes (owned or memory-mapped) with a
//!   lazily computed, memoized content hash
//! - **Parameters**: rendering intent / black point / black
//!   preservation policy inputs
//! - **Engine seam**: `CmsEngine` builds transforms, `CmsTransform`
//!   applies them to pixel buffers
//! - **Passthrough**: a built-in engine for the unmanaged-color case

#![warn(missing_docs)]

mod buffer;
mod engine;
mod error;
pub mod parser;
mod params;
mod profile;

pub use buffer::BufferDesc;
pub use engine::{CmsEngine, CmsTransform, LinkRequest, PassthroughEngine};
pub use error::{Error, Result};
pub use params::{RenderingIntent, RenderingParams};
pub use parser::{ColorSpace, IccHeader};
pub use profile::IccProfile;
