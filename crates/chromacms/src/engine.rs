//! The color-matching engine seam
//!
//! The link cache treats transform construction as a black box behind
//! `CmsEngine`. A real engine wraps an external CMM; the built-in
//! [`PassthroughEngine`] covers the unmanaged-color case where pixel
//! values pass through with only channel-count adjustment.

use tracing::debug;

use crate::buffer::BufferDesc;
use crate::error::{Error, Result};
use crate::params::RenderingParams;
use crate::profile::IccProfile;

/// Everything needed to build one transform
///
/// The destination is always concrete here; resolving a "device
/// default" destination happens in the rendering pipeline before the
/// request is formed.
#[derive(Debug)]
pub struct LinkRequest<'a> {
    /// Source color space profile
    pub src: &'a IccProfile,
    /// Destination color space profile
    pub dst: &'a IccProfile,
    /// Optional proofing profile simulated between source and destination
    pub proof: Option<&'a IccProfile>,
    /// Rendering policy inputs
    pub params: RenderingParams,
}

/// A built transform, ready to map pixel data
///
/// Implementations own their native handle; releasing it happens in
/// `Drop`. `apply` must be safe to call concurrently from multiple
/// checkout holders.
pub trait CmsTransform: Send + Sync {
    /// Map pixels from `src` into `dst` according to the two layouts
    fn apply(
        &self,
        src_desc: &BufferDesc,
        src: &[u8],
        dst_desc: &BufferDesc,
        dst: &mut [u8],
    ) -> Result<()>;
}

/// Builds transforms from profile pairs plus rendering parameters
pub trait CmsEngine: Send + Sync {
    /// Construct a transform for the request
    ///
    /// May block on I/O or engine-internal work; the link cache calls
    /// this without holding any lock.
    fn build_link(&self, req: &LinkRequest<'_>) -> Result<Box<dyn CmsTransform>>;
}

/// Engine for the unmanaged-color path
///
/// Copies channel values straight across, truncating or zero-padding
/// when the source and destination channel counts differ. No color
/// math at all; used when the pipeline runs with color management
/// disabled.
#[derive(Debug, Default)]
pub struct PassthroughEngine;

impl PassthroughEngine {
    /// Create a passthrough engine
    pub fn new() -> Self {
        PassthroughEngine
    }
}

impl CmsEngine for PassthroughEngine {
    fn build_link(&self, req: &LinkRequest<'_>) -> Result<Box<dyn CmsTransform>> {
        if req.proof.is_some() {
            return Err(Error::BuildFailed(
                "passthrough engine cannot simulate proofing".to_string(),
            ));
        }
        let in_chan = req.src.num_comps();
        let out_chan = req.dst.num_comps();
        debug!(in_chan, out_chan, "building passthrough link");
        Ok(Box::new(PassthroughTransform { in_chan, out_chan }))
    }
}

struct PassthroughTransform {
    in_chan: usize,
    out_chan: usize,
}

impl CmsTransform for PassthroughTransform {
    fn apply(
        &self,
        src_desc: &BufferDesc,
        src: &[u8],
        dst_desc: &BufferDesc,
        dst: &mut [u8],
    ) -> Result<()> {
        if src_desc.num_chan as usize != self.in_chan {
            return Err(Error::ShapeMismatch(format!(
                "source has {} channels, link expects {}",
                src_desc.num_chan, self.in_chan
            )));
        }
        if dst_desc.num_chan as usize != self.out_chan {
            return Err(Error::ShapeMismatch(format!(
                "destination has {} channels, link expects {}",
                dst_desc.num_chan, self.out_chan
            )));
        }
        if src_desc.is_planar || dst_desc.is_planar {
            return Err(Error::ShapeMismatch(
                "passthrough handles interleaved buffers only".to_string(),
            ));
        }
        if src_desc.bytes_per_chan != dst_desc.bytes_per_chan {
            return Err(Error::ShapeMismatch(format!(
                "sample widths differ: {} vs {}",
                src_desc.bytes_per_chan, dst_desc.bytes_per_chan
            )));
        }
        if src_desc.num_rows != dst_desc.num_rows
            || src_desc.pixels_per_row != dst_desc.pixels_per_row
        {
            return Err(Error::ShapeMismatch(
                "source and destination extents differ".to_string(),
            ));
        }
        if src.len() < src_desc.min_len() || dst.len() < dst_desc.min_len() {
            return Err(Error::ShapeMismatch(
                "buffer shorter than its descriptor".to_string(),
            ));
        }

        let bpc = src_desc.bytes_per_chan as usize;
        let copy = self.in_chan.min(self.out_chan) * bpc;
        let in_pix = self.in_chan * bpc;
        let out_pix = self.out_chan * bpc;

        for row in 0..src_desc.num_rows {
            let src_row = row * src_desc.row_stride;
            let dst_row = row * dst_desc.row_stride;
            for pix in 0..src_desc.pixels_per_row {
                let s = src_row + pix * in_pix;
                let d = dst_row + pix * out_pix;
                dst[d..d + copy].copy_from_slice(&src[s..s + copy]);
                for byte in dst[d + copy..d + out_pix].iter_mut() {
                    *byte = 0;
                }
            }
        }
        Ok(())
    }
}
