//! Rendering parameters that shape how a transform is built

const BP_SHIFT: u64 = 0;
const REND_SHIFT: u64 = 8;
const PRESERVE_SHIFT: u64 = 16;

/// Rendering intent per the ICC model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderingIntent {
    /// Compress the gamut to preserve overall appearance
    #[default]
    Perceptual = 0,
    /// Map colors relative to the destination white point
    RelativeColorimetric = 1,
    /// Preserve saturation at the cost of hue accuracy
    Saturation = 2,
    /// Map colors in absolute colorimetric terms
    AbsoluteColorimetric = 3,
}

impl RenderingIntent {
    /// Decode the numeric intent stored in an ICC header
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(RenderingIntent::Perceptual),
            1 => Some(RenderingIntent::RelativeColorimetric),
            2 => Some(RenderingIntent::Saturation),
            3 => Some(RenderingIntent::AbsoluteColorimetric),
            _ => None,
        }
    }
}

/// Policy inputs that affect transform construction
///
/// Only the fields that actually change what the engine builds are
/// included; anything resolved before link construction (engine
/// selection, profile overrides) must not show up here, since these
/// bits feed the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderingParams {
    /// Rendering intent
    pub intent: RenderingIntent,
    /// Apply black point compensation
    pub black_point_comp: bool,
    /// Preserve pure black channels across the transform
    pub preserve_black: bool,
}

impl RenderingParams {
    /// Pack the parameters into the hash word used by the cache key
    pub fn hash_bits(&self) -> u64 {
        ((self.black_point_comp as u64) << BP_SHIFT)
            | ((self.intent as u64) << REND_SHIFT)
            | ((self.preserve_black as u64) << PRESERVE_SHIFT)
    }
}
