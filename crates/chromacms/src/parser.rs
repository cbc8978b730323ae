//! ICC profile header parser using nom
//!
//! Only the fields the link cache cares about are read (offsets per
//! the ICC.1 header layout, all integers big-endian):
//!
//! ```text
//! [0..4]    profile size: u32
//! [16..20]  data color space signature
//! [20..24]  profile connection space signature
//! [36..40]  magic b"acsp"
//! [64..68]  rendering intent hint: u32
//! ```

use nom::{
    bytes::complete::{tag, take},
    number::complete::be_u32,
    IResult,
};

use crate::error::{Error, Result};
use crate::params::RenderingIntent;

/// Magic signature every ICC profile carries at offset 36
pub const ICC_MAGIC: &[u8] = b"acsp";

/// Fixed size of the ICC profile header
pub const ICC_HEADER_SIZE: usize = 128;

/// Color space described by a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// Single-channel gray
    Gray,
    /// Three-channel RGB
    Rgb,
    /// Four-channel CMYK
    Cmyk,
    /// CIELAB
    Lab,
    /// CIEXYZ
    Xyz,
}

impl ColorSpace {
    /// Decode a 4-byte ICC color space signature
    pub fn from_signature(sig: [u8; 4]) -> Option<Self> {
        match &sig {
            b"GRAY" => Some(ColorSpace::Gray),
            b"RGB " => Some(ColorSpace::Rgb),
            b"CMYK" => Some(ColorSpace::Cmyk),
            b"Lab " => Some(ColorSpace::Lab),
            b"XYZ " => Some(ColorSpace::Xyz),
            _ => None,
        }
    }

    /// The 4-byte ICC signature for this color space
    pub fn signature(self) -> [u8; 4] {
        match self {
            ColorSpace::Gray => *b"GRAY",
            ColorSpace::Rgb => *b"RGB ",
            ColorSpace::Cmyk => *b"CMYK",
            ColorSpace::Lab => *b"Lab ",
            ColorSpace::Xyz => *b"XYZ ",
        }
    }

    /// Number of color channels in this space
    pub fn num_comps(self) -> usize {
        match self {
            ColorSpace::Gray => 1,
            ColorSpace::Rgb | ColorSpace::Lab | ColorSpace::Xyz => 3,
            ColorSpace::Cmyk => 4,
        }
    }
}

/// Parsed ICC profile header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IccHeader {
    /// Declared profile size in bytes
    pub profile_size: u32,
    /// Data color space of the profile
    pub color_space: ColorSpace,
    /// Profile connection space
    pub pcs: ColorSpace,
    /// Rendering intent hint stored in the header
    pub intent_hint: RenderingIntent,
}

fn signature(input: &[u8]) -> IResult<&[u8], [u8; 4]> {
    let (rest, raw) = take(4usize)(input)?;
    Ok((rest, [raw[0], raw[1], raw[2], raw[3]]))
}

fn raw_header(input: &[u8]) -> IResult<&[u8], (u32, [u8; 4], [u8; 4], u32)> {
    let (input, profile_size) = be_u32(input)?;
    let (input, _) = take(12usize)(input)?;
    let (input, data_cs) = signature(input)?;
    let (input, pcs) = signature(input)?;
    let (input, _) = take(12usize)(input)?;
    let (input, _) = tag(ICC_MAGIC)(input)?;
    let (input, _) = take(24usize)(input)?;
    let (input, intent) = be_u32(input)?;
    Ok((input, (profile_size, data_cs, pcs, intent)))
}

/// Parse the fixed ICC profile header from the front of `input`
pub fn parse_header(input: &[u8]) -> Result<IccHeader> {
    if input.len() < ICC_HEADER_SIZE {
        return Err(Error::Parse(format!(
            "profile too short for ICC header: {} bytes",
            input.len()
        )));
    }

    let (_, (profile_size, data_cs, pcs_sig, intent)) = raw_header(input)?;

    let color_space = ColorSpace::from_signature(data_cs)
        .ok_or_else(|| Error::Parse(format!("unknown color space signature {:?}", data_cs)))?;
    let pcs = ColorSpace::from_signature(pcs_sig)
        .ok_or_else(|| Error::Parse(format!("unknown PCS signature {:?}", pcs_sig)))?;
    let intent_hint = RenderingIntent::from_u32(intent)
        .ok_or_else(|| Error::Parse(format!("rendering intent {} out of range", intent)))?;

    Ok(IccHeader {
        profile_size,
        color_space,
        pcs,
        intent_hint,
    })
}

/// Build a minimal valid ICC header (tests, fixtures, benches)
pub fn build_header(color_space: ColorSpace, pcs: ColorSpace) -> Vec<u8> {
    let mut header = vec![0u8; ICC_HEADER_SIZE];
    header[0..4].copy_from_slice(&(ICC_HEADER_SIZE as u32).to_be_bytes());
    header[16..20].copy_from_slice(&color_space.signature());
    header[20..24].copy_from_slice(&pcs.signature());
    header[36..40].copy_from_slice(ICC_MAGIC);
    // intent hint left at 0 (perceptual)
    header
}
