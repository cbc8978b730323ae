//! Pixel buffer descriptors handed to a transform's `apply`

/// Layout description for a block of pixel data
///
/// Describes how samples are arranged in memory so an engine can walk
/// the buffer without guessing. Strides are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Number of color channels per pixel
    pub num_chan: u8,
    /// Bytes per channel sample
    pub bytes_per_chan: u8,
    /// Buffer carries an alpha channel
    pub has_alpha: bool,
    /// Alpha precedes the color channels
    pub alpha_first: bool,
    /// Channels stored in separate planes rather than interleaved
    pub is_planar: bool,
    /// Bytes between planes (planar only)
    pub plane_stride: usize,
    /// Bytes between rows
    pub row_stride: usize,
    /// Number of rows
    pub num_rows: usize,
    /// Pixels per row
    pub pixels_per_row: usize,
    /// Sample byte order; always little-endian in this pipeline
    pub little_endian: bool,
}

impl BufferDesc {
    /// Describe an interleaved buffer with no alpha and packed rows
    pub fn interleaved(
        num_chan: u8,
        bytes_per_chan: u8,
        num_rows: usize,
        pixels_per_row: usize,
    ) -> Self {
        let row_stride = pixels_per_row * num_chan as usize * bytes_per_chan as usize;
        BufferDesc {
            num_chan,
            bytes_per_chan,
            has_alpha: false,
            alpha_first: false,
            is_planar: false,
            plane_stride: 0,
            row_stride,
            num_rows,
            pixels_per_row,
            little_endian: true,
        }
    }

    /// Describe a planar buffer, one packed plane per channel
    pub fn planar(
        num_chan: u8,
        bytes_per_chan: u8,
        num_rows: usize,
        pixels_per_row: usize,
    ) -> Self {
        let row_stride = pixels_per_row * bytes_per_chan as usize;
        BufferDesc {
            num_chan,
            bytes_per_chan,
            has_alpha: false,
            alpha_first: false,
            is_planar: true,
            plane_stride: row_stride * num_rows,
            row_stride,
            num_rows,
            pixels_per_row,
            little_endian: true,
        }
    }

    /// Minimum byte length a buffer must have to satisfy this layout
    pub fn min_len(&self) -> usize {
        if self.is_planar {
            self.plane_stride * self.num_chan as usize
        } else {
            self.row_stride * self.num_rows
        }
    }
}
