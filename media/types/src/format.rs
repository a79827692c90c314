/*!
    Pixel and sample layouts.
*/

/**
    Video pixel formats.

    Decoders may emit any of these; render surfaces in this engine expect
    packed 32-bit formats, which is what the FFmpeg adapter converts to.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Packed RGBA, 32bpp
    Rgba,
    /// Packed BGRA, 32bpp
    Bgra,
    /// Packed RGB, 24bpp
    Rgb24,
    /// Planar YUV 4:2:0, 12bpp
    Yuv420p,
    /// Semi-planar YUV 4:2:0, 12bpp
    Nv12,
}

impl PixelFormat {
    /**
        Number of bytes a tightly packed frame of this format occupies.
    */
    pub const fn frame_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Rgba | Self::Bgra => pixels * 4,
            Self::Rgb24 => pixels * 3,
            // Chroma planes are subsampled 2x2, rounding up for odd sizes
            Self::Yuv420p | Self::Nv12 => {
                let chroma = (width as usize).div_ceil(2) * (height as usize).div_ceil(2);
                pixels + chroma * 2
            }
        }
    }

    /**
        Returns true for packed formats with one 32-bit word per pixel.
    */
    pub const fn is_packed_32(self) -> bool {
        matches!(self, Self::Rgba | Self::Bgra)
    }
}

/**
    Audio sample formats. Data is always interleaved.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SampleFormat {
    /// 32-bit float, range [-1.0, 1.0]
    F32,
    /// 64-bit float
    F64,
    /// Signed 16-bit integer
    S16,
    /// Signed 32-bit integer
    S32,
    /// Unsigned 8-bit integer, silence at 128
    U8,
}

impl SampleFormat {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_frame_sizes() {
        assert_eq!(PixelFormat::Rgba.frame_size(4, 2), 32);
        assert_eq!(PixelFormat::Rgb24.frame_size(4, 2), 24);
        assert!(PixelFormat::Bgra.is_packed_32());
        assert!(!PixelFormat::Rgb24.is_packed_32());
    }

    #[test]
    fn planar_frame_sizes_round_chroma_up() {
        assert_eq!(PixelFormat::Yuv420p.frame_size(4, 4), 16 + 8);
        assert_eq!(PixelFormat::Nv12.frame_size(3, 3), 9 + 8);
    }

    #[test]
    fn sample_sizes() {
        assert_eq!(SampleFormat::U8.bytes_per_sample(), 1);
        assert_eq!(SampleFormat::S16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::F32.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::F64.bytes_per_sample(), 8);
        assert!(SampleFormat::F64.is_float());
        assert!(!SampleFormat::S32.is_float());
    }
}
