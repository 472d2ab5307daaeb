//! Minimal JPEG header probe.
//!
//! Only the frame header is read: enough to size the output buffer and
//! reject streams the hardware block cannot decode. Entropy-coded data is
//! never touched.

use crate::error::HeaderError;
use crate::types::Resolution;

mod markers {
    pub const SOI: u8 = 0xD8;
    pub const EOI: u8 = 0xD9;
    pub const SOS: u8 = 0xDA;
    pub const SOF0: u8 = 0xC0;
    pub const SOF1: u8 = 0xC1;
    pub const DHT: u8 = 0xC4;
    pub const JPG: u8 = 0xC8;
    pub const DAC: u8 = 0xCC;
    pub const TEM: u8 = 0x01;
    pub const RST0: u8 = 0xD0;
    pub const RST7: u8 = 0xD7;
}

/// Chroma subsampling, derived from the luma sampling factor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Subsampling {
    Yuv444,
    Yuv422,
    Yuv420,
    Gray,
}

impl Subsampling {
    fn from_luma_factor(factor: u8) -> Option<Self> {
        match (factor >> 4, factor & 0x0F) {
            (1, 1) => Some(Self::Yuv444),
            (2, 1) => Some(Self::Yuv422),
            (2, 2) => Some(Self::Yuv420),
            _ => None,
        }
    }
}

/// Frame header fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    pub precision: u8,
    pub subsampling: Subsampling,
}

impl JpegInfo {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Walk the marker segments from SOI and decode the first frame header.
pub fn parse_header(data: &[u8]) -> Result<JpegInfo, HeaderError> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != markers::SOI {
        return Err(HeaderError::MissingSoi);
    }

    let mut pos = 2;
    loop {
        if pos + 2 > data.len() {
            return Err(HeaderError::Truncated { offset: pos });
        }
        if data[pos] != 0xFF {
            return Err(HeaderError::InvalidSegment { offset: pos });
        }
        let marker = data[pos + 1];
        match marker {
            // Fill bytes before a marker.
            0xFF => {
                pos += 1;
                continue;
            }
            markers::TEM | markers::RST0..=markers::RST7 | markers::SOI => {
                pos += 2;
                continue;
            }
            markers::EOI | markers::SOS => return Err(HeaderError::NoFrameHeader),
            _ => {}
        }

        if pos + 4 > data.len() {
            return Err(HeaderError::Truncated { offset: pos });
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if length < 2 {
            return Err(HeaderError::InvalidSegment { offset: pos });
        }
        let seg_start = pos + 4;
        let seg_end = pos + 2 + length;
        if seg_end > data.len() {
            return Err(HeaderError::Truncated { offset: pos });
        }
        let segment = &data[seg_start..seg_end];

        match marker {
            markers::SOF0 | markers::SOF1 => return parse_sof(segment, seg_start),
            markers::DHT | markers::JPG | markers::DAC => {}
            0xC0..=0xCF => return Err(HeaderError::UnsupportedProcess { marker }),
            _ => {}
        }
        pos = seg_end;
    }
}

fn parse_sof(segment: &[u8], offset: usize) -> Result<JpegInfo, HeaderError> {
    if segment.len() < 6 {
        return Err(HeaderError::Truncated { offset });
    }
    let precision = segment[0];
    if precision != 8 {
        return Err(HeaderError::UnsupportedPrecision(precision));
    }
    let height = u16::from_be_bytes([segment[1], segment[2]]) as u32;
    let width = u16::from_be_bytes([segment[3], segment[4]]) as u32;
    let components = segment[5];
    if components != 1 && components != 3 {
        return Err(HeaderError::UnsupportedComponents(components));
    }
    if segment.len() < 6 + components as usize * 3 {
        return Err(HeaderError::Truncated { offset });
    }
    if width == 0 || height == 0 {
        return Err(HeaderError::EmptyImage);
    }

    let subsampling = if components == 1 {
        Subsampling::Gray
    } else {
        let luma = segment[7];
        let sub = Subsampling::from_luma_factor(luma)
            .ok_or(HeaderError::UnsupportedSampling(luma))?;
        for chroma in 1..3 {
            let factor = segment[6 + chroma * 3 + 1];
            if factor != 0x11 {
                return Err(HeaderError::UnsupportedSampling(factor));
            }
        }
        sub
    };

    Ok(JpegInfo {
        width,
        height,
        components,
        precision,
        subsampling,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sof(marker: u8, width: u16, height: u16, luma: u8) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        // APP0 stub
        out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x4A, 0x46]);
        out.extend_from_slice(&[0xFF, marker, 0x00, 17, 8]);
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&[3, 1, luma, 0, 2, 0x11, 1, 3, 0x11, 1]);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    #[test]
    fn reads_baseline_header() {
        let info = parse_header(&sof(0xC0, 864, 480, 0x21)).unwrap();
        assert_eq!(info.resolution(), Resolution::new(864, 480));
        assert_eq!(info.components, 3);
        assert_eq!(info.subsampling, Subsampling::Yuv422);
    }

    #[test]
    fn reads_extended_420() {
        let info = parse_header(&sof(0xC1, 320, 240, 0x22)).unwrap();
        assert_eq!(info.subsampling, Subsampling::Yuv420);
    }

    #[test]
    fn rejects_progressive() {
        assert_eq!(
            parse_header(&sof(0xC2, 320, 240, 0x11)),
            Err(HeaderError::UnsupportedProcess { marker: 0xC2 })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_header(&[0u8; 10]), Err(HeaderError::MissingSoi));
        assert_eq!(parse_header(&[]), Err(HeaderError::MissingSoi));
    }

    #[test]
    fn rejects_truncated_segment() {
        let data = sof(0xC0, 320, 240, 0x11);
        assert!(matches!(
            parse_header(&data[..12]),
            Err(HeaderError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert_eq!(
            parse_header(&sof(0xC0, 0, 240, 0x11)),
            Err(HeaderError::EmptyImage)
        );
    }

    #[test]
    fn rejects_eoi_before_frame_header() {
        assert_eq!(
            parse_header(&[0xFF, 0xD8, 0xFF, 0xD9]),
            Err(HeaderError::NoFrameHeader)
        );
    }
}
