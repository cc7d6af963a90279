//! Inline image sizing.
//!
//! Header sniffing for PNG, GIF, JPEG and BMP payloads plus the display-size
//! computation applied to inline image directives. Both are pure functions:
//! nothing here touches the filesystem or the host.

/// Bytes of header every format check needs.
pub const HEADER_LEN: usize = 32;

/// Upper bound on JPEG segments walked while looking for a frame header.
pub const JPEG_MAX_SEGMENTS: usize = 512;

const PNG_SIGNATURE: &[u8] = b"\x89PNG";
const PNG_MARKER: u32 = 0x0D0A_1A0A;

/// Image container recognised from its first bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Gif,
    Jpeg,
    Bmp,
}

impl ImageFormat {
    /// Recognise the container from the payload header.
    pub fn detect(head: &[u8]) -> Option<Self> {
        if head.starts_with(PNG_SIGNATURE) {
            Some(Self::Png)
        } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if is_jpeg(head) {
            Some(Self::Jpeg)
        } else if head.starts_with(b"BM") {
            Some(Self::Bmp)
        } else {
            None
        }
    }

    /// File extension used for the decoded temp file.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Jpeg => "jpg",
            Self::Bmp => "bmp",
        }
    }
}

/// JFIF/Exif markers, plus anything opening with an SOI marker.
fn is_jpeg(head: &[u8]) -> bool {
    matches!(head.get(6..10), Some(b"JFIF") | Some(b"Exif")) || head.starts_with(&[0xFF, 0xD8])
}

/// Natural pixel size of an image payload, or `None` when it cannot be read.
///
/// Payloads shorter than [`HEADER_LEN`] bytes, unknown containers and
/// truncated or malformed headers all yield `None`. Zero-sized images are
/// rejected as well since nothing can be laid out from them.
pub fn sniff_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < HEADER_LEN {
        return None;
    }
    let head = &data[..HEADER_LEN];

    let (width, height) = match ImageFormat::detect(head)? {
        ImageFormat::Png => {
            if be_u32(head, 4)? != PNG_MARKER {
                return None;
            }
            (be_u32(head, 16)?, be_u32(head, 20)?)
        }
        ImageFormat::Gif => (le_u16(head, 6)? as u32, le_u16(head, 8)? as u32),
        ImageFormat::Jpeg => jpeg_dimensions(data)?,
        ImageFormat::Bmp => (le_u32(head, 18)?, le_u32(head, 22)?),
    };

    (width > 0 && height > 0).then_some((width, height))
}

fn is_start_of_frame(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Walk JPEG segments until a start-of-frame header.
///
/// The frame header stores height before width.
fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut pos = 0usize;
    let mut skip = 2usize;

    for _ in 0..JPEG_MAX_SEGMENTS {
        pos = pos.checked_add(skip)?;

        let mut marker = *data.get(pos)?;
        pos += 1;
        while marker == 0xFF {
            marker = *data.get(pos)?;
            pos += 1;
        }

        let length = be_u16(data, pos)? as usize;
        pos += 2;

        if is_start_of_frame(marker) {
            // precision byte
            pos += 1;
            let height = be_u16(data, pos)? as u32;
            let width = be_u16(data, pos + 2)? as u32;
            return Some((width, height));
        }

        skip = length.checked_sub(2)?;
    }

    tracing::debug!(
        segments = JPEG_MAX_SEGMENTS,
        "no JPEG frame header within scan limit"
    );
    None
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn le_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(at..at.checked_add(4)?)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn le_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(at..at.checked_add(4)?)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Requested width or height of an inline image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionSpec {
    /// Bare integer: that many character cells.
    Cells(u32),
    /// `N%`: percentage of the natural dimension.
    Percent(u32),
    /// `Npx`: absolute pixels.
    Pixels(u32),
}

impl DimensionSpec {
    /// Parse a directive value. `auto`, empty and unrecognised values mean
    /// "use the natural dimension" and return `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(percent) = value.strip_suffix('%') {
            return parse_digits(percent).map(Self::Percent);
        }
        if let Some(pixels) = value.strip_suffix("px") {
            return parse_digits(pixels).map(Self::Pixels);
        }
        parse_digits(value).map(Self::Cells)
    }

    fn resolve(self, natural: f64, em_width: f64) -> f64 {
        match self {
            Self::Cells(cells) => cells as f64 * em_width,
            Self::Percent(percent) => (natural * percent as f64 / 100.0).trunc(),
            Self::Pixels(pixels) => pixels as f64,
        }
    }
}

fn parse_digits(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn resolve_dimension(spec: Option<&str>, natural: f64, em_width: f64) -> f64 {
    match spec {
        None => natural,
        Some(raw) => match DimensionSpec::parse(raw) {
            Some(spec) => spec.resolve(natural, em_width),
            None => {
                if !raw.trim().is_empty() && raw.trim() != "auto" {
                    tracing::debug!(value = raw, "unrecognised image dimension, using natural size");
                }
                natural
            }
        },
    }
}

/// Compute the display size of an inline image.
///
/// Absent specs fall back to the natural dimension. With `preserve_ratio`,
/// the requested area is kept and redistributed onto the natural aspect
/// ratio: `h = floor(sqrt(area / ratio))`, `w = floor(area / h)`. A result
/// wider than `max_width` is scaled down so its width equals `max_width`.
pub fn image_resize(
    natural: (u32, u32),
    width: Option<&str>,
    height: Option<&str>,
    em_width: f64,
    max_width: f64,
    preserve_ratio: bool,
) -> (u32, u32) {
    let natural_width = natural.0 as f64;
    let natural_height = natural.1 as f64;

    let mut width = resolve_dimension(width, natural_width, em_width);
    let mut height = resolve_dimension(height, natural_height, em_width);

    if preserve_ratio && natural_width > 0.0 && natural_height > 0.0 {
        let ratio = natural_width / natural_height;
        let area = width * height;
        height = (area / ratio).sqrt().floor();
        width = if height > 0.0 {
            (area / height).floor()
        } else {
            0.0
        };
    }

    let max_width = max_width.max(1.0);
    if width > max_width {
        height = (height * max_width / width).floor();
        width = max_width;
    }

    (width as u32, height as u32)
}
