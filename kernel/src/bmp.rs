// Streamed 1 bpp BMP decoder
//
// Reads the 14-byte file header, skips to the pixel offset, then pulls
// `height` bottom-up rows of `ceil(width/8)` bytes padded to a 4-byte
// stride, writing each flipped into a packed top-down buffer with the
// padding dropped. Every read races an idle timer that restarts on
// progress, so a stalled server costs at most `idle_ms` per read.
//
// The destination is the framebuffer's staging plane; on any error its
// contents are garbage and must not be committed.

use embassy_futures::select::{Either, select};
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Read;
use log::{debug, warn};

pub const FILE_HEADER_LEN: usize = 14;

// anything past this is not a 1 bpp panel image
const MAX_PIXEL_OFFSET: u32 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Header does not start with `BM`.
    BadMagic,
    /// Pixel offset points inside the file header or absurdly far.
    BadOffset,
    /// Declared content length cannot hold the pixel rows.
    ShortBody,
    /// Stream ended before the last row.
    Truncated,
    /// No bytes for longer than the idle bound.
    Timeout,
    Io,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadMagic => write!(f, "not a bitmap"),
            Self::BadOffset => write!(f, "bad pixel offset"),
            Self::ShortBody => write!(f, "body shorter than image"),
            Self::Truncated => write!(f, "stream truncated"),
            Self::Timeout => write!(f, "stream idle timeout"),
            Self::Io => write!(f, "stream read error"),
        }
    }
}

/// Packed bytes per row, without padding.
#[inline]
pub const fn row_bytes(width: u16) -> usize {
    (width as usize).div_ceil(8)
}

/// Row length in the file, padded to 4 bytes.
#[inline]
pub const fn row_stride(width: u16) -> usize {
    row_bytes(width).next_multiple_of(4)
}

/// Validates the file header and returns the pixel data offset.
pub fn parse_header(header: &[u8; FILE_HEADER_LEN]) -> Result<u32, DecodeError> {
    if &header[..2] != b"BM" {
        return Err(DecodeError::BadMagic);
    }
    let offset = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
    if offset < FILE_HEADER_LEN as u32 || offset > MAX_PIXEL_OFFSET {
        return Err(DecodeError::BadOffset);
    }
    Ok(offset)
}

async fn read_full<R: Read, D: DelayNs>(
    src: &mut R,
    buf: &mut [u8],
    delay: &mut D,
    idle_ms: u32,
) -> Result<(), DecodeError> {
    let mut got = 0;
    while got < buf.len() {
        match select(src.read(&mut buf[got..]), delay.delay_ms(idle_ms)).await {
            Either::First(Ok(0)) => return Err(DecodeError::Truncated),
            Either::First(Ok(n)) => got += n,
            Either::First(Err(_)) => return Err(DecodeError::Io),
            Either::Second(()) => return Err(DecodeError::Timeout),
        }
    }
    Ok(())
}

async fn skip<R: Read, D: DelayNs>(
    src: &mut R,
    mut n: usize,
    delay: &mut D,
    idle_ms: u32,
) -> Result<(), DecodeError> {
    let mut scratch = [0u8; 64];
    while n > 0 {
        let step = n.min(scratch.len());
        read_full(src, &mut scratch[..step], delay, idle_ms).await?;
        n -= step;
    }
    Ok(())
}

/// Decodes a `width` x `height` bitmap from `src` into `out`.
///
/// `out` must hold `row_bytes(width) * height` bytes. `content_length`
/// is the declared body size when the server sent one.
pub async fn decode<R: Read, D: DelayNs>(
    src: &mut R,
    content_length: Option<usize>,
    delay: &mut D,
    idle_ms: u32,
    out: &mut [u8],
    width: u16,
    height: u16,
) -> Result<(), DecodeError> {
    let rb = row_bytes(width);
    let stride = row_stride(width);
    debug_assert!(out.len() >= rb * height as usize);

    let mut header = [0u8; FILE_HEADER_LEN];
    read_full(src, &mut header, delay, idle_ms).await?;
    let offset = parse_header(&header)? as usize;
    debug!("bmp: pixel offset {}", offset);

    let needed = offset + stride * height as usize;
    if let Some(len) = content_length
        && len < needed
    {
        warn!("bmp: content-length {} < {}", len, needed);
        return Err(DecodeError::ShortBody);
    }

    skip(src, offset - FILE_HEADER_LEN, delay, idle_ms).await?;

    let mut pad = [0u8; 3];
    let pad_len = stride - rb;
    for row in 0..height as usize {
        let dst = (height as usize - 1 - row) * rb;
        if let Err(e) = read_full(src, &mut out[dst..dst + rb], delay, idle_ms).await {
            warn!("bmp: row {} failed: {}", row, e);
            return Err(e);
        }
        if pad_len > 0 {
            read_full(src, &mut pad[..pad_len], delay, idle_ms).await?;
        }
    }
    Ok(())
}
