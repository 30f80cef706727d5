//! Caller-side YUV 4:2:0 planes and the copy into the session's frame.
//!
//! Backends pad rows for alignment, so the destination stride is frequently
//! larger than the logical row width. Planes are therefore copied row by row,
//! never as one `stride * rows` block.

use crate::error::EncodeError;

/// Index of the luma plane.
pub const Y_PLANE: usize = 0;
/// Index of the blue-difference chroma plane.
pub const U_PLANE: usize = 1;
/// Index of the red-difference chroma plane.
pub const V_PLANE: usize = 2;

/// One caller-owned plane: bytes plus the distance between row starts.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    /// Sample bytes.
    pub data: &'a [u8],
    /// Row pitch in bytes.
    pub stride: usize,
}

impl<'a> Plane<'a> {
    /// A plane with an explicit row pitch.
    pub fn new(data: &'a [u8], stride: usize) -> Self {
        Self { data, stride }
    }
}

/// Three planes of one 4:2:0 image, borrowed for a single submit call.
///
/// # Example
///
/// ```
/// use yuvenc::FrameBuffer;
///
/// let y = vec![16u8; 4 * 2];
/// let u = vec![128u8; 2 * 1];
/// let v = vec![128u8; 2 * 1];
/// let frame = FrameBuffer::packed(4, &y, &u, &v);
/// assert_eq!(frame.planes()[0].stride, 4);
/// assert_eq!(frame.planes()[1].stride, 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameBuffer<'a> {
    planes: [Plane<'a>; 3],
}

impl<'a> FrameBuffer<'a> {
    /// Planes with explicit strides.
    pub fn new(y: Plane<'a>, u: Plane<'a>, v: Plane<'a>) -> Self {
        Self { planes: [y, u, v] }
    }

    /// Tightly packed planes for an image `width` pixels wide.
    pub fn packed(width: u32, y: &'a [u8], u: &'a [u8], v: &'a [u8]) -> Self {
        let luma = width as usize;
        let chroma = luma / 2;
        Self::new(
            Plane::new(y, luma),
            Plane::new(u, chroma),
            Plane::new(v, chroma),
        )
    }

    /// The Y, U, and V planes in order.
    pub fn planes(&self) -> &[Plane<'a>; 3] {
        &self.planes
    }
}

/// Logical size of the three planes for a given image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlaneGeometry {
    pub(crate) width: usize,
    pub(crate) height: usize,
}

impl PlaneGeometry {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as usize,
            height: height as usize,
        }
    }

    /// `(row_bytes, rows)` of `plane`.
    pub(crate) fn extent(&self, plane: usize) -> (usize, usize) {
        match plane {
            Y_PLANE => (self.width, self.height),
            _ => (self.width / 2, self.height / 2),
        }
    }
}

fn plane_name(plane: usize) -> &'static str {
    match plane {
        Y_PLANE => "Y",
        U_PLANE => "U",
        _ => "V",
    }
}

/// Check that a caller plane covers `rows` rows of `row_bytes`.
pub(crate) fn validate_plane(
    plane: usize,
    source: &Plane<'_>,
    row_bytes: usize,
    rows: usize,
) -> Result<(), EncodeError> {
    if source.stride < row_bytes {
        return Err(EncodeError::InvalidFrame(format!(
            "{} plane stride {} is smaller than its row width {}",
            plane_name(plane),
            source.stride,
            row_bytes,
        )));
    }

    let required = if rows == 0 {
        0
    } else {
        source.stride * (rows - 1) + row_bytes
    };
    if source.data.len() < required {
        return Err(EncodeError::InvalidFrame(format!(
            "{} plane holds {} bytes, {} rows of {} at stride {} need {}",
            plane_name(plane),
            source.data.len(),
            rows,
            row_bytes,
            source.stride,
            required,
        )));
    }

    Ok(())
}

/// Copy `rows` rows from `source` into `destination` laid out at
/// `destination_stride`. Bytes past `row_bytes` in each destination row are
/// left untouched.
pub(crate) fn copy_plane(
    destination: &mut [u8],
    destination_stride: usize,
    source: &Plane<'_>,
    row_bytes: usize,
    rows: usize,
) -> Result<(), EncodeError> {
    let width = row_bytes.min(destination_stride).min(source.stride);

    if destination_stride == source.stride && width == source.stride {
        let total = width * rows;
        if destination.len() < total {
            return Err(EncodeError::Resource(format!(
                "frame plane holds {} bytes, {} required",
                destination.len(),
                total
            )));
        }
        destination[..total].copy_from_slice(&source.data[..total]);
        return Ok(());
    }

    for row in 0..rows {
        let source_start = row * source.stride;
        let destination_start = row * destination_stride;
        let Some(target) = destination.get_mut(destination_start..destination_start + width) else {
            return Err(EncodeError::Resource(format!(
                "frame plane too short for row {row} at stride {destination_stride}"
            )));
        };
        target.copy_from_slice(&source.data[source_start..source_start + width]);
    }

    Ok(())
}
