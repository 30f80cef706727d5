//! Deterministic synthetic YUV 4:2:0 frames.
//!
//! Frame `i` of a [`TestPattern`] has, modulo 256:
//!
//! - `Y[x, y] = x + y + 3i`
//! - `U[x, y] = 128 + y + 2i`
//! - `V[x, y] = 64 + x + 5i`
//!
//! where `x`, `y` index the plane's own samples (chroma planes are half size).
//! The result is a moving diagonal gradient that compresses predictably.

use crate::planes::FrameBuffer;

/// Generator for the moving-gradient pattern.
///
/// # Example
///
/// ```
/// use yuvenc::TestPattern;
///
/// let pattern = TestPattern::new(4, 2);
/// let frame = pattern.frame(1);
/// assert_eq!(frame.y, vec![3, 4, 5, 6, 4, 5, 6, 7]);
/// assert_eq!(frame.u, vec![130, 130]);
/// assert_eq!(frame.v, vec![69, 70]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPattern {
    width: u32,
    height: u32,
}

/// One tightly packed frame of the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternFrame {
    /// Image width in pixels.
    pub width: u32,
    /// Luma plane, `width * height` bytes.
    pub y: Vec<u8>,
    /// Blue-difference plane, `width/2 * height/2` bytes.
    pub u: Vec<u8>,
    /// Red-difference plane, `width/2 * height/2` bytes.
    pub v: Vec<u8>,
}

impl PatternFrame {
    /// Borrow the planes for submission.
    pub fn buffer(&self) -> FrameBuffer<'_> {
        FrameBuffer::packed(self.width, &self.y, &self.u, &self.v)
    }
}

impl TestPattern {
    /// A pattern for `width x height` images.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Image width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Render frame `index` into freshly allocated planes.
    pub fn frame(&self, index: u64) -> PatternFrame {
        let luma = self.width as usize * self.height as usize;
        let chroma = (self.width / 2) as usize * (self.height / 2) as usize;
        let mut frame = PatternFrame {
            width: self.width,
            y: vec![0; luma],
            u: vec![0; chroma],
            v: vec![0; chroma],
        };
        self.fill(index, &mut frame.y, &mut frame.u, &mut frame.v);
        frame
    }

    /// Render frame `index` into existing packed planes.
    ///
    /// Planes shorter than the image are filled as far as they go.
    pub fn fill(&self, index: u64, y: &mut [u8], u: &mut [u8], v: &mut [u8]) {
        let width = self.width as usize;
        let chroma_width = width / 2;
        let step = (index % 256) as usize;

        for (offset, sample) in y.iter_mut().enumerate() {
            let (row, column) = (offset / width.max(1), offset % width.max(1));
            *sample = (column + row + step * 3) as u8;
        }
        for (offset, (cb, cr)) in u.iter_mut().zip(v.iter_mut()).enumerate() {
            let (row, column) = (
                offset / chroma_width.max(1),
                offset % chroma_width.max(1),
            );
            *cb = (128 + row + step * 2) as u8;
            *cr = (64 + column + step * 5) as u8;
        }
    }
}
