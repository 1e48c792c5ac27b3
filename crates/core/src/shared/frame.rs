use ndarray::ArrayView3;

/// Channel order of a frame's interleaved pixel data.
///
/// Cameras and some decoders hand out BGR; the detection graph expects RGB.
/// Conversion happens once, at the point a frame enters the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelOrder {
    Rgb,
    Bgr,
}

/// A single video/image frame: contiguous 3-channel bytes in row-major order.
///
/// The frame owns its pixel data; submitting it to the graph moves the
/// buffer into the packet without further copies.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    order: PixelOrder,
    index: usize,
}

pub const FRAME_CHANNELS: usize = 3;

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        Self::with_order(data, width, height, PixelOrder::Rgb, index)
    }

    pub fn with_order(
        data: Vec<u8>,
        width: u32,
        height: u32,
        order: PixelOrder,
        index: usize,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * FRAME_CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            order,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> PixelOrder {
        self.order
    }

    /// Zero-based position of this frame in its source stream.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the frame with RGB channel order, swapping in place if needed.
    pub fn into_rgb(mut self) -> Self {
        if self.order == PixelOrder::Bgr {
            for px in self.data.chunks_exact_mut(FRAME_CHANNELS) {
                px.swap(0, 2);
            }
            self.order = PixelOrder::Rgb;
        }
        self
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, FRAME_CHANNELS)
    }
}
