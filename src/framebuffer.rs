use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;

use crate::{
    common::Color,
    error::{Error, Result},
};

/// RGBA output surface. Rows start every `pitch` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Framebuffer {
    width: usize,
    height: usize,
    pitch: usize,
    data: Vec<u8>,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        let pitch = width * 4;
        Self {
            width,
            height,
            pitch,
            data: vec![0; pitch * height],
        }
    }

    /// Wraps a caller-supplied buffer, which must hold `height` rows of `pitch` bytes.
    pub fn from_target(data: Vec<u8>, pitch: usize, width: usize, height: usize) -> Result<Self> {
        if pitch < width * 4 {
            return Err(Error::WrongSize(format!("pitch {} below row size {}", pitch, width * 4)));
        }
        if data.len() < pitch * height {
            return Err(Error::WrongSize(format!(
                "render target holds {} bytes, needs {}",
                data.len(),
                pitch * height
            )));
        }
        Ok(Self {
            width,
            height,
            pitch,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn line(&self, y: usize) -> &[u8] {
        &self.data[y * self.pitch..][..self.width * 4]
    }

    pub(crate) fn line_mut(&mut self, y: usize) -> &mut [u8] {
        &mut self.data[y * self.pitch..][..self.width * 4]
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let px = &self.line(y)[x * 4..][..4];
        Some(Color::new(px[0], px[1], px[2]))
    }

    /// Packed RGBA rows without pitch padding.
    pub fn to_rgba(&self) -> Vec<u8> {
        (0..self.height).flat_map(|y| self.line(y).iter().copied()).collect()
    }
}

/// Renderer side of a double-buffered handoff to a presenter thread.
pub struct FrameExchange {
    full: Sender<Framebuffer>,
    spare: Receiver<Framebuffer>,
}

/// Presenter side: receives finished frames and hands spent buffers back.
pub struct FramePresenter {
    full: Receiver<Framebuffer>,
    spare: Sender<Framebuffer>,
}

/// Creates a connected pair seeded with one spare `width` x `height` buffer.
pub fn frame_exchange(width: usize, height: usize) -> Result<(FrameExchange, FramePresenter)> {
    let (full_tx, full_rx) = bounded(1);
    let (spare_tx, spare_rx) = bounded(2);
    spare_tx
        .send(Framebuffer::new(width, height))
        .map_err(|_| Error::NullPointer("frame exchange"))?;
    Ok((
        FrameExchange {
            full: full_tx,
            spare: spare_rx,
        },
        FramePresenter {
            full: full_rx,
            spare: spare_tx,
        },
    ))
}

impl FrameExchange {
    /// Hands `frame` to the presenter and waits for a spare buffer to draw the next one into.
    pub fn swap(&self, frame: Framebuffer) -> Result<Framebuffer> {
        self.full
            .send(frame)
            .map_err(|_| Error::NullPointer("frame presenter"))?;
        let next = self
            .spare
            .recv()
            .map_err(|_| Error::NullPointer("frame presenter"))?;
        debug!("Swapped framebuffer");
        Ok(next)
    }
}

impl FramePresenter {
    /// Blocks until a finished frame arrives; `None` once the renderer is gone.
    pub fn recv(&self) -> Option<Framebuffer> {
        self.full.recv().ok()
    }

    pub fn recycle(&self, frame: Framebuffer) -> Result<()> {
        self.spare
            .send(frame)
            .map_err(|_| Error::NullPointer("frame exchange"))
    }
}
