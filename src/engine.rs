use log::{info, trace};

use crate::{
    config::EngineConfig,
    draw::{draw_scanline, LineBuffers},
    error::{Error, Result},
    framebuffer::{FrameExchange, Framebuffer},
    scene::Scene,
};

/// Invoked with the scanline about to be composited.
pub type RasterCallback = Box<dyn FnMut(&mut Scene, usize)>;
/// Invoked with the frame timestamp after the last scanline.
pub type FrameCallback = Box<dyn FnMut(&mut Scene, u32)>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Protocol {
    /// `draw_frame` composites the whole frame.
    Callback,
    /// `begin_frame` + `draw_next_scanline`.
    Manual,
}

/// Engine context: the scene plus the framebuffer it is composited into.
pub struct Engine {
    pub scene: Scene,
    framebuffer: Framebuffer,
    buffers: LineBuffers,
    raster_callback: Option<RasterCallback>,
    frame_callback: Option<FrameCallback>,
    protocol: Option<Protocol>,
    line: usize,
    time: u32,
    exchange: Option<FrameExchange>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let scene = Scene::new(&config)?;
        info!(
            "Engine {}x{}: {} layers, {} sprites, {} animations",
            config.width, config.height, config.layers, config.sprites, config.animations
        );
        Ok(Self {
            scene,
            framebuffer: Framebuffer::new(config.width, config.height),
            buffers: LineBuffers::new(config.width),
            raster_callback: None,
            frame_callback: None,
            protocol: None,
            line: config.height,
            time: 0,
            exchange: None,
        })
    }

    pub fn width(&self) -> usize {
        self.scene.width()
    }

    pub fn height(&self) -> usize {
        self.scene.height()
    }

    pub fn set_raster_callback(&mut self, callback: impl FnMut(&mut Scene, usize) + 'static) {
        self.raster_callback = Some(Box::new(callback));
    }

    pub fn clear_raster_callback(&mut self) {
        self.raster_callback = None;
    }

    pub fn set_frame_callback(&mut self, callback: impl FnMut(&mut Scene, u32) + 'static) {
        self.frame_callback = Some(Box::new(callback));
    }

    pub fn clear_frame_callback(&mut self) {
        self.frame_callback = None;
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Draws into `data` from now on; rows start every `pitch` bytes.
    pub fn set_render_target(&mut self, data: Vec<u8>, pitch: usize) -> Result<()> {
        let target = Framebuffer::from_target(data, pitch, self.width(), self.height());
        self.framebuffer = self.scene_record(target)?;
        Ok(())
    }

    /// Takes the current output surface, leaving a fresh one in its place.
    pub fn take_render_target(&mut self) -> Framebuffer {
        let (width, height) = (self.width(), self.height());
        std::mem::replace(&mut self.framebuffer, Framebuffer::new(width, height))
    }

    /// Hands finished frames to a presenter through `exchange`.
    pub fn attach_exchange(&mut self, exchange: FrameExchange) {
        self.exchange = Some(exchange);
    }

    /// Sends the finished frame to the presenter and continues on a spare buffer.
    pub fn present(&mut self) -> Result<()> {
        let Some(exchange) = &self.exchange else {
            return self.scene_record(Err(Error::Unsupported("no frame exchange attached".into())));
        };
        let frame = std::mem::replace(&mut self.framebuffer, Framebuffer::new(0, 0));
        match exchange.swap(frame) {
            Ok(next) => {
                self.framebuffer = next;
                Ok(())
            }
            Err(e) => {
                self.framebuffer = Framebuffer::new(self.width(), self.height());
                self.scene_record(Err(e))
            }
        }
    }

    fn scene_record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.scene.set_last_error(e.kind());
        }
        result
    }

    fn lock_protocol(&mut self, protocol: Protocol) -> Result<()> {
        match self.protocol {
            None => {
                self.protocol = Some(protocol);
                Ok(())
            }
            Some(p) if p == protocol => Ok(()),
            Some(p) => self.scene_record(Err(Error::Unsupported(format!(
                "engine already renders with the {:?} protocol",
                p
            )))),
        }
    }

    fn start(&mut self, time: u32) {
        trace!("Frame at {}", time);
        self.time = time;
        self.line = 0;
        self.scene.reset_collisions();
        self.scene.update_animations(time);
    }

    fn draw_line(&mut self) {
        let line = self.line;
        if let Some(callback) = &mut self.raster_callback {
            callback(&mut self.scene, line);
        }
        draw_scanline(
            &mut self.scene,
            line,
            self.framebuffer.line_mut(line),
            &mut self.buffers,
        );
        self.line += 1;
        if self.line == self.height() {
            if let Some(callback) = &mut self.frame_callback {
                callback(&mut self.scene, self.time);
            }
        }
    }

    /// Composites a whole frame, calling the raster callback before every scanline.
    pub fn draw_frame(&mut self, time: u32) -> Result<()> {
        self.lock_protocol(Protocol::Callback)?;
        self.start(time);
        while self.line < self.height() {
            self.draw_line();
        }
        Ok(())
    }

    /// Starts a frame for `draw_next_scanline`.
    pub fn begin_frame(&mut self, time: u32) -> Result<()> {
        self.lock_protocol(Protocol::Manual)?;
        self.start(time);
        Ok(())
    }

    /// Composites the next scanline; `Ok(false)` once the frame is complete.
    pub fn draw_next_scanline(&mut self) -> Result<bool> {
        self.lock_protocol(Protocol::Manual)?;
        if self.line >= self.height() {
            return Ok(false);
        }
        self.draw_line();
        Ok(self.line < self.height())
    }

    /// Scanline `draw_next_scanline` will composite next.
    pub fn current_line(&self) -> usize {
        self.line
    }
}
