use log::debug;

use crate::{
    arena::Handle,
    common::{Color, TileIdx},
    palette::{mix_color, Palette},
    sequence::{ColorStrip, Sequence, SequenceFrame, StripDirection},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnimationTarget {
    Palette(Handle<Palette>),
    /// Tileset bound to the given layer.
    Tileset { layer: usize },
    /// Tilemap bound to the given layer.
    Tilemap { layer: usize },
    Sprite { sprite: usize },
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AnimationState {
    #[default]
    Inactive,
    Active,
}

/// Frame shown by a frame animation, with the frame it replaces.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameChange {
    pub prev: Option<TileIdx>,
    pub index: TileIdx,
}

#[derive(Copy, Clone, Debug, Default)]
struct StripTimer {
    pos: usize,
    elapsed: u32,
}

#[derive(Clone, Debug, Default)]
pub struct Animation {
    state: AnimationState,
    target: Option<AnimationTarget>,
    sequence: Option<Handle<Sequence>>,
    pos: usize,
    elapsed: u32,
    loops_left: u32,
    started: bool,
    blend: bool,
    /// Replaces every per-step delay of the sequence.
    delay: Option<u32>,
    strips: Vec<StripTimer>,
    source: Option<Palette>,
}

impl Animation {
    pub fn state(&self) -> AnimationState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == AnimationState::Active
    }

    pub fn target(&self) -> Option<AnimationTarget> {
        self.target
    }

    pub fn sequence(&self) -> Option<Handle<Sequence>> {
        self.sequence
    }

    /// Index of the frame (or first strip position) currently shown.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn activate(
        &mut self,
        target: AnimationTarget,
        sequence: Handle<Sequence>,
        blend: bool,
        source: Option<Palette>,
    ) {
        *self = Animation {
            state: AnimationState::Active,
            target: Some(target),
            sequence: Some(sequence),
            blend,
            source,
            ..Default::default()
        };
    }

    pub fn delay(&self) -> Option<u32> {
        self.delay
    }

    pub(crate) fn set_delay(&mut self, delay: Option<u32>) {
        self.delay = delay;
    }

    /// Stops immediately; the target keeps its last rendered state.
    pub fn disable(&mut self) {
        self.state = AnimationState::Inactive;
    }

    pub(crate) fn set_source(&mut self, source: Palette) {
        self.source = Some(source);
    }

    /// Advances a frame sequence by `dt` time units. The first tick after
    /// activation shows frame 0 without consuming time.
    pub(crate) fn tick_frames(&mut self, frames: &[SequenceFrame], loops: u32, dt: u32) -> Vec<FrameChange> {
        let mut changes = vec![];
        if !self.is_active() {
            return changes;
        }
        if frames.is_empty() {
            self.state = AnimationState::Inactive;
            return changes;
        }
        if !self.started {
            self.started = true;
            self.loops_left = loops;
            changes.push(FrameChange {
                prev: None,
                index: frames[0].index,
            });
            return changes;
        }
        self.elapsed = self.elapsed.saturating_add(dt);
        loop {
            let delay = self.delay.unwrap_or(frames[self.pos].delay).max(1);
            if self.elapsed < delay {
                break;
            }
            self.elapsed -= delay;
            let prev = frames[self.pos].index;
            self.pos += 1;
            if self.pos == frames.len() {
                match self.loops_left {
                    0 => self.pos = 0,
                    1 => {
                        self.pos = frames.len() - 1;
                        self.state = AnimationState::Inactive;
                        debug!("Animation finished on frame {}", prev);
                        break;
                    }
                    n => {
                        self.loops_left = n - 1;
                        self.pos = 0;
                    }
                }
            }
            changes.push(FrameChange {
                prev: Some(prev),
                index: frames[self.pos].index,
            });
        }
        changes
    }

    /// Advances every color strip by `dt` and returns the palette entries to write.
    pub(crate) fn tick_palette(&mut self, strips: &[ColorStrip], dt: u32) -> Vec<(usize, Color)> {
        if !self.started {
            self.started = true;
            self.strips = vec![StripTimer::default(); strips.len()];
        } else {
            for (timer, strip) in self.strips.iter_mut().zip(strips) {
                let delay = self.delay.unwrap_or(strip.delay).max(1);
                timer.elapsed = timer.elapsed.saturating_add(dt);
                while timer.elapsed >= delay {
                    timer.elapsed -= delay;
                    timer.pos = (timer.pos + 1) % strip.count.max(1) as usize;
                }
            }
        }
        self.pos = self.strips.first().map_or(0, |t| t.pos);

        let Some(source) = &self.source else {
            return vec![];
        };
        let mut writes = vec![];
        for (timer, strip) in self.strips.iter().zip(strips) {
            let count = strip.count as usize;
            let at = |k: usize, pos: usize| -> Color {
                let pos = pos % count;
                let offset = match strip.dir {
                    StripDirection::Forward => (k + count - pos) % count,
                    StripDirection::Backward => (k + pos) % count,
                };
                source
                    .color((strip.first as usize + offset) as u8)
                    .unwrap_or_default()
            };
            for k in 0..count {
                let color = if self.blend {
                    let delay = self.delay.unwrap_or(strip.delay).max(1);
                    let t = (timer.elapsed as u64 * 255 / delay as u64) as u8;
                    mix_color(at(k, timer.pos), at(k, timer.pos + 1), t)
                } else {
                    at(k, timer.pos)
                };
                writes.push((strip.first as usize + k, color));
            }
        }
        writes
    }
}
