use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{
    arena::Handle,
    common::TileIdx,
    error::{Error, Result},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFrame {
    /// Tile or sprite picture index shown by this frame.
    pub index: TileIdx,
    pub delay: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum StripDirection {
    #[default]
    Forward = 0,
    Backward = 1,
}

/// Range of palette entries rotated every `delay` time units.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorStrip {
    pub first: u8,
    pub count: u8,
    pub delay: u32,
    #[serde(default)]
    pub dir: StripDirection,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceData {
    Frames { frames: Vec<SequenceFrame> },
    Cycle { strips: Vec<ColorStrip> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    /// Tile replaced by a tileset animation.
    #[serde(default)]
    pub target: TileIdx,
    /// Number of passes; 0 repeats forever.
    #[serde(default)]
    pub loops: u32,
    #[serde(flatten)]
    pub data: SequenceData,
}

impl Sequence {
    pub fn frames(name: &str, target: TileIdx, frames: Vec<SequenceFrame>, loops: u32) -> Result<Self> {
        let seq = Self {
            name: name.to_string(),
            target,
            loops,
            data: SequenceData::Frames { frames },
        };
        seq.validate()?;
        Ok(seq)
    }

    pub fn cycle(name: &str, strips: Vec<ColorStrip>) -> Result<Self> {
        let seq = Self {
            name: name.to_string(),
            target: 0,
            loops: 0,
            data: SequenceData::Cycle { strips },
        };
        seq.validate()?;
        Ok(seq)
    }

    pub fn validate(&self) -> Result<()> {
        match &self.data {
            SequenceData::Frames { frames } if frames.is_empty() => Err(Error::WrongSize(
                format!("sequence '{}' has no frames", self.name),
            )),
            SequenceData::Cycle { strips } if strips.is_empty() => Err(Error::WrongSize(
                format!("sequence '{}' has no color strips", self.name),
            )),
            SequenceData::Cycle { strips } => {
                if let Some(s) = strips
                    .iter()
                    .find(|s| s.count == 0 || s.first as usize + s.count as usize > 256)
                {
                    return Err(Error::WrongSize(format!(
                        "sequence '{}' strip {}+{}",
                        self.name, s.first, s.count
                    )));
                }
                Ok(())
            }
            SequenceData::Frames { .. } => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            SequenceData::Frames { frames } => frames.len(),
            SequenceData::Cycle { strips } => strips.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self.data, SequenceData::Cycle { .. })
    }
}

/// Named collection of sequences held in the sequence arena.
#[derive(Clone, Debug, Default)]
pub struct SequencePack {
    pub name: String,
    sequences: Vec<Handle<Sequence>>,
    names: HashMap<String, usize>,
}

impl SequencePack {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Adds a sequence under `name`; a later sequence with the same name wins lookups.
    pub fn add(&mut self, name: &str, sequence: Handle<Sequence>) {
        self.names.insert(name.to_string(), self.sequences.len());
        self.sequences.push(sequence);
    }

    pub fn find(&self, name: &str) -> Option<Handle<Sequence>> {
        self.names.get(name).map(|&i| self.sequences[i])
    }

    pub fn get(&self, index: usize) -> Option<Handle<Sequence>> {
        self.sequences.get(index).copied()
    }

    pub fn sequences(&self) -> &[Handle<Sequence>] {
        &self.sequences
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}
