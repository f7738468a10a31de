use std::{cell::Cell, path::PathBuf};

use thiserror::Error;

/// Closed set of error kinds reported through the last-error record.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    #[default]
    Ok,
    OutOfMemory,
    IdxLayer,
    IdxSprite,
    IdxAnimation,
    IdxPicture,
    RefTileset,
    RefTilemap,
    RefSpriteset,
    RefPalette,
    RefSequence,
    RefSequencePack,
    RefBitmap,
    RefList,
    NullPointer,
    FileNotFound,
    WrongFormat,
    WrongSize,
    Unsupported,
}

impl ErrorKind {
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::Ok => "No error",
            ErrorKind::OutOfMemory => "Not enough memory",
            ErrorKind::IdxLayer => "Layer index out of range",
            ErrorKind::IdxSprite => "Sprite index out of range",
            ErrorKind::IdxAnimation => "Animation index out of range",
            ErrorKind::IdxPicture => "Picture or tile index out of range",
            ErrorKind::RefTileset => "Invalid tileset reference",
            ErrorKind::RefTilemap => "Invalid tilemap reference",
            ErrorKind::RefSpriteset => "Invalid spriteset reference",
            ErrorKind::RefPalette => "Invalid palette reference",
            ErrorKind::RefSequence => "Invalid sequence reference",
            ErrorKind::RefSequencePack => "Invalid sequence pack reference",
            ErrorKind::RefBitmap => "Invalid bitmap reference",
            ErrorKind::RefList => "Invalid object list reference",
            ErrorKind::NullPointer => "Null pointer as required argument",
            ErrorKind::FileNotFound => "Resource file not found",
            ErrorKind::WrongFormat => "Resource file has invalid format",
            ErrorKind::WrongSize => "A width or height parameter is invalid",
            ErrorKind::Unsupported => "Unsupported function",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Out of memory")]
    OutOfMemory,

    #[error("Layer index {0} out of range")]
    IdxLayer(usize),

    #[error("Sprite index {0} out of range")]
    IdxSprite(usize),

    #[error("Animation index {0} out of range")]
    IdxAnimation(usize),

    #[error("Picture index {0} out of range")]
    IdxPicture(usize),

    #[error("Invalid tileset reference")]
    RefTileset,

    #[error("Invalid tilemap reference")]
    RefTilemap,

    #[error("Invalid spriteset reference")]
    RefSpriteset,

    #[error("Invalid palette reference")]
    RefPalette,

    #[error("Invalid sequence reference")]
    RefSequence,

    #[error("Invalid sequence pack reference")]
    RefSequencePack,

    #[error("Invalid bitmap reference")]
    RefBitmap,

    #[error("Invalid object list reference")]
    RefObjectList,

    #[error("Missing required argument: {0}")]
    NullPointer(&'static str),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error on {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("Wrong format: {0}")]
    WrongFormat(String),

    #[error("Wrong size: {0}")]
    WrongSize(String),

    #[error("Cell ({row}, {col}) outside of {rows}x{cols} grid")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OutOfMemory => ErrorKind::OutOfMemory,
            Error::IdxLayer(_) => ErrorKind::IdxLayer,
            Error::IdxSprite(_) => ErrorKind::IdxSprite,
            Error::IdxAnimation(_) => ErrorKind::IdxAnimation,
            Error::IdxPicture(_) => ErrorKind::IdxPicture,
            Error::RefTileset => ErrorKind::RefTileset,
            Error::RefTilemap => ErrorKind::RefTilemap,
            Error::RefSpriteset => ErrorKind::RefSpriteset,
            Error::RefPalette => ErrorKind::RefPalette,
            Error::RefSequence => ErrorKind::RefSequence,
            Error::RefSequencePack => ErrorKind::RefSequencePack,
            Error::RefBitmap => ErrorKind::RefBitmap,
            Error::RefObjectList => ErrorKind::RefList,
            Error::NullPointer(_) => ErrorKind::NullPointer,
            Error::FileNotFound(_) | Error::Io { .. } => ErrorKind::FileNotFound,
            Error::WrongFormat(_) => ErrorKind::WrongFormat,
            Error::WrongSize(_) | Error::OutOfBounds { .. } => ErrorKind::WrongSize,
            Error::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Most recent error kind produced by a slot operation.
#[derive(Debug, Default)]
pub struct LastError(Cell<ErrorKind>);

impl LastError {
    pub fn get(&self) -> ErrorKind {
        self.0.get()
    }

    pub fn set(&self, kind: ErrorKind) {
        self.0.set(kind);
    }

    pub fn record<T>(&self, result: Result<T>) -> Result<T> {
        self.0.set(match &result {
            Ok(_) => ErrorKind::Ok,
            Err(e) => e.kind(),
        });
        result
    }
}
