use crate::readback::ReadbackError;

#[derive(Debug, thiserror::Error)]
pub enum SpriteError {
    /// Registration rejected; the instance was not added.
    #[error("sprite capacity of {max} instances exceeded")]
    CapacityExceeded { max: u32 },
    #[error("sprite renderer has not been initialized")]
    NotInitialized,
    #[error("render called before prepare for this frame")]
    FrameNotPrepared,
    #[error(transparent)]
    Readback(#[from] ReadbackError),
}
