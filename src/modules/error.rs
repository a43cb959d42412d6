use thiserror::Error;

pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("at least one rover is required")]
    NoRovers,

    #[error("loss rate must lie in [0, 1], got {0}")]
    InvalidLossRate(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("obstacle {index} is not a valid polygon")]
    InvalidObstacle { index: usize },

    #[error("not enough start positions: need {need}, have {have}")]
    NotEnoughStarts { need: usize, have: usize },

    #[error("start position {index} is not a free cell inside the world")]
    InvalidStart { index: usize },

    #[error("could not find a free start position after {attempts} attempts")]
    StartPositionsExhausted { attempts: usize },
}
