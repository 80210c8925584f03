use crate::backend::BackendError;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the forward models.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("precondition violated: {0}")]
    Precondition(String),

    /// A failure inside a model run, tagged with where it happened.
    #[error("run {run} failed at {location} during {stage}: {source}")]
    Run {
        run: Uuid,
        location: Location,
        stage: Stage,
        #[source]
        source: Failure,
    },
}

/// The underlying cause of a failed run.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Pipeline stage of one illumination angle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Init,
    Illuminate,
    Propagate,
    Scatter,
    Refocus,
    Filter,
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Illuminate => "illuminate",
            Stage::Propagate => "propagate",
            Stage::Scatter => "scatter",
            Stage::Refocus => "refocus",
            Stage::Filter => "filter",
            Stage::Extract => "extract",
        };
        f.write_str(name)
    }
}

/// Angle and slice indices of a failure. The angle is absent for failures during setup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub angle: Option<usize>,
    pub slice: Option<usize>,
}

impl Location {
    pub fn setup() -> Self {
        Location::default()
    }

    pub fn angle(angle: usize) -> Self {
        Location {
            angle: Some(angle),
            slice: None,
        }
    }

    pub fn slice(angle: usize, slice: usize) -> Self {
        Location {
            angle: Some(angle),
            slice: Some(slice),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.angle, self.slice) {
            (None, None) => f.write_str("setup"),
            (None, Some(slice)) => write!(f, "setup, slice {}", slice),
            (Some(angle), None) => write!(f, "angle {}", angle),
            (Some(angle), Some(slice)) => write!(f, "angle {}, slice {}", angle, slice),
        }
    }
}

impl Error {
    pub(crate) fn run(
        run: Uuid,
        location: Location,
        stage: Stage,
        source: impl Into<Failure>,
    ) -> Self {
        Error::Run {
            run,
            location,
            stage,
            source: source.into(),
        }
    }

    /// The stage a run failed in, if this is a run failure.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Run { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Error::Run { location, .. } => Some(*location),
            _ => None,
        }
    }
}
