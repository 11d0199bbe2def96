use std::error::Error as StdError;
use std::fmt;

use crate::dag::PlanError;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error. Build-time plan rejections keep their typed form so
/// callers can match on them; everything else rides as glue.
#[derive(Debug)]
pub enum Error {
    Plan(PlanError),
    Other(anyhow::Error),
}

impl Error {
    pub fn msg(msg: String) -> Self {
        Error::Other(anyhow!(msg))
    }

    /// The planner rejection behind this error, if that is what it is.
    pub fn as_plan(&self) -> Option<&PlanError> {
        match self {
            Error::Plan(e) => Some(e),
            Error::Other(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Plan(e) => e.fmt(f),
            Error::Other(e) => e.fmt(f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Plan(e) => Some(e),
            Error::Other(e) => e.source(),
        }
    }
}

impl From<PlanError> for Error {
    fn from(e: PlanError) -> Self {
        Error::Plan(e)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::error::Error;
    use crate::dag::PlanError;

    #[test]
    pub fn plan_error_stays_typed_test() {
        let error = Error::from(PlanError::CycleDetected);
        assert!(matches!(error.as_plan(), Some(PlanError::CycleDetected)));
        assert_eq!(error.to_string(), "the pipeline contains a cycle");
    }

    #[test]
    pub fn glue_error_test() {
        let error = Error::msg("partition count must increase".to_string());
        assert!(error.as_plan().is_none());
        assert!(error.to_string().contains("partition count"));
    }
}
