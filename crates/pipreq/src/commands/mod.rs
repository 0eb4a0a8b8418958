use std::process::ExitCode;

pub(crate) use dump::dump;
pub(crate) use hash::hash;
pub(crate) use parse::parse;

mod dump;
mod hash;
mod parse;

#[derive(Copy, Clone)]
pub(crate) enum ExitStatus {
    /// The command succeeded.
    Success,

    /// The command succeeded, but some lines could not be parsed.
    Failure,

    /// The command failed with an unexpected error.
    Error,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => Self::from(0),
            ExitStatus::Failure => Self::from(1),
            ExitStatus::Error => Self::from(2),
        }
    }
}
