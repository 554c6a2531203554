//! Side effects requested by the update function.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Move the job selection by `offset` places.
    SelectRelativeJob(isize),
    /// Observe the global tree instead of a job.
    ObserveGlobal,
    /// Loud pull of everything for the current target.
    Retry,
    /// Ask the backend to reload its state.
    BackendRefresh,
    Quit,
}
