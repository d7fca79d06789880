use ulid::Ulid;

/// Infrastructure and precondition faults. Expected negative outcomes of
/// an admission attempt (conflicts, closed hours, bad intervals) are NOT
/// errors — they travel as `Admission::Rejected` values.
#[derive(Debug)]
pub enum EngineError {
    FieldNotFound(Ulid),
    ReservationNotFound(Ulid),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    /// Journal I/O failed. Possibly transient; the caller may retry with
    /// backoff. The engine itself never retries a write blindly.
    JournalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::FieldNotFound(id) => write!(f, "field not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
