/// Coarse classification shared by storage and service errors, used by the
/// HTTP boundary to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied bad input.
    Validation,
    NotFound,
    WrongPassword,
    /// Uniqueness violation on insert.
    Conflict,
    /// Lock contention or pool exhaustion; the caller may retry.
    Transient,
    /// A stored hash or timestamp could not be parsed.
    CorruptData,
    Cancelled,
    Internal,
}
