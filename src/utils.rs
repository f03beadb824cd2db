//! Small helpers shared across the crate.

/// A convenience trait to log an error.
pub trait LogErr {
    /// Log an error with [`tracing`].
    fn log_err(&self);
    /// Log an error, then return self. This is for convenience with method chaining.
    fn and_log_err(self) -> Self
    where
        Self: Sized,
    {
        self.log_err();
        self
    }
}
impl<T, E: LogErr> LogErr for Result<T, E> {
    fn log_err(&self) {
        if let Err(err) = self {
            err.log_err();
        }
    }
}
