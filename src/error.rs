use thiserror::Error;

/// Failures raised while extracting a parent trace context from a carrier.
///
/// These errors never reach the caller of the middleware: extraction failures
/// are recovered locally by starting a root span instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtractError {
    /// The carrier holds a propagation field whose value cannot be read as a
    /// string, so it cannot be treated as a text-map carrier.
    #[error("carrier cannot be read as a text map")]
    InvalidCarrier,
    /// The carrier holds propagation fields, but they do not decode to a
    /// usable span context.
    #[error("span context in carrier is corrupted")]
    SpanContextCorrupted,
}
