pub mod progress;

pub use progress::{LoadingSpinner, ProgressWriterFactory, RunProgress};
