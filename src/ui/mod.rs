//! Terminal output

mod progress;

pub use progress::{ConsoleWriter, ProgressReporter, TransferBar};
