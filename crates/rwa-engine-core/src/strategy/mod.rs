pub mod generators;

pub use generators::{JsonViewGenerator, ManualViewGenerator, ViewGenerator};
