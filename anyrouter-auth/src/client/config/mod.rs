mod settings;

pub use settings::{AppPaths, Settings};
