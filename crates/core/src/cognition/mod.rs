pub mod classifier;
pub mod prompt;
