pub mod selection_pattern;

pub use selection_pattern::{SelectionPattern, SelectionPatterns};
