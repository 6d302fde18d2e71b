//! Domain model: workspace packages, the graph they form and the patterns
//! that select them
pub mod entities;
pub mod value_objects;
