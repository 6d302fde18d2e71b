//! Use cases built on the domain and infrastructure layers

pub mod use_cases;
