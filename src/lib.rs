// crisis-guard - Crisis signal detection
// Library exports

pub mod config;
pub mod crisis;
pub mod errors;
