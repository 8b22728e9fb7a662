/// Macros for locating test fixtures.
pub mod tests;
