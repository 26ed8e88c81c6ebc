pub mod dreams;
pub mod runs;
