pub mod serve;
pub mod sweep;
pub mod triggers;
