pub mod coordinator;
pub mod lifecycle;
