pub mod core;
pub mod events;
pub mod gradings;
pub mod resolve;
