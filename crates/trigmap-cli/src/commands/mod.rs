pub mod dep;
pub mod map_state;
pub mod triggers;
