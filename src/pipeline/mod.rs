pub mod frame_bus;

pub use frame_bus::{FrameBus, Published};
