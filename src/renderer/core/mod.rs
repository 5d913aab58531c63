pub mod device;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod target;
pub mod transfer;
