pub mod architecture;
pub mod deployment;
pub mod state;
