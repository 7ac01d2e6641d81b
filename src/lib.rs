pub mod command_loop;
pub mod config;
pub mod console;
pub mod events;
pub mod peripheral;
pub mod protocol;
pub mod pump;
pub mod response_buffer;
pub mod session;
pub mod simulator;
pub mod terminal;

#[cfg(feature = "btleplug")]
pub mod ble;
