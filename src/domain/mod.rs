pub mod calibration;
pub mod command;
pub mod conditioner;
pub mod frame;
pub mod mapper;
pub mod models;
pub mod settings;
