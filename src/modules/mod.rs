pub mod channel;
pub mod comms;
pub mod config;
pub mod error;
pub mod geometry;
pub mod map;
pub mod navigation;
pub mod report;
pub mod rover;
pub mod sim;
pub mod world_model;
