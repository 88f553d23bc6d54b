pub mod color;
pub mod color_cache;
pub mod config;
pub mod control;
pub mod controller;
pub mod errors;
pub mod frame_clock;
pub mod lightning;
pub mod logging;
pub mod model;
pub mod noise;
pub mod opc;
pub mod params;
pub mod renderer;
pub mod transform;
pub mod watch;
