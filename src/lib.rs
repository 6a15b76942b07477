pub mod api;
pub mod capture;
pub mod config;
pub mod congestion;
pub mod detector;
pub mod error;
pub mod geometry;
pub mod model;
pub mod pipeline;
pub mod roi;
pub mod state;
pub mod store;
