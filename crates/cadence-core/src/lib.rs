pub mod comparator;
pub mod config;
pub mod cycle;
pub mod data;
pub mod error;
pub mod event;
pub mod io;
pub mod job;
pub mod paths;
pub mod pipeline;
pub mod repository;
pub mod scenario;
pub mod scenario_manager;
pub mod subscriber;
pub mod types;

pub use error::{CadenceError, Result};
