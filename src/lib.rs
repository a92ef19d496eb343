pub mod config;
pub mod document;
pub mod handlers;
pub mod models;
pub mod retrieval;
pub mod services;
pub mod state;
pub mod utils;
