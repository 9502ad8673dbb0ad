pub mod assets;
pub mod clients;
pub mod config;
pub mod database;
pub mod errors;
pub mod gating;
pub mod matching;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod services;
pub mod utils;
pub mod web;
