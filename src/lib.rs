//! Barnbook footing engine: moisture estimation, ride-day scoring, ride
//! window generation and the drying-rate tuner.

pub mod config;
pub mod db;
pub mod errors;
pub mod helpers;
pub mod routes;
pub mod services;
