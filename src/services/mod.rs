pub mod accuracy;
pub mod alerts;
pub mod calendar;
pub mod forecast;
pub mod moisture;
pub mod owm;
pub mod ride_day;
pub mod scoring;
pub mod settings;
pub mod sync;
pub mod tuner;
pub mod windows;
