pub mod eod_controller;
pub mod tracking_controller;
