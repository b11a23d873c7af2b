pub mod api_response;
pub mod eod_dto;
pub mod tracking_dto;

pub use api_response::ApiResponse;
pub use eod_dto::{EodFilter, EodReportsResponse};
pub use tracking_dto::*;
