pub mod baseline;
pub mod cache;
pub mod cities;
pub mod gamma_api;
pub mod live;
pub mod ocr;
pub mod types;
pub mod weather;
