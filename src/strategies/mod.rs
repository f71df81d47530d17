pub mod recommend;
pub mod types;
pub mod weather_edge;
