pub mod client;
pub mod errors;
pub mod source;
pub mod wire;

pub use client::FifaClient;
pub use errors::ApiError;
pub use source::SportsDataSource;
