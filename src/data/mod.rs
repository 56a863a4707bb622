pub mod events;
pub mod live;
pub mod models;
