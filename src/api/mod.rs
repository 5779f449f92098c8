pub mod client;
pub mod models;

pub use client::ApiClient;
pub use models::{CommandReply, PowerData, RegisterRange, RegisterReading, ServerStatus, SessionsResponse};
