mod client;
mod response;

pub use client::{HttpClient, RequestSpec};
pub use response::Response;
