pub mod client;
pub mod error;
pub mod repository;
pub mod types;

pub use client::RestClient;
pub use error::ApiError;
pub use repository::InboxRepository;
pub use types::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MessagePage};
