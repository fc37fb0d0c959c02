pub mod config;
pub mod error;
pub mod notion_client;
pub mod record_mapper;
