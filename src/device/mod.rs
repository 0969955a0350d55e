pub mod backend;
pub mod finder;
pub mod http;
pub mod recording;
pub mod types;
