pub mod dispatcher;
pub mod engine;
pub mod journal;
pub mod template;
