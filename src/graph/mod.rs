pub mod catalog;
pub mod document;
pub mod model;
pub mod operation;
pub mod search;
pub mod selector;
