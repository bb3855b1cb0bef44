pub mod export;
pub mod extractor;
pub mod service;
pub mod session;
