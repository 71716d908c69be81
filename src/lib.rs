pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod repository;
pub mod settings;
pub mod shell;
pub mod wal;
