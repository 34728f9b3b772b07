pub mod calendar_host;
pub mod command_log;
pub mod config;
pub mod error;
pub mod preference_store;
pub mod scan_result_repository;
pub mod sqlite_calendar_host;
pub mod storage;
