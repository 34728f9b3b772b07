pub mod bootstrap;
pub mod category_applier;
pub mod category_registry;
pub mod commands;
pub mod event_scanner;
pub mod scheduler;
