pub mod cli;
pub mod config;
pub mod equivalence;
pub mod executor;
pub mod fsadapter;
pub mod fsnotify;
pub mod logging;
pub mod priority;
pub mod supervisor;
