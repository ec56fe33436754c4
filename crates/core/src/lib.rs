//! Filesystem-event trigger pipeline, chapter-rename queue, and mergerfs
//! reconciliation core.
//!
//! This crate holds every pure, testable piece of the daemon: it never
//! spawns a process, opens a socket, or reads the wall clock directly.
//! Every external effect (logging, process execution, inotify-equivalent
//! watching, raw filesystem syscalls) is expressed as a narrow trait so the
//! binary crate can supply real implementations while tests supply fakes.

pub mod branch_plan;
pub mod branch_stage;
pub mod coalescer;
pub mod equivalence;
pub mod error;
pub mod events;
pub mod executor;
pub mod fsadapter;
pub mod logger;
pub mod merge_workflow;
pub mod mount_command;
pub mod mount_snapshot;
pub mod path;
pub mod pipeline;
pub mod priority;
pub mod reconcile;
pub mod rename_processor;
pub mod rename_queue;
pub mod sanitize;
pub mod volumes;
