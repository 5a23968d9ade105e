//! Prefetch scheduling: buffer items, the list scheduler and its service task

pub mod buffer_item;
pub mod scheduler;
pub mod service;
pub mod timer;

pub use buffer_item::{BufferItem, BufferItemInfo, ItemId, TickResult};
pub use scheduler::BufferListScheduler;
pub use service::{PrefetchHandle, PrefetchService};
pub use timer::{PendingPoll, PollTimer, TokioPollTimer};
