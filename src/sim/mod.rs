//! 仿真核心模块
//!
//! Single-threaded discrete-event kernel: one virtual clock, one event queue.
//! All scenario setup happens before the clock runs; afterwards only events
//! mutate runtime state.

mod event;
mod scheduled_event;
mod simulator;
mod time;
mod world;

pub use event::Event;
pub use scheduled_event::ScheduledEvent;
pub use simulator::Simulator;
pub use time::SimTime;
pub use world::World;
