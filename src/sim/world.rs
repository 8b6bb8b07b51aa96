//! 世界 trait
//!
//! The state events operate on. The scenario runtime implements it with
//! `net::NetWorld`; kernel tests use small stand-ins.

use super::simulator::Simulator;
use std::any::Any;

pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called after every executed event.
    fn on_tick(&mut self, _sim: &mut Simulator) {}

    /// Called once when the scenario horizon is reached and the kernel is torn
    /// down. Pending events have already been discarded at this point.
    fn on_teardown(&mut self, _sim: &Simulator) {}
}
