//! Domain model of the service order lifecycle: orders, their events, the
//! state machine and the ports to the outside world.

pub mod billing;
pub mod event;
pub mod inventory;
pub mod lifecycle;
pub mod order;
pub mod ports;
pub mod principal;
