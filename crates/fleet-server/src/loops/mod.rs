//! Background loops.

pub mod broadcast_loop;
pub mod persist_loop;
pub mod tick_loop;
