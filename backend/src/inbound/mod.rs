//! Inbound adapters: the request pipeline and the controllers plugged into it.

pub mod artifacts;
pub mod controller;
