#![allow(dead_code)]

pub mod events;
pub mod scripted_server;
pub mod socket_guard;
