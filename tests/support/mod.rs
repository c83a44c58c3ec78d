#![allow(dead_code)]

pub mod http;
pub mod socket_guard;
