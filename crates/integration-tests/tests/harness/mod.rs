#![allow(dead_code)]

pub mod routes;
pub mod server;
