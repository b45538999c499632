//! Service hosting a load balancer over a simulated agent pool

pub mod api;
pub mod config;
pub mod simulation;
