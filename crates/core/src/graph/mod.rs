pub mod calculator;
pub mod config;
pub mod packet;
pub mod runner;
