#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod memory;
pub mod splitter;
pub mod text;
pub mod traits;
pub mod types;
