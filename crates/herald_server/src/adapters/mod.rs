#![forbid(unsafe_code)]

mod demo;

pub use demo::DemoSource;
