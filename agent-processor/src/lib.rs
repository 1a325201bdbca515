mod processor;

pub use processor::*;
