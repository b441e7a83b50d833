pub mod animator;
pub mod bands;
pub mod batch;
pub mod capture;
pub mod device;
pub mod file;
pub mod producer;
pub mod queue;
pub mod spectrum;
pub mod tone;
