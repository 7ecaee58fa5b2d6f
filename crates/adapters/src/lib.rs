#![deny(unsafe_code)]

pub mod clock;
pub mod ebpf;
pub mod http;
pub mod sinks;
pub mod sysctl;
