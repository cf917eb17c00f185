pub mod errors;
pub mod hosts;
pub mod model;
pub mod vms;

pub use errors::{Error, Result};
pub use hosts::HostService;
pub use model::{Host, HostStatus, NewHost, NewVm, RunVmConfig, Vm, VmStatus};
pub use vms::VmService;
