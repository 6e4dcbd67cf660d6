use lazy_static::lazy_static;
use tch::Device;

lazy_static! {
    pub static ref DEVICE: Device = Device::cuda_if_available();
}

/// The default device unless `force_cpu` is set.
pub fn select_device(force_cpu: bool) -> Device {
    if force_cpu {
        Device::Cpu
    } else {
        *DEVICE
    }
}
