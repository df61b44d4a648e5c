mod device;

pub use device::{AlsaDriver, AlsaSession};
