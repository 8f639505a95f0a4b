mod cert;
mod host;

pub use cert::*;
pub use host::*;
