pub mod fingerprint;
pub mod proxy;
pub mod status;

pub use fingerprint::*;
pub use proxy::*;
pub use status::*;
