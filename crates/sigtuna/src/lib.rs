#![forbid(unsafe_code)]

pub use sigtuna_c14n as c14n;
pub use sigtuna_core as core;
pub use sigtuna_crypto as crypto;
pub use sigtuna_refs as refs;
pub use sigtuna_transforms as transforms;
pub use sigtuna_xml as xml;
