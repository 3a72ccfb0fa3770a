//! Static inspection of compiled application code: usage scanning for
//! capability inference and native-interface discovery for glue generation.

mod capabilities;
mod interfaces;
mod scanner;

pub use capabilities::{CapabilityFlags, FlagObserver};
pub use interfaces::{
    extract_native_interfaces, JavaType, NativeInterfaceDesc, NativeMethodDesc,
};
pub use scanner::{scan_tree, scan_unit, ScanError, UsageObserver};
