pub mod advice;
pub mod context;
pub mod crop_profile;
pub mod rule;
pub mod trace;

pub use advice::*;
pub use context::*;
pub use crop_profile::*;
pub use rule::*;
pub use trace::*;
