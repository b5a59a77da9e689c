pub mod availability;
pub mod roster;
pub mod time;

pub use availability::*;
pub use roster::*;
pub use time::*;
