mod client;
mod display;
mod error;
pub mod proto;
pub mod record;
mod session;

pub use self::display::{DisplayName, Endpoint};
pub use self::error::Error;
pub use self::record::ByteOrder;
pub use crate::client::*;
