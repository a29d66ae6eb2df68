pub mod codec;
pub mod paletted;
pub mod state;
pub mod packets;
pub mod adapter;
pub mod connection;

pub use codec::*;
pub use paletted::*;
pub use state::*;
pub use packets::*;
pub use adapter::*;
pub use connection::{Connection, ConnectionReader, ConnectionWriter};
