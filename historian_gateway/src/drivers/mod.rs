pub mod address;
pub mod resilient;
pub mod s7;
pub mod traits;
pub mod transport;

pub use resilient::{ResilientChannel, RetryPolicy};
pub use s7::S7Channel;
pub use traits::{Channel, ChannelExt, ChannelHealth, PlcConfig, TryRead};
pub use transport::{BlockTransport, MemoryTransport};
