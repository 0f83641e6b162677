pub mod core;
pub mod socket;
pub mod utils;

pub use core::{
    config::{MessageKindSets, SocketConfig},
    errors::{ReadinessError, SocketError},
    traits::{IdentityStore, ResponseStore, SessionHooks},
    types::*,
};
pub use socket::{ResponseHandle, SocketBuilder, SocketClient, Subscription};
pub use utils::memory::{MemoryIdentityStore, MemoryResponseStore};
