//! Shared plumbing every service runs on: the keyed record store, the pub/sub bus,
//! cooperative cancellation and the restart supervisor.

pub mod bus;
pub mod guard;
pub mod signal;
pub mod store;
pub mod supervisor;

pub use bus::{BusError, BusMessage, MemoryBus, Subscription};
pub use guard::UniverseGuard;
pub use signal::{stop_channel, ServiceExit, StopHandle, StopSignal, UniverseListener};
pub use store::{MemoryStore, Repositories, StoreRepository};
pub use supervisor::run_forever;
