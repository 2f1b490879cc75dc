pub mod clock;
pub mod config;
pub mod edge;
pub mod error;
pub mod logger;
pub mod network;
pub mod proxy;
pub mod request;
pub mod response;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod worker;

pub use config::Config;
pub use error::InterceptError;

pub type Result<T> = std::result::Result<T, InterceptError>;

pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::Config;
    pub use crate::edge::{EdgeDecision, EdgeRouter, PassReason};
    pub use crate::error::InterceptError;
    pub use crate::network::{Fetcher, HttpFetcher, OriginFetcher};
    pub use crate::proxy::ProxyServer;
    pub use crate::request::{Destination, FetchRequest, RequestKey};
    pub use crate::response::BufferedResponse;
    pub use crate::store::{CacheEntry, CacheStorage, DiskCacheStorage, MemoryCacheStorage};
    pub use crate::worker::{
        CacheNames, CacheWorker, FetchOutcome, FetchSource, Registration, WorkerState,
    };
}
