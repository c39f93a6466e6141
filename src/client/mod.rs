//! Talking to the config server: fetch, failover, retry and discovery.

pub mod discovery;
pub mod environment;
pub mod failover;
pub mod http;
pub mod retry;

pub use discovery::ConfigServerLocator;
pub use environment::{PropertySource, RemoteEnvironment};
pub use failover::{FailoverWalker, WalkOutcome};
pub use http::{ConfigServerHttp, Credentials, FetchOutcome};
pub use retry::{RetryPolicy, RetryState};
