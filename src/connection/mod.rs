//! Outbound connections to remote engines.

pub mod balancer;
pub mod mock;
pub mod tcp;

use std::fmt;

use async_trait::async_trait;

use crate::command::RemoteCommand;
use crate::error::Result;

pub use balancer::LoadBalancer;
pub use tcp::TcpConnection;

/// Somewhere commands can be sent to.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Stable identity of the remote end, e.g. `"10.0.0.5:12345"`.
    /// Two connections with the same descriptor are the same peer.
    fn descriptor(&self) -> String;

    async fn send_request(&self, command: &dyn RemoteCommand) -> Result<()>;

    async fn send_response(&self, command: &dyn RemoteCommand) -> Result<()>;
}
