//! The provider operations dockyard depends on.

use crate::error::Result;
use crate::types::{
    ApplianceQuery, FirewallPolicy, FirewallPolicyRequest, PowerAction, Server, ServerAppliance,
    ServerRequest,
};
use async_trait::async_trait;

/// CRUD access to the servers and firewall policies of one provider account.
///
/// Implementations must be cheap to share; callers hold one instance behind
/// an `Arc` for the lifetime of a machine operation.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Newest base image matching `query`.
    async fn find_newest_appliance(&self, query: &ApplianceQuery) -> Result<ServerAppliance>;

    async fn list_servers(&self) -> Result<Vec<Server>>;

    async fn list_firewall_policies(&self) -> Result<Vec<FirewallPolicy>>;

    async fn create_firewall_policy(&self, request: &FirewallPolicyRequest)
        -> Result<FirewallPolicy>;

    async fn get_firewall_policy(&self, id: &str) -> Result<FirewallPolicy>;

    /// Request deletion. The policy may linger in a `REMOVING` state afterwards.
    async fn delete_firewall_policy(&self, id: &str) -> Result<()>;

    async fn create_server(&self, request: &ServerRequest) -> Result<Server>;

    async fn get_server(&self, id: &str) -> Result<Server>;

    /// Request deletion. The server may linger in a `REMOVING` state afterwards.
    async fn delete_server(&self, id: &str) -> Result<()>;

    /// Request a power state change.
    async fn server_action(&self, id: &str, action: PowerAction) -> Result<()>;
}
