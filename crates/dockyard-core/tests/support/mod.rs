//! In-memory provider and SSH doubles shared by the integration tests.
//!
//! Every double appends to one shared call log so tests can assert on the
//! order of operations across the provider and the SSH layer.

#![allow(dead_code)]

use async_trait::async_trait;
use dockyard_cloud::{
    ApplianceQuery, CloudApi, CloudError, FirewallPolicy, FirewallPolicyRequest, PowerAction,
    Server, ServerAppliance, ServerIp, ServerRequest, ServerStatus,
};
use dockyard_core::{
    CommandOutput, DriverOptions, MachineDriver, MachineRecord, PortProbe, ProvisionError,
    SshConnector, SshSession, SshTarget,
};
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const SERVER_ID: &str = "srv-1";
pub const FIREWALL_ID: &str = "fw-1";
pub const PASSWORD: &str = "initial-root-pw";

/// Ordered record of every call made against the doubles.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Number of entries whose call name is `name`.
    pub fn count(&self, name: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.split(':').next() == Some(name))
            .count()
    }

    /// Position of the first entry whose call name is `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries()
            .iter()
            .position(|e| e.split(':').next() == Some(name))
    }
}

/// Scripted behaviour of [`MockCloud`].
pub struct Script {
    pub appliances: Vec<ServerAppliance>,
    pub existing_servers: Vec<Server>,
    pub existing_firewalls: Vec<FirewallPolicy>,
    /// Successive server states returned by `get_server`; the last one repeats
    pub server_states: VecDeque<String>,
    /// Successive firewall states; the last one repeats
    pub firewall_states: VecDeque<String>,
    pub ips: Vec<String>,
    pub password_on_create: Option<String>,
    pub fail_create_server: Option<(u16, String)>,
    pub fail_delete_server: Option<(u16, String)>,
    pub fail_delete_firewall: Option<(u16, String)>,
    /// Ids the provider does not know (404 on every call)
    pub unknown_ids: HashSet<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            appliances: vec![ubuntu_appliance("app-2004", "20.04"), ubuntu_appliance("app-2204", "22.04")],
            existing_servers: Vec::new(),
            existing_firewalls: Vec::new(),
            server_states: VecDeque::from(["POWERED_ON".to_string()]),
            firewall_states: VecDeque::from(["ACTIVE".to_string()]),
            ips: vec!["192.0.2.10".into(), "192.0.2.11".into()],
            password_on_create: Some(PASSWORD.into()),
            fail_create_server: None,
            fail_delete_server: None,
            fail_delete_firewall: None,
            unknown_ids: HashSet::new(),
        }
    }
}

pub fn ubuntu_appliance(id: &str, version: &str) -> ServerAppliance {
    ServerAppliance {
        id: id.into(),
        name: format!("ubuntu{}min64_1", version.replace('.', "")),
        os_family: "Linux".into(),
        os: "Ubuntu".into(),
        os_version: version.into(),
        os_architecture: 64,
        os_image_type: "Minimal".into(),
        automatic_installation: true,
    }
}

/// A provider account held in memory.
pub struct MockCloud {
    script: Mutex<Script>,
    deleted: Mutex<HashSet<String>>,
    log: CallLog,
    pub last_server_request: Mutex<Option<ServerRequest>>,
    pub last_firewall_request: Mutex<Option<FirewallPolicyRequest>>,
}

impl MockCloud {
    pub fn new(script: Script, log: CallLog) -> Self {
        Self {
            script: Mutex::new(script),
            deleted: Mutex::new(HashSet::new()),
            log,
            last_server_request: Mutex::new(None),
            last_firewall_request: Mutex::new(None),
        }
    }

    fn missing(&self, id: &str) -> bool {
        self.deleted.lock().unwrap().contains(id)
            || self.script.lock().unwrap().unknown_ids.contains(id)
    }

    fn server(&self, id: &str, state: String) -> Server {
        let script = self.script.lock().unwrap();
        Server {
            id: id.into(),
            name: "[Docker Machine] dev".into(),
            status: ServerStatus {
                state,
                percent: None,
            },
            ips: script
                .ips
                .iter()
                .enumerate()
                .map(|(i, ip)| ServerIp {
                    id: format!("ip-{i}"),
                    ip: ip.clone(),
                })
                .collect(),
            first_password: None,
        }
    }
}

fn next_state(states: &mut VecDeque<String>) -> String {
    if states.len() > 1 {
        states.pop_front().unwrap_or_default()
    } else {
        states.front().cloned().unwrap_or_default()
    }
}

fn api_error((status, message): (u16, String)) -> CloudError {
    CloudError::Api { status, message }
}

#[async_trait]
impl CloudApi for MockCloud {
    async fn find_newest_appliance(
        &self,
        query: &ApplianceQuery,
    ) -> dockyard_cloud::Result<ServerAppliance> {
        self.log.push("find_newest_appliance");
        let script = self.script.lock().unwrap();
        dockyard_cloud::newest_matching(&script.appliances, query)
            .cloned()
            .ok_or_else(|| CloudError::NoMatchingAppliance(query.to_string()))
    }

    async fn list_servers(&self) -> dockyard_cloud::Result<Vec<Server>> {
        self.log.push("list_servers");
        Ok(self.script.lock().unwrap().existing_servers.clone())
    }

    async fn list_firewall_policies(&self) -> dockyard_cloud::Result<Vec<FirewallPolicy>> {
        self.log.push("list_firewall_policies");
        Ok(self.script.lock().unwrap().existing_firewalls.clone())
    }

    async fn create_firewall_policy(
        &self,
        request: &FirewallPolicyRequest,
    ) -> dockyard_cloud::Result<FirewallPolicy> {
        self.log.push("create_firewall_policy");
        *self.last_firewall_request.lock().unwrap() = Some(request.clone());
        Ok(FirewallPolicy {
            id: FIREWALL_ID.into(),
            name: request.name.clone(),
            state: "CONFIGURING".into(),
            rules: request.rules.clone(),
        })
    }

    async fn get_firewall_policy(&self, id: &str) -> dockyard_cloud::Result<FirewallPolicy> {
        self.log.push(format!("get_firewall_policy:{id}"));
        if self.missing(id) {
            return Err(CloudError::NotFound {
                kind: "firewall policy",
                id: id.into(),
            });
        }
        let state = next_state(&mut self.script.lock().unwrap().firewall_states);
        Ok(FirewallPolicy {
            id: id.into(),
            name: "[Docker Machine] dev".into(),
            state,
            rules: Vec::new(),
        })
    }

    async fn delete_firewall_policy(&self, id: &str) -> dockyard_cloud::Result<()> {
        self.log.push(format!("delete_firewall_policy:{id}"));
        if self.missing(id) {
            return Err(CloudError::NotFound {
                kind: "firewall policy",
                id: id.into(),
            });
        }
        if let Some(failure) = self.script.lock().unwrap().fail_delete_firewall.clone() {
            return Err(api_error(failure));
        }
        self.deleted.lock().unwrap().insert(id.to_string());
        Ok(())
    }

    async fn create_server(&self, request: &ServerRequest) -> dockyard_cloud::Result<Server> {
        self.log.push("create_server");
        *self.last_server_request.lock().unwrap() = Some(request.clone());
        let (failure, password) = {
            let script = self.script.lock().unwrap();
            (script.fail_create_server.clone(), script.password_on_create.clone())
        };
        if let Some(failure) = failure {
            return Err(api_error(failure));
        }
        let mut server = self.server(SERVER_ID, "DEPLOYING".into());
        server.ips.clear();
        server.first_password = password;
        Ok(server)
    }

    async fn get_server(&self, id: &str) -> dockyard_cloud::Result<Server> {
        self.log.push(format!("get_server:{id}"));
        if self.missing(id) {
            return Err(CloudError::NotFound {
                kind: "server",
                id: id.into(),
            });
        }
        let state = next_state(&mut self.script.lock().unwrap().server_states);
        Ok(self.server(id, state))
    }

    async fn delete_server(&self, id: &str) -> dockyard_cloud::Result<()> {
        self.log.push(format!("delete_server:{id}"));
        if self.missing(id) {
            return Err(CloudError::NotFound {
                kind: "server",
                id: id.into(),
            });
        }
        if let Some(failure) = self.script.lock().unwrap().fail_delete_server.clone() {
            return Err(api_error(failure));
        }
        self.deleted.lock().unwrap().insert(id.to_string());
        Ok(())
    }

    async fn server_action(&self, id: &str, action: PowerAction) -> dockyard_cloud::Result<()> {
        self.log.push(format!("server_action:{id}:{action}"));
        Ok(())
    }
}

/// SSH double: every login succeeds unless `fail_connect` is set.
#[derive(Clone)]
pub struct MockSsh {
    log: CallLog,
    pub fail_connect: bool,
    pub install_exit_status: i32,
    /// Output of the apt cache age command
    pub apt_cache_age: String,
}

impl MockSsh {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_connect: false,
            install_exit_status: 0,
            apt_cache_age: "600".into(),
        }
    }
}

#[async_trait]
impl SshConnector for MockSsh {
    async fn connect(
        &self,
        target: &SshTarget,
        password: &str,
    ) -> dockyard_core::Result<Box<dyn SshSession>> {
        self.log
            .push(format!("ssh_connect:{}@{}:{password}", target.user, target.addr));
        if self.fail_connect {
            return Err(ProvisionError::SshBootstrap("authentication failed".into()));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl SshSession for MockSsh {
    async fn exec(&self, command: &str) -> dockyard_core::Result<CommandOutput> {
        self.log.push(format!("ssh_exec:{command}"));
        if command.contains("/var/cache/apt") {
            return Ok(CommandOutput {
                exit_status: 0,
                stdout: format!("{}\n", self.apt_cache_age),
            });
        }
        Ok(CommandOutput {
            exit_status: self.install_exit_status,
            stdout: String::new(),
        })
    }
}

/// Port probe that reports the port open after `closed_polls` attempts.
pub struct MockPortProbe {
    log: CallLog,
    closed_polls: Mutex<u32>,
}

impl MockPortProbe {
    pub fn new(log: CallLog, closed_polls: u32) -> Self {
        Self {
            log,
            closed_polls: Mutex::new(closed_polls),
        }
    }
}

#[async_trait]
impl PortProbe for MockPortProbe {
    async fn is_open(&self, addr: SocketAddr) -> bool {
        self.log.push(format!("port_probe:{addr}"));
        let mut closed = self.closed_polls.lock().unwrap();
        if *closed == 0 {
            true
        } else {
            *closed -= 1;
            false
        }
    }
}

/// Everything one scenario needs.
pub struct Harness {
    pub log: CallLog,
    pub cloud: Arc<MockCloud>,
    pub ssh: MockSsh,
    pub driver: MachineDriver,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        Self::with_ssh(script, |_| {})
    }

    pub fn with_ssh(script: Script, configure: impl FnOnce(&mut MockSsh)) -> Self {
        Self::build(script, configure, 0)
    }

    /// SSH port refuses connections for the first `closed_polls` probes.
    pub fn with_closed_port(script: Script, closed_polls: u32) -> Self {
        Self::build(script, |_| {}, closed_polls)
    }

    fn build(script: Script, configure: impl FnOnce(&mut MockSsh), closed_polls: u32) -> Self {
        let log = CallLog::default();
        let cloud = Arc::new(MockCloud::new(script, log.clone()));
        let mut ssh = MockSsh::new(log.clone());
        configure(&mut ssh);
        let driver = MachineDriver::new(cloud.clone())
            .with_ssh_connector(Arc::new(ssh.clone()))
            .with_port_probe(Arc::new(MockPortProbe::new(log.clone(), closed_polls)));
        Self {
            log,
            cloud,
            ssh,
            driver,
        }
    }
}

pub fn options() -> DriverOptions {
    DriverOptions {
        endpoint: "https://cloudpanel-api.example.com/v1".into(),
        access_token: "token".into(),
        cores: 2,
        ram_gb: 4,
        ssd_gb: 40,
    }
}

pub fn record(store: &Path) -> MachineRecord {
    MachineRecord::new("dev", store.join("machines").join("dev"), &options())
        .expect("test options are valid")
}
