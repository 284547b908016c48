//! Command line surface.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dockyard_cloud::{RestClient, DEFAULT_ENDPOINT};
use dockyard_core::{
    AptCacheQuiet, DriverOptions, MachineDriver, MachineRecord, PackageManagerProbe,
    ProcessAbsent, RetryPolicy,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::store::{self, MachineStore};

/// dockyard - provision container hosts on 1&1 Cloud Servers.
#[derive(Debug, Parser)]
#[command(name = "dockyard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding machine records and keys.
    #[arg(long, global = true, env = "DOCKYARD_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    /// Give up any single readiness wait after this many seconds.
    ///
    /// Without it, waits poll until the condition holds or Ctrl-C.
    #[arg(long, global = true)]
    wait_timeout: Option<u64>,

    /// How to decide that the package manager on a new server is idle.
    #[arg(long, global = true, value_enum, default_value_t = PackageProbe::AptCache)]
    package_probe: PackageProbe,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PackageProbe {
    /// The apt cache has not changed for 30 seconds
    AptCache,
    /// No aptitude process is running
    Process,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a machine.
    Create(CreateArgs),

    /// Show the state of a machine.
    Status(MachineArg),

    /// Print the IP address of a machine.
    Ip(MachineArg),

    /// Print the container engine URL of a machine.
    Url(MachineArg),

    /// Power a machine on.
    Start(MachineArg),

    /// Shut a machine down gracefully.
    Stop(MachineArg),

    /// Reboot a machine.
    Restart(MachineArg),

    /// Cut power to a machine.
    Kill(MachineArg),

    /// Delete a machine's server and firewall policy and forget it.
    Rm(MachineArg),

    /// Print a machine's stored record.
    Inspect(MachineArg),
}

#[derive(Debug, Args)]
struct MachineArg {
    /// Machine name.
    name: String,
}

#[derive(Debug, Args)]
struct CreateArgs {
    /// Machine name.
    name: String,

    /// 1&1 API access token.
    #[arg(long, env = "ONEANDONE_ACCESS_TOKEN", hide_env_values = true)]
    oneandone_access_token: String,

    /// 1&1 API endpoint.
    #[arg(long, env = "ONEANDONE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    oneandone_endpoint: String,

    /// Number of virtual cores (1-16).
    #[arg(long, env = "ONEANDONE_CORES", default_value_t = 1)]
    oneandone_cores: u32,

    /// RAM in GB (1-128).
    #[arg(long, env = "ONEANDONE_RAM", default_value_t = 1)]
    oneandone_ram: u32,

    /// SSD size in GB (20-500, multiples of 20).
    #[arg(long, env = "ONEANDONE_SSD", default_value_t = 20)]
    oneandone_ssd: u32,
}

impl CreateArgs {
    fn options(&self) -> DriverOptions {
        DriverOptions {
            endpoint: self.oneandone_endpoint.clone(),
            access_token: self.oneandone_access_token.clone(),
            cores: self.oneandone_cores,
            ram_gb: self.oneandone_ram,
            ssd_gb: self.oneandone_ssd,
        }
    }
}

impl Cli {
    /// Run the selected command. `cancel` aborts in-flight waits.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let root = match &self.storage_path {
            Some(path) => path.clone(),
            None => store::default_root()?,
        };
        let store = MachineStore::new(root);
        let ctx = CommandContext {
            store,
            policy: self.retry_policy(),
            package_probe: self.package_probe,
            cancel,
        };

        match self.command {
            Commands::Create(args) => ctx.create(args).await,
            Commands::Status(m) => {
                let record = ctx.store.load(&m.name)?;
                let state = ctx.driver(&record)?.state(&record).await?;
                println!("{state}");
                Ok(())
            }
            Commands::Ip(m) => {
                let record = ctx.store.load(&m.name)?;
                match &record.ip_address {
                    Some(ip) => println!("{ip}"),
                    None => bail!("machine '{}' has no IP address", m.name),
                }
                Ok(())
            }
            Commands::Url(m) => {
                let record = ctx.store.load(&m.name)?;
                match record.url() {
                    Some(url) => println!("{url}"),
                    None => bail!("machine '{}' has no IP address", m.name),
                }
                Ok(())
            }
            Commands::Start(m) => {
                let record = ctx.store.load(&m.name)?;
                ctx.driver(&record)?.start(&record).await?;
                Ok(())
            }
            Commands::Stop(m) => {
                let record = ctx.store.load(&m.name)?;
                ctx.driver(&record)?.stop(&record).await?;
                Ok(())
            }
            Commands::Restart(m) => {
                let record = ctx.store.load(&m.name)?;
                ctx.driver(&record)?.restart(&record).await?;
                Ok(())
            }
            Commands::Kill(m) => {
                let record = ctx.store.load(&m.name)?;
                ctx.driver(&record)?.kill(&record).await?;
                Ok(())
            }
            Commands::Rm(m) => ctx.remove(&m.name).await,
            Commands::Inspect(m) => {
                let mut record = ctx.store.load(&m.name)?;
                record.access_token = "<redacted>".into();
                println!("{}", serde_json::to_string_pretty(&record)?);
                Ok(())
            }
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::default();
        match self.wait_timeout {
            Some(secs) => policy.with_deadline(Duration::from_secs(secs)),
            None => policy,
        }
    }
}

struct CommandContext {
    store: MachineStore,
    policy: RetryPolicy,
    package_probe: PackageProbe,
    cancel: CancellationToken,
}

impl CommandContext {
    /// Driver bound to the account a record was created on.
    fn driver(&self, record: &MachineRecord) -> Result<MachineDriver> {
        let api = RestClient::new(&record.endpoint, &record.access_token)
            .context("Failed to build provider API client")?;
        let probe: Arc<dyn PackageManagerProbe> = match self.package_probe {
            PackageProbe::AptCache => Arc::new(AptCacheQuiet::default()),
            PackageProbe::Process => Arc::new(ProcessAbsent::default()),
        };
        Ok(MachineDriver::new(Arc::new(api))
            .with_package_manager_probe(probe)
            .with_retry_policy(self.policy)
            .with_cancellation(self.cancel.clone()))
    }

    async fn create(&self, args: CreateArgs) -> Result<()> {
        store::validate_name(&args.name)?;
        if self.store.exists(&args.name) {
            bail!("machine '{}' already exists", args.name);
        }

        let mut record = MachineRecord::new(
            &args.name,
            self.store.machine_dir(&args.name),
            &args.options(),
        )?;
        let driver = self.driver(&record)?;
        driver.pre_create_check(&record).await?;

        let result = driver.create(&mut record).await;
        // A failed create is kept on disk while it still owns remote resources.
        if result.is_err() && !record.has_remote_resources() {
            self.store.delete(&record.name)?;
        } else {
            self.store.save(&record)?;
        }
        result.with_context(|| format!("Failed to create machine '{}'", args.name))?;

        println!(
            "Machine '{}' is running at {}",
            record.name,
            record.ip_address.as_deref().unwrap_or_default()
        );
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let mut record = self.store.load(name)?;
        let driver = self.driver(&record)?;

        let result = driver.remove(&mut record).await;
        if let Err(e) = result {
            self.store.save(&record)?;
            return Err(e).with_context(|| format!("Failed to remove machine '{name}'"));
        }

        self.store.delete(name)?;
        tracing::info!(machine = %name, "Machine removed");
        Ok(())
    }
}
