//! Command line interface
//!
//! Two subcommand groups, `vm` and `storage`. The single-dash spellings
//! (`-vm 100`, `-storage nfs-a`) are rewritten to their `--` forms before
//! clap sees them.

use crate::config::DEFAULT_CONFIG_PATH;
use crate::controlplane::{Orchestrator, PauseMode};
use crate::error::{Error, Result};
use crate::output::{Outcome, OutputFormat};
use clap::{Parser, Subcommand};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

/// ONTAP snapshots, FlexClone mounts and disk clones for Proxmox VE storage
#[derive(Parser, Debug)]
#[command(name = "pve-ontap-snapshot", author, version, about, long_about = None)]
pub struct Args {
    /// Config file path
    #[arg(long, global = true, env = "PVE_ONTAP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    pub log_json: bool,

    /// Result format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// VM disk operations
    #[command(subcommand)]
    Vm(VmCommand),

    /// Storage pool snapshot operations
    #[command(subcommand)]
    Storage(StorageCommand),
}

#[derive(Subcommand, Debug)]
pub enum VmCommand {
    /// Copy-on-write clone every disk of a VM
    Create {
        /// VM id
        #[arg(long)]
        vm: u32,

        /// Suspend the VM to disk while cloning
        #[arg(long, conflicts_with = "shutdown")]
        suspend: bool,

        /// Shut the VM down while cloning
        #[arg(long)]
        shutdown: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum StorageCommand {
    /// Snapshot the volume behind a storage pool
    Create {
        #[arg(long)]
        storage: String,
    },

    /// List snapshots, oldest first
    List {
        #[arg(long)]
        storage: String,
    },

    Delete {
        #[arg(long)]
        storage: String,
        #[arg(long)]
        snapshot: String,
    },

    /// Revert the volume to a snapshot, discarding all later writes
    Restore {
        #[arg(long)]
        storage: String,
        #[arg(long)]
        snapshot: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Clone a snapshot and register it as storage `<storage>-CLONE`
    Mount {
        #[arg(long)]
        storage: String,
        #[arg(long)]
        snapshot: String,
    },

    /// Unregister a mounted clone storage and destroy its volume
    Unmount {
        #[arg(long)]
        storage: String,
    },

    /// Print the backing volume's metadata
    Show {
        #[arg(long)]
        storage: String,
    },
}

const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("-vm", "--vm"),
    ("-storage", "--storage"),
    ("-snapshot", "--snapshot"),
    ("-suspend", "--suspend"),
    ("-shutdown", "--shutdown"),
    ("-config", "--config"),
    ("-loglevel", "--log-level"),
];

/// Rewrite single-dash long flags to the spelling clap expects
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter().map(normalize_arg).collect()
}

fn normalize_arg(arg: String) -> String {
    let (flag, value) = match arg.split_once('=') {
        Some((flag, value)) => (flag, Some(value)),
        None => (arg.as_str(), None),
    };
    let replaced = LEGACY_FLAGS
        .iter()
        .find(|(legacy, _)| *legacy == flag)
        .map(|(_, modern)| match value {
            Some(value) => format!("{}={}", modern, value),
            None => modern.to_string(),
        });
    replaced.unwrap_or(arg)
}

impl Command {
    /// Run the command. `confirm` is asked before any destructive step.
    pub async fn execute<C>(self, orchestrator: &Orchestrator, confirm: C) -> Result<Outcome>
    where
        C: Fn(&str) -> Result<bool>,
    {
        match self {
            Command::Vm(VmCommand::Create { vm, suspend, shutdown }) => {
                let pause = match (suspend, shutdown) {
                    (true, _) => Some(PauseMode::Suspend),
                    (false, true) => Some(PauseMode::Shutdown),
                    (false, false) => None,
                };
                let disks = orchestrator.clone_vm_disks(vm, pause).await?;
                Ok(Outcome::DisksCloned { vm, disks })
            }
            Command::Storage(command) => command.execute(orchestrator, confirm).await,
        }
    }
}

impl StorageCommand {
    async fn execute<C>(self, orchestrator: &Orchestrator, confirm: C) -> Result<Outcome>
    where
        C: Fn(&str) -> Result<bool>,
    {
        match self {
            StorageCommand::Create { storage } => {
                let snapshot = orchestrator.create_snapshot(&storage).await?;
                Ok(Outcome::SnapshotCreated { pool: storage, snapshot })
            }
            StorageCommand::List { storage } => {
                let snapshots = orchestrator.list_snapshots(&storage).await?;
                Ok(Outcome::SnapshotList { pool: storage, snapshots })
            }
            StorageCommand::Delete { storage, snapshot } => {
                orchestrator.delete_snapshot(&storage, &snapshot).await?;
                Ok(Outcome::SnapshotDeleted { pool: storage, snapshot })
            }
            StorageCommand::Restore { storage, snapshot, yes } => {
                let question = format!(
                    "Restore storage {} to snapshot {}? All writes since the snapshot are lost.",
                    storage, snapshot
                );
                if !yes && !confirm(&question)? {
                    return Err(Error::ConfirmationRequired(format!(
                        "restore of {} to {} was not confirmed",
                        storage, snapshot
                    )));
                }
                orchestrator.restore_snapshot(&storage, &snapshot).await?;
                Ok(Outcome::SnapshotRestored { pool: storage, snapshot })
            }
            StorageCommand::Mount { storage, snapshot } => {
                let mounted = orchestrator.mount_snapshot(&storage, &snapshot).await?;
                Ok(Outcome::Mounted(mounted))
            }
            StorageCommand::Unmount { storage } => {
                let unmounted = orchestrator.unmount_snapshot(&storage).await?;
                Ok(Outcome::Unmounted(unmounted))
            }
            StorageCommand::Show { storage } => {
                let volume = orchestrator.show_volume(&storage).await?;
                Ok(Outcome::Volume { pool: storage, volume })
            }
        }
    }
}

/// Ask on the terminal. Without a terminal, refuse and point at `--yes`.
pub fn terminal_confirm(question: &str) -> Result<bool> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return Err(Error::ConfirmationRequired(
            "stdin is not a terminal, pass --yes to confirm".to_string(),
        ));
    }
    let mut stderr = std::io::stderr();
    write!(stderr, "{} [y/N] ", question)?;
    stderr.flush()?;
    read_answer(&mut stdin.lock())
}

fn read_answer(input: &mut impl BufRead) -> Result<bool> {
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::orchestrator::testing::fixture;
    use assert_matches::assert_matches;

    fn parse(line: &str) -> Args {
        let args = normalize_args(line.split_whitespace().map(String::from));
        Args::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_legacy_flags_are_accepted() {
        let args = parse("pve-ontap-snapshot vm create -vm 100 -suspend -config /etc/x.toml");

        assert_eq!(args.config, PathBuf::from("/etc/x.toml"));
        assert_matches!(
            args.command,
            Command::Vm(VmCommand::Create { vm: 100, suspend: true, shutdown: false })
        );
    }

    #[test]
    fn test_legacy_flag_with_value_and_log_level() {
        let args = parse("pve-ontap-snapshot storage mount -storage=nfs-a -snapshot s1 -loglevel debug");

        assert_eq!(args.log_level, "debug");
        assert_matches!(
            args.command,
            Command::Storage(StorageCommand::Mount { ref storage, ref snapshot })
                if storage == "nfs-a" && snapshot == "s1"
        );
    }

    #[test]
    fn test_suspend_and_shutdown_conflict() {
        let args = normalize_args(
            "pve-ontap-snapshot vm create -vm 100 -suspend -shutdown"
                .split_whitespace()
                .map(String::from),
        );
        assert!(Args::try_parse_from(args).is_err());
    }

    #[test]
    fn test_output_format_flag() {
        let args = parse("pve-ontap-snapshot storage list --storage nfs-a --output json");
        assert_eq!(args.output, OutputFormat::Json);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_unrelated_args_pass_through() {
        let args = normalize_args(["-y".to_string(), "-vmx".to_string(), "nfs=a".to_string()]);
        assert_eq!(args, vec!["-y", "-vmx", "nfs=a"]);
    }

    #[test]
    fn test_read_answer() {
        assert!(read_answer(&mut "yes\n".as_bytes()).unwrap());
        assert!(read_answer(&mut "Y\n".as_bytes()).unwrap());
        assert!(!read_answer(&mut "\n".as_bytes()).unwrap());
        assert!(!read_answer(&mut "nope\n".as_bytes()).unwrap());
    }

    #[tokio::test]
    async fn test_unconfirmed_restore_mutates_nothing() {
        let (orchestrator, _, controller) = fixture().await;
        let snapshot = orchestrator.create_snapshot("nfs-a").await.unwrap();
        let mutations = controller.mutation_count().await;

        let command = Command::Storage(StorageCommand::Restore {
            storage: "nfs-a".into(),
            snapshot,
            yes: false,
        });
        let err = command.execute(&orchestrator, |_| Ok(false)).await.unwrap_err();

        assert_matches!(err, Error::ConfirmationRequired(_));
        assert_eq!(controller.mutation_count().await, mutations);
    }

    #[tokio::test]
    async fn test_restore_with_yes_skips_prompt() {
        let (orchestrator, _, controller) = fixture().await;
        let snapshot = orchestrator.create_snapshot("nfs-a").await.unwrap();

        let command = Command::Storage(StorageCommand::Restore {
            storage: "nfs-a".into(),
            snapshot: snapshot.clone(),
            yes: true,
        });
        let outcome = command
            .execute(&orchestrator, |_| panic!("prompted despite --yes"))
            .await
            .unwrap();

        assert_matches!(outcome, Outcome::SnapshotRestored { .. });
        assert_eq!(controller.restored_to("vol_a").await, Some(snapshot));
    }

    #[tokio::test]
    async fn test_storage_commands_round_trip() {
        let (orchestrator, manager, _) = fixture().await;
        let yes = |_: &str| Ok(true);

        let created = Command::Storage(StorageCommand::Create { storage: "nfs-a".into() })
            .execute(&orchestrator, yes)
            .await
            .unwrap();
        let snapshot = match created {
            Outcome::SnapshotCreated { snapshot, .. } => snapshot,
            other => panic!("unexpected outcome {:?}", other),
        };

        Command::Storage(StorageCommand::Mount {
            storage: "nfs-a".into(),
            snapshot: snapshot.clone(),
        })
        .execute(&orchestrator, yes)
        .await
        .unwrap();
        assert!(manager.pool("nfs-a-CLONE").await.is_some());

        Command::Storage(StorageCommand::Unmount { storage: "nfs-a-CLONE".into() })
            .execute(&orchestrator, yes)
            .await
            .unwrap();
        assert!(manager.pool("nfs-a-CLONE").await.is_none());

        let listed = Command::Storage(StorageCommand::List { storage: "nfs-a".into() })
            .execute(&orchestrator, yes)
            .await
            .unwrap();
        assert_matches!(listed, Outcome::SnapshotList { ref snapshots, .. } if snapshots.len() == 1);
    }
}
