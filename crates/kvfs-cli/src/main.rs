// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use kvfs_core::{
    normalize, AccessMode, FixedDescriptorTable, FsResult, Namespace, NodeRef, Pid, Resolution,
    VfsConfig,
};
use kvfs_logging::{CliLogLevel, CliLoggingArgs};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Bootstrap a kernel namespace and inspect it")]
struct Cli {
    /// Namespace configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Register a service before running the command
    #[arg(long = "service", value_name = "NAME=PID", global = true)]
    services: Vec<String>,

    /// Publish a process before running the command
    #[arg(long = "process", value_name = "PID", global = true)]
    processes: Vec<u32>,

    #[command(flatten)]
    logging: CliLoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the canonical form of each path
    Normalize { paths: Vec<String> },
    /// Resolve each path against the tree
    Resolve { paths: Vec<String> },
    /// Print the tree
    Tree,
    /// Describe the node a path names, as JSON
    Describe { path: String },
    /// Open the given paths for reading and print the global file table
    Files { paths: Vec<String> },
    /// Print occupancy counters as JSON
    Stats,
}

fn load_config(config_path: Option<&Path>) -> Result<VfsConfig> {
    match config_path {
        Some(path) => VfsConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(VfsConfig::default()),
    }
}

fn parse_service(arg: &str) -> Result<(&str, Pid)> {
    let (name, pid) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("service must be NAME=PID, got {arg:?}"))?;
    let pid = pid.parse().with_context(|| format!("invalid pid in {arg:?}"))?;
    Ok((name, Pid(pid)))
}

fn process_summary(pid: u32) -> Arc<dyn kvfs_core::ContentProvider> {
    Arc::new(move |node: NodeRef| -> FsResult<Vec<u8>> {
        Ok(format!("pid: {pid}\nnode: {node}\n").into_bytes())
    })
}

fn build_namespace(cli: &Cli) -> Result<Namespace> {
    let config = load_config(cli.config.as_deref())?;
    let ns = Namespace::new(config)?;
    for service in &cli.services {
        let (name, owner) = parse_service(service)?;
        ns.register_service(owner, name)
            .with_context(|| format!("registering service {name}"))?;
    }
    for &pid in &cli.processes {
        ns.publish_process(Pid(pid), process_summary(pid))
            .with_context(|| format!("publishing process {pid}"))?;
    }
    info!(
        services = cli.services.len(),
        processes = cli.processes.len(),
        "namespace ready"
    );
    Ok(ns)
}

fn describe_resolution(ns: &Namespace, path: &str) -> String {
    match ns.lookup(path) {
        Ok(Resolution::Node(node)) => match ns.node_name(node) {
            Ok(name) if name.is_empty() => format!("{path}\t{node}\t/"),
            Ok(name) => format!("{path}\t{node}\t{name}"),
            Err(err) => format!("{path}\terror: {err}"),
        },
        Ok(Resolution::Service {
            service,
            owner,
            remainder,
        }) => format!("{path}\t{service}\tforward to {owner}: {remainder}"),
        Err(err) => format!("{path}\terror: {err} (errno {})", err.errno()),
    }
}

fn run(cli: &Cli, out: &mut dyn Write) -> Result<()> {
    let ns = build_namespace(cli)?;
    match &cli.command {
        Command::Normalize { paths } => {
            for path in paths {
                writeln!(out, "{}", normalize(path))?;
            }
        }
        Command::Resolve { paths } => {
            for path in paths {
                writeln!(out, "{}", describe_resolution(&ns, path))?;
            }
        }
        Command::Tree => write!(out, "{}", ns.dump_tree())?,
        Command::Describe { path } => {
            let node = ns.resolve(path).with_context(|| format!("resolving {path}"))?;
            let info = ns.describe_node(node)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
        }
        Command::Files { paths } => {
            let mut fds = FixedDescriptorTable::new(paths.len().max(1));
            for path in paths {
                let fd = ns
                    .open_path(&mut fds, AccessMode::READ, path)
                    .with_context(|| format!("opening {path}"))?;
                debug!(%path, fd = fd.0, "opened");
            }
            write!(out, "{}", ns.dump_file_table())?;
        }
        Command::Stats => writeln!(out, "{}", serde_json::to_string_pretty(&ns.stats())?)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.clone().init("kvfsctl", CliLogLevel::Warn)?;
    let stdout = io::stdout();
    run(&cli, &mut stdout.lock())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("kvfsctl").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run(&cli, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn test_parse_service() {
        assert_eq!(parse_service("disk=4").expect("service"), ("disk", Pid(4)));
        assert!(parse_service("disk").is_err());
        assert!(parse_service("disk=four").is_err());
    }

    #[test]
    fn test_normalize_command() {
        let out = run_args(&["normalize", "/a//b/./c/../d", "/..", "x/../.."]).expect("run");
        assert_eq!(out, "/a/b/d\n/\n..\n");
    }

    #[test]
    fn test_resolve_command() {
        let out = run_args(&[
            "--service",
            "vga=3",
            "resolve",
            "/system/services/vga",
            "/system/unknown",
            "/fs/home/user",
        ])
        .expect("run");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "/system/services/vga\tv5\tvga");
        assert!(lines[1].starts_with("/system/unknown\terror: node not found"));
        assert_eq!(lines[2], "/fs/home/user\tv1\tforward to 0: home/user");
    }

    #[test]
    fn test_tree_command() {
        let out = run_args(&["--process", "1", "--process", "2", "tree"]).expect("run");
        assert!(out.contains(" | |- 1\n | |- 2\n"), "{out}");
    }

    #[test]
    fn test_duplicate_service_fails() {
        assert!(run_args(&["--service", "a=1", "--service", "a=2", "tree"]).is_err());
    }

    #[test]
    fn test_files_command() {
        let out = run_args(&["files", "/", "/", "/system"]).expect("run");
        assert!(out.contains("refCount: 2"), "{out}");
        assert_eq!(out.matches("file @ index").count(), 2);
    }

    #[test]
    fn test_config_file_limits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kvfs.json");
        std::fs::write(&path, r#"{ "limits": { "node-capacity": 5 } }"#).expect("write");
        let config = path.to_str().expect("utf-8 path");

        let out = run_args(&["--config", config, "stats"]).expect("run");
        assert!(out.contains("\"node-capacity\": 5"), "{out}");
        assert!(run_args(&["--config", config, "--process", "1", "tree"]).is_err());
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "limits": { "file-capacity": 0 } }"#).expect("write");
        let err = run_args(&["--config", path.to_str().expect("utf-8 path"), "tree"])
            .expect_err("invalid config");
        assert!(format!("{err:#}").contains("file-capacity"), "{err:#}");
    }
}
