//! CLI commands for the agency node using clap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{default_log_dir, load_config, validate_config, AgencyConfig};
use crate::core::RemoteClient;
use crate::logging;
use crate::protocol::{AclBuilder, AgentId, AgentInfo, Performative};
use crate::task::EchoTask;
use crate::web::run_server;

const DEFAULT_URL: &str = "http://127.0.0.1:10000";
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Agency node of a distributed multi-agent platform.
#[derive(Parser, Debug)]
#[command(name = "agency")]
#[command(version)]
#[command(about = "Agency node: hosts agents and routes ACL messages", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an agency node
    Serve {
        /// Config file (defaults to ~/.agency/agency.json when present)
        #[arg(short, long, env = "AGENCY_CONFIG")]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long, env = "AGENCY_PORT")]
        port: Option<u16>,

        /// Node id of this agency
        #[arg(long, env = "AGENCY_NODE_ID")]
        node_id: Option<u64>,
    },

    /// Show a running agency and its agents
    Info {
        /// Base URL of the agency
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },

    /// Create an agent on a running agency
    Spawn {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,

        /// Agent id, unique within the agency
        #[arg(long)]
        id: AgentId,

        #[arg(long)]
        name: String,

        /// Agent type
        #[arg(long = "type")]
        a_type: String,

        #[arg(long = "subtype", default_value = "")]
        a_subtype: String,

        /// Initial custom data
        #[arg(long, default_value = "")]
        custom: String,
    },

    /// Terminate and remove an agent
    Kill {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,

        /// Agent id
        id: AgentId,
    },

    /// Send an ACL message through a running agency
    Send {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,

        /// Sender agent id
        #[arg(long)]
        from: AgentId,

        /// Receiver agent id
        #[arg(long)]
        to: AgentId,

        #[arg(long)]
        content: String,

        /// FIPA performative, e.g. inform, request, query_if
        #[arg(long, default_value = "inform", value_parser = parse_performative)]
        performative: Performative,
    },
}

fn parse_performative(s: &str) -> std::result::Result<Performative, String> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| format!("unknown performative '{}'", s))
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Serve {
                config,
                port,
                node_id,
            } => cmd_serve(config.as_deref(), *port, *node_id).await,
            Command::Info { url } => cmd_info(url).await,
            Command::Spawn {
                url,
                id,
                name,
                a_type,
                a_subtype,
                custom,
            } => {
                let mut info = AgentInfo::new(*id, name.as_str(), a_type.as_str())
                    .with_custom(custom.as_str());
                info.spec.a_subtype = a_subtype.clone();
                cmd_spawn(url, &info).await
            }
            Command::Kill { url, id } => cmd_kill(url, *id).await,
            Command::Send {
                url,
                from,
                to,
                content,
                performative,
            } => cmd_send(url, *from, *to, content, *performative).await,
        }
    }
}

/// Apply command-line and environment overrides on top of the loaded file.
fn apply_overrides(config: &mut AgencyConfig, port: Option<u16>, node_id: Option<u64>) {
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(node_id) = node_id {
        config.node_id = node_id;
    }
}

async fn cmd_serve(
    config_path: Option<&std::path::Path>,
    port: Option<u16>,
    node_id: Option<u64>,
) -> Result<()> {
    let mut config = load_config(config_path).context("Failed to load configuration")?;
    apply_overrides(&mut config, port, node_id);
    validate_config(&config)?;

    let log_dir = match &config.log_dir {
        Some(dir) => dir.clone(),
        None => default_log_dir()?,
    };
    let _guard = logging::init(&log_dir)?;

    run_server(&config, Arc::new(EchoTask)).await?;
    Ok(())
}

async fn cmd_info(url: &str) -> Result<()> {
    logging::init_console();
    let client = RemoteClient::new(CLIENT_TIMEOUT)?;
    let info = client
        .get_agency(url)
        .await
        .with_context(|| format!("Failed to reach agency at {}", url))?;

    println!("Agency: {} (node {}, mas {})", info.name, info.id, info.mas_id);
    println!("Address: {}", info.address);
    if info.agents.is_empty() {
        println!("No agents running");
        return Ok(());
    }
    println!("\nAgents:");
    for agent in &info.agents {
        let status = agent
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "  {} | {} | {}/{} | {}",
            agent.id, agent.spec.name, agent.spec.a_type, agent.spec.a_subtype, status
        );
    }
    Ok(())
}

async fn cmd_spawn(url: &str, info: &AgentInfo) -> Result<()> {
    logging::init_console();
    info.validate()?;
    let client = RemoteClient::new(CLIENT_TIMEOUT)?;
    client
        .create_agent(url, info)
        .await
        .with_context(|| format!("Failed to submit agent {}", info.id))?;
    println!("Agent {} submitted", info.id);
    Ok(())
}

async fn cmd_kill(url: &str, id: AgentId) -> Result<()> {
    logging::init_console();
    let client = RemoteClient::new(CLIENT_TIMEOUT)?;
    client
        .remove_agent(url, id)
        .await
        .with_context(|| format!("Failed to remove agent {}", id))?;
    println!("Agent {} removed", id);
    Ok(())
}

async fn cmd_send(
    url: &str,
    from: AgentId,
    to: AgentId,
    content: &str,
    performative: Performative,
) -> Result<()> {
    logging::init_console();
    let msg = AclBuilder::from(from)
        .to(to)
        .performative(performative)
        .content(content)
        .build()
        .map_err(anyhow::Error::msg)?;

    let client = RemoteClient::new(CLIENT_TIMEOUT)?;
    client
        .post_messages(url, std::slice::from_ref(&msg))
        .await
        .with_context(|| format!("Failed to send message to {}", url))?;
    println!("Message {} queued", msg.conversation_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Agency;
    use crate::web::serve;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_serve() {
        let args =
            Commands::try_parse_from(["agency", "serve", "--port", "10001", "--node-id", "4"])
                .unwrap();
        match args.command {
            Command::Serve { port, node_id, .. } => {
                assert_eq!(port, Some(10001));
                assert_eq!(node_id, Some(4));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_send_performative() {
        let args = Commands::try_parse_from([
            "agency",
            "send",
            "--from",
            "1",
            "--to",
            "2",
            "--content",
            "hi",
            "--performative",
            "query_if",
        ])
        .unwrap();
        match args.command {
            Command::Send {
                performative, url, ..
            } => {
                assert_eq!(performative, Performative::QueryIf);
                assert_eq!(url, DEFAULT_URL);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Commands::try_parse_from([
            "agency", "send", "--from", "1", "--to", "2", "--content", "hi", "--performative",
            "shout",
        ])
        .is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = AgencyConfig::default();
        apply_overrides(&mut config, Some(12000), None);
        assert_eq!(config.port, 12000);
        assert_eq!(config.node_id, AgencyConfig::default().node_id);

        apply_overrides(&mut config, None, Some(9));
        assert_eq!(config.node_id, 9);
    }

    #[tokio::test]
    async fn test_client_commands_against_running_node() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let config = AgencyConfig {
            address: Some(url.clone()),
            ..Default::default()
        };
        let agency = Agency::new(&config, Arc::new(EchoTask)).unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, Arc::clone(&agency), 8, async move {
            let _ = stopped.await;
        }));

        cmd_spawn(&url, &AgentInfo::new(1, "pump", "device"))
            .await
            .unwrap();
        for _ in 0..100 {
            if agency.get_agent(1).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        cmd_info(&url).await.unwrap();
        cmd_send(&url, 2, 1, "hello", Performative::Inform)
            .await
            .unwrap();
        cmd_kill(&url, 1).await.unwrap();
        assert!(cmd_kill(&url, 1).await.is_err());

        let _ = stop.send(());
        server.await.unwrap().unwrap();
    }
}
