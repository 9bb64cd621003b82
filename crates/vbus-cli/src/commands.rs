use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use vbus_registry::{LoopbackTransport, Registry};
use vbus_server::HostServer;
use vbus_tree::RawNode;

use crate::cli::{Cli, Command, HostArgs, RunArgs};
use crate::config::HostConfig;
use crate::status;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => {
            let config = HostConfig::load(config_path)?.with_overrides(&args.host)?;
            cmd_run(config, &args).await
        }
        Command::Config(args) => cmd_config(HostConfig::load(config_path)?, &args),
    }
}

async fn cmd_run(config: HostConfig, args: &RunArgs) -> anyhow::Result<()> {
    let transport = Arc::new(LoopbackTransport::default());
    let registry = Registry::shared(config.registry.clone(), transport);
    start(&registry, status::status_node()).await?;

    print_banner(&config);

    let http = match &config.server.static_root {
        Some(_) => {
            let server = HostServer::new(config.server.clone(), Arc::clone(&registry));
            let closed = Arc::clone(&registry);
            Some(tokio::spawn(server.serve(async move { closed.closed().await })))
        }
        None => None,
    };

    registry.run_until(shutdown_signal(args.duration)).await?;

    if let Some(http) = http {
        http.await.context("HTTP server task")??;
    }
    println!("{} {} closed", "✓".green().bold(), config.registry.id().bold());
    Ok(())
}

/// Publish the status node and then connect, so a failed registration never
/// leaves the transport connected.
async fn start(registry: &Arc<Registry>, node: RawNode) -> anyhow::Result<()> {
    registry
        .add_node(status::STATUS_NODE, node)
        .context("publishing the status node")?;
    registry
        .connect()
        .await
        .with_context(|| format!("connecting {} to the bus", registry.config().id()))?;
    Ok(())
}

fn cmd_config(config: HostConfig, args: &HostArgs) -> anyhow::Result<()> {
    let config = config.with_overrides(args)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_banner(config: &HostConfig) {
    println!(
        "{} {} on {}",
        "✓".green().bold(),
        config.registry.id().bold(),
        config.registry.hostname.cyan()
    );
    println!("  Attribute: {}", "status.hour".yellow());
    match &config.server.static_root {
        Some(root) => println!(
            "  Static: {} at http://{}",
            root.display().to_string().blue(),
            config.server.bind_addr
        ),
        None => println!("  Static: {}", "disabled".dimmed()),
    }
    println!("  Press {} to stop.", "Ctrl-C".bold());
}

fn shutdown_signal(duration: Option<u64>) -> impl Future<Output = ()> {
    async move {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C; stopping");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbus_registry::{LifecycleState, RegistryConfig};

    fn registry() -> (Arc<LoopbackTransport>, Arc<Registry>) {
        let transport = Arc::new(LoopbackTransport::default());
        let registry = Registry::shared(RegistryConfig::default(), transport.clone());
        (transport, registry)
    }

    #[tokio::test]
    async fn start_publishes_then_connects() {
        let (transport, registry) = registry();
        start(&registry, status::status_node()).await.unwrap();
        assert_eq!(registry.state(), LifecycleState::Connected);
        assert!(transport.read("status.hour").await.is_ok());
        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_publish_leaves_transport_disconnected() {
        let (transport, registry) = registry();
        registry
            .add_node(status::STATUS_NODE, RawNode::new())
            .unwrap();

        let err = start(&registry, status::status_node()).await.unwrap_err();
        assert!(err.to_string().contains("publishing the status node"));
        assert_eq!(registry.state(), LifecycleState::Uninitialized);
        assert!(!transport.is_accepting());
    }

    #[tokio::test]
    async fn failed_connect_is_reported_with_context() {
        let (transport, registry) = registry();
        transport.fail_next_connect("broker unreachable");
        let err = start(&registry, status::status_node()).await.unwrap_err();
        assert!(err.to_string().starts_with("connecting system.info to the bus"));
        assert!(format!("{err:#}").contains("broker unreachable"));
    }
}
