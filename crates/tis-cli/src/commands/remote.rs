use anyhow::{Context, Result};

use tis_graph::{ClientCredentials, GraphClient, IndicatorGateway, OAuthClient, TokenSource};

use super::load_sync_config;

/// `tis remote list`: fetch the remote collection and print it as JSON.
pub fn list(config_paths: &[String]) -> Result<()> {
    let (_, cfg) = load_sync_config(config_paths, false)?;

    let tokens = OAuthClient::new(&cfg.authority_base_url).context("build token client")?;
    let token = tokens
        .fetch_token(&ClientCredentials::from_config(&cfg))
        .context("token exchange")?;

    let gateway = GraphClient::new(&cfg.graph_base_url).context("build graph client")?;
    let listed = gateway.list(&token).context("list remote indicators")?;

    let pretty = serde_json::to_string_pretty(&listed).context("serialize remote listing")?;
    println!("{}", pretty);
    Ok(())
}
