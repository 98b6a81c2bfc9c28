//! Environment self-diagnostic. Reports which variables are set and which
//! chain would be used, never the values themselves.

use crate::config::{chain_for_id, AgentConfig, DEFAULT_CHAIN_ID};
use eyre::Context as _;
use serde_json::json;
use std::io::Write as _;

pub fn run(json_output: bool) -> eyre::Result<()> {
    let lookup = |k: &str| std::env::var(k).ok();

    let env = AgentConfig::env_report(lookup);
    let chain_id = std::env::var("SKIFF_CHAIN_ID")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_CHAIN_ID);
    let chain_name = chain_for_id(chain_id).map(|c| c.name).unwrap_or("unsupported");
    let wallet_server = std::env::var("SKIFF_WALLET_SERVER_URL")
        .is_ok_and(|v| !v.trim().is_empty());

    let report = json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "chain": { "id": chain_id, "name": chain_name },
        "env": env
            .iter()
            .map(|(k, present)| ((*k).to_owned(), json!(present)))
            .collect::<serde_json::Map<_, _>>(),
        "wallet_server_configured": wallet_server,
    });

    let mut out = std::io::stdout().lock();
    if json_output {
        writeln!(out, "{}", serde_json::to_string(&report).context("serialize report")?)
            .context("write report")?;
        return Ok(());
    }

    writeln!(out, "skiff {}", env!("CARGO_PKG_VERSION")).context("write report")?;
    writeln!(out, "chain: {chain_name} ({chain_id})").context("write report")?;
    for (k, present) in &env {
        writeln!(out, "{k}: {}", if *present { "set" } else { "missing" })
            .context("write report")?;
    }
    writeln!(
        out,
        "wallet server: {}",
        if wallet_server { "configured" } else { "not configured" }
    )
    .context("write report")?;
    Ok(())
}
