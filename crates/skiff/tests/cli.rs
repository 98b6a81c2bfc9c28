use std::process::Command;

use eyre::{Context as _, ContextCompat as _};

#[test]
fn actions_catalog_is_machine_readable_and_unique() -> eyre::Result<()> {
    let exe = assert_cmd::cargo::cargo_bin!("skiff");

    let out = Command::new(exe)
        .args(["actions"])
        .output()
        .context("run skiff actions")?;
    assert!(
        out.status.success(),
        "actions exited non-zero: stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).context("parse actions json")?;
    let actions = v
        .get("actions")
        .and_then(serde_json::Value::as_array)
        .context("catalog missing actions array")?;
    assert!(actions.len() >= 15, "catalog unexpectedly small");

    let mut names = std::collections::BTreeSet::new();
    for a in actions {
        let name = a
            .get("name")
            .and_then(serde_json::Value::as_str)
            .context("action missing name")?;
        assert!(!name.is_empty(), "empty action name");
        assert!(names.insert(name.to_owned()), "duplicate action: {name}");
        let schema_type = a
            .pointer("/inputSchema/type")
            .and_then(serde_json::Value::as_str);
        assert_eq!(schema_type, Some("object"), "{name} schema is not an object");
    }
    Ok(())
}

#[test]
fn doctor_json_reports_missing_env_without_failing() -> eyre::Result<()> {
    let exe = assert_cmd::cargo::cargo_bin!("skiff");

    let out = Command::new(exe)
        .env_remove("OPENAI_API_KEY")
        .env_remove("SKIFF_PRIVATE_KEY")
        .env_remove("SKIFF_MNEMONIC")
        .env_remove("SKIFF_RPC_URL")
        .env_remove("SKIFF_PAYMASTER_API_KEY")
        .env_remove("SKIFF_ANALYTICS_API_KEY")
        .env("SKIFF_CHAIN_ID", "43114")
        .args(["doctor", "--json"])
        .output()
        .context("run skiff doctor --json")?;

    assert!(
        out.status.success(),
        "doctor exited non-zero: status={:?}, stderr={}",
        out.status.code(),
        String::from_utf8_lossy(&out.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).context("parse doctor json")?;
    assert_eq!(v.get("ok").and_then(serde_json::Value::as_bool), Some(true));
    assert_eq!(
        v.pointer("/chain/name").and_then(|x| x.as_str()),
        Some("avalanche")
    );
    assert_eq!(
        v.pointer("/env/OPENAI_API_KEY").and_then(|x| x.as_bool()),
        Some(false)
    );
    Ok(())
}

#[test]
fn chat_without_required_env_exits_nonzero_and_echoes_placeholders() -> eyre::Result<()> {
    let exe = assert_cmd::cargo::cargo_bin!("skiff");

    let out = Command::new(exe)
        .env_remove("OPENAI_API_KEY")
        .env_remove("SKIFF_PRIVATE_KEY")
        .env_remove("SKIFF_MNEMONIC")
        .env_remove("SKIFF_RPC_URL")
        .env_remove("SKIFF_PAYMASTER_API_KEY")
        .env_remove("SKIFF_ANALYTICS_API_KEY")
        .args(["chat"])
        .output()
        .context("run skiff chat")?;

    assert!(!out.status.success(), "chat must fail without configuration");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("OPENAI_API_KEY=") && stderr.contains("SKIFF_RPC_URL="),
        "missing variables are echoed as placeholders, got: {stderr}"
    );
    Ok(())
}
