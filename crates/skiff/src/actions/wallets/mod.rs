pub mod list;
pub mod logs;
pub mod switch;

use crate::account::ServerWallet;
use crate::agentkit::Agentkit;
use crate::errors::{ActionError, SkiffError};

/// Server-wallet actions are only meaningful in server mode; everywhere
/// else they fail with a capability error, not a crash.
pub(super) fn server_wallet(kit: &Agentkit) -> Result<&ServerWallet, ActionError> {
    kit.server_wallet()
        .ok_or_else(|| SkiffError::ServerWalletNotConfigured.into())
}

/// Render the wallet service's RFC3339 timestamps for the agent channel,
/// falling back to the raw string when the service sends something else.
pub(super) fn humanize_timestamp(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|_| raw.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_compactly_or_pass_through() {
        assert_eq!(
            humanize_timestamp("2025-02-01T12:30:00Z"),
            "2025-02-01 12:30 UTC"
        );
        assert_eq!(humanize_timestamp("yesterday"), "yesterday");
    }
}
