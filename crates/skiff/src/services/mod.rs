pub mod analytics;
pub mod bridge;
pub mod confidential;
pub mod launchpad;
pub mod swap;
pub mod wallet_server;
