pub mod bridge;
pub mod cancel_order;
pub mod confidential;
pub mod launch;
pub mod swap;
pub mod transfer;
