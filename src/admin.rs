//! Administrative blocklist seeding

use std::fmt;
use std::net::IpAddr;
use tracing::warn;

use crate::db::Database;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Blocked,
    AlreadyBlocked,
    InvalidFormat,
    Failed(String),
}

impl BlockOutcome {
    /// Anything other than blocked or already-blocked
    pub fn is_error(&self) -> bool {
        matches!(self, BlockOutcome::InvalidFormat | BlockOutcome::Failed(_))
    }
}

#[derive(Debug, Default)]
pub struct BlockReport {
    pub outcomes: Vec<(String, BlockOutcome)>,
}

impl BlockReport {
    pub fn blocked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == BlockOutcome::Blocked)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.blocked()
    }

    pub fn has_errors(&self) -> bool {
        self.outcomes.iter().any(|(_, o)| o.is_error())
    }
}

impl fmt::Display for BlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (ip, outcome) in &self.outcomes {
            match outcome {
                BlockOutcome::Blocked => writeln!(f, "Successfully blocked IP: {}", ip)?,
                BlockOutcome::AlreadyBlocked => writeln!(f, "IP already blocked: {}", ip)?,
                BlockOutcome::InvalidFormat => writeln!(f, "Invalid IP address format: {}", ip)?,
                BlockOutcome::Failed(e) => writeln!(f, "Error blocking IP {}: {}", ip, e)?,
            }
        }
        write!(
            f,
            "\nBlocking complete: {} IPs blocked, {} IPs skipped",
            self.blocked(),
            self.skipped()
        )
    }
}

/// Validate and add each address to the blocklist unless it is already there.
/// One bad item never stops the rest.
pub async fn block_addresses(db: &Database, addresses: &[String], reason: Option<&str>) -> BlockReport {
    let mut report = BlockReport::default();

    for raw in addresses {
        let outcome = match raw.trim().parse::<IpAddr>() {
            Err(_) => BlockOutcome::InvalidFormat,
            Ok(addr) => match db.block_if_absent(&addr.to_canonical().to_string(), reason).await {
                Ok(true) => BlockOutcome::Blocked,
                Ok(false) => BlockOutcome::AlreadyBlocked,
                Err(e) => {
                    warn!("Failed to block {}: {}", raw, e);
                    BlockOutcome::Failed(e.to_string())
                }
            },
        };
        report.outcomes.push((raw.clone(), outcome));
    }

    report
}
