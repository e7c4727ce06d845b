use anyhow::Result;

use crate::categorize::Categorizer;
use crate::config::Config;

/// One row of `tabman providers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    pub id: String,
    /// Position in the configured preference order, if listed.
    pub rank: Option<usize>,
    pub ready: bool,
    pub note: String,
}

pub fn provider_statuses(categorizer: &Categorizer) -> Vec<ProviderStatus> {
    let preference = categorizer.preference();
    let mut rows: Vec<ProviderStatus> = categorizer
        .providers()
        .map(|p| {
            let ready = p.has_credential();
            let note = match (ready, p.credential_env()) {
                (true, Some(var)) => format!("{} set", var),
                (true, None) => "no credential needed".to_string(),
                (false, Some(var)) => format!("{} not set", var),
                (false, None) => "unavailable".to_string(),
            };
            ProviderStatus {
                id: p.id().to_string(),
                rank: preference.iter().position(|id| id == p.id()).map(|i| i + 1),
                ready,
                note,
            }
        })
        .collect();
    rows.sort_by_key(|r| r.rank.unwrap_or(usize::MAX));
    rows
}

pub fn list_providers(config: &Config) -> Result<()> {
    let categorizer = Categorizer::from_config(&config.categorize)?;

    println!("{:<10} {:<6} {:<6} NOTE", "PROVIDER", "ORDER", "READY");
    for row in provider_statuses(&categorizer) {
        let rank = row
            .rank
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<10} {:<6} {:<6} {}", row.id, rank, row.ready, row.note);
    }

    Ok(())
}
