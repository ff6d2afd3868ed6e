//! Code list command

use anyhow::{Context, Result};

use crate::cli::output::{OutputFormat, print_formatted};
use crate::config::Config;
use crate::service::{CertificationService, ServiceClient};

pub async fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let client = ServiceClient::new(&config.service)?;
    let budgets = client.budgets().await.context("Failed to fetch codes")?;

    print_formatted(&budgets, format, |budgets| {
        if budgets.is_empty() {
            return "No codes available".to_string();
        }
        budgets
            .iter()
            .map(|b| match &b.descripcion {
                Some(desc) => format!("{:<12} {}", b.codigo, desc),
                None => b.codigo.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    });

    Ok(())
}
