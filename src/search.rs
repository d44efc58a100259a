//! `aidx search` and `aidx grouped`: query the local index from the CLI.
//!
//! Queries use the textual predicate syntax of
//! [`parse_predicate`](artifact_index_core::query::parse_predicate):
//!
//! ```text
//! aidx search 'sha1:7ab67e6b20e5332a7fb4fdf2f019aec4275846c2'
//! aidx search '+groupId:org.apache.maven.indexer +artifactId:indexer-core -classifier:*'
//! aidx search 'classNames~DefaultNexusIndexer'
//! aidx grouped 'packaging:maven-plugin' --by ga
//! ```

use artifact_index_core::grouping::Grouping;
use artifact_index_core::query::parse_predicate;
use artifact_index_core::search::{FlatSearchRequest, GroupedSearchRequest};

use crate::config::Config;
use crate::context::IndexingContext;

pub fn run_search(config: &Config, query: &str, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let predicate = parse_predicate(query)?;
    let ctx = IndexingContext::from_config(config)?;
    let limit = limit.unwrap_or(config.search.result_limit);
    let response = ctx.search_flat(&FlatSearchRequest::new(predicate).with_limit(limit))?;
    ctx.close(false)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in response.results.iter().enumerate() {
        let record = &hit.record;
        println!("{}. [{:.2}] {}", i + 1, hit.score, record);
        if let Some(sha1) = &record.sha1 {
            println!("    sha1: {}", sha1);
        }
        if let Some(description) = &record.description {
            println!("    description: {}", description.replace('\n', " ").trim());
        }
        println!("    modified: {}", record.last_modified.format("%Y-%m-%d"));
        println!();
    }
    println!(
        "{} of {} matches shown.",
        response.results.len(),
        response.total_hits
    );
    Ok(())
}

pub fn run_grouped(config: &Config, query: &str, by: &str, json: bool) -> anyhow::Result<()> {
    let predicate = parse_predicate(query)?;
    let grouping: Grouping = by.parse()?;
    let ctx = IndexingContext::from_config(config)?;
    let response = ctx.search_grouped(&GroupedSearchRequest {
        predicate,
        grouping,
    })?;
    ctx.close(false)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    if response.groups.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (key, group) in &response.groups {
        let Some(latest) = group.representative() else {
            continue;
        };
        println!("{}", key);
        println!("    latest: {} ({})", latest.version, latest.packaging);
        if let Some(prefix) = &latest.plugin_prefix {
            println!("    prefix: {}", prefix);
        }
        let versions: Vec<&str> = group.artifacts.iter().map(|a| a.version.as_str()).collect();
        println!("    versions: {}", versions.join(", "));
    }
    println!();
    println!(
        "{} groups, {} matching artifacts.",
        response.groups.len(),
        response.total_hits
    );
    Ok(())
}
