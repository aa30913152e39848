//! Read-only query commands and migrations.
//!
//! Each handler runs after config is loaded and both stores are connected,
//! and prints a plain-text table to stdout.

use std::fmt::Write as _;

use chrono::Utc;
use pubtrend_core::{DurationKey, MetricField, Scope};
use pubtrend_db::{EntityScope, ListQuery, Stores, TopValuesRequest, TrendingScope};

const TITLE_WIDTH: usize = 50;

/// Apply pending migrations to the relational store.
///
/// # Errors
///
/// Returns an error if any migration fails.
pub(crate) async fn run_migrate(stores: &Stores) -> anyhow::Result<()> {
    let applied = pubtrend_db::run_migrations(&stores.relational).await?;
    tracing::info!(applied, "migrations complete");
    println!("applied {applied} migration(s)");
    Ok(())
}

/// Print the trending publications for a duration.
///
/// # Errors
///
/// Returns an error if `limit` is not positive or the query fails.
pub(crate) async fn run_trending(
    stores: &Stores,
    duration: DurationKey,
    limit: i64,
    sort: Option<String>,
    order: String,
) -> anyhow::Result<()> {
    let query = ListQuery::new(limit, 0)?.with_sort(sort, Some(order));
    let rows = pubtrend_db::list_trending_publications(
        &stores.relational,
        TrendingScope::All,
        duration,
        &query,
    )
    .await?;

    if rows.is_empty() {
        println!("no trending records for {duration}");
        return Ok(());
    }

    println!("{:<6}{:<12}{:<8}{:<32}TITLE", "RANK", "SCORE", "COUNT", "DOI");
    for row in &rows {
        println!(
            "{:<6}{:<12.3}{:<8}{:<32}{}",
            row.trending_ranking,
            row.metrics.score,
            row.metrics.count,
            row.doi,
            truncate(&row.title, TITLE_WIDTH)
        );
    }
    println!("{} of {} record(s)", rows.len(), rows[0].total_count);

    Ok(())
}

/// Print per-field aggregates for the top publications (or given DOIs).
///
/// # Errors
///
/// Returns an error if a field name is unknown, `n` is not positive, or a
/// query fails.
pub(crate) async fn run_top(
    stores: &Stores,
    duration: DurationKey,
    n: i64,
    fields: &str,
    dois: Option<&str>,
) -> anyhow::Result<()> {
    let mut fields = MetricField::parse_list(fields)?;
    if fields.is_empty() {
        fields.push(MetricField::Score);
    }
    let request = TopValuesRequest {
        range: duration.definition().ending_at(Utc::now()),
        fields,
        n,
        dois: split_dois(dois),
    };

    let result = pubtrend_db::top_values(stores, &request).await?;
    println!("selected by {:?}", result.selection);

    let mut header = format!("{:<32}", "DOI");
    for field in &request.fields {
        write!(header, "{:<16}", field.as_str().to_uppercase())?;
    }
    println!("{header}");
    for doi in &result.dois {
        let mut line = format!("{doi:<32}");
        for field in &request.fields {
            let value = result
                .values
                .get(field.as_str())
                .and_then(|per_doi| per_doi.get(doi))
                .copied()
                .flatten();
            write!(line, "{:<16}", fmt_value(value))?;
        }
        println!("{line}");
    }

    Ok(())
}

/// Print the DOIs a scope resolves to.
///
/// # Errors
///
/// Returns an error if the scope kind or id is invalid, or the lookup fails.
pub(crate) async fn run_scope(
    stores: &Stores,
    kind: &str,
    id: Option<&str>,
    duration: DurationKey,
) -> anyhow::Result<()> {
    let scope = Scope::parse(kind, id)?;
    match pubtrend_db::resolve_scope(&stores.relational, &scope, duration).await? {
        EntityScope::All => println!("all publications"),
        EntityScope::Keys(keys) if keys.is_empty() => {
            println!("no publications with {duration} records in scope");
        }
        EntityScope::Keys(keys) => {
            for key in &keys {
                println!("{key}");
            }
            println!("{} publication(s)", keys.len());
        }
    }
    Ok(())
}

/// Print a publication's metrics next to the population min/max/avg.
///
/// # Errors
///
/// Returns an error if the publication does not exist or a query fails.
pub(crate) async fn run_profile(
    stores: &Stores,
    doi: &str,
    duration: DurationKey,
    json: bool,
) -> anyhow::Result<()> {
    let comparison = pubtrend_db::profile_comparison(&stores.relational, doi, duration).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
        return Ok(());
    }

    println!(
        "{:<22}{:<14}{:<14}{:<14}AVG",
        "METRIC", "VALUE", "MIN", "MAX"
    );
    for (metric, row) in &comparison.metrics {
        println!(
            "{:<22}{:<14}{:<14}{:<14}{}",
            metric,
            fmt_value(row.value),
            fmt_value(row.min),
            fmt_value(row.max),
            fmt_value(row.avg)
        );
    }
    if !comparison.is_complete() {
        let missing: Vec<&str> = comparison.missing.iter().map(String::as_str).collect();
        println!("missing: {}", missing.join(", "));
    }

    Ok(())
}

pub(crate) fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

pub(crate) fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        format!("{}...", text.chars().take(width).collect::<String>())
    } else {
        text.to_string()
    }
}

pub(crate) fn split_dois(raw: Option<&str>) -> Option<Vec<String>> {
    let mut dois: Vec<String> = Vec::new();
    for doi in raw?.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !dois.iter().any(|seen| seen == doi) {
            dois.push(doi.to_owned());
        }
    }
    (!dois.is_empty()).then_some(dois)
}
