//! Runs one table-session page request over a JSON dataset and prints the
//! result as JSON.
//!
//! ```text
//! gridfetch-demo --table orders.table.json --data orders.data.json \
//!     --filter-column status --filter-value active --sort name --page-size 10
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gridfetch_core::{
    ColumnRegistry, FilterOperator, FilterValue, Principal, SortDirection, StaticIdentity,
    TableConfig,
};
use gridfetch_session::{
    init_logging, CacheConfig, CacheFactory, InMemoryExecutor, LogFormat, SessionConfig,
    SessionError, TableSession,
};

#[derive(Debug, Parser)]
#[command(name = "gridfetch-demo", about = "Fetch one page of a configured table")]
struct Args {
    /// Table configuration (JSON).
    #[arg(long, env = "GRIDFETCH_TABLE")]
    table: PathBuf,

    /// Dataset: a JSON object mapping table names to arrays of rows.
    #[arg(long, env = "GRIDFETCH_DATA")]
    data: PathBuf,

    /// Principal the session is scoped to.
    #[arg(long, default_value = "demo")]
    principal: String,

    #[arg(long)]
    search: Option<String>,

    #[arg(long)]
    filter_column: Option<String>,

    /// Filter operator, e.g. `contains`, `gte`, `oneOf`, `between`.
    #[arg(long, value_parser = parse_operator)]
    filter_op: Option<FilterOperator>,

    /// Filter value. Repeat for `oneOf`; give two for `between`.
    #[arg(long)]
    filter_value: Vec<String>,

    /// Date range start (`YYYY-MM-DD`).
    #[arg(long)]
    from: Option<String>,

    /// Date range end (`YYYY-MM-DD`).
    #[arg(long)]
    to: Option<String>,

    #[arg(long)]
    sort: Option<String>,

    #[arg(long)]
    desc: bool,

    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long)]
    page_size: Option<u32>,

    /// Comma-separated visible column keys. Defaults to all columns.
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Also print the filter options of this column.
    #[arg(long)]
    distinct: Option<String>,

    #[arg(long, env = "GRIDFETCH_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
}

fn parse_operator(raw: &str) -> Result<FilterOperator, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown filter operator {raw:?}"))
}

fn filter_value(operator: Option<FilterOperator>, mut values: Vec<String>) -> Option<FilterValue> {
    match operator {
        _ if values.is_empty() => None,
        Some(FilterOperator::OneOf) => Some(FilterValue::OneOf(values)),
        Some(FilterOperator::Between) => {
            let mut values = values.into_iter();
            Some(FilterValue::Between {
                from: values.next(),
                to: values.next(),
            })
        }
        _ => Some(FilterValue::Single(values.swap_remove(0))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format, "info")?;

    let config_json = std::fs::read_to_string(&args.table)
        .with_context(|| format!("reading table config {}", args.table.display()))?;
    let table = TableConfig::from_json(&config_json).context("parsing table config")?;
    let registry = ColumnRegistry::register(&table).map_err(SessionError::from)?;

    let data_json = std::fs::read_to_string(&args.data)
        .with_context(|| format!("reading dataset {}", args.data.display()))?;
    let executor = Arc::new(InMemoryExecutor::from_json(&data_json).context("parsing dataset")?);

    let principal = Principal {
        id: args.principal.clone(),
    };
    let identity = StaticIdentity::for_principal(&principal, table.table.clone());
    let factory = CacheFactory::new(CacheConfig::default());
    let mut session = TableSession::new(
        &identity,
        registry,
        executor,
        &factory,
        SessionConfig::default(),
    );

    if !args.columns.is_empty() {
        session.set_visible_columns(args.columns.iter().cloned());
    }
    if let Some(term) = &args.search {
        session.set_search(term.clone());
    }
    if args.filter_column.is_some() {
        session.set_filter_column(args.filter_column.clone());
        session.set_filter_operator(args.filter_op);
        session.set_filter_value(filter_value(args.filter_op, args.filter_value.clone()));
    }
    session.set_date_range(args.from.clone(), args.to.clone());
    let direction = if args.desc {
        SortDirection::Desc
    } else {
        SortDirection::Asc
    };
    session.set_sort(args.sort.clone(), direction);
    if let Some(size) = args.page_size {
        session.set_page_size(size);
    }
    session.set_page(args.page);

    let page = session.get_page().await?;
    tracing::info!(
        fingerprint = %page.fingerprint,
        rows = page.rows.len(),
        total = page.total_count,
        relations = ?session.plan_relations(),
        "page fetched"
    );

    let mut output = serde_json::json!({
        "meta": page.meta(),
        "rows": page.rows,
    });
    if let Some(key) = &args.distinct {
        let options = session.get_distinct_values(key).await?;
        output["distinct"] = serde_json::json!({ "column": key, "values": options });
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
