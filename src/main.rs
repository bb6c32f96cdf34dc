//! query-expr command line
//!
//! Usage: query-expr [--config FILE] [--dialect D] <COMMAND>
//!
//! Commands:
//!   tokenize <FILTER>                 Print the tokens of an OData filter
//!   filter <ENTITY> <FILTER>          Compile OData query options to SQL
//!   closure <ENTITY> <SOURCE>         Compile a closure filter to SQL
//!   format <FILE>                     Format a serialized query expression

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use query_expr::odata::{self, Token};
use query_expr::{
    ClosureParser, Config, DefaultResolver, FormatterSettings, ODataQuery, QueryExpression,
    SqlFormatter,
};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "query-expr")]
#[command(about = "Compile OData filters and closure sources to SQL", long_about = None)]
struct Args {
    /// Config file (defaults to ./query-expr.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dialect preset: plain, mysql, postgres, mssql
    #[arg(long, global = true)]
    dialect: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tokens of an OData filter
    Tokenize {
        filter: String,
    },

    /// Compile OData query options to a select statement
    Filter {
        /// Entity to select from
        entity: String,

        /// $filter expression
        filter: String,

        /// $select list, e.g. "id, count(id) as total"
        #[arg(long)]
        select: Option<String>,

        /// $orderby list, e.g. "name desc, id"
        #[arg(long)]
        orderby: Option<String>,

        /// $groupby list
        #[arg(long)]
        groupby: Option<String>,

        #[arg(long)]
        top: Option<u64>,

        #[arg(long)]
        skip: Option<u64>,
    },

    /// Compile a closure filter (e.g. "x => x.price > 5") to a select statement
    Closure {
        entity: String,

        source: String,

        /// Bind a free identifier: name=json (plain text is bound as a string)
        #[arg(long = "bind", value_parser = parse_binding)]
        bindings: Vec<(String, Value)>,

        #[arg(long)]
        take: Option<u64>,
    },

    /// Format a query expression stored as JSON
    Format {
        file: PathBuf,
    },
}

fn parse_binding(input: &str) -> Result<(String, Value), String> {
    let (name, raw) = input
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", input))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.trim().to_string(), value))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_expr=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = load_settings(args.config.as_deref(), args.dialect.as_deref())?;
    tracing::debug!("Formatter settings: {:?}", settings);
    let formatter = SqlFormatter::with_settings(settings);

    match args.command {
        Command::Tokenize { filter } => cmd_tokenize(&filter),
        Command::Filter {
            entity,
            filter,
            select,
            orderby,
            groupby,
            top,
            skip,
        } => {
            let options = ODataQuery {
                filter: Some(filter),
                select,
                order_by: orderby,
                group_by: groupby,
                top,
                skip,
            };
            let query = options.to_query_expression(&entity, &DefaultResolver)?;
            print_sql(&formatter, &query)
        }
        Command::Closure {
            entity,
            source,
            bindings,
            take,
        } => {
            let parser = bindings
                .into_iter()
                .fold(ClosureParser::new(), |parser, (name, value)| parser.bind(name, value));
            let mut query = QueryExpression::new()
                .select_all()
                .from(entity)
                .filter(parser.parse_filter(&source)?);
            if let Some(take) = take {
                query = query.take(take);
            }
            print_sql(&formatter, &query)
        }
        Command::Format { file } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
            let query: QueryExpression = serde_json::from_str(&content)?;
            print_sql(&formatter, &query)
        }
    }
}

fn load_settings(config: Option<&Path>, dialect: Option<&str>) -> anyhow::Result<FormatterSettings> {
    let mut config = match config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_file(path)?
        }
        None => Config::load(&std::env::current_dir()?)?,
    };
    if let Some(dialect) = dialect {
        config.dialect = Some(dialect.to_string());
    }
    Ok(config.settings()?)
}

fn cmd_tokenize(filter: &str) -> anyhow::Result<()> {
    let tokens = odata::tokenize(filter)?;
    for (i, token) in tokens.iter().enumerate() {
        let kind = match token {
            Token::Literal(value) => format!("{:?}", value.literal_type()).green(),
            Token::Identifier(_) => "Identifier".cyan(),
            Token::Syntax(_) => "Syntax".dimmed(),
        };
        println!("{:>4}  {:<12} {}", i, kind, token);
    }
    Ok(())
}

fn print_sql(formatter: &SqlFormatter, query: &QueryExpression) -> anyhow::Result<()> {
    let sql = formatter.format(query)?;
    println!("{}", sql);
    Ok(())
}
