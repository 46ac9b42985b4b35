//! Loads the first page of a remote grid and prints the rendered HTML.
//!
//! Usage: `lgrid-demo <config.json> [width]`

use std::sync::Arc;
use std::{env, fs, process};

use lgrid_core::{
    DynamicFields, DynamicProperty, DynamicRow, FetchOutcome, GridContext, GridError, GridOptions,
    GridView, JsonFileStorage,
};
use lgrid_http::{ReqwestTransport, init_logging};
use log::{error, info};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct DemoConfig {
    base_url: String,
    #[serde(default)]
    bearer_token: Option<String>,
    options: GridOptions,
    columns: Vec<DynamicProperty>,
}

async fn run(config_path: &str, width: f64) -> Result<String, GridError> {
    let content = fs::read_to_string(config_path)?;
    let config: DemoConfig = serde_json::from_str(&content)?;
    config.options.validate()?;

    let mut transport = ReqwestTransport::new(&config.base_url)?;
    if let Some(token) = &config.bearer_token {
        transport = transport.with_bearer_token(token);
    }

    let storage = JsonFileStorage::new(&config.options.app_namespace)?;
    let context = GridContext::new(Arc::new(storage)).with_transport(Arc::new(transport));
    let provider = Arc::new(DynamicFields::new(config.columns));

    let mut grid: GridView<DynamicRow> = GridView::new(config.options, context, provider, None)?;
    match grid.initialize().await? {
        FetchOutcome::Applied(rows) => info!("Loaded {} rows", rows),
        outcome => info!("Initial fetch finished with {:?}", outcome),
    }

    Ok(grid.render(width).to_html())
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging() {
        eprintln!("Logger already installed: {}", e);
    }

    let args: Vec<String> = env::args().collect();
    let Some(config_path) = args.get(1) else {
        eprintln!("Usage: lgrid-demo <config.json> [width]");
        process::exit(2);
    };
    let width = args
        .get(2)
        .and_then(|w| w.parse::<f64>().ok())
        .unwrap_or(1200.0);

    match run(config_path, width).await {
        Ok(html) => println!("{}", html),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
