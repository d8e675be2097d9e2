//! Fetch command - answer one request the way the worker would

use crate::cli::args::FetchArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{PrecacheError, PrecacheResult};
use crate::network::{Request, Response};
use crate::worker::{parse_origin, FetchInterceptor, Intercepted, ResponseSource};
use console::style;
use std::io::Write;
use std::sync::Arc;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> PrecacheResult<()> {
    let origin = parse_origin(args.origin.as_deref().unwrap_or(&config.worker.origin))?;
    // Absolute URLs replace the origin entirely
    let url = origin
        .join(&args.path)
        .map_err(|e| PrecacheError::InvalidUrl {
            url: args.path.clone(),
            reason: e.to_string(),
        })?;

    let mut request = Request::new(args.method, url);
    for (name, value) in args.headers {
        request = request.with_header(name, value);
    }
    if let Some(data) = args.data {
        request = request.with_body(data.into_bytes());
    }

    let interceptor = FetchInterceptor::new(
        config.worker.cache_name.clone(),
        ConfigManager::storage(config),
        Arc::new(super::http_fetcher(config)),
    );
    let Intercepted { response, source } = interceptor.intercept(&request).await?;

    let label = match source {
        ResponseSource::Cache => style("cache").green(),
        ResponseSource::Network => style("network").yellow(),
    };
    eprintln!(
        "{} {} {} {}",
        label,
        request.method,
        request.url,
        status_line(&response)
    );

    let mut out = Vec::new();
    if args.include {
        out.extend_from_slice(format!("{}\n", status_line(&response)).as_bytes());
        for (name, value) in &response.headers {
            out.extend_from_slice(format!("{}: {}\n", name, value).as_bytes());
        }
        out.push(b'\n');
    }

    match args.output {
        Some(path) => {
            out.extend_from_slice(&response.body);
            tokio::fs::write(&path, &out)
                .await
                .map_err(|e| PrecacheError::io(format!("writing {}", path.display()), e))?;
        }
        None => write_stdout(&out, &response.body)
            .map_err(|e| PrecacheError::io("writing response to stdout", e))?,
    }

    Ok(())
}

fn write_stdout(head: &[u8], body: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(head)?;
    stdout.write_all(body)?;
    stdout.flush()
}

fn status_line(response: &Response) -> String {
    if response.status_text.is_empty() {
        response.status.to_string()
    } else {
        format!("{} {}", response.status, response.status_text)
    }
}
