use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use reqwest::{Client, Method, Url};
use rulekit::RequestDescriptor;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Parser, Debug)]
pub struct SearchCommand {
    /// Source ID (see list-sources)
    pub source: String,

    /// Search key
    pub key: String,

    /// Page number
    #[arg(short, long, default_value_t = 1)]
    pub page: u32,

    /// Print the resolved request and exit without fetching
    #[arg(long)]
    pub dry_run: bool,
}

impl SearchCommand {
    pub async fn run(self) -> Result<()> {
        let manifest = rulekit::find_by_id(&self.source)?;
        let request = manifest.request(&self.key, self.page);

        if self.dry_run {
            println!("{}", serde_json::to_string_pretty(&request)?);
            return Ok(());
        }
        if request.webview {
            tracing::warn!(url = %request.url, "webview requested, fetching directly");
        }

        let body = fetch(&Client::new(), &request).await?;
        let records = super::extract::extract_records(&manifest, body)?;
        println!("{}", serde_json::to_string_pretty(&records)?);
        Ok(())
    }
}

/// Send a resolved request and return the response body.
async fn fetch(client: &Client, request: &RequestDescriptor) -> Result<String> {
    let url = request_url(request)?;
    let method = Method::from_bytes(request.method.as_bytes())
        .with_context(|| format!("Invalid HTTP method '{}'", request.method))?;
    tracing::info!(%method, %url, "fetching");

    let mut builder = client
        .request(method, url.clone())
        .header("User-Agent", USER_AGENT);
    for (key, value) in &request.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }
    if let Some(timeout) = request.timeout {
        builder = builder.timeout(Duration::from_millis(timeout));
    }

    let response = builder
        .send()
        .await
        .map_err(|e| anyhow!("HTTP request failed for '{}': {}", url, e))?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "HTTP request failed for '{}': status {}",
            url,
            response.status()
        ));
    }

    let body = response
        .text()
        .await
        .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

    tracing::debug!(bytes = body.len(), "fetched");
    Ok(body)
}

/// The request URL with its params appended to the query.
fn request_url(request: &RequestDescriptor) -> Result<Url> {
    let mut url = Url::parse(&request.url)
        .with_context(|| format!("Request URL '{}' is not absolute", request.url))?;
    if !request.params.is_empty() {
        url.query_pairs_mut().extend_pairs(&request.params);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, Command};

    #[test]
    fn test_parse_args() {
        let args =
            Args::try_parse_from(["rulekit", "search", "quotes", "life", "-p", "2", "--dry-run"])
                .unwrap();
        let Some(Command::Search(cmd)) = args.command else {
            panic!("expected search command");
        };
        assert_eq!(cmd.source, "quotes");
        assert_eq!(cmd.key, "life");
        assert_eq!(cmd.page, 2);
        assert!(cmd.dry_run);
    }

    #[test]
    fn test_request_url_appends_params() {
        let request = rulekit::RequestBuilder::new()
            .with_base_url("https://s.example/")
            .build(r#"/find?x=1,{"params":{"q":"{{key}}","p":"{{page}}"}}"#, "a b", 3);
        let url = request_url(&request).unwrap();
        assert_eq!(url.as_str(), "https://s.example/find?x=1&p=3&q=a+b");
    }

    #[test]
    fn test_relative_url_is_rejected() {
        let request = rulekit::RequestBuilder::new().build("/relative", "", 1);
        assert!(request_url(&request).is_err());
    }
}
