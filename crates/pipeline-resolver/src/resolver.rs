//! Production [`CdnResolver`] that scrapes a share page for its embedded CDN link.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use pipeline_stages::CdnResolver;
use regex::Regex;

static CDN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(https://lh3\.googleusercontent\.com/[^\s"']+)"#).expect("static pattern is valid"));

/// Fetches a share URL's landing page over HTTP and extracts its CDN link.
pub(crate) struct HttpCdnResolver {
    client: reqwest::Client,
}

impl HttpCdnResolver {
    pub(crate) fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CdnResolver for HttpCdnResolver {
    async fn resolve(&self, share_url: &str) -> anyhow::Result<String> {
        let response = self.client.get(share_url).send().await?.error_for_status()?;
        let body = response.text().await?;

        let captures = CDN_PATTERN
            .captures(&body)
            .ok_or_else(|| anyhow::anyhow!("no CDN URL found in share page: {share_url}"))?;
        let cdn_base = captures
            .get(1)
            .ok_or_else(|| anyhow::anyhow!("no CDN URL found in share page: {share_url}"))?
            .as_str();
        let trimmed = cdn_base.split('=').next().unwrap_or(cdn_base);
        Ok(format!("{trimmed}=dv"))
    }
}

#[cfg(test)]
mod tests {
    use super::CDN_PATTERN;

    #[test]
    fn pattern_extracts_the_cdn_base_and_strips_params() {
        let page = r#"<img src="https://lh3.googleusercontent.com/abc123=w200-h200">"#;
        let captures = CDN_PATTERN.captures(page).expect("pattern should match");
        let cdn_base = captures.get(1).unwrap().as_str();
        assert_eq!(cdn_base.split('=').next().unwrap(), "https://lh3.googleusercontent.com/abc123");
    }
}
