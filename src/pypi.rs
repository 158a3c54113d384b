use anyhow::Result;
use regex::Regex;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT},
    Client,
};
use serde::Deserialize;
use std::sync::OnceLock;

pub const PYPI_URL: &str = "https://pypi.org";

pub struct PypiClient {
    pub base_url: String,
    pub client: Client,
}

#[derive(Deserialize)]
struct ApiResponse {
    info: ApiInfo,
}

#[derive(Deserialize)]
struct ApiInfo {
    version: String,
}

impl PypiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("otools/", env!("CARGO_PKG_VERSION"))),
        );
        let client = Client::builder().default_headers(headers).build()?;
        Ok(PypiClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn package_url(&self, pkg_name: &str) -> String {
        format!("{}/pypi/{}/json", self.base_url, pkg_name)
    }

    /// Latest published version of `pkg_name` (`info.version`).
    ///
    /// Any failure, including a package the index does not know, is logged and yields `None`.
    pub async fn latest_version(&self, pkg_name: &str) -> Option<String> {
        let url = self.package_url(pkg_name);
        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(%url, error = %err, "could not reach package index");
                return None;
            }
        };
        let resp = match resp.error_for_status() {
            Ok(resp) => resp,
            Err(err) => {
                tracing::debug!(%url, error = %err, "package not found on index");
                return None;
            }
        };
        match resp.json::<ApiResponse>().await {
            Ok(body) => Some(body.info.version),
            Err(err) => {
                tracing::debug!(%url, error = %err, "unexpected package index payload");
                None
            }
        }
    }
}

/// `sale_stock` -> `odoo16-addon-sale-stock` for serie `16.0`, `odoo-addon-sale-stock` without serie
pub fn odoo_name_to_pkg_name(odoo_name: &str, odoo_serie: Option<&str>) -> String {
    let kebab = odoo_name.replace('_', "-");
    match odoo_serie.and_then(|s| s.split('.').next()).filter(|m| !m.is_empty()) {
        Some(major) => format!("odoo{major}-addon-{kebab}"),
        None => format!("odoo-addon-{kebab}"),
    }
}

fn pkg_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^odoo(?:\d+)?-addon-(.+)$").expect("package name pattern is valid"))
}

/// Reverse of [`odoo_name_to_pkg_name`]; other names are returned unchanged
pub fn pkg_name_to_odoo_name(pkg_name: &str) -> String {
    match pkg_name_regex().captures(pkg_name) {
        Some(caps) => caps[1].replace('-', "_"),
        None => pkg_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odoo_name_to_pkg_name() {
        assert_eq!(
            odoo_name_to_pkg_name("sale_stock_foo", Some("16.0")),
            "odoo16-addon-sale-stock-foo"
        );
        assert_eq!(
            odoo_name_to_pkg_name("sale_stock_foo", None),
            "odoo-addon-sale-stock-foo"
        );
    }

    #[test]
    fn test_pkg_name_to_odoo_name() {
        assert_eq!(pkg_name_to_odoo_name("odoo-addon-sale-foo"), "sale_foo");
        assert_eq!(pkg_name_to_odoo_name("odoo14-addon-sale-foo"), "sale_foo");
        assert_eq!(pkg_name_to_odoo_name("requests"), "requests");
        let pkg = odoo_name_to_pkg_name("web_responsive", Some("17.0"));
        assert_eq!(pkg_name_to_odoo_name(&pkg), "web_responsive");
    }

    #[test]
    fn test_package_url() {
        let client = PypiClient::new("https://pypi.org/").unwrap();
        assert_eq!(
            client.package_url("odoo-addon-x"),
            "https://pypi.org/pypi/odoo-addon-x/json"
        );
    }

    #[tokio::test]
    async fn test_unreachable_index_yields_none() {
        let client = PypiClient::new("http://127.0.0.1:9").unwrap();
        assert_eq!(client.latest_version("odoo-addon-x").await, None);
    }
}
