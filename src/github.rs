use crate::error::OtoolsError;
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

/// The parts of a GitHub pull request (or commit) URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubUrl {
    pub upstream: String,
    pub repo_name: String,
    pub entity_type: String,
    pub entity_id: String,
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:https?://)?(?:www\.)?github\.com/(?P<upstream>[^/\s]+)/(?P<repo_name>[^/\s]+)/(?P<entity_type>pull|commit)/(?P<entity_id>[^/\s#?]+)",
        )
        .expect("github url pattern is valid")
    })
}

/// Split `https://github.com/OCA/sale-workflow/pull/1234` into its parts
pub fn parse_github_url(url: &str) -> Result<GithubUrl> {
    let caps = url_regex().captures(url.trim()).ok_or_else(|| OtoolsError::ParseError {
        source_cmd: url.to_string(),
        reason: "not a GitHub pull request URL".into(),
    })?;
    Ok(GithubUrl {
        upstream: caps["upstream"].to_string(),
        repo_name: caps["repo_name"].to_string(),
        entity_type: caps["entity_type"].to_string(),
        entity_id: caps["entity_id"].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pull_request_url() {
        let parts = parse_github_url("https://github.com/OCA/sale-workflow/pull/1234/files").unwrap();
        assert_eq!(
            parts,
            GithubUrl {
                upstream: "OCA".into(),
                repo_name: "sale-workflow".into(),
                entity_type: "pull".into(),
                entity_id: "1234".into(),
            }
        );
        assert_eq!(
            parse_github_url("github.com/camptocamp/odoo-cloud-platform/pull/7")
                .unwrap()
                .entity_id,
            "7"
        );
    }

    #[test]
    fn test_rejects_other_urls() {
        for bad in [
            "https://gitlab.com/OCA/sale-workflow/pull/1",
            "https://github.com/OCA/sale-workflow",
            "not a url",
        ] {
            assert!(parse_github_url(bad).is_err(), "{bad}");
        }
    }
}
