//! Outbound request construction with rotated identity headers
//!
//! Every request gets a user agent and a referer picked at random from fixed
//! pools so consecutive calls do not share one uniform fingerprint.

use crate::config::PortalConfig;
use rand::seq::SliceRandom;
use reqwest::blocking::{Client, RequestBuilder as HttpRequest};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};

/// User agents rotated across requests
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/95.0.4638.69 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/95.0.4638.54 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/94.0.4606.81 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/94.0.4606.81 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:93.0) Gecko/20100101 Firefox/93.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/95.0.4638.54 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; rv:91.0) Gecko/20100101 Firefox/91.0",
    "Mozilla/5.0 (Linux; Android 12) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.45 Mobile Safari/537.36",
    "Mozilla/5.0 (Android 12; Mobile; rv:68.0) Gecko/68.0 Firefox/94.0",
    "Mozilla/5.0 (Linux; Android 12; SM-A102U) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.45 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 12_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/12.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 12_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/69.0.3497.105 Mobile/15E148 Safari/605.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 11_0 like Mac OS X) AppleWebKit/604.1.38 (KHTML, like Gecko) Version/11.0 Mobile/15A372 Safari/604.1",
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
];

/// Identity headers chosen for a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_agent: &'static str,
    pub referer: String,
}

/// Builds portal requests with rotated identity headers
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    site_url: String,
    referer_paths: Vec<String>,
    authorization: String,
}

impl RequestBuilder {
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            site_url: config.site_url.trim_end_matches('/').to_string(),
            referer_paths: config.referer_paths.clone(),
            authorization: config.authorization.clone(),
        }
    }

    /// Picks a user agent and referer uniformly at random
    ///
    /// With no referer paths configured the referer is the bare site URL.
    pub fn identity(&self) -> RequestIdentity {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]);
        let referer = match self.referer_paths.choose(&mut rng) {
            Some(path) => format!("{}{}", self.site_url, path),
            None => format!("{}/", self.site_url),
        };
        RequestIdentity {
            user_agent,
            referer,
        }
    }

    /// Builds a GET request for `url` carrying a fresh identity
    pub fn build(&self, client: &Client, url: &str) -> HttpRequest {
        let identity = self.identity();
        client
            .get(url)
            .header(USER_AGENT, identity.user_agent)
            .header(REFERER, identity.referer.as_str())
            .header(ORIGIN, identity.referer.as_str())
            .header(AUTHORIZATION, self.authorization.as_str())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header("sec-ch-ua", r#"";Not A Brand";v="99", "Chromium";v="94""#)
            .header("sec-ch-ua-mobile", "?0")
    }
}
