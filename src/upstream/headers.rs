//! Request header strategies for upstream calls
//!
//! The spoofing strategy only decorates requests; nothing in the pipeline
//! depends on which one is active.

use std::net::Ipv4Addr;

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT,
};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const USER_AGENTS: &[&str] = &[
    DEFAULT_USER_AGENT,
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Mobile/15E148 Safari/604.1",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "de-DE,de;q=0.9,en;q=0.6",
    "fr-FR,fr;q=0.9,en;q=0.5",
    "pt-BR,pt;q=0.9,en;q=0.4",
    "ja-JP,ja;q=0.9,en;q=0.3",
];

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Produces the headers attached to each upstream request
pub trait HeaderStrategy: Send + Sync {
    fn headers(&self) -> HeaderMap;

    fn strategy_name(&self) -> &'static str;
}

fn base_headers(user_agent: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

/// Fixed browser-like headers
#[derive(Debug, Default)]
pub struct StaticHeaders;

impl HeaderStrategy for StaticHeaders {
    fn headers(&self) -> HeaderMap {
        base_headers(DEFAULT_USER_AGENT)
    }

    fn strategy_name(&self) -> &'static str {
        "static"
    }
}

/// Random User-Agent, client address and locale on every call
#[derive(Debug, Default)]
pub struct RandomizedHeaders;

impl HeaderStrategy for RandomizedHeaders {
    fn headers(&self) -> HeaderMap {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS.choose(&mut rng).copied().unwrap_or(DEFAULT_USER_AGENT);
        let mut headers = base_headers(user_agent);

        if let Some(lang) = ACCEPT_LANGUAGES.choose(&mut rng).copied() {
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(lang));
        }

        let ip = random_public_ipv4(&mut rng);
        if let Ok(value) = HeaderValue::from_str(&ip.to_string()) {
            headers.insert(X_FORWARDED_FOR.clone(), value);
        }

        headers
    }

    fn strategy_name(&self) -> &'static str {
        "randomized"
    }
}

/// Unicast address outside loopback, private and link-local ranges
fn random_public_ipv4(rng: &mut impl Rng) -> Ipv4Addr {
    loop {
        let ip = Ipv4Addr::new(
            rng.gen_range(11..=223),
            rng.gen(),
            rng.gen(),
            rng.gen_range(1..=254),
        );
        if !ip.is_loopback() && !ip.is_private() && !ip.is_link_local() {
            return ip;
        }
    }
}

pub fn create_header_strategy(spoof: bool) -> Box<dyn HeaderStrategy> {
    if spoof {
        Box::new(RandomizedHeaders)
    } else {
        Box::new(StaticHeaders)
    }
}
