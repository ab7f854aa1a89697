//! Curated User-Agent pool with matching Accept-Language rotation
//!
//! Read-only; a random entry is picked per host lease so one host always
//! sees a consistent browser identity.

use rand::seq::SliceRandom;

/// Real browser User-Agents (kept reasonably current).
const USER_AGENTS: &[&str] = &[
    // Chrome Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    // Chrome Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Firefox Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Firefox Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Safari
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    // Edge
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Accept-Language variants for the target ccTLD markets.
const ACCEPT_LANGUAGES: &[&str] = &[
    "de-DE,de;q=0.9,en-US;q=0.8,en;q=0.7",
    "de-CH,de;q=0.9,en;q=0.8",
    "de-AT,de;q=0.9,en;q=0.8",
    "en-GB,en;q=0.9",
    "fr-FR,fr;q=0.9,en;q=0.8",
    "it-IT,it;q=0.9,en;q=0.8",
    "es-ES,es;q=0.9,en;q=0.8",
];

#[derive(Default)]
pub struct UserAgentPool;

impl UserAgentPool {
    pub fn new() -> Self {
        Self
    }

    pub fn pick(&self) -> &'static str {
        USER_AGENTS.choose(&mut rand::thread_rng()).copied().unwrap_or(USER_AGENTS[0])
    }

    pub fn pick_accept_language(&self) -> &'static str {
        ACCEPT_LANGUAGES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(ACCEPT_LANGUAGES[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_come_from_the_pool() {
        let pool = UserAgentPool::new();
        for _ in 0..20 {
            assert!(USER_AGENTS.contains(&pool.pick()));
            assert!(ACCEPT_LANGUAGES.contains(&pool.pick_accept_language()));
        }
    }
}
