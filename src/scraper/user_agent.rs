use rand::seq::SliceRandom;

/// Desktop Chrome and Safari builds; mobile agents get different markup on the target sites
const DESKTOP_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// Pool of browser identities, one picked per request
#[derive(Debug, Clone)]
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    /// Use `configured` agents, or the built-in desktop set when none are given
    pub fn new(configured: &[String]) -> Self {
        let agents = if configured.is_empty() {
            DESKTOP_AGENTS.iter().map(|a| a.to_string()).collect()
        } else {
            configured.to_vec()
        };
        Self { agents }
    }

    pub fn pick(&self) -> &str {
        self.agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DESKTOP_AGENTS[0])
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(String::as_str)
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_agents_are_desktop_browsers() {
        let pool = UserAgentPool::default();
        assert_eq!(pool.len(), DESKTOP_AGENTS.len());
        assert!(pool.iter().all(|a| a.starts_with("Mozilla/5.0") && !a.contains("Mobile")));
    }

    #[test]
    fn test_configured_agents_replace_builtin_set() {
        let configured = vec!["Agent/1.0".to_string(), "Agent/2.0".to_string()];
        let pool = UserAgentPool::new(&configured);

        assert_eq!(pool.len(), 2);
        for _ in 0..10 {
            let picked = pool.pick();
            assert!(configured.iter().any(|a| a == picked));
        }
    }
}
