// src/middlewares/router.rs

use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone)]
pub struct RateLimitRule {
    pub period: Duration,
    pub limit: u32,
}

// rate limit rules
pub fn get_rules() -> (HashMap<&'static str, RateLimitRule>, RateLimitRule) {
    let mut path_rules = HashMap::new();

    // The dashboard polls the listing aggressively while a tab is open.
    path_rules.insert(
        "/v1/servers",
        RateLimitRule {
            period: Duration::from_secs(2),
            limit: 10,
        },
    );

    // Deploys resolve downloads and create containers; keep them rare.
    path_rules.insert(
        "/v1/servers/deploy",
        RateLimitRule {
            period: Duration::from_secs(10),
            limit: 2,
        },
    );

    path_rules.insert(
        "/",
        RateLimitRule {
            period: Duration::from_secs(1),
            limit: 5,
        },
    );

    // --- Define the default rule for all other paths ---
    let default_rule = RateLimitRule {
        period: Duration::from_secs(1),
        limit: 8,
    };

    (path_rules, default_rule)
}
