//! Typed wrappers over [`ApiClient::dispatch`] for the known ZwiftPower
//! endpoints, each with a cache lifetime matched to how often the data
//! changes upstream.

use std::time::Duration;

use tracing::info;

use crate::api::{run_batch, ApiClient, RequestOptions, RequestOutcome};
use crate::cache::{params, Params};

/// JSON API
pub const API_ENDPOINT: &str = "api3.php";

/// Pre-rendered per-rider data
pub const CACHE_ENDPOINT: &str = "cache3.php";

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

pub const PROFILE_TTL_SECS: u64 = DAY;
pub const SEARCH_TTL_SECS: u64 = HOUR;
pub const ACHIEVEMENTS_TTL_SECS: u64 = DAY;
pub const POWER_PROFILE_TTL_SECS: u64 = HOUR;
pub const POWER_ANALYSIS_TTL_SECS: u64 = 2 * HOUR;
pub const RACE_POWER_TTL_SECS: u64 = DAY;
pub const FTP_HISTORY_TTL_SECS: u64 = 12 * HOUR;
pub const LEAGUE_TTL_SECS: u64 = 30 * MINUTE;
pub const TEAM_RANKINGS_TTL_SECS: u64 = 2 * HOUR;
pub const RACE_RESULTS_TTL_SECS: u64 = DAY;
pub const UPCOMING_RACES_TTL_SECS: u64 = 15 * MINUTE;
pub const RIDER_RANKINGS_TTL_SECS: u64 = 2 * HOUR;
pub const CATEGORY_RANKINGS_TTL_SECS: u64 = 4 * HOUR;
pub const SERIES_STANDINGS_TTL_SECS: u64 = 2 * HOUR;
pub const LEAGUE_SEARCH_TTL_SECS: u64 = HOUR;
pub const TOP_PERFORMERS_TTL_SECS: u64 = 4 * HOUR;
pub const COMPETITIVE_ANALYSIS_TTL_SECS: u64 = 6 * HOUR;

/// Default pause between items of a batch, in seconds
pub const DEFAULT_BATCH_DELAY_SECS: u64 = 1;

/// cache3.php data kinds change at different rates
pub fn cached_kind_ttl_secs(kind: &str) -> u64 {
    match kind {
        "profile" | "ftp" | "weight" => DAY,
        _ => HOUR,
    }
}

fn with_optional(mut params: Params, key: &str, value: Option<&str>) -> Params {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        params.insert(key.to_string(), value.to_string());
    }
    params
}

/// Rider profiles, search and achievements
pub struct ProfileApi<'a> {
    client: &'a ApiClient,
    use_cache: bool,
}

impl<'a> ProfileApi<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            use_cache: true,
        }
    }

    /// Skip cached responses; fresh results are still written back
    pub fn bypass_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    fn options(&self, ttl_secs: u64) -> RequestOptions {
        RequestOptions::with_ttl_secs(ttl_secs).use_cache(self.use_cache)
    }

    pub async fn rider_profile(&self, zwid: &str) -> RequestOutcome {
        let params = params([("do", "profile_search"), ("type", "rider"), ("zwid", zwid)]);
        self.client
            .get(API_ENDPOINT, &params, self.options(PROFILE_TTL_SECS))
            .await
    }

    pub async fn search_riders(
        &self,
        name: Option<&str>,
        team: Option<&str>,
        category: Option<&str>,
    ) -> RequestOutcome {
        let params = params([("do", "profile_search"), ("type", "rider")]);
        let params = with_optional(params, "name", name);
        let params = with_optional(params, "team", team);
        let params = with_optional(params, "category", category);
        self.client
            .get(API_ENDPOINT, &params, self.options(SEARCH_TTL_SECS))
            .await
    }

    pub async fn rider_achievements(&self, zwid: &str) -> RequestOutcome {
        let params = params([("do", "achievements"), ("zwid", zwid)]);
        self.client
            .get(API_ENDPOINT, &params, self.options(ACHIEVEMENTS_TTL_SECS))
            .await
    }

    /// One kind of pre-rendered rider data: `profile`, `power`, `ftp`,
    /// `weight`, `recent_races`...
    pub async fn cached_profile_data(&self, zwid: &str, kind: &str) -> RequestOutcome {
        let params = params([("do", kind), ("z", zwid)]);
        self.client
            .get(CACHE_ENDPOINT, &params, self.options(cached_kind_ttl_secs(kind)))
            .await
    }

    pub async fn recent_races(&self, zwid: &str) -> RequestOutcome {
        self.cached_profile_data(zwid, "recent_races").await
    }

    /// Profiles for several riders, fetched one after another
    pub async fn batch_rider_profiles(
        &self,
        zwids: &[&str],
        delay: Duration,
    ) -> Vec<(String, RequestOutcome)> {
        let total = zwids.len();
        run_batch(zwids.iter().enumerate(), delay, |(i, zwid)| async move {
            info!(item = i + 1, total, "Fetching rider profile");
            (zwid.to_string(), self.rider_profile(zwid).await)
        })
        .await
    }
}

/// Power curves, analysis and FTP history
pub struct PowerApi<'a> {
    client: &'a ApiClient,
    use_cache: bool,
}

impl<'a> PowerApi<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            use_cache: true,
        }
    }

    pub fn bypass_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    fn options(&self, ttl_secs: u64) -> RequestOptions {
        RequestOptions::with_ttl_secs(ttl_secs).use_cache(self.use_cache)
    }

    pub async fn power_profile(&self, zwid: &str) -> RequestOutcome {
        let params = params([("do", "power"), ("z", zwid)]);
        self.client
            .get(CACHE_ENDPOINT, &params, self.options(POWER_PROFILE_TTL_SECS))
            .await
    }

    pub async fn power_analysis(&self, zwid: &str) -> RequestOutcome {
        let params = params([("do", "power_analysis"), ("zwid", zwid)]);
        self.client
            .get(API_ENDPOINT, &params, self.options(POWER_ANALYSIS_TTL_SECS))
            .await
    }

    /// Power data for one race, or every recent race when `race_id` is None
    pub async fn race_power(&self, zwid: &str, race_id: Option<&str>) -> RequestOutcome {
        let params = with_optional(
            params([("do", "race_power"), ("zwid", zwid)]),
            "race_id",
            race_id,
        );
        self.client
            .get(API_ENDPOINT, &params, self.options(RACE_POWER_TTL_SECS))
            .await
    }

    pub async fn ftp_history(&self, zwid: &str) -> RequestOutcome {
        let params = params([("do", "ftp"), ("z", zwid)]);
        self.client
            .get(CACHE_ENDPOINT, &params, self.options(FTP_HISTORY_TTL_SECS))
            .await
    }

    pub async fn batch_power_profiles(
        &self,
        zwids: &[&str],
        delay: Duration,
    ) -> Vec<(String, RequestOutcome)> {
        let total = zwids.len();
        run_batch(zwids.iter().enumerate(), delay, |(i, zwid)| async move {
            info!(item = i + 1, total, "Fetching power profile");
            (zwid.to_string(), self.power_profile(zwid).await)
        })
        .await
    }
}

/// League tables, team lists, race results and rider rankings
pub struct RankingsApi<'a> {
    client: &'a ApiClient,
    use_cache: bool,
}

impl<'a> RankingsApi<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            use_cache: true,
        }
    }

    pub fn bypass_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    fn options(&self, ttl_secs: u64) -> RequestOptions {
        RequestOptions::with_ttl_secs(ttl_secs).use_cache(self.use_cache)
    }

    pub async fn league_standings(&self, league_id: &str) -> RequestOutcome {
        let params = params([("do", "league_view"), ("id", league_id)]);
        self.client
            .get(API_ENDPOINT, &params, self.options(LEAGUE_TTL_SECS))
            .await
    }

    pub async fn team_rankings(&self, team_id: Option<&str>) -> RequestOutcome {
        let params = with_optional(params([("do", "team_list")]), "id", team_id);
        self.client
            .get(API_ENDPOINT, &params, self.options(TEAM_RANKINGS_TTL_SECS))
            .await
    }

    pub async fn race_results(&self, race_id: &str) -> RequestOutcome {
        let params = params([("do", "race_results"), ("id", race_id)]);
        self.client
            .get(API_ENDPOINT, &params, self.options(RACE_RESULTS_TTL_SECS))
            .await
    }

    pub async fn upcoming_races(
        &self,
        category: Option<&str>,
        series: Option<&str>,
    ) -> RequestOutcome {
        let params = params([("do", "upcoming_races")]);
        let params = with_optional(params, "cat", category);
        let params = with_optional(params, "series", series);
        self.client
            .get(API_ENDPOINT, &params, self.options(UPCOMING_RACES_TTL_SECS))
            .await
    }

    /// `ranking_type` is `overall`, `category` or `power`
    pub async fn rider_rankings(&self, zwid: &str, ranking_type: &str) -> RequestOutcome {
        let params = params([
            ("do", "rider_rankings"),
            ("zwid", zwid),
            ("type", ranking_type),
        ]);
        self.client
            .get(API_ENDPOINT, &params, self.options(RIDER_RANKINGS_TTL_SECS))
            .await
    }

    /// Riders ranked within category `A` to `D`, optionally by gender (`M`, `F`)
    pub async fn category_rankings(
        &self,
        category: &str,
        gender: Option<&str>,
        limit: u32,
    ) -> RequestOutcome {
        let limit = limit.to_string();
        let params = params([
            ("do", "category_rankings"),
            ("cat", category),
            ("limit", limit.as_str()),
        ]);
        let params = with_optional(params, "gender", gender);
        self.client
            .get(API_ENDPOINT, &params, self.options(CATEGORY_RANKINGS_TTL_SECS))
            .await
    }

    pub async fn series_standings(&self, series_id: &str) -> RequestOutcome {
        let params = params([("do", "series_standings"), ("id", series_id)]);
        self.client
            .get(API_ENDPOINT, &params, self.options(SERIES_STANDINGS_TTL_SECS))
            .await
    }

    /// League search by name; `status` is usually `active`
    pub async fn search_leagues(&self, name: Option<&str>, status: &str) -> RequestOutcome {
        let params = params([("do", "league_search"), ("status", status)]);
        let params = with_optional(params, "name", name);
        self.client
            .get(API_ENDPOINT, &params, self.options(LEAGUE_SEARCH_TTL_SECS))
            .await
    }

    /// `metric` is `power`, `speed` or `ftp`; `timeframe` is `week`, `month` or `year`
    pub async fn top_performers(
        &self,
        metric: &str,
        category: Option<&str>,
        timeframe: &str,
        limit: u32,
    ) -> RequestOutcome {
        let limit = limit.to_string();
        let params = params([
            ("do", "top_performers"),
            ("metric", metric),
            ("timeframe", timeframe),
            ("limit", limit.as_str()),
        ]);
        let params = with_optional(params, "cat", category);
        self.client
            .get(API_ENDPOINT, &params, self.options(TOP_PERFORMERS_TTL_SECS))
            .await
    }

    /// Compares one rider against others; an empty `rivals` list sends no `compare`
    pub async fn competitive_analysis(&self, zwid: &str, rivals: &[&str]) -> RequestOutcome {
        let compare = rivals.join(",");
        let params = params([("do", "competitive_analysis"), ("zwid", zwid)]);
        let params = with_optional(params, "compare", Some(compare.as_str()));
        self.client
            .get(API_ENDPOINT, &params, self.options(COMPETITIVE_ANALYSIS_TTL_SECS))
            .await
    }
}
