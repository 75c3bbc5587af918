//! Dashboard statistics
//!
//! Statistics are optional enrichment: backend failures are logged and
//! degrade to zero or empty results.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::postgrest::PostgrestClient;
use crate::users::Role;

/// Time window of a statistics query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    All,
    Year,
    Month,
    Week,
}

/// Filters picked on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsFilters {
    pub period: Period,
    pub year: Option<i32>,
    /// 1 to 12
    pub month: Option<u32>,
}

fn first_day(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn last_day(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    first_day(next_year, next_month)?.pred_opt()
}

fn whole_year(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((first_day(year, 1)?, last_day(year, 12)?))
}

impl StatsFilters {
    pub fn new(period: Period) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    /// A single month of a given year is selected; temporal charts then go
    /// by day instead of by month
    pub fn is_monthly_view(&self) -> bool {
        self.period == Period::Month && self.year.is_some() && self.month.is_some()
    }

    pub fn granularity(&self) -> Granularity {
        if self.is_monthly_view() {
            Granularity::Day
        } else {
            Granularity::Month
        }
    }

    /// Inclusive date range covered by the filters, `None` for all time
    pub fn date_range(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        match (self.period, self.year, self.month) {
            (Period::All, Some(year), _) => whole_year(year),
            (Period::All, None, _) => None,
            (Period::Week, _, _) => Some((today - Duration::days(7), today)),
            (Period::Month, Some(year), Some(month)) => {
                Some((first_day(year, month)?, last_day(year, month)?))
            }
            (Period::Month, Some(year), None) => whole_year(year),
            (Period::Month, None, _) => Some((first_day(today.year(), today.month())?, today)),
            (Period::Year, Some(year), _) => whole_year(year),
            (Period::Year, None, _) => Some((first_day(today.year(), 1)?, today)),
        }
    }
}

/// Bucket size of the temporal charts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
}

/// One bucket of a temporal chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalPoint {
    pub period_label: String,
    #[serde(default)]
    pub count_value: i64,
}

#[derive(Debug, Serialize)]
struct TemporalParams {
    period_type: Granularity,
    filter_year: Option<i32>,
    filter_month: Option<u32>,
}

impl TemporalParams {
    fn from_filters(filters: &StatsFilters) -> Self {
        Self {
            period_type: filters.granularity(),
            filter_year: filters.year,
            filter_month: if filters.is_monthly_view() {
                filters.month
            } else {
                None
            },
        }
    }
}

/// A category and how many artists fall into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// An artist ranked by releases or musics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedArtist {
    pub name: String,
    pub count: i64,
}

/// Artist demographics and rankings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistStats {
    /// `SOLO`, `GROUP`, ...
    pub types: Vec<CategoryCount>,
    pub genders: Vec<CategoryCount>,
    pub statuses: Vec<CategoryCount>,
    pub top_by_releases: Vec<RankedArtist>,
    pub top_by_musics: Vec<RankedArtist>,
}

impl ArtistStats {
    /// Count for one artist type, zero when absent
    pub fn type_count(&self, kind: &str) -> i64 {
        self.types
            .iter()
            .find(|c| c.category == kind)
            .map_or(0, |c| c.count)
    }
}

#[derive(Debug, Deserialize)]
struct DemographicRow {
    stat_type: String,
    category: String,
    #[serde(default)]
    count_value: i64,
}

#[derive(Debug, Deserialize)]
struct TopArtistRow {
    artist_name: String,
    #[serde(default, alias = "release_count", alias = "music_count")]
    count: i64,
}

#[derive(Debug, Serialize)]
struct TopArtistParams {
    filter_year: Option<i32>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    limit_count: u32,
}

/// Number of artists in each ranking
const TOP_ARTISTS: u32 = 10;

/// Everything the dashboard shows for one set of filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub general: GeneralStats,
    pub artists: ArtistStats,
    pub releases_over_time: Vec<TemporalPoint>,
    pub musics_over_time: Vec<TemporalPoint>,
}

/// Totals shown on the dashboard overview
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralStats {
    #[serde(default)]
    pub total_artists: i64,
    #[serde(default)]
    pub total_releases: i64,
    #[serde(default)]
    pub total_musics: i64,
    #[serde(default)]
    pub total_companies: i64,
    #[serde(default)]
    pub active_artists: i64,
    #[serde(default)]
    pub inactive_artists: i64,
}

#[derive(Debug, Serialize)]
struct GeneralStatsParams {
    filter_year: Option<i32>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

/// Share of users holding one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRoleStats {
    pub role: Role,
    pub count: u64,
    /// Rounded to one decimal
    pub percentage: f64,
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    #[serde(default)]
    role: Option<Role>,
}

/// Client for the dashboard statistics
#[derive(Clone)]
pub struct StatisticsClient {
    users: PostgrestClient,
}

impl StatisticsClient {
    /// `users` points at the users table; RPCs go through the same endpoint
    pub fn new(users: PostgrestClient) -> Self {
        Self { users }
    }

    /// Overview totals for the filtered period, zero on failure
    pub async fn general_stats(&self, filters: &StatsFilters) -> GeneralStats {
        match self.fetch_general_stats(filters, Utc::now().date_naive()).await {
            Ok(stats) => stats,
            Err(err) => {
                warn!("general stats unavailable: {}", err);
                GeneralStats::default()
            }
        }
    }

    async fn fetch_general_stats(
        &self,
        filters: &StatsFilters,
        today: NaiveDate,
    ) -> Result<GeneralStats, Error> {
        let range = filters.date_range(today);
        let params = GeneralStatsParams {
            filter_year: filters.year,
            start_date: range.map(|(start, _)| start),
            end_date: range.map(|(_, end)| end),
        };

        let rows: Vec<GeneralStats> = self
            .users
            .rpc("get_general_stats", params)
            .execute()
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    /// Releases per bucket for the filtered period, empty on failure
    pub async fn releases_temporal_stats(&self, filters: &StatsFilters) -> Vec<TemporalPoint> {
        self.temporal("get_releases_temporal_stats", filters).await
    }

    /// Musics per bucket for the filtered period, empty on failure
    pub async fn musics_temporal_stats(&self, filters: &StatsFilters) -> Vec<TemporalPoint> {
        self.temporal("get_musics_temporal_stats_with_fallback", filters)
            .await
    }

    async fn temporal(&self, function: &str, filters: &StatsFilters) -> Vec<TemporalPoint> {
        let params = TemporalParams::from_filters(filters);
        match self.users.rpc(function, params).execute().await {
            Ok(points) => points,
            Err(err) => {
                warn!("{} unavailable: {}", function, err);
                Vec::new()
            }
        }
    }

    /// Artist demographics and top 10 rankings; failing parts stay empty
    pub async fn artist_stats(&self, filters: &StatsFilters) -> ArtistStats {
        let range = filters.date_range(Utc::now().date_naive());
        let ranking = |function: &'static str| {
            let params = TopArtistParams {
                filter_year: filters.year,
                start_date: range.map(|(start, _)| start),
                end_date: range.map(|(_, end)| end),
                limit_count: TOP_ARTISTS,
            };
            async move {
                match self.users.rpc(function, params).execute::<Vec<TopArtistRow>>().await {
                    Ok(rows) => rows
                        .into_iter()
                        .map(|row| RankedArtist {
                            name: row.artist_name,
                            count: row.count,
                        })
                        .collect(),
                    Err(err) => {
                        warn!("{} unavailable: {}", function, err);
                        Vec::new()
                    }
                }
            }
        };

        let (demographics, top_by_releases, top_by_musics) = tokio::join!(
            async {
                self.users
                    .rpc("get_artist_demographics", serde_json::json!({}))
                    .execute::<Vec<DemographicRow>>()
                    .await
            },
            ranking("get_top_artists_by_releases"),
            ranking("get_top_artists_by_musics"),
        );

        let mut stats = ArtistStats {
            top_by_releases,
            top_by_musics,
            ..Default::default()
        };
        match demographics {
            Ok(rows) => {
                for row in rows {
                    let entry = CategoryCount {
                        category: row.category,
                        count: row.count_value,
                    };
                    match row.stat_type.as_str() {
                        "type" => stats.types.push(entry),
                        "gender" => stats.genders.push(entry),
                        "status" => stats.statuses.push(entry),
                        other => debug!("ignoring demographic stat {}", other),
                    }
                }
            }
            Err(err) => warn!("artist demographics unavailable: {}", err),
        }
        stats
    }

    /// All dashboard figures, fetched concurrently
    pub async fn dashboard(&self, filters: &StatsFilters) -> DashboardStats {
        let (general, artists, releases_over_time, musics_over_time) = tokio::join!(
            self.general_stats(filters),
            self.artist_stats(filters),
            self.releases_temporal_stats(filters),
            self.musics_temporal_stats(filters),
        );
        DashboardStats {
            general,
            artists,
            releases_over_time,
            musics_over_time,
        }
    }

    /// Users per role, in `USER`, `CONTRIBUTOR`, `ADMIN` order; empty on failure
    pub async fn user_role_stats(&self) -> Vec<UserRoleStats> {
        match self.users.select("role").execute::<RoleRow>().await {
            Ok(rows) => role_breakdown(rows.iter().map(|row| row.role.unwrap_or_default())),
            Err(err) => {
                warn!("user role stats unavailable: {}", err);
                Vec::new()
            }
        }
    }
}

fn role_breakdown(roles: impl Iterator<Item = Role>) -> Vec<UserRoleStats> {
    let mut counts = [0u64; 3];
    for role in roles {
        if let Some(slot) = Role::ALL.iter().position(|r| *r == role) {
            counts[slot] += 1;
        }
    }

    let total: u64 = counts.iter().sum();
    Role::ALL
        .iter()
        .zip(counts)
        .map(|(role, count)| UserRoleStats {
            role: *role,
            count,
            percentage: if total == 0 {
                0.0
            } else {
                (count as f64 * 1000.0 / total as f64).round() / 10.0
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_ranges() {
        let today = date(2024, 3, 15);

        assert_eq!(StatsFilters::new(Period::All).date_range(today), None);
        assert_eq!(
            StatsFilters::new(Period::All).with_year(2022).date_range(today),
            Some((date(2022, 1, 1), date(2022, 12, 31)))
        );
        assert_eq!(
            StatsFilters::new(Period::Week).date_range(today),
            Some((date(2024, 3, 8), today))
        );
        assert_eq!(
            StatsFilters::new(Period::Month)
                .with_year(2024)
                .with_month(2)
                .date_range(today),
            Some((date(2024, 2, 1), date(2024, 2, 29)))
        );
        assert_eq!(
            StatsFilters::new(Period::Month)
                .with_year(2023)
                .with_month(12)
                .date_range(today),
            Some((date(2023, 12, 1), date(2023, 12, 31)))
        );
        assert_eq!(
            StatsFilters::new(Period::Month).with_year(2023).date_range(today),
            Some((date(2023, 1, 1), date(2023, 12, 31)))
        );
        assert_eq!(
            StatsFilters::new(Period::Month).date_range(today),
            Some((date(2024, 3, 1), today))
        );
        assert_eq!(
            StatsFilters::new(Period::Year).date_range(today),
            Some((date(2024, 1, 1), today))
        );
        assert_eq!(
            StatsFilters::new(Period::Month)
                .with_year(2024)
                .with_month(13)
                .date_range(today),
            None
        );
    }

    #[test]
    fn test_role_breakdown() {
        let stats = role_breakdown(
            [Role::User, Role::User, Role::Admin, Role::User, Role::Contributor, Role::User]
                .into_iter(),
        );
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].role, Role::User);
        assert_eq!(stats[0].count, 4);
        assert_eq!(stats[0].percentage, 66.7);
        assert_eq!(stats[2].role, Role::Admin);
        assert_eq!(stats[2].percentage, 16.7);

        let empty = role_breakdown(std::iter::empty());
        assert!(empty.iter().all(|s| s.count == 0 && s.percentage == 0.0));
    }

    #[tokio::test]
    async fn test_general_stats_rpc() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_general_stats"))
            .and(body_json(json!({
                "filter_year": 2023,
                "start_date": "2023-01-01",
                "end_date": "2023-12-31"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "total_artists": 120,
                "total_releases": 340,
                "total_musics": 2100,
                "total_companies": 18,
                "active_artists": 100,
                "inactive_artists": 20
            }])))
            .mount(&mock_server)
            .await;

        let client = StatisticsClient::new(PostgrestClient::new(
            &mock_server.uri(),
            "anon",
            "users",
            Client::new(),
        ));
        let stats = client
            .general_stats(&StatsFilters::new(Period::Year).with_year(2023))
            .await;

        assert_eq!(stats.total_artists, 120);
        assert_eq!(stats.inactive_artists, 20);
    }

    #[tokio::test]
    async fn test_failures_degrade() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_general_stats"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": "PGRST202",
                "message": "Could not find the function"
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("select", "role"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = StatisticsClient::new(PostgrestClient::new(
            &mock_server.uri(),
            "anon",
            "users",
            Client::new(),
        ));

        assert_eq!(
            client.general_stats(&StatsFilters::default()).await,
            GeneralStats::default()
        );
        assert!(client.user_role_stats().await.is_empty());
    }

    #[tokio::test]
    async fn test_user_role_stats() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("select", "role"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "role": "ADMIN" },
                { "role": "USER" },
                { "role": null },
                { "role": "CONTRIBUTOR" }
            ])))
            .mount(&mock_server)
            .await;

        let client = StatisticsClient::new(PostgrestClient::new(
            &mock_server.uri(),
            "anon",
            "users",
            Client::new(),
        ));
        let stats = client.user_role_stats().await;

        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].percentage, 50.0);
        assert_eq!(stats[1].count, 1);
        assert_eq!(stats[2].count, 1);
    }

    fn stats_client(uri: &str) -> StatisticsClient {
        StatisticsClient::new(PostgrestClient::new(uri, "anon", "users", Client::new()))
    }

    #[test]
    fn test_temporal_params() {
        let monthly = StatsFilters::new(Period::Month).with_year(2024).with_month(3);
        assert!(monthly.is_monthly_view());
        assert_eq!(
            serde_json::to_value(TemporalParams::from_filters(&monthly)).unwrap(),
            json!({ "period_type": "day", "filter_year": 2024, "filter_month": 3 })
        );

        // a month without a year is not a monthly view
        let loose = StatsFilters::new(Period::Month).with_month(3);
        assert_eq!(loose.granularity(), Granularity::Month);
        assert_eq!(
            serde_json::to_value(TemporalParams::from_filters(&loose)).unwrap(),
            json!({ "period_type": "month", "filter_year": null, "filter_month": null })
        );
    }

    #[tokio::test]
    async fn test_temporal_stats() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_releases_temporal_stats"))
            .and(body_json(json!({
                "period_type": "month",
                "filter_year": 2023,
                "filter_month": null
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "period_label": "2023-01", "count_value": 12 },
                { "period_label": "2023-02", "count_value": 7 }
            ])))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_musics_temporal_stats_with_fallback"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = stats_client(&mock_server.uri());
        let filters = StatsFilters::new(Period::Year).with_year(2023);

        let releases = client.releases_temporal_stats(&filters).await;
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].period_label, "2023-01");
        assert_eq!(releases[1].count_value, 7);

        assert!(client.musics_temporal_stats(&filters).await.is_empty());
    }

    #[tokio::test]
    async fn test_artist_stats() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_artist_demographics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "stat_type": "type", "category": "SOLO", "count_value": 40 },
                { "stat_type": "type", "category": "GROUP", "count_value": 80 },
                { "stat_type": "gender", "category": "FEMALE", "count_value": 70 },
                { "stat_type": "status", "category": "ACTIVE", "count_value": 100 },
                { "stat_type": "debut", "category": "2010s", "count_value": 3 }
            ])))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_top_artists_by_releases"))
            .and(body_json(json!({
                "filter_year": null,
                "start_date": null,
                "end_date": null,
                "limit_count": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "artist_name": "TWICE", "release_count": 31 }
            ])))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_top_artists_by_musics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "artist_name": "BTS", "music_count": 250 }
            ])))
            .mount(&mock_server)
            .await;

        let stats = stats_client(&mock_server.uri())
            .artist_stats(&StatsFilters::default())
            .await;

        assert_eq!(stats.type_count("GROUP"), 80);
        assert_eq!(stats.type_count("UNKNOWN"), 0);
        assert_eq!(stats.genders.len(), 1);
        assert_eq!(stats.statuses[0].count, 100);
        assert_eq!(stats.top_by_releases[0].name, "TWICE");
        assert_eq!(stats.top_by_releases[0].count, 31);
        assert_eq!(stats.top_by_musics[0].count, 250);
    }

    #[tokio::test]
    async fn test_dashboard_degrades_per_part() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_general_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "total_artists": 5 }
            ])))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_releases_temporal_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "period_label": "2024-03-01", "count_value": 1 }
            ])))
            .mount(&mock_server)
            .await;

        let filters = StatsFilters::new(Period::Month).with_year(2024).with_month(3);
        let dashboard = stats_client(&mock_server.uri()).dashboard(&filters).await;

        assert_eq!(dashboard.general.total_artists, 5);
        assert_eq!(dashboard.general.total_musics, 0);
        assert_eq!(dashboard.releases_over_time.len(), 1);
        assert!(dashboard.musics_over_time.is_empty());
        assert_eq!(dashboard.artists, ArtistStats::default());
    }
}
