//! Live integration tests for pubtrend-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/pubtrend-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory. Both stores share that one database here.

use chrono::{DateTime, TimeDelta, Utc};
use pubtrend_core::{CoreError, DurationKey, LabelField, MetricField, Scope, TimeRange};
use pubtrend_db::{
    aggregate_value, aggregate_values, distinct_label_count, get_author, get_field_of_study,
    get_publication, list_trending_authors, list_trending_publications, population_series,
    profile_comparison, resolve_scope, top_facet_values, top_labels, top_n, top_n_by_count,
    top_values, values_by_entity, windowed_series, DbError, DiscussionFacet, EntityScope,
    ListQuery, Stores, TopSelection, TopValuesRequest, TrendingScope, WindowMode,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn insert_publication(pool: &sqlx::PgPool, doi: &str) {
    sqlx::query("INSERT INTO publication (doi, title, year) VALUES ($1, $2, 2024)")
        .bind(doi)
        .bind(format!("Publication {doi}"))
        .execute(pool)
        .await
        .unwrap_or_else(|e| panic!("insert_publication failed for '{doi}': {e}"));
}

async fn insert_trending(pool: &sqlx::PgPool, doi: &str, duration: &str, score: f64) {
    sqlx::query(
        "INSERT INTO trending (publication_doi, duration, score, count, sum_followers, mean_sentiment) \
         VALUES ($1, $2, $3, 1, 100, 0.5)",
    )
    .bind(doi)
    .bind(duration)
    .bind(score)
    .execute(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_trending failed for '{doi}'/{duration}: {e}"));
}

async fn insert_author(pool: &sqlx::PgPool, id: i64, name: &str, dois: &[&str]) {
    sqlx::query("INSERT INTO author (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .expect("insert author");
    for doi in dois {
        sqlx::query("INSERT INTO publication_author (publication_doi, author_id) VALUES ($1, $2)")
            .bind(doi)
            .bind(id)
            .execute(pool)
            .await
            .expect("link author");
    }
}

async fn insert_point(
    pool: &sqlx::PgPool,
    time: DateTime<Utc>,
    bucket: &str,
    doi: &str,
    field: &str,
    value: f64,
) {
    sqlx::query(
        "INSERT INTO discussion_metrics (time, bucket, doi, field, value) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(time)
    .bind(bucket)
    .bind(doi)
    .bind(field)
    .bind(value)
    .execute(pool)
    .await
    .expect("insert point");
}

async fn insert_label(pool: &sqlx::PgPool, time: DateTime<Utc>, doi: &str, field: &str, label: &str) {
    sqlx::query("INSERT INTO discussion_labels (time, doi, field, label) VALUES ($1, $2, $3, $4)")
        .bind(time)
        .bind(doi)
        .bind(field)
        .bind(label)
        .execute(pool)
        .await
        .expect("insert label");
}

fn range(key: DurationKey) -> TimeRange {
    key.definition().ending_at(Utc::now())
}

fn page(limit: i64, offset: i64) -> ListQuery {
    ListQuery::new(limit, offset).expect("valid page")
}

// ---------------------------------------------------------------------------
// Relational trending
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn trending_listing_limits_and_orders_by_score(pool: sqlx::PgPool) {
    for i in 0..10 {
        let doi = format!("10.1/{i:02}");
        insert_publication(&pool, &doi).await;
        insert_trending(&pool, &doi, "currently", f64::from((i * 7) % 10)).await;
    }

    let query = page(5, 0).with_sort(Some("score".to_string()), Some("desc".to_string()));
    let rows =
        list_trending_publications(&pool, TrendingScope::All, DurationKey::Currently, &query)
            .await
            .expect("list trending");

    assert_eq!(rows.len(), 5);
    assert!(rows
        .windows(2)
        .all(|w| w[0].metrics.score >= w[1].metrics.score));
    assert!(rows.iter().all(|r| r.total_count == 10));
}

#[sqlx::test(migrations = "../../migrations")]
async fn trending_listing_past_the_end_is_empty(pool: sqlx::PgPool) {
    insert_publication(&pool, "10.1/a").await;
    insert_trending(&pool, "10.1/a", "week", 1.0).await;

    let rows = list_trending_publications(&pool, TrendingScope::All, DurationKey::Week, &page(10, 50))
        .await
        .expect("list trending");

    assert!(rows.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn top_n_breaks_score_ties_by_doi(pool: sqlx::PgPool) {
    for (doi, score) in [("10.1/b", 5.0), ("10.1/a", 5.0), ("10.1/c", 3.0)] {
        insert_publication(&pool, doi).await;
        insert_trending(&pool, doi, "today", score).await;
    }

    let rows = top_n(&pool, DurationKey::Today, 10, None)
        .await
        .expect("top_n");
    let dois: Vec<&str> = rows.iter().map(|r| r.publication_doi.as_str()).collect();

    assert_eq!(dois, vec!["10.1/a", "10.1/b", "10.1/c"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn top_n_cuts_off_at_n_keeping_highest_scores(pool: sqlx::PgPool) {
    for (doi, score) in [
        ("10.1/d", 1.0),
        ("10.1/c", 4.0),
        ("10.1/b", 4.0),
        ("10.1/a", 9.0),
    ] {
        insert_publication(&pool, doi).await;
        insert_trending(&pool, doi, "week", score).await;
    }

    let rows = top_n(&pool, DurationKey::Week, 2, None)
        .await
        .expect("top_n");
    let dois: Vec<&str> = rows.iter().map(|r| r.publication_doi.as_str()).collect();

    assert_eq!(dois, vec!["10.1/a", "10.1/b"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn top_n_rejects_non_positive_n(pool: sqlx::PgPool) {
    let err = top_n(&pool, DurationKey::Today, 0, None).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::Invalid(CoreError::InvalidParameter { name: "n", .. })
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn publication_detail_reports_rank_for_duration(pool: sqlx::PgPool) {
    for (doi, score) in [("10.1/a", 1.0), ("10.1/b", 9.0)] {
        insert_publication(&pool, doi).await;
        insert_trending(&pool, doi, "month", score).await;
    }
    insert_author(&pool, 7, "Ada", &["10.1/a"]).await;

    let detail = get_publication(&pool, "10.1/a", DurationKey::Month)
        .await
        .expect("get publication");
    assert_eq!(detail.trending_ranking, Some(2));
    assert_eq!(detail.authors.len(), 1);
    assert_eq!(detail.authors[0].name, "Ada");

    let unranked = get_publication(&pool, "10.1/a", DurationKey::Year)
        .await
        .expect("get publication");
    assert_eq!(unranked.trending_ranking, None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn missing_entities_are_not_found(pool: sqlx::PgPool) {
    let publication = get_publication(&pool, "10.1/missing", DurationKey::Today).await;
    let author = get_author(&pool, 999).await;
    let fos = get_field_of_study(&pool, 999, true).await;

    assert!(matches!(
        publication,
        Err(DbError::EntityNotFound { kind: "publication", .. })
    ));
    assert!(matches!(author, Err(DbError::EntityNotFound { kind: "author", .. })));
    assert!(matches!(fos, Err(DbError::EntityNotFound { .. })));
}

#[sqlx::test(migrations = "../../migrations")]
async fn trending_authors_sum_publication_scores(pool: sqlx::PgPool) {
    for (doi, score) in [("10.1/a", 2.0), ("10.1/b", 3.0), ("10.1/c", 4.0)] {
        insert_publication(&pool, doi).await;
        insert_trending(&pool, doi, "week", score).await;
    }
    insert_author(&pool, 1, "Ada", &["10.1/a", "10.1/b"]).await;
    insert_author(&pool, 2, "Grace", &["10.1/c"]).await;

    let query = page(10, 0).with_sort(Some("score".to_string()), Some("desc".to_string()));
    let rows = list_trending_authors(&pool, DurationKey::Week, &query)
        .await
        .expect("trending authors");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].name, "Ada");
    assert!((rows[0].score - 5.0).abs() < f64::EPSILON);
    assert_eq!(rows[0].pub_count, 2);
    assert_eq!(rows[0].trending_ranking, 1);
}

// ---------------------------------------------------------------------------
// Scope resolution
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn author_scope_keeps_publications_with_a_record(pool: sqlx::PgPool) {
    for doi in ["10.1/a", "10.1/b", "10.1/c"] {
        insert_publication(&pool, doi).await;
    }
    insert_trending(&pool, "10.1/a", "week", 1.0).await;
    insert_trending(&pool, "10.1/c", "week", 1.0).await;
    insert_trending(&pool, "10.1/b", "today", 1.0).await;
    insert_author(&pool, 42, "Ada", &["10.1/a", "10.1/b", "10.1/c"]).await;

    let scope = resolve_scope(&pool, &Scope::Author(42), DurationKey::Week)
        .await
        .expect("resolve scope");

    assert_eq!(
        scope,
        EntityScope::Keys(vec!["10.1/a".to_string(), "10.1/c".to_string()])
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_author_scope_is_empty(pool: sqlx::PgPool) {
    let scope = resolve_scope(&pool, &Scope::Author(404), DurationKey::Week)
        .await
        .expect("resolve scope");

    assert!(scope.is_empty());
}

// ---------------------------------------------------------------------------
// Time series
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn followers_sum_over_today(pool: sqlx::PgPool) {
    let r = range(DurationKey::Today);
    for (i, followers) in [10.0, 20.0, 30.0].into_iter().enumerate() {
        let at = r.start + TimeDelta::hours(i64::try_from(i).expect("small") + 1);
        insert_point(&pool, at, "today", "10.1/a", "followers", followers).await;
    }
    // Outside the range and in another bucket; both ignored.
    insert_point(&pool, r.start - TimeDelta::hours(1), "today", "10.1/a", "followers", 99.0).await;
    insert_point(&pool, r.start + TimeDelta::hours(1), "week", "10.1/a", "followers", 99.0).await;

    let total = aggregate_value(&pool, None, &r, MetricField::Followers)
        .await
        .expect("aggregate");

    assert_eq!(total, Some(60.0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn count_on_currently_counts_raw_points(pool: sqlx::PgPool) {
    let r = range(DurationKey::Currently);
    for minutes in [5, 10, 15] {
        insert_point(&pool, r.start + TimeDelta::minutes(minutes), "trending", "10.1/a", "score", 2.5).await;
    }

    let count = aggregate_value(&pool, None, &r, MetricField::Count)
        .await
        .expect("aggregate");

    assert_eq!(count, Some(3.0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn count_on_rollups_sums_stored_counts(pool: sqlx::PgPool) {
    let r = range(DurationKey::Week);
    insert_point(&pool, r.start + TimeDelta::hours(3), "week", "10.1/a", "count", 4.0).await;
    insert_point(&pool, r.start + TimeDelta::hours(30), "week", "10.1/a", "count", 5.0).await;

    let count = aggregate_value(&pool, None, &r, MetricField::Count)
        .await
        .expect("aggregate");

    assert_eq!(count, Some(9.0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_key_set_short_circuits_to_empty_values(pool: sqlx::PgPool) {
    let r = range(DurationKey::Month);
    let keys: Vec<String> = Vec::new();

    let values = aggregate_values(
        &pool,
        Some(&keys),
        &r,
        &[MetricField::Score, MetricField::Sentiment],
    )
    .await
    .expect("aggregate");

    assert_eq!(values["score"], Some(0.0));
    assert_eq!(values["sentiment"], None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn standard_series_omits_empty_windows(pool: sqlx::PgPool) {
    let r = range(DurationKey::Currently);
    insert_point(&pool, r.start + TimeDelta::minutes(1), "trending", "10.1/a", "score", 1.0).await;
    insert_point(&pool, r.start + TimeDelta::minutes(2), "trending", "10.1/a", "score", 2.0).await;
    insert_point(&pool, r.start + TimeDelta::minutes(61), "trending", "10.1/a", "score", 4.0).await;

    let keys = vec!["10.1/a".to_string(), "10.1/none".to_string()];
    let series = windowed_series(&pool, &keys, &r, MetricField::Score, WindowMode::Standard)
        .await
        .expect("series");

    assert_eq!(series.len(), 2);
    assert_eq!(series[0].doi.as_deref(), Some("10.1/a"));
    let values: Vec<f64> = series[0].points.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![3.0, 4.0]);
    assert_eq!(series[0].points[0].time, r.start);
    assert!(series[1].points.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn repeated_key_gets_the_same_series_each_time(pool: sqlx::PgPool) {
    let r = range(DurationKey::Currently);
    insert_point(&pool, r.start + TimeDelta::minutes(1), "trending", "10.1/a", "score", 2.0).await;

    let keys = vec!["10.1/a".to_string(), "10.1/a".to_string()];
    let series = windowed_series(&pool, &keys, &r, MetricField::Score, WindowMode::Standard)
        .await
        .expect("series");

    assert_eq!(series.len(), 2);
    assert_eq!(series[0], series[1]);
    assert_eq!(series[1].points.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn cumulative_series_zero_fills_and_accumulates(pool: sqlx::PgPool) {
    let r = range(DurationKey::Currently);
    insert_point(&pool, r.start + TimeDelta::minutes(1), "trending", "10.1/a", "followers", 2.0).await;
    insert_point(&pool, r.start + TimeDelta::minutes(13), "trending", "10.1/a", "followers", 3.0).await;

    let series = population_series(&pool, &r, MetricField::Followers, WindowMode::Cumulative)
        .await
        .expect("series");

    assert_eq!(series.points.len(), 60);
    assert_eq!(series.points[0].value, 2.0);
    assert_eq!(series.points[1].value, 2.0);
    assert_eq!(series.points[2].value, 5.0);
    assert_eq!(series.points[59].value, 5.0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn cumulative_mean_field_is_rejected(pool: sqlx::PgPool) {
    let r = range(DurationKey::Today);
    let err = population_series(&pool, &r, MetricField::Sentiment, WindowMode::Cumulative)
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Invalid(CoreError::NonCumulativeField(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn cumulative_score_with_negative_points_is_rejected(pool: sqlx::PgPool) {
    let r = range(DurationKey::Week);
    insert_point(&pool, r.start + TimeDelta::hours(1), "week", "10.1/a", "score", 1.0).await;
    insert_point(&pool, r.start + TimeDelta::hours(5), "week", "10.1/a", "score", -5.0).await;

    let keys = vec!["10.1/a".to_string()];
    let err = windowed_series(&pool, &keys, &r, MetricField::Score, WindowMode::Cumulative)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Invalid(CoreError::NonCumulativeField(ref f)) if f == "score"
    ));

    let standard = windowed_series(&pool, &keys, &r, MetricField::Score, WindowMode::Standard)
        .await
        .expect("standard series");
    let values: Vec<f64> = standard[0].points.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![1.0, -5.0]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn top_n_by_count_ranks_raw_events(pool: sqlx::PgPool) {
    let r = range(DurationKey::Currently);
    for (doi, events) in [("10.1/a", 1), ("10.1/b", 3), ("10.1/c", 3)] {
        for i in 0..events {
            insert_point(&pool, r.start + TimeDelta::minutes(10 + i), "trending", doi, "score", 1.0).await;
        }
    }

    let rows = top_n_by_count(&pool, &r, 2).await.expect("top by count");
    let dois: Vec<&str> = rows.iter().map(|r| r.publication_doi.as_str()).collect();

    assert_eq!(dois, vec!["10.1/b", "10.1/c"]);
    assert_eq!(rows[0].value, Some(3.0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn values_by_entity_fills_missing_keys(pool: sqlx::PgPool) {
    let r = range(DurationKey::Month);
    insert_point(&pool, r.start + TimeDelta::days(1), "month", "10.1/a", "score", 7.0).await;

    let keys = vec!["10.1/a".to_string(), "10.1/b".to_string()];
    let values = values_by_entity(&pool, &keys, &r, MetricField::Score)
        .await
        .expect("values");

    assert_eq!(values["10.1/a"], Some(7.0));
    assert_eq!(values["10.1/b"], Some(0.0));
}

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn top_values_falls_back_to_event_counts(pool: sqlx::PgPool) {
    let r = range(DurationKey::Currently);
    insert_point(&pool, r.start + TimeDelta::minutes(3), "trending", "10.1/a", "score", 1.5).await;
    insert_point(&pool, r.start + TimeDelta::minutes(4), "trending", "10.1/a", "followers", 40.0).await;

    let stores = Stores::shared(pool);
    let request = TopValuesRequest {
        range: r,
        fields: vec![MetricField::Followers],
        n: 5,
        dois: None,
    };
    let result = top_values(&stores, &request).await.expect("top values");

    assert_eq!(result.selection, TopSelection::EventCount);
    assert_eq!(result.dois, vec!["10.1/a".to_string()]);
    assert_eq!(result.values["followers"]["10.1/a"], Some(40.0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn top_values_prefers_trending_records(pool: sqlx::PgPool) {
    insert_publication(&pool, "10.1/a").await;
    insert_trending(&pool, "10.1/a", "today", 1.0).await;

    let stores = Stores::shared(pool);
    let request = TopValuesRequest {
        range: range(DurationKey::Today),
        fields: vec![MetricField::Score, MetricField::BotRating],
        n: 5,
        dois: None,
    };
    let result = top_values(&stores, &request).await.expect("top values");

    assert_eq!(result.selection, TopSelection::Trending);
    assert_eq!(result.values["score"]["10.1/a"], Some(0.0));
    assert_eq!(result.values["bot_rating"]["10.1/a"], None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn profile_comparison_places_entity_in_population(pool: sqlx::PgPool) {
    for (doi, score) in [("10.1/a", 1.0), ("10.1/b", 3.0)] {
        insert_publication(&pool, doi).await;
        insert_trending(&pool, doi, "year", score).await;
    }

    let comparison = profile_comparison(&pool, "10.1/a", DurationKey::Year)
        .await
        .expect("profile");
    let score = &comparison.metrics["score"];

    assert_eq!(score.value, Some(1.0));
    assert_eq!(score.min, Some(1.0));
    assert_eq!(score.max, Some(3.0));
    assert_eq!(score.avg, Some(2.0));

    let missing = profile_comparison(&pool, "10.1/none", DurationKey::Year).await;
    assert!(matches!(missing, Err(DbError::EntityNotFound { .. })));
}

// ---------------------------------------------------------------------------
// Discussion statistics
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn top_languages_exclude_undetermined(pool: sqlx::PgPool) {
    let r = range(DurationKey::Week);
    let at = r.start + TimeDelta::hours(1);
    for label in ["en", "en", "de", "und", "und", "und"] {
        insert_label(&pool, at, "10.1/a", "lang", label).await;
    }

    let rows = top_labels(&pool, LabelField::Language, None, &r, 10)
        .await
        .expect("labels");
    let distinct = distinct_label_count(&pool, LabelField::Language, Some("10.1/a"), &r)
        .await
        .expect("distinct");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].value, "en");
    assert_eq!(rows[0].count, 2);
    assert_eq!(distinct, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn top_words_sum_counts_across_publications(pool: sqlx::PgPool) {
    for doi in ["10.1/a", "10.1/b"] {
        insert_publication(&pool, doi).await;
    }
    sqlx::query("INSERT INTO discussion_word (id, word) VALUES (1, 'protein'), (2, 'cell')")
        .execute(&pool)
        .await
        .expect("insert words");
    sqlx::query(
        "INSERT INTO discussion_word_data (publication_doi, discussion_word_id, count) \
         VALUES ('10.1/a', 1, 3), ('10.1/b', 1, 2), ('10.1/b', 2, 4)",
    )
    .execute(&pool)
    .await
    .expect("insert word data");

    let all = top_facet_values(&pool, DiscussionFacet::Word, None, 10)
        .await
        .expect("words");
    let one = top_facet_values(&pool, DiscussionFacet::Word, Some("10.1/a"), 10)
        .await
        .expect("words");

    assert_eq!(all[0].value, "protein");
    assert_eq!(all[0].count, 5);
    assert_eq!(one.len(), 1);
}
