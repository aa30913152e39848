//! Closed table of time-series metric fields and how each one aggregates.
//!
//! Callers pick a field by name; the aggregator is never caller-selectable.
//! Summing a mean or averaging a counter would silently change what a number
//! means, so unknown names are rejected instead of falling back.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::duration::DurationKey;
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregator {
    Sum,
    Mean,
    Count,
}

impl Aggregator {
    /// What the aggregate of zero points is. Means have no value.
    #[must_use]
    pub const fn empty_value(self) -> Option<f64> {
        match self {
            Aggregator::Sum | Aggregator::Count => Some(0.0),
            Aggregator::Mean => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    Score,
    Count,
    Followers,
    Sentiment,
    BotRating,
    AbstractDifference,
    Length,
    Questions,
    Exclamations,
    TimeScore,
    TypeScore,
    UserScore,
}

/// How one field is computed for one duration: which stored series to read
/// and which aggregate to apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAggregation {
    pub stored_field: &'static str,
    pub aggregator: Aggregator,
}

impl MetricField {
    pub const ALL: [MetricField; 12] = [
        MetricField::Score,
        MetricField::Count,
        MetricField::Followers,
        MetricField::Sentiment,
        MetricField::BotRating,
        MetricField::AbstractDifference,
        MetricField::Length,
        MetricField::Questions,
        MetricField::Exclamations,
        MetricField::TimeScore,
        MetricField::TypeScore,
        MetricField::UserScore,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricField::Score => "score",
            MetricField::Count => "count",
            MetricField::Followers => "followers",
            MetricField::Sentiment => "sentiment",
            MetricField::BotRating => "bot_rating",
            MetricField::AbstractDifference => "abstract_difference",
            MetricField::Length => "length",
            MetricField::Questions => "questions",
            MetricField::Exclamations => "exclamations",
            MetricField::TimeScore => "time_score",
            MetricField::TypeScore => "type_score",
            MetricField::UserScore => "user_score",
        }
    }

    /// Non-negative counters, the only fields a running total is defined for.
    ///
    /// `score` sums too, but individual points can be negative.
    #[must_use]
    pub const fn is_counter(self) -> bool {
        matches!(self, MetricField::Count | MetricField::Followers)
    }

    /// Resolve the stored series and aggregate for this field.
    ///
    /// `count` is the one field whose computation depends on the duration:
    /// the raw `currently` bucket holds one `score` point per discussion event,
    /// so its count is the number of points; rollup buckets store a
    /// precomputed `count` per point, which must be summed instead.
    #[must_use]
    pub const fn aggregation(self, duration: DurationKey) -> FieldAggregation {
        let (stored_field, aggregator) = match self {
            MetricField::Score => ("score", Aggregator::Sum),
            MetricField::Count => {
                if duration.is_raw() {
                    ("score", Aggregator::Count)
                } else {
                    ("count", Aggregator::Sum)
                }
            }
            MetricField::Followers => ("followers", Aggregator::Sum),
            MetricField::Sentiment => ("sentiment_raw", Aggregator::Mean),
            MetricField::BotRating => ("bot_rating", Aggregator::Mean),
            MetricField::AbstractDifference => ("abstract_difference", Aggregator::Mean),
            MetricField::Length => ("length", Aggregator::Mean),
            MetricField::Questions => ("questions", Aggregator::Mean),
            MetricField::Exclamations => ("exclamations", Aggregator::Mean),
            MetricField::TimeScore => ("time_score", Aggregator::Mean),
            MetricField::TypeScore => ("type_score", Aggregator::Mean),
            MetricField::UserScore => ("user_score", Aggregator::Mean),
        };
        FieldAggregation {
            stored_field,
            aggregator,
        }
    }

    /// Parse a comma-separated field list, rejecting the first unknown name.
    ///
    /// Blank entries are skipped and duplicates collapse to one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedField`] naming the first unknown field.
    pub fn parse_list(raw: &str) -> Result<Vec<MetricField>, CoreError> {
        let mut fields = Vec::new();
        for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let field = name.parse::<MetricField>()?;
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        Ok(fields)
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricField {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| CoreError::UnsupportedField(s.to_string()))
    }
}

/// Categorical fields recorded per discussion event in the label series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelField {
    Language,
    AuthorLocation,
    AuthorName,
}

impl LabelField {
    #[must_use]
    pub const fn stored_field(self) -> &'static str {
        match self {
            LabelField::Language => "lang",
            LabelField::AuthorLocation => "author_location",
            LabelField::AuthorName => "author_name",
        }
    }

    /// Placeholder labels the pipeline writes when a value is unknown.
    #[must_use]
    pub const fn ignored_labels(self) -> &'static [&'static str] {
        match self {
            LabelField::Language => &["und"],
            LabelField::AuthorLocation => &["unknown"],
            LabelField::AuthorName => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_round_trips_through_its_name() {
        for field in MetricField::ALL {
            assert_eq!(field.as_str().parse::<MetricField>().ok(), Some(field));
        }
    }

    #[test]
    fn unknown_field_is_reported_by_name() {
        let err = "retweets".parse::<MetricField>().unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedField(ref f) if f == "retweets"));
    }

    #[test]
    fn field_names_are_case_sensitive() {
        assert!("Score".parse::<MetricField>().is_err());
    }

    #[test]
    fn counters_sum_and_normalized_metrics_average() {
        let week = DurationKey::Week;
        assert_eq!(
            MetricField::Score.aggregation(week).aggregator,
            Aggregator::Sum
        );
        assert_eq!(
            MetricField::Followers.aggregation(week).aggregator,
            Aggregator::Sum
        );
        assert_eq!(
            MetricField::Sentiment.aggregation(week).aggregator,
            Aggregator::Mean
        );
        assert_eq!(
            MetricField::BotRating.aggregation(week).aggregator,
            Aggregator::Mean
        );
    }

    #[test]
    fn count_on_raw_bucket_counts_score_points() {
        let agg = MetricField::Count.aggregation(DurationKey::Currently);
        assert_eq!(agg.stored_field, "score");
        assert_eq!(agg.aggregator, Aggregator::Count);
    }

    #[test]
    fn count_on_rollup_buckets_sums_stored_counts() {
        for key in [
            DurationKey::Today,
            DurationKey::Week,
            DurationKey::Month,
            DurationKey::Year,
        ] {
            let agg = MetricField::Count.aggregation(key);
            assert_eq!(agg.stored_field, "count", "duration {key}");
            assert_eq!(agg.aggregator, Aggregator::Sum, "duration {key}");
        }
    }

    #[test]
    fn only_count_and_followers_are_counters() {
        let counters: Vec<MetricField> = MetricField::ALL
            .into_iter()
            .filter(|f| f.is_counter())
            .collect();
        assert_eq!(counters, vec![MetricField::Count, MetricField::Followers]);
    }

    #[test]
    fn counters_never_average() {
        for key in DurationKey::ALL {
            for field in [MetricField::Count, MetricField::Followers] {
                assert_ne!(field.aggregation(key).aggregator, Aggregator::Mean);
            }
        }
    }

    #[test]
    fn parse_list_dedupes_and_skips_blanks() {
        let fields = MetricField::parse_list("score, count,,score ").expect("valid list");
        assert_eq!(fields, vec![MetricField::Score, MetricField::Count]);
    }

    #[test]
    fn parse_list_names_first_bad_field() {
        let err = MetricField::parse_list("score,nope,also_nope").unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedField(ref f) if f == "nope"));
    }

    #[test]
    fn empty_values_follow_aggregator() {
        assert_eq!(Aggregator::Sum.empty_value(), Some(0.0));
        assert_eq!(Aggregator::Count.empty_value(), Some(0.0));
        assert_eq!(Aggregator::Mean.empty_value(), None);
    }
}
