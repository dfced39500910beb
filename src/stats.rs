use std::collections::HashMap;

use chrono::{DateTime, Duration, Months, Utc};
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::model::{round_elapsed, EndpointStat, StatusCount};

/// Recognized trailing-window units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl WindowUnit {
    /// Case-insensitive, accepting plural and abbreviated spellings.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.to_ascii_lowercase().as_str() {
            "minute" | "minutes" | "min" | "mins" => Ok(Self::Minute),
            "hour" | "hours" => Ok(Self::Hour),
            "day" | "days" => Ok(Self::Day),
            "week" | "weeks" => Ok(Self::Week),
            "month" | "months" => Ok(Self::Month),
            _ => Err(AppError::Validation(
                "Time unit must be one of: minute, hour, day, week, month".to_string(),
            )),
        }
    }
}

/// A trailing time range, "N units ago through now".
#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub amount: u32,
    pub unit: WindowUnit,
}

impl Window {
    pub fn parse(amount: i64, unit: &str) -> Result<Self, AppError> {
        if amount < 1 {
            return Err(AppError::Validation(
                "Time number must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            amount: amount as u32,
            unit: WindowUnit::parse(unit)?,
        })
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff_from(Utc::now())
    }

    fn cutoff_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let n = self.amount as i64;
        match self.unit {
            WindowUnit::Minute => now - Duration::minutes(n),
            WindowUnit::Hour => now - Duration::hours(n),
            WindowUnit::Day => now - Duration::days(n),
            WindowUnit::Week => now - Duration::weeks(n),
            // Calendar months; an amount large enough to underflow the
            // calendar clamps to the widest possible window.
            WindowUnit::Month => now
                .checked_sub_months(Months::new(self.amount))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

/// Per-endpoint request statistics over the window: totals, truncated
/// success percentage, mean latency and a status-code breakdown, ordered by
/// total descending. Read-only; an empty window yields an empty vec.
pub async fn compute(pool: &SqlitePool, window: &Window) -> Result<Vec<EndpointStat>, AppError> {
    let cutoff = window.cutoff();

    let base: Vec<(String, String, i64, i64, f64)> = sqlx::query_as(
        r#"
        SELECT method,
               endpoint,
               COUNT(*) AS total,
               SUM(CASE WHEN response_status BETWEEN 200 AND 299 THEN 1 ELSE 0 END) * 100 / COUNT(*)
                   AS successes_percent,
               COALESCE(AVG(elapsed_seconds), 0.0) AS average_elapsed_seconds
        FROM requests
        WHERE created_at > ?1
        GROUP BY method, endpoint
        ORDER BY total DESC
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let breakdown: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
        r#"
        SELECT method, endpoint, response_status, response_status_text, COUNT(*) AS total
        FROM requests
        WHERE created_at > ?1
        GROUP BY method, endpoint, response_status
        ORDER BY response_status
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let mut responses: HashMap<(String, String), Vec<StatusCount>> = HashMap::new();
    for (method, endpoint, status, status_text, total) in breakdown {
        responses
            .entry((method, endpoint))
            .or_default()
            .push(StatusCount {
                response_status: status,
                response_status_text: status_text,
                total,
            });
    }

    Ok(base
        .into_iter()
        .map(|(method, endpoint, total, successes_percent, average)| {
            let key = (method.clone(), endpoint.clone());
            EndpointStat {
                method,
                endpoint,
                total,
                successes_percent,
                average_elapsed_seconds: round_elapsed(average),
                responses: responses.remove(&key).unwrap_or_default(),
            }
        })
        .collect())
}
