//! Series Service
//!
//! Resolves metric expressions into their series (ids, descriptors, labels,
//! instances) through the connection's series cache, and answers
//! time-series queries from the resolved series and freshly fetched values.

use crate::application::context::RequestContext;
use crate::domain::entities::{
    DataFrame, DataQuery, DataResponse, QueryDataResponse, Series, SeriesValue, ValuesRange,
};
use crate::domain::ports::MetricsApi;
use crate::error::DatasourceError;
use crate::infrastructure::SeriesCache;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Per-connection series resolution and time-series query handling.
pub struct SeriesService {
    api: Arc<dyn MetricsApi>,
    cache: SeriesCache<Vec<Series>>,
}

impl SeriesService {
    pub fn new(api: Arc<dyn MetricsApi>, cache_capacity: usize) -> Result<Self, DatasourceError> {
        Ok(Self {
            api,
            cache: SeriesCache::new(cache_capacity)?,
        })
    }

    pub fn cache(&self) -> &SeriesCache<Vec<Series>> {
        &self.cache
    }

    /// Series matching `expr`, resolved at most once per cache lifetime.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        expr: &str,
    ) -> Result<Arc<Vec<Series>>, DatasourceError> {
        let api = Arc::clone(&self.api);
        ctx.run(
            self.cache
                .resolve(expr, move |expr| async move { resolve_series(api, expr).await }),
        )
        .await
    }

    /// Answer every query of a time-series batch.
    ///
    /// Queries run concurrently. A failing query reports its error in its
    /// own response; cancellation fails the whole batch.
    pub async fn handle_time_series_queries(
        &self,
        ctx: &RequestContext,
        queries: &[DataQuery],
    ) -> Result<QueryDataResponse, DatasourceError> {
        let results =
            futures::future::join_all(queries.iter().map(|query| self.run_query(ctx, query)))
                .await;

        let mut response = QueryDataResponse::default();
        for (query, result) in queries.iter().zip(results) {
            let data = match result {
                Ok(frames) => DataResponse::from_frames(frames),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!("query {} ({}) failed: {}", query.ref_id, query.expr, e);
                    DataResponse::from_error(e.to_string())
                }
            };
            response.responses.insert(query.ref_id.clone(), data);
        }
        Ok(response)
    }

    /// Drop cached resolutions; called when the owning instance is disposed.
    pub fn dispose(&self) {
        self.cache.close();
    }

    async fn run_query(
        &self,
        ctx: &RequestContext,
        query: &DataQuery,
    ) -> Result<Vec<DataFrame>, DatasourceError> {
        let expr = query.expr.trim();
        if expr.is_empty() {
            return Err(DatasourceError::invalid_parameter("expr", "must not be empty"));
        }
        if query.time_range.from > query.time_range.to {
            return Err(DatasourceError::invalid_parameter(
                "timeRange",
                "'from' is after 'to'",
            ));
        }

        let series = self.resolve(ctx, expr).await?;
        let ids: Vec<String> = series.iter().map(|s| s.id.clone()).collect();
        let mut range = ValuesRange::for_query(query);
        if series.iter().any(|s| s.descriptor.is_counter()) {
            // The first sample of a counter only seeds the rate
            range = range.with_leading_interval();
        }
        let values = ctx.run(self.api.values(&ids, &range)).await?;

        Ok(build_frames(&series, values, query.legend_format.as_deref()))
    }
}

/// Resolve an expression against the metrics API: matching series ids,
/// then their descriptors, names, labels and (for instance-domain series)
/// instances.
async fn resolve_series(
    api: Arc<dyn MetricsApi>,
    expr: String,
) -> Result<Vec<Series>, DatasourceError> {
    let ids = api.query(&expr).await?;
    if ids.is_empty() {
        return Err(DatasourceError::Upstream(format!(
            "no series found for expression '{}'",
            expr
        )));
    }

    let (descs, names, labels) =
        futures::try_join!(api.descs(&ids), api.metrics(&ids), api.labels(&ids))?;

    let descs: HashMap<String, _> = descs.into_iter().map(|d| (d.series.clone(), d)).collect();
    let names: HashMap<String, String> = names.into_iter().map(|m| (m.series, m.name)).collect();
    let labels: HashMap<String, BTreeMap<String, String>> = labels
        .into_iter()
        .map(|l| {
            let flat = l
                .labels
                .into_iter()
                .map(|(k, v)| (k, label_text(&v)))
                .collect();
            (l.series, flat)
        })
        .collect();

    let indom_series: Vec<String> = ids
        .iter()
        .filter(|id| descs.get(*id).map(|d| d.has_instances()).unwrap_or(false))
        .cloned()
        .collect();
    let mut instances: HashMap<String, Vec<_>> = HashMap::new();
    if !indom_series.is_empty() {
        for instance in api.instances(&indom_series).await? {
            instances
                .entry(instance.series.clone())
                .or_default()
                .push(instance);
        }
    }

    let series = ids
        .into_iter()
        .map(|id| Series {
            name: names.get(&id).cloned().unwrap_or_else(|| expr.clone()),
            descriptor: descs.get(&id).cloned().unwrap_or_default(),
            labels: labels.get(&id).cloned().unwrap_or_default(),
            instances: instances.remove(&id).unwrap_or_default(),
            id,
        })
        .collect::<Vec<_>>();

    tracing::debug!("resolved '{}' to {} series", expr, series.len());
    Ok(series)
}

fn label_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Group values into one frame per (series, instance), sorted by time.
/// Counter series are converted to per-second rates.
fn build_frames(
    series: &[Series],
    values: Vec<SeriesValue>,
    legend_format: Option<&str>,
) -> Vec<DataFrame> {
    let by_id: HashMap<&str, &Series> = series.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut points: BTreeMap<(String, Option<String>), Vec<(i64, f64)>> = BTreeMap::new();

    for value in values {
        let Ok(parsed) = value.value.parse::<f64>() else {
            tracing::debug!("skipping non-numeric value for series {}", value.series);
            continue;
        };
        points
            .entry((value.series, value.instance))
            .or_default()
            .push((value.timestamp as i64, parsed));
    }

    points
        .into_iter()
        .filter_map(|((series_id, instance), mut samples)| {
            let series = by_id.get(series_id.as_str())?;
            samples.sort_by_key(|(time, _)| *time);
            if series.descriptor.is_counter() {
                samples = counter_rates(&samples);
            }
            let instance_name = instance
                .as_deref()
                .map(|i| series.instance_name(i).unwrap_or(i).to_string());
            Some(DataFrame {
                name: frame_name(series, instance_name.as_deref(), legend_format),
                labels: series.labels.clone(),
                times: samples.iter().map(|(t, _)| *t).collect(),
                values: samples.iter().map(|(_, v)| *v).collect(),
            })
        })
        .collect()
}

/// Per-second rate between consecutive samples, stamped with the later
/// sample's time. The first sample yields no point; a counter that goes
/// backwards (wrap or restart) skips that point.
fn counter_rates(samples: &[(i64, f64)]) -> Vec<(i64, f64)> {
    samples
        .windows(2)
        .filter_map(|pair| {
            let ((t0, v0), (t1, v1)) = (pair[0], pair[1]);
            let delta = v1 - v0;
            let elapsed_ms = t1 - t0;
            if delta < 0.0 || elapsed_ms <= 0 {
                return None;
            }
            Some((t1, delta / (elapsed_ms as f64 / 1000.0)))
        })
        .collect()
}

/// Frame name from the legend format, or `metric[instance]` by default.
fn frame_name(series: &Series, instance: Option<&str>, legend_format: Option<&str>) -> String {
    match legend_format.filter(|f| !f.is_empty()) {
        Some(format) => {
            let mut vars: Vec<(&str, &str)> = vec![
                ("metric", series.name.as_str()),
                ("instance", instance.unwrap_or("")),
            ];
            vars.extend(series.labels.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            // Longest names first so `$instance` does not clobber `$instance_type`
            vars.sort_by_key(|(key, _)| std::cmp::Reverse(key.len()));
            vars.into_iter().fold(format.to_string(), |name, (key, value)| {
                name.replace(&format!("${}", key), value)
            })
        }
        None => match instance {
            Some(instance) => format!("{}[{}]", series.name, instance),
            None => series.name.clone(),
        },
    }
}
