//! Resource Service
//!
//! Routes resource calls (`<method>?<query string>`) to one metrics API
//! call each and returns the result as JSON.

use crate::domain::ports::MetricsApi;
use crate::domain::value_objects::ResourceMethod;
use crate::error::DatasourceError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Query-string parameters: name → values in the order they appeared.
pub type ResourceParams = BTreeMap<String, Vec<String>>;

/// Split a resource URL into its method and parameters.
///
/// The method is the path with any leading `/` removed.
pub fn parse_resource_url(raw: &str) -> Result<(String, ResourceParams), DatasourceError> {
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw, ""),
    };
    let method = path.trim_start_matches('/');
    if method.is_empty() {
        return Err(DatasourceError::InvalidRequest(
            "resource path is empty".to_string(),
        ));
    }

    let mut params = ResourceParams::new();
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(name.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    Ok((method.to_string(), params))
}

/// Template variable value, as the host expects it from `metricFindQuery`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricFindValue {
    pub text: String,
}

/// Resource router for one connection.
pub struct ResourceService {
    api: Arc<dyn MetricsApi>,
}

impl ResourceService {
    pub fn new(api: Arc<dyn MetricsApi>) -> Self {
        Self { api }
    }

    /// Invoke the metrics API call registered for `method`.
    pub async fn route(&self, method: &str, params: &ResourceParams) -> Result<Value, DatasourceError> {
        let resource = ResourceMethod::from_name(method)
            .ok_or_else(|| DatasourceError::UnknownResourceMethod(method.to_string()))?;
        tracing::debug!("resource call: {} {:?}", resource, params);

        match resource {
            ResourceMethod::Metrics => {
                let pattern = optional(params, "match");
                to_json(self.api.metric_names(pattern).await?)
            }
            ResourceMethod::Labels => {
                let names = terms(params, "names");
                if names.is_empty() {
                    to_json(self.api.label_names().await?)
                } else {
                    to_json(self.api.label_values(&names).await?)
                }
            }
            ResourceMethod::Metadata => {
                let series = required_terms(params, "series")?;
                to_json(self.api.descs(&series).await?)
            }
            ResourceMethod::Instances => {
                let series = required_terms(params, "series")?;
                to_json(self.api.instances(&series).await?)
            }
            ResourceMethod::Series => {
                let expr = required(params, "expr")?;
                to_json(self.api.query(expr).await?)
            }
            ResourceMethod::MetricFindQuery => {
                let query = required(params, "query")?;
                to_json(self.metric_find_query(query).await?)
            }
        }
    }

    /// Template variable queries: `metrics()`, `metrics(<pattern>)`,
    /// `label_names()` and `label_values(<label>)`.
    async fn metric_find_query(&self, query: &str) -> Result<Vec<MetricFindValue>, DatasourceError> {
        let (function, argument) = parse_function_call(query)?;
        let texts: Vec<String> = match (function, argument) {
            ("metrics", pattern) => self.api.metric_names(pattern).await?,
            ("label_names", None) => self.api.label_names().await?,
            ("label_values", Some(label)) => {
                let mut values = self.api.label_values(&[label.to_string()]).await?;
                values
                    .remove(label)
                    .unwrap_or_default()
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            }
            _ => {
                return Err(DatasourceError::invalid_parameter(
                    "query",
                    format!("unsupported query '{}'", query),
                ))
            }
        };
        Ok(texts.into_iter().map(|text| MetricFindValue { text }).collect())
    }
}

/// Parse `name(argument)`; an empty argument is `None`.
fn parse_function_call(query: &str) -> Result<(&str, Option<&str>), DatasourceError> {
    let invalid = || {
        DatasourceError::invalid_parameter("query", format!("expected name(argument), got '{}'", query))
    };
    let (name, rest) = query.trim().split_once('(').ok_or_else(invalid)?;
    let argument = rest.strip_suffix(')').ok_or_else(invalid)?.trim();
    let argument = if argument.is_empty() { None } else { Some(argument) };
    Ok((name.trim(), argument))
}

fn optional<'a>(params: &'a ResourceParams, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .and_then(|values| values.first())
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn required<'a>(params: &'a ResourceParams, name: &str) -> Result<&'a str, DatasourceError> {
    optional(params, name).ok_or_else(|| DatasourceError::invalid_parameter(name, "is required"))
}

/// All values of a multi-valued parameter; comma-separated lists are split.
fn terms(params: &ResourceParams, name: &str) -> Vec<String> {
    params
        .get(name)
        .into_iter()
        .flatten()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

fn required_terms(params: &ResourceParams, name: &str) -> Result<Vec<String>, DatasourceError> {
    let values = terms(params, name);
    if values.is_empty() {
        return Err(DatasourceError::invalid_parameter(
            name,
            "at least one value is required",
        ));
    }
    Ok(values)
}

fn to_json<T: Serialize>(value: T) -> Result<Value, DatasourceError> {
    serde_json::to_value(value).map_err(|e| DatasourceError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        MetricName, PingResponse, SeriesDescriptor, SeriesInstance, SeriesLabels, SeriesValue,
        ValuesRange,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    // ===== Mock Implementation =====

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingApi {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetricsApi for RecordingApi {
        async fn ping(&self) -> Result<PingResponse, DatasourceError> {
            Ok(PingResponse { success: true })
        }

        async fn query(&self, expr: &str) -> Result<Vec<String>, DatasourceError> {
            self.record(format!("query {}", expr));
            Ok(vec!["s1".to_string(), "s2".to_string()])
        }

        async fn descs(&self, series: &[String]) -> Result<Vec<SeriesDescriptor>, DatasourceError> {
            self.record(format!("descs {}", series.join(",")));
            Ok(series
                .iter()
                .map(|id| SeriesDescriptor {
                    series: id.clone(),
                    semantics: "counter".to_string(),
                    ..Default::default()
                })
                .collect())
        }

        async fn labels(&self, _series: &[String]) -> Result<Vec<SeriesLabels>, DatasourceError> {
            Ok(vec![])
        }

        async fn label_names(&self) -> Result<Vec<String>, DatasourceError> {
            self.record("label_names".to_string());
            Ok(vec!["hostname".to_string(), "agent".to_string()])
        }

        async fn label_values(
            &self,
            names: &[String],
        ) -> Result<BTreeMap<String, Vec<Value>>, DatasourceError> {
            self.record(format!("label_values {}", names.join(",")));
            Ok(names
                .iter()
                .map(|n| (n.clone(), vec![Value::from("web01"), Value::from(42)]))
                .collect())
        }

        async fn metric_names(&self, pattern: Option<&str>) -> Result<Vec<String>, DatasourceError> {
            self.record(format!("metric_names {}", pattern.unwrap_or("*")));
            if pattern == Some("broken*") {
                return Err(DatasourceError::Upstream("pmproxy returned 500".to_string()));
            }
            Ok(vec!["disk.dev.read".to_string(), "disk.dev.write".to_string()])
        }

        async fn metrics(&self, _series: &[String]) -> Result<Vec<MetricName>, DatasourceError> {
            Ok(vec![])
        }

        async fn instances(&self, series: &[String]) -> Result<Vec<SeriesInstance>, DatasourceError> {
            self.record(format!("instances {}", series.join(",")));
            Ok(vec![])
        }

        async fn values(
            &self,
            _series: &[String],
            _range: &ValuesRange,
        ) -> Result<Vec<SeriesValue>, DatasourceError> {
            Ok(vec![])
        }
    }

    fn service() -> (ResourceService, Arc<RecordingApi>) {
        let api = Arc::new(RecordingApi::default());
        (ResourceService::new(api.clone()), api)
    }

    async fn call(service: &ResourceService, url: &str) -> Result<Value, DatasourceError> {
        let (method, params) = parse_resource_url(url)?;
        service.route(&method, &params).await
    }

    #[test]
    fn test_parse_resource_url() {
        let (method, params) =
            parse_resource_url("/labels?names=hostname&names=agent&x=a%20b").unwrap();
        assert_eq!(method, "labels");
        assert_eq!(params["names"], vec!["hostname", "agent"]);
        assert_eq!(params["x"], vec!["a b"]);
    }

    #[test]
    fn test_parse_resource_url_without_query() {
        let (method, params) = parse_resource_url("metrics").unwrap();
        assert_eq!(method, "metrics");
        assert!(params.is_empty());
    }

    #[test]
    fn test_parse_resource_url_empty_path() {
        assert!(matches!(
            parse_resource_url("/?a=b"),
            Err(DatasourceError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (service, api) = service();
        let err = call(&service, "dropTables").await.unwrap_err();
        assert_eq!(err, DatasourceError::UnknownResourceMethod("dropTables".to_string()));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_with_pattern() {
        let (service, api) = service();
        let result = call(&service, "metrics?match=disk.*").await.unwrap();
        assert_eq!(result, serde_json::json!(["disk.dev.read", "disk.dev.write"]));
        assert_eq!(api.calls(), vec!["metric_names disk.*"]);
    }

    #[tokio::test]
    async fn test_labels_without_names_lists_names() {
        let (service, api) = service();
        let result = call(&service, "labels").await.unwrap();
        assert_eq!(result, serde_json::json!(["hostname", "agent"]));
        assert_eq!(api.calls(), vec!["label_names"]);
    }

    #[tokio::test]
    async fn test_labels_with_names_preserves_order() {
        let (service, api) = service();
        call(&service, "labels?names=hostname&names=agent,domain")
            .await
            .unwrap();
        assert_eq!(api.calls(), vec!["label_values hostname,agent,domain"]);
    }

    #[tokio::test]
    async fn test_metadata_requires_series() {
        let (service, api) = service();
        let err = call(&service, "metadata").await.unwrap_err();
        assert!(matches!(err, DatasourceError::InvalidParameter { .. }));
        assert!(api.calls().is_empty());

        let result = call(&service, "metadata?series=s1&series=s2").await.unwrap();
        assert_eq!(result[1]["semantics"], "counter");
        assert_eq!(result[0]["type"], "");
    }

    #[tokio::test]
    async fn test_instances_and_series() {
        let (service, api) = service();
        call(&service, "instances?series=s1").await.unwrap();
        let ids = call(&service, "series?expr=kernel.all.load").await.unwrap();
        assert_eq!(ids, serde_json::json!(["s1", "s2"]));
        assert_eq!(api.calls(), vec!["instances s1", "query kernel.all.load"]);
    }

    #[tokio::test]
    async fn test_upstream_error_propagates() {
        let (service, _) = service();
        let err = call(&service, "metrics?match=broken*").await.unwrap_err();
        assert!(matches!(err, DatasourceError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_metric_find_query_variants() {
        let (service, _) = service();

        let metrics = call(&service, "metricFindQuery?query=metrics()").await.unwrap();
        assert_eq!(
            metrics,
            serde_json::json!([{ "text": "disk.dev.read" }, { "text": "disk.dev.write" }])
        );

        let names = call(&service, "metricFindQuery?query=label_names()").await.unwrap();
        assert_eq!(names, serde_json::json!([{ "text": "hostname" }, { "text": "agent" }]));

        let values = call(&service, "metricFindQuery?query=label_values(hostname)")
            .await
            .unwrap();
        assert_eq!(values, serde_json::json!([{ "text": "web01" }, { "text": "42" }]));
    }

    #[tokio::test]
    async fn test_metric_find_query_rejects_garbage() {
        let (service, _) = service();
        for query in ["label_values()", "metrics", "rate(disk.io)"] {
            let url = format!("metricFindQuery?query={}", query);
            let err = call(&service, &url).await.unwrap_err();
            assert!(
                matches!(err, DatasourceError::InvalidParameter { .. }),
                "{} should be rejected",
                query
            );
        }
    }
}
