//! Path-template compilation and the per-method route table.
//!
//! Templates such as `/weather/{city}` compile into a list of [`Segment`]s once,
//! when the registry rebuilds its index. Matching is purely structural: the inbound
//! path must have the same number of segments and every literal must match exactly.
//! There is no specificity ranking, the first matching route in bucket order wins.
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use thiserror::Error;

use crate::core::service::{Endpoint, ServiceDefinition};

/// Reasons a path template cannot be compiled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("path cannot be empty")]
    Empty,

    #[error("path must start with '/' (got {0:?})")]
    MissingLeadingSlash(String),

    #[error("path {0:?} contains an empty segment")]
    EmptySegment(String),

    #[error("path {0:?} contains an empty parameter name")]
    EmptyParameterName(String),

    #[error("path segment {0:?} has unmatched braces")]
    UnmatchedBraces(String),

    #[error("path parameter {{{0}}} appears more than once")]
    DuplicateParameter(String),
}

/// No route accepts the inbound (method, path) pair.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no route matches {method} {path}")]
pub struct RouteNotFound {
    pub method: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compile a template like `/todos/{id}/items`.
    pub fn parse(path: &str) -> Result<Self, TemplateError> {
        if path.is_empty() {
            return Err(TemplateError::Empty);
        }
        if !path.starts_with('/') {
            return Err(TemplateError::MissingLeadingSlash(path.to_string()));
        }

        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self {
                segments: Vec::new(),
            });
        }

        let segments = trimmed
            .split('/')
            .map(|part| Self::parse_segment(path, part))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        for segment in &segments {
            if let Segment::Param(name) = segment
                && !seen.insert(name.as_str())
            {
                return Err(TemplateError::DuplicateParameter(name.clone()));
            }
        }
        Ok(Self { segments })
    }

    fn parse_segment(path: &str, part: &str) -> Result<Segment, TemplateError> {
        if part.is_empty() {
            return Err(TemplateError::EmptySegment(path.to_string()));
        }
        if !part.contains('{') && !part.contains('}') {
            return Ok(Segment::Literal(part.to_string()));
        }

        match part
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        {
            Some(inner) if inner.contains('{') || inner.contains('}') => {
                Err(TemplateError::UnmatchedBraces(part.to_string()))
            }
            Some(inner) => {
                let name = inner.trim();
                if name.is_empty() {
                    Err(TemplateError::EmptyParameterName(path.to_string()))
                } else {
                    Ok(Segment::Param(name.to_string()))
                }
            }
            None => Err(TemplateError::UnmatchedBraces(part.to_string())),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholder names in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match an inbound path and return the concrete forwarding path.
    pub fn match_path(&self, request_path: &str) -> Option<String> {
        let trimmed = request_path.trim_matches('/');
        if trimmed.is_empty() {
            return self.segments.is_empty().then(|| "/".to_string());
        }

        let parts: Vec<&str> = trimmed.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut forward = String::with_capacity(request_path.len());
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => forward.push_str(literal),
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(_) => forward.push_str(part),
            }
            forward.push('/');
        }
        forward.pop();
        forward.insert(0, '/');
        Some(forward)
    }
}

/// A compiled endpoint together with the service that owns it.
#[derive(Debug, Clone)]
pub struct Route {
    service: Arc<ServiceDefinition>,
    endpoint_index: usize,
    template: PathTemplate,
}

impl Route {
    pub fn new(
        service: Arc<ServiceDefinition>,
        endpoint_index: usize,
    ) -> Result<Self, TemplateError> {
        let template = PathTemplate::parse(&service.endpoints[endpoint_index].path)?;
        Ok(Self {
            service,
            endpoint_index,
            template,
        })
    }

    pub fn service(&self) -> &Arc<ServiceDefinition> {
        &self.service
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.service.endpoints[self.endpoint_index]
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Route,
    /// Path to request on the backend, placeholders substituted.
    pub forward_path: String,
}

impl RouteMatch {
    pub fn service(&self) -> &Arc<ServiceDefinition> {
        self.route.service()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.route.endpoint()
    }
}

/// Method -> ordered routes. Always built wholesale from a full service set.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    buckets: HashMap<String, Vec<Route>>,
}

impl RouteTable {
    /// Compile every endpoint of `services` in iteration order. Endpoints whose
    /// template fails to compile are logged and skipped.
    pub fn build<'a>(services: impl IntoIterator<Item = &'a Arc<ServiceDefinition>>) -> Self {
        let mut buckets: HashMap<String, Vec<Route>> = HashMap::new();
        for service in services {
            for (index, endpoint) in service.endpoints.iter().enumerate() {
                match Route::new(service.clone(), index) {
                    Ok(route) => buckets
                        .entry(endpoint.method.to_ascii_uppercase())
                        .or_default()
                        .push(route),
                    Err(e) => tracing::warn!(
                        service = %service.name,
                        "Skipping endpoint {} {}: {}",
                        endpoint.method,
                        endpoint.path,
                        e
                    ),
                }
            }
        }
        Self { buckets }
    }

    /// Find the first route in the method bucket that accepts `path`. HEAD falls
    /// back to the GET bucket when no HEAD routes exist.
    pub fn find(&self, method: &str, path: &str) -> Result<RouteMatch, RouteNotFound> {
        let method = method.to_ascii_uppercase();
        let candidates = match self.buckets.get(&method) {
            Some(routes) if !routes.is_empty() => routes.as_slice(),
            _ if method == "HEAD" => self.buckets.get("GET").map_or(&[][..], Vec::as_slice),
            _ => &[][..],
        };

        candidates
            .iter()
            .find_map(|route| {
                route.template.match_path(path).map(|forward_path| RouteMatch {
                    route: route.clone(),
                    forward_path,
                })
            })
            .ok_or_else(|| RouteNotFound {
                method,
                path: path.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn service(name: &str, endpoints: &[(&str, &str)]) -> Arc<ServiceDefinition> {
        Arc::new(ServiceDefinition {
            name: name.to_string(),
            address: format!("http://{name}.local"),
            description: String::new(),
            endpoints: endpoints
                .iter()
                .map(|(method, path)| Endpoint {
                    path: path.to_string(),
                    method: method.to_string(),
                    description: String::new(),
                    operation_id: None,
                    parameters: Vec::new(),
                    request_body: None,
                })
                .collect(),
            source: PathBuf::from(format!("{name}.yaml")),
        })
    }

    #[test]
    fn parses_literals_and_params() {
        let template = PathTemplate::parse("/todos/{ id }/items").unwrap();
        assert_eq!(
            template.segments(),
            &[
                Segment::Literal("todos".to_string()),
                Segment::Param("id".to_string()),
                Segment::Literal("items".to_string()),
            ]
        );
        assert_eq!(template.param_names().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn rejects_malformed_templates() {
        assert_eq!(PathTemplate::parse(""), Err(TemplateError::Empty));
        assert!(matches!(
            PathTemplate::parse("todos"),
            Err(TemplateError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            PathTemplate::parse("/todos//items"),
            Err(TemplateError::EmptySegment(_))
        ));
        assert!(matches!(
            PathTemplate::parse("/todos/{}"),
            Err(TemplateError::EmptyParameterName(_))
        ));
        assert!(matches!(
            PathTemplate::parse("/todos/{id"),
            Err(TemplateError::UnmatchedBraces(_))
        ));
        assert!(matches!(
            PathTemplate::parse("/todos/x{id}"),
            Err(TemplateError::UnmatchedBraces(_))
        ));
        assert_eq!(
            PathTemplate::parse("/a/{id}/b/{ id }"),
            Err(TemplateError::DuplicateParameter("id".to_string()))
        );
    }

    #[test]
    fn weather_template_matches_exact_segment_count() {
        let template = PathTemplate::parse("/weather/{city}").unwrap();
        assert_eq!(
            template.match_path("/weather/Paris"),
            Some("/weather/Paris".to_string())
        );
        assert_eq!(
            template.match_path("/weather/Paris/"),
            Some("/weather/Paris".to_string())
        );
        assert_eq!(template.match_path("/weather"), None);
        assert_eq!(template.match_path("/weather/Paris/extra"), None);
        assert_eq!(template.match_path("/Weather/Paris"), None);
    }

    #[test]
    fn root_template_matches_only_root() {
        let template = PathTemplate::parse("/").unwrap();
        assert!(template.segments().is_empty());
        assert_eq!(template.match_path("/"), Some("/".to_string()));
        assert_eq!(template.match_path(""), Some("/".to_string()));
        assert_eq!(template.match_path("//"), Some("/".to_string()));
        assert_eq!(template.match_path("/anything"), None);

        let non_root = PathTemplate::parse("/todos").unwrap();
        assert_eq!(non_root.match_path("/"), None);
    }

    #[test]
    fn inner_empty_segment_never_matches_param() {
        let template = PathTemplate::parse("/a/{b}/c").unwrap();
        assert_eq!(template.match_path("/a//c"), None);
        assert_eq!(template.match_path("/a/x/c"), Some("/a/x/c".to_string()));
    }

    #[test]
    fn first_route_in_bucket_order_wins() {
        let first = service("alpha", &[("GET", "/items/{id}")]);
        let second = service("beta", &[("GET", "/items/special")]);
        let table = RouteTable::build([&first, &second]);

        let found = table.find("GET", "/items/special").unwrap();
        assert_eq!(found.service().name, "alpha");
        assert_eq!(found.forward_path, "/items/special");
    }

    #[test]
    fn head_falls_back_to_get_bucket() {
        let svc = service("todo", &[("GET", "/todos"), ("POST", "/todos")]);
        let table = RouteTable::build([&svc]);

        let found = table.find("HEAD", "/todos").unwrap();
        assert_eq!(found.endpoint().method, "GET");
        assert!(table.find("DELETE", "/todos").is_err());
    }

    #[test]
    fn head_bucket_takes_precedence_when_present() {
        let svc = service("todo", &[("HEAD", "/ping"), ("GET", "/todos")]);
        let table = RouteTable::build([&svc]);

        assert!(table.find("HEAD", "/ping").is_ok());
        // HEAD has its own bucket, so there is no fallback to GET.
        assert!(table.find("HEAD", "/todos").is_err());
    }

    #[test]
    fn invalid_endpoints_are_skipped() {
        let svc = service("broken", &[("GET", "/ok"), ("GET", "/bad/{")]);
        let table = RouteTable::build([&svc]);
        assert_eq!(table.len(), 1);
        assert!(table.find("GET", "/ok").is_ok());
    }

    #[test]
    fn not_found_reports_method_and_path() {
        let table = RouteTable::default();
        let err = table.find("get", "/missing").unwrap_err();
        assert_eq!(err.method, "GET");
        assert_eq!(err.path, "/missing");
        assert!(table.is_empty());
    }
}
