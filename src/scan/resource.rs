//! Classifies cached MAS api responses by url and pulls applications,
//! charts, and genres out of their JSON.
//!
//! Known endpoints (`/v1/<mode>/<country>/<sub mode>`):
//! - catalog/apps, catalog/contents: `data` is a list of app objects
//! - catalog/charts?genre=N: `results.apps` lists one chart per type
//! - editorial/categories: `results.categories` is the genre tree
//! - editorial/*: `data` lists rooms (with apps) and groupings (ignored)

use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::model::{AppId, AppKind, AppObservation, ChartType};

#[derive(Debug, Error, PartialEq)]
pub enum ResourceError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unknown url: {0}")]
    UnknownUrl(String),

    #[error("unhandled {mode} sub-mode: {sub_mode}")]
    UnknownSubMode { mode: String, sub_mode: String },

    #[error("chart url without a single genre: {0}")]
    MissingGenre(String),

    #[error("missing or malformed field '{0}'")]
    MissingField(&'static str),

    #[error("unknown chart type: {0}")]
    UnknownChartType(String),

    #[error("unexpected editorial type: {0}")]
    UnknownEditorial(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    CatalogApps,
    Charts { genre: u32 },
    EditorialCategories,
    Editorial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub country: String,
    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryNode {
    pub genre: u32,
    pub name: String,
    pub children: Vec<(u32, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Apps(Vec<AppObservation>),
    Charts {
        genre: u32,
        charts: Vec<(ChartType, Vec<AppObservation>)>,
    },
    Categories(Vec<CategoryNode>),
}

/// Works out country and endpoint from a request url.
pub fn classify(source: &str) -> Result<Locator, ResourceError> {
    let url = Url::parse(source).map_err(|_| ResourceError::InvalidUrl(source.to_string()))?;
    let parts: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    // parts[0] is the api version
    let (Some(mode), Some(country), Some(sub_mode)) = (parts.get(1), parts.get(2), parts.get(3)) else {
        return Err(ResourceError::UnknownUrl(source.to_string()));
    };

    let endpoint = match (*mode, *sub_mode) {
        ("catalog", "apps" | "contents") => Endpoint::CatalogApps,
        ("catalog", "charts") => {
            let genres: Vec<String> = url
                .query_pairs()
                .filter(|(k, _)| k == "genre")
                .map(|(_, v)| v.into_owned())
                .collect();
            let genre = match genres.as_slice() {
                [single] => single.parse().ok(),
                _ => None,
            };
            let genre = genre.ok_or_else(|| ResourceError::MissingGenre(source.to_string()))?;
            Endpoint::Charts { genre }
        }
        ("catalog", other) => {
            return Err(ResourceError::UnknownSubMode {
                mode: "catalog".into(),
                sub_mode: other.to_string(),
            })
        }
        ("editorial", "categories") => Endpoint::EditorialCategories,
        ("editorial", _) => Endpoint::Editorial,
        _ => return Err(ResourceError::UnknownUrl(source.to_string())),
    };

    Ok(Locator {
        country: country.to_string(),
        endpoint,
    })
}

/// Extracts the payload of a classified response.
pub fn parse(endpoint: &Endpoint, resource: &Value) -> Result<Payload, ResourceError> {
    match endpoint {
        Endpoint::CatalogApps => {
            let data = array_at(resource, &["data"], "data")?;
            let apps = data.iter().map(parse_app).collect::<Result<Vec<_>, _>>()?;
            Ok(Payload::Apps(apps))
        }
        Endpoint::Charts { genre } => {
            let charts_data = array_at(resource, &["results", "apps"], "results.apps")?;
            let mut charts: Vec<(ChartType, Vec<AppObservation>)> = Vec::new();
            for chart in charts_data {
                let name = chart
                    .get("chart")
                    .and_then(Value::as_str)
                    .ok_or(ResourceError::MissingField("chart"))?;
                let chart_type =
                    ChartType::from_api(name).ok_or_else(|| ResourceError::UnknownChartType(name.to_string()))?;
                let apps = array_at(chart, &["data"], "data")?
                    .iter()
                    .map(parse_app)
                    .collect::<Result<Vec<_>, _>>()?;

                // a later listing of the same type replaces the earlier one
                charts.retain(|(existing, _)| *existing != chart_type);
                charts.push((chart_type, apps));
            }
            Ok(Payload::Charts { genre: *genre, charts })
        }
        Endpoint::EditorialCategories => {
            let categories = array_at(resource, &["results", "categories"], "results.categories")?;
            let nodes = categories
                .iter()
                .map(|category| -> Result<CategoryNode, ResourceError> {
                    let children = match category.get("children").and_then(Value::as_array) {
                        Some(children) => children
                            .iter()
                            .map(|child| -> Result<(u32, String), ResourceError> {
                                Ok((genre_id(child)?, genre_name(child)?))
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                        None => Vec::new(),
                    };
                    Ok(CategoryNode {
                        genre: genre_id(category)?,
                        name: genre_name(category)?,
                        children,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Payload::Categories(nodes))
        }
        Endpoint::Editorial => {
            let mut apps = Vec::new();
            for editorial in array_at(resource, &["data"], "data")? {
                match editorial.get("type").and_then(Value::as_str) {
                    // apps are nested several levels deep in groupings
                    Some("groupings") => continue,
                    Some("rooms") => {
                        let contents = array_at(
                            editorial,
                            &["relationships", "contents", "data"],
                            "relationships.contents.data",
                        )?;
                        for app in contents {
                            apps.push(parse_app(app)?);
                        }
                    }
                    other => {
                        return Err(ResourceError::UnknownEditorial(other.unwrap_or("<none>").to_string()));
                    }
                }
            }
            Ok(Payload::Apps(apps))
        }
    }
}

/// Reads one app object. Only `id` is required; lazily loaded apps
/// come without `attributes`.
pub fn parse_app(data: &Value) -> Result<AppObservation, ResourceError> {
    let itunes_id = id_value(data.get("id")).ok_or(ResourceError::MissingField("id"))?;
    let attributes = data.get("attributes");
    let attribute = |path: &[&str]| -> Option<String> {
        let mut current = attributes?;
        for key in path {
            current = current.get(*key)?;
        }
        current.as_str().map(str::to_string)
    };

    Ok(AppObservation {
        itunes_id,
        kind: AppKind::from_api(data.get("type").and_then(Value::as_str)),
        name: attribute(&["name"]),
        bundle_id: attribute(&["platformAttributes", "osx", "bundleId"]),
        genre: attribute(&["genreDisplayName"]),
        data: data.clone(),
    })
}

fn array_at<'a>(value: &'a Value, path: &[&str], field: &'static str) -> Result<&'a Vec<Value>, ResourceError> {
    let mut current = value;
    for key in path {
        current = current.get(*key).ok_or(ResourceError::MissingField(field))?;
    }
    current.as_array().ok_or(ResourceError::MissingField(field))
}

/// Ids come as strings ("497799835") or numbers depending on the endpoint.
fn id_value(value: Option<&Value>) -> Option<AppId> {
    match value? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn genre_id(category: &Value) -> Result<u32, ResourceError> {
    id_value(category.get("genre"))
        .and_then(|id| u32::try_from(id).ok())
        .ok_or(ResourceError::MissingField("genre"))
}

fn genre_name(category: &Value) -> Result<String, ResourceError> {
    category
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ResourceError::MissingField("name"))
}
