use std::{fmt, str::FromStr, sync::LazyLock};

use axum::Json;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::AppError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static identifier pattern"));
static SPACES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));

pub fn success<T: Serialize>(data: T, message: Option<&str>) -> Json<Value> {
    let mut body = json!({ "success": true, "data": data });
    if let Some(message) = message {
        body["message"] = Value::from(message);
    }
    Json(body)
}

/// Accepts identifiers as handed out by the registry and ledger.
pub fn validate_id(id: &str) -> Result<(), AppError> {
    if id.trim().is_empty() {
        return Err(AppError::MissingId);
    }
    if !ID_RE.is_match(id) {
        return Err(AppError::InvalidInput(format!("malformed identifier: {id}")));
    }
    Ok(())
}

/// Trim, collapse inner whitespace and drop duplicates while keeping first-seen order.
pub fn normalize_cuisines(cuisines: &[String]) -> Result<Vec<String>, AppError> {
    let mut normalized: Vec<String> = Vec::with_capacity(cuisines.len());

    for cuisine in cuisines {
        let name = SPACES_RE.replace_all(cuisine.trim(), " ").into_owned();

        if name.is_empty() {
            return Err(AppError::InvalidInput("cuisine names must not be empty".to_string()));
        }
        if name.contains(':') {
            return Err(AppError::InvalidInput(format!("cuisine name may not contain ':': {name}")));
        }
        if !normalized.contains(&name) {
            normalized.push(name);
        }
    }

    Ok(normalized)
}

/// A `lng,lat` pair as stored in the restaurant hash.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub lng: f64,
    pub lat: f64,
}

impl FromStr for Coordinates {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::InvalidInput(format!("location must be \"lng,lat\": {raw}"));

        let (lng, lat) = raw.split_once(',').ok_or_else(invalid)?;
        let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;

        if !(-180.0..=180.0).contains(&lng) || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::InvalidInput(format!(
                "coordinates out of range: {raw}"
            )));
        }

        Ok(Self { lng, lat })
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lng, self.lat)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// One page of a ranked or listed collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Result<Self, AppError> {
        if page == 0 {
            return Err(AppError::InvalidInput("page starts at 1".to_string()));
        }
        if limit == 0 || limit > MAX_LIMIT {
            return Err(AppError::InvalidInput(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(Self { page, limit })
    }

    /// Inclusive `(start, end)` rank window.
    pub fn window(&self) -> (isize, isize) {
        let start = (self.page as isize - 1) * self.limit as isize;
        (start, start + self.limit as isize - 1)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl TryFrom<PageQuery> for Page {
    type Error = AppError;

    fn try_from(query: PageQuery) -> Result<Self, Self::Error> {
        Self::new(
            query.page.unwrap_or(DEFAULT_PAGE),
            query.limit.unwrap_or(DEFAULT_LIMIT),
        )
    }
}
