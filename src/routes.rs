use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};

use crate::{
    cuisines,
    error::AppError,
    restaurants::{self, NewRestaurant},
    reviews::{self, NewReview},
    state::AppState,
    utils::{Page, PageQuery, success},
    weather,
};

type Shared = State<Arc<AppState>>;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/restaurants", get(list_restaurants).post(create_restaurant))
        .route("/restaurants/{restaurant_id}", get(get_restaurant))
        .route(
            "/restaurants/{restaurant_id}/details",
            get(get_details).post(set_details),
        )
        .route(
            "/restaurants/{restaurant_id}/reviews",
            get(list_reviews).post(submit_review),
        )
        .route(
            "/restaurants/{restaurant_id}/reviews/{review_id}",
            axum::routing::delete(delete_review),
        )
        .route("/restaurants/{restaurant_id}/weather", get(get_weather))
        .route("/cuisines", get(list_cuisines))
        .route("/cuisines/{cuisine}", get(cuisine_restaurants))
        .with_state(state)
}

fn page(query: Result<Query<PageQuery>, QueryRejection>) -> Result<Page, AppError> {
    let Query(query) = query.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    Page::try_from(query)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| AppError::InvalidInput(e.body_text()))
}

pub async fn list_restaurants(
    State(state): Shared,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let restaurants = restaurants::read_page(&state, page(query)?).await?;
    Ok(success(restaurants, None))
}

pub async fn create_restaurant(
    State(state): Shared,
    payload: Result<Json<NewRestaurant>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let restaurant = restaurants::create(&state, body(payload)?).await?;
    Ok(success(restaurant, Some("Added new restaurant")))
}

pub async fn get_restaurant(
    State(state): Shared,
    Path(restaurant_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let restaurant = restaurants::read_one(&state, &restaurant_id).await?;
    Ok(success(restaurant, None))
}

pub async fn get_details(
    State(state): Shared,
    Path(restaurant_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let details = restaurants::get_details(&state, &restaurant_id).await?;
    Ok(success(details, None))
}

pub async fn set_details(
    State(state): Shared,
    Path(restaurant_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    restaurants::set_details(&state, &restaurant_id, &body(payload)?).await?;
    Ok(success(Value::Object(Default::default()), Some("Restaurant details added")))
}

pub async fn list_reviews(
    State(state): Shared,
    Path(restaurant_id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let reviews = reviews::list(&state, &restaurant_id, page(query)?).await?;
    Ok(success(reviews, None))
}

pub async fn submit_review(
    State(state): Shared,
    Path(restaurant_id): Path<String>,
    payload: Result<Json<NewReview>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let review = reviews::submit(&state, &restaurant_id, body(payload)?).await?;
    Ok(success(review, Some("Review added")))
}

pub async fn delete_review(
    State(state): Shared,
    Path((restaurant_id, review_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = reviews::delete(&state, &restaurant_id, &review_id).await?;
    let mut data = json!({ "reviewId": review_id });
    if let Some(avg_stars) = deleted.avg_stars {
        data["avgStars"] = Value::from(avg_stars);
    }
    Ok(success(data, Some("Review deleted")))
}

pub async fn get_weather(
    State(state): Shared,
    Path(restaurant_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let weather = weather::current_weather(&state, &restaurant_id).await?;
    Ok(success(weather, None))
}

pub async fn list_cuisines(State(state): Shared) -> Result<impl IntoResponse, AppError> {
    Ok(success(cuisines::list(&state).await?, None))
}

pub async fn cuisine_restaurants(
    State(state): Shared,
    Path(cuisine): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success(cuisines::restaurants(&state, &cuisine).await?, None))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::router;
    use crate::{
        config::Config, memory::MemoryStore, state::AppState, weather::tests::StaticWeather,
    };

    fn app() -> Router {
        router(AppState::from_parts(
            Config::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(StaticWeather::default()),
        ))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, json)
    }

    #[tokio::test]
    async fn test_restaurant_flow_over_http() {
        let app = app();

        let (status, created) = call(
            &app,
            Method::POST,
            "/restaurants",
            Some(json!({ "name": "Pasta Place", "location": "-73.0,40.0", "cuisines": ["Italian"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["message"], "Added new restaurant");
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, review) = call(
            &app,
            Method::POST,
            &format!("/restaurants/{id}/reviews"),
            Some(json!({ "rating": 4, "body": "Great carbonara" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["data"]["avgStars"], 4.0);
        assert_eq!(review["data"]["restaurantId"], id.as_str());

        let (status, fetched) = call(&app, Method::GET, &format!("/restaurants/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"]["viewCount"], 1);
        assert_eq!(fetched["data"]["cuisines"], json!(["Italian"]));

        let (status, listed) = call(&app, Method::GET, "/restaurants?page=1&limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["data"][0]["id"], id.as_str());

        let (status, cuisines) = call(&app, Method::GET, "/cuisines", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cuisines["data"], json!(["Italian"]));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = app();

        let (status, body) = call(&app, Method::GET, "/restaurants/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Restaurant not found");

        let (status, _) = call(&app, Method::GET, "/restaurants?page=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::GET, "/restaurants?limit=abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/restaurants",
            Some(json!({ "name": "No Location" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_missing_review() {
        let app = app();
        let (_, created) = call(
            &app,
            Method::POST,
            "/restaurants",
            Some(json!({ "name": "Noodle Bar", "location": "100.5,13.75", "cuisines": [] })),
        )
        .await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            Method::DELETE,
            &format!("/restaurants/{id}/reviews/nothing"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Review not found");

        let (_, review) = call(
            &app,
            Method::POST,
            &format!("/restaurants/{id}/reviews"),
            Some(json!({ "rating": 2, "body": "Too salty" })),
        )
        .await;
        let review_id = review["data"]["id"].as_str().unwrap().to_string();

        let (status, deleted) = call(
            &app,
            Method::DELETE,
            &format!("/restaurants/{id}/reviews/{review_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["data"]["reviewId"], review_id.as_str());
        assert!(deleted["data"].get("avgStars").is_none());
    }

    #[tokio::test]
    async fn test_details_and_weather() {
        let app = app();
        let (_, created) = call(
            &app,
            Method::POST,
            "/restaurants",
            Some(json!({ "name": "Cafe", "location": "2.35,48.85", "cuisines": ["French"] })),
        )
        .await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, empty) = call(&app, Method::GET, &format!("/restaurants/{id}/details"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(empty["data"], Value::Null);

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/restaurants/{id}/details"),
            Some(json!({ "contact": { "phone": "555-0100" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, details) = call(&app, Method::GET, &format!("/restaurants/{id}/details"), None).await;
        assert_eq!(details["data"]["contact"]["phone"], "555-0100");

        let (status, weather) = call(&app, Method::GET, &format!("/restaurants/{id}/weather"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(weather["data"]["coord"]["lat"], 48.85);
    }
}
