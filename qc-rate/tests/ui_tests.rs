//! Integration tests for the rating pages: cookie session flow, judgment
//! submission and error pages

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use http_body_util::BodyExt;
use qc_common::db::images::{upsert_image, UpsertOutcome};
use qc_common::db::init_database;
use qc_common::db::judgments::{insert_clicks, list_clicks, list_ratings};
use qc_common::db::sessions::create_session;
use qc_common::db::{ImageKey, JudgmentMeta, NewImage, Point};
use qc_common::{DisplayAxis, RatingValue, Step};
use qc_rate::config::ServiceSettings;
use qc_rate::{build_router, AppState};
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot` method

async fn setup_test_db() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("qc.db")).await.unwrap();
    (dir, pool)
}

#[tokio::test]
async fn test_restarting_session_replaces_previous_state() {
    let (_dir, db) = setup_test_db().await;
    seed_image(&db, Step::Dtifit, "sub-01_dwi_FA.nii.gz").await;
    let state = AppState::new(db, ServiceSettings::default());
    let sessions = state.sessions.clone();
    let app = build_router(state);

    let first = start_session(&app, Step::Dtifit, "jdoe").await;
    let response = app
        .clone()
        .oneshot(form_request("/", &first, "step=mask"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(sessions.len().await, 1);

    // The old token no longer resolves
    let response = app.oneshot(get_request("/rate/dtifit", &first)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

fn setup_app(db: SqlitePool) -> axum::Router {
    build_router(AppState::new(db, ServiceSettings::default()))
}

async fn seed_image(pool: &SqlitePool, step: Step, file1: &str) -> i64 {
    let image = NewImage {
        key: ImageKey {
            slice: Some(0),
            file1: file1.to_string(),
            display: DisplayAxis::X,
            step,
        },
        file2: None,
        img: vec![1, 2, 3],
    };
    match upsert_image(pool, &image, false).await.unwrap() {
        UpsertOutcome::Inserted(id) => id,
        other => panic!("expected insert, got {:?}", other),
    }
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn form_request(uri: &str, cookie: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, cookie)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

/// Start a session through `POST /` and return the cookie header to send back
async fn start_session(app: &axum::Router, step: Step, user: &str) -> String {
    let response = app
        .clone()
        .oneshot(form_request(
            "/",
            &format!("X-Tapis-Username={}", user),
            &format!("step={}", step.slug()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION].to_str().unwrap(),
        format!("/rate/{}", step.slug())
    );

    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    let pair = set_cookie.split(';').next().unwrap();
    assert!(pair.starts_with("qc_session="));
    format!("{}; X-Tapis-Username={}", pair, user)
}

fn shown_image(html: &str) -> i64 {
    let marker = "data-image-id=\"";
    let start = html.find(marker).expect("page shows an image") + marker.len();
    let end = start + html[start..].find('"').unwrap();
    html[start..end].parse().unwrap()
}

#[tokio::test]
async fn test_index_lists_steps() {
    let (_dir, db) = setup_test_db().await;
    let app = setup_app(db);

    let response = app.oneshot(get_request("/", "X-Tapis-Username=jdoe")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("fmap_coregistration"));
    assert!(html.contains("jdoe"));
}

#[tokio::test]
async fn test_rating_flow_moves_to_next_image() {
    let (_dir, db) = setup_test_db().await;
    let a = seed_image(&db, Step::Dtifit, "sub-01_dwi_FA.nii.gz").await;
    let b = seed_image(&db, Step::Dtifit, "sub-02_dwi_FA.nii.gz").await;
    let app = setup_app(db.clone());

    let cookie = start_session(&app, Step::Dtifit, "jdoe").await;

    let response = app.clone().oneshot(get_request("/rate/dtifit", &cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert_eq!(shown_image(&html), a);
    assert!(html.contains("data:image/gif;base64,"));

    let response = app
        .clone()
        .oneshot(form_request("/rate/dtifit", &cookie, "rating=&rating_submit=0&comments=fine"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(shown_image(&body_text(response).await), b);

    let ratings = list_ratings(&db).await.unwrap();
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].image_id, a);
    assert_eq!(ratings[0].rating, RatingValue::Pass);
    assert_eq!(ratings[0].comments, "fine");
    assert_eq!(ratings[0].session_user.as_deref(), Some("jdoe"));
}

#[tokio::test]
async fn test_invalid_rating_rerenders_same_image() {
    let (_dir, db) = setup_test_db().await;
    let a = seed_image(&db, Step::FmapCoregistration, "boldref-a.nii.gz").await;
    seed_image(&db, Step::FmapCoregistration, "boldref-b.nii.gz").await;
    let app = setup_app(db.clone());

    let cookie = start_session(&app, Step::FmapCoregistration, "jdoe").await;
    app.clone()
        .oneshot(get_request("/rate/fmap_coregistration", &cookie))
        .await
        .unwrap();

    let response = app
        .oneshot(form_request("/rate/fmap_coregistration", &cookie, "rating=5"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = body_text(response).await;
    assert_eq!(shown_image(&html), a);
    assert!(html.contains("class=\"error\""));
    assert!(list_ratings(&db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_click_flow_stores_points() {
    let (_dir, db) = setup_test_db().await;
    let a = seed_image(&db, Step::Mask, "sub-01_desc-brain_mask.nii.gz").await;
    let b = seed_image(&db, Step::Mask, "sub-02_desc-brain_mask.nii.gz").await;
    let c = seed_image(&db, Step::Mask, "sub-03_desc-brain_mask.nii.gz").await;

    // An earlier rater already clicked twice on b
    let earlier = create_session(&db, Step::Mask, Some("earlier")).await.unwrap();
    let meta = JudgmentMeta {
        image_id: b,
        session_id: earlier.id,
        source_data_issue: false,
        comments: String::new(),
    };
    insert_clicks(&db, &meta, &[Point { x: 1.0, y: 1.0 }, Point { x: 2.0, y: 2.0 }])
        .await
        .unwrap();
    let app = setup_app(db.clone());

    let cookie = start_session(&app, Step::Mask, "rater").await;
    let response = app.clone().oneshot(get_request("/rate/mask", &cookie)).await.unwrap();
    let html = body_text(response).await;
    assert_eq!(shown_image(&html), a);
    assert!(html.contains("/static/clicks.js"));

    // points=[{"x":5,"y":6},{"x":7.5,"y":8}] urlencoded
    let body = "points=%5B%7B%22x%22%3A5%2C%22y%22%3A6%7D%2C%7B%22x%22%3A7.5%2C%22y%22%3A8%7D%5D&source_data_issue=on";
    let response = app
        .clone()
        .oneshot(form_request("/rate/mask", &cookie, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    // a and b now carry two clicks each, c none
    assert_eq!(shown_image(&body_text(response).await), c);

    let clicks: Vec<_> = list_clicks(&db)
        .await
        .unwrap()
        .into_iter()
        .filter(|click| click.image_id == a)
        .collect();
    assert_eq!(clicks.len(), 2);
    assert!(clicks.iter().all(|click| click.source_data_issue));
    assert_eq!((clicks[1].x, clicks[1].y), (Some(7.5), Some(8.0)));
}

#[tokio::test]
async fn test_next_partial_returns_fragment() {
    let (_dir, db) = setup_test_db().await;
    let a = seed_image(&db, Step::SurfaceLocalization, "sub-01/mri/ribbon.mgz").await;
    let app = setup_app(db);

    let cookie = start_session(&app, Step::SurfaceLocalization, "rater").await;
    let response = app
        .oneshot(get_request("/rate/surface_localization/next", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(!html.contains("<!DOCTYPE html>"));
    assert_eq!(shown_image(&html), a);
}

#[tokio::test]
async fn test_empty_step_shows_no_content() {
    let (_dir, db) = setup_test_db().await;
    let app = setup_app(db);

    let cookie = start_session(&app, Step::SpatialNormalization, "rater").await;
    let response = app
        .oneshot(get_request("/rate/spatial_normalization", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("No content available"));
}

#[tokio::test]
async fn test_missing_or_foreign_session_redirects_home() {
    let (_dir, db) = setup_test_db().await;
    seed_image(&db, Step::Dtifit, "a").await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(get_request("/rate/dtifit", "qc_session=unknown"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    // A session for one step does not open another step's page
    let cookie = start_session(&app, Step::Mask, "rater").await;
    let response = app.oneshot(get_request("/rate/dtifit", &cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_unknown_step_is_not_found() {
    let (_dir, db) = setup_test_db().await;
    let app = setup_app(db);

    let response = app
        .oneshot(get_request("/rate/segmentation", "qc_session=x"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_scripts_served() {
    let (_dir, db) = setup_test_db().await;
    let app = setup_app(db);

    for path in ["/static/clicks.js", "/static/hotkeys.js"] {
        let response = app.clone().oneshot(get_request(path, "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/javascript");
    }
}
