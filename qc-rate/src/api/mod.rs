//! HTTP handlers for qc-rate

pub mod health;
pub mod images;
pub mod judgments;
pub mod ui;

pub use health::health_routes;
pub use images::{create_image_handler, delete_image_handler, get_image_handler, list_images_handler};
pub use judgments::{list_clicks_handler, list_ratings_handler};
pub use ui::{
    index_page, next_image_partial, rate_page, serve_clicks_js, serve_hotkeys_js, start_session,
    submit_judgment,
};
