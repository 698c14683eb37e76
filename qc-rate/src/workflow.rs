//! Rating workflow
//!
//! Drives a rater through the loop
//!
//! ```text
//! start/enter ──▶ AwaitingFirstImage ──show──▶ Displaying(id)
//!                                               │       ▲
//!                                          submit       show
//!                                               ▼       │
//!                                           Submitted(id)
//! ```
//!
//! Selection always runs on the dispatcher. After a submit the next
//! selection is dispatched only once the judgment rows are committed, so the
//! query sees the new counts.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use qc_common::db::sessions::create_session;
use qc_common::db::Image;
use qc_common::{ContentType, Step};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchError, TaskDispatcher, TaskHandle};
use crate::forms::JudgmentForm;
use crate::judgment::{Attribution, Judgment};
use crate::selector::{SelectError, SelectionPolicy, Selector};
use crate::session::{Phase, SessionState};

/// Outcome of one selection job
pub type SelectionResult = Result<Image, SelectError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("No content available for step {0}")]
    NotFound(Step),

    #[error("Image selection did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error(transparent)]
    Database(#[from] qc_common::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Image ready to embed in a page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedImage {
    pub image_id: i64,
    pub step: Step,
    pub file1: String,
    pub content_type: ContentType,
    /// Base64 payload without the data URI prefix
    pub data: String,
}

impl RenderedImage {
    pub fn from_image(image: &Image) -> Self {
        Self {
            image_id: image.id,
            step: image.step,
            file1: image.file1.clone(),
            content_type: image.step.content_type(),
            data: STANDARD.encode(&image.img),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.content_type.mime(), self.data)
    }
}

#[derive(Clone)]
pub struct RatingWorkflow {
    db: SqlitePool,
    selector: Selector,
    dispatcher: TaskDispatcher<SelectionResult>,
    timeout: Duration,
}

impl RatingWorkflow {
    pub fn new(
        db: SqlitePool,
        policy: SelectionPolicy,
        dispatcher: TaskDispatcher<SelectionResult>,
        timeout: Duration,
    ) -> Self {
        Self {
            selector: Selector::new(db.clone(), policy),
            db,
            dispatcher,
            timeout,
        }
    }

    fn dispatch(&self, step: Step, exclude: Option<i64>) -> TaskHandle {
        let selector = self.selector.clone();
        let handle = self
            .dispatcher
            .submit(async move { selector.next_image(step, exclude).await });
        debug!(step = %step, exclude = ?exclude, %handle, "Dispatched selection");
        handle
    }

    /// Open a new labeling session and queue its first selection
    pub async fn start(&self, step: Step, user: Option<&str>) -> Result<SessionState, WorkflowError> {
        let session = create_session(&self.db, step, user).await?;
        info!(session_id = session.id, step = %step, user = ?user, "Session started");

        let mut state = SessionState::new(session.id, step);
        state.pending = Some(self.dispatch(step, None));
        Ok(state)
    }

    /// Re-enter the step page: queue a fresh selection without exclusion
    pub fn enter(&self, state: &mut SessionState) {
        state.pending = Some(self.dispatch(state.step, None));
        state.phase = Phase::AwaitingFirstImage;
    }

    /// Redeem the pending selection and display its image
    pub async fn show(&self, state: &mut SessionState) -> Result<RenderedImage, WorkflowError> {
        let handle = match state.pending {
            Some(handle) => handle,
            None => {
                let handle = self.dispatch(state.step, state.last_image());
                state.pending = Some(handle);
                handle
            }
        };

        let selected = match self.dispatcher.redeem(handle, self.timeout).await {
            Ok(selected) => selected,
            Err(DispatchError::Timeout(..)) => {
                warn!(session_id = state.session_id, %handle, "Selection timed out");
                return Err(WorkflowError::Timeout(self.timeout));
            }
            Err(e) => {
                state.pending = None;
                return Err(WorkflowError::Internal(e.to_string()));
            }
        };
        state.pending = None;

        match selected {
            Ok(image) => {
                state.phase = Phase::Displaying(image.id);
                debug!(session_id = state.session_id, image_id = image.id, "Displaying image");
                Ok(RenderedImage::from_image(&image))
            }
            Err(SelectError::NotFound(step)) => Err(WorkflowError::NotFound(step)),
            Err(SelectError::Database(e)) => Err(WorkflowError::Database(e.into())),
            Err(SelectError::Common(e)) => Err(WorkflowError::Database(e)),
        }
    }

    /// Persist a judgment for the displayed image and queue the next selection
    ///
    /// Returns the number of judgment rows written.
    pub async fn submit(&self, state: &mut SessionState, form: &JudgmentForm) -> Result<usize, WorkflowError> {
        let image_id = state
            .displayed_image()
            .ok_or_else(|| WorkflowError::InvalidSubmission("No image is being displayed".to_string()))?;

        let submission = form
            .validate(state.step.judgment_kind())
            .map_err(WorkflowError::InvalidSubmission)?;

        let attribution = Attribution {
            image_id,
            session_id: state.session_id,
        };
        let rows = submission.persist(&self.db, attribution).await?;
        info!(
            session_id = state.session_id,
            image_id,
            kind = ?submission.kind(),
            rows,
            "Judgment stored"
        );

        state.pending = Some(self.dispatch(state.step, Some(image_id)));
        state.phase = Phase::Submitted(image_id);
        Ok(rows)
    }

    /// Reload the image currently on screen, if any
    pub async fn current_image(&self, state: &SessionState) -> Result<Option<RenderedImage>, WorkflowError> {
        let Some(id) = state.displayed_image() else {
            return Ok(None);
        };
        let image = qc_common::db::images::get_image(&self.db, id).await?;
        Ok(image.as_ref().map(RenderedImage::from_image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_common::db::images::{upsert_image, UpsertOutcome};
    use qc_common::db::init::init_database;
    use qc_common::db::judgments::{clicks_for_session, ratings_for_session};
    use qc_common::db::{ImageKey, NewImage};
    use qc_common::{DisplayAxis, RatingValue};

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("qc.db")).await.unwrap();
        (dir, pool)
    }

    async fn add_image(pool: &SqlitePool, step: Step, file1: &str) -> i64 {
        let image = NewImage {
            key: ImageKey {
                slice: Some(0),
                file1: file1.to_string(),
                display: DisplayAxis::Z,
                step,
            },
            file2: None,
            img: b"GIF89a".to_vec(),
        };
        match upsert_image(pool, &image, false).await.unwrap() {
            UpsertOutcome::Inserted(id) => id,
            other => panic!("expected insert, got {:?}", other),
        }
    }

    fn workflow(pool: &SqlitePool, workers: usize, timeout: Duration) -> RatingWorkflow {
        RatingWorkflow::new(
            pool.clone(),
            SelectionPolicy::PerFile,
            TaskDispatcher::new(workers),
            timeout,
        )
    }

    fn rating_form(value: &str) -> JudgmentForm {
        JudgmentForm {
            rating: Some(value.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_show_then_submit_rating() {
        let (_dir, pool) = test_pool().await;
        let a = add_image(&pool, Step::Dtifit, "a").await;
        let b = add_image(&pool, Step::Dtifit, "b").await;
        let workflow = workflow(&pool, 2, Duration::from_secs(5));

        let mut state = workflow.start(Step::Dtifit, Some("rater")).await.unwrap();
        let first = workflow.show(&mut state).await.unwrap();
        assert_eq!(first.image_id, a);
        assert_eq!(state.phase, Phase::Displaying(a));
        assert!(first.data_uri().starts_with("data:image/gif;base64,"));

        let rows = workflow.submit(&mut state, &rating_form("1")).await.unwrap();
        assert_eq!(rows, 1);
        assert_eq!(state.phase, Phase::Submitted(a));

        let next = workflow.show(&mut state).await.unwrap();
        assert_eq!(next.image_id, b);

        let ratings = ratings_for_session(&pool, state.session_id).await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].image_id, a);
        assert_eq!(ratings[0].rating, RatingValue::Unsure);
    }

    #[tokio::test]
    async fn test_submit_requires_displayed_image() {
        let (_dir, pool) = test_pool().await;
        add_image(&pool, Step::Dtifit, "a").await;
        let workflow = workflow(&pool, 1, Duration::from_secs(5));

        let mut state = workflow.start(Step::Dtifit, None).await.unwrap();
        let result = workflow.submit(&mut state, &rating_form("0")).await;

        assert!(matches!(result, Err(WorkflowError::InvalidSubmission(_))));
    }

    #[tokio::test]
    async fn test_invalid_rating_writes_nothing() {
        let (_dir, pool) = test_pool().await;
        add_image(&pool, Step::FmapCoregistration, "a").await;
        let workflow = workflow(&pool, 1, Duration::from_secs(5));

        let mut state = workflow.start(Step::FmapCoregistration, None).await.unwrap();
        workflow.show(&mut state).await.unwrap();
        let before = state.clone();

        let result = workflow.submit(&mut state, &rating_form("7")).await;

        assert!(matches!(result, Err(WorkflowError::InvalidSubmission(_))));
        assert_eq!(state, before);
        assert!(ratings_for_session(&pool, state.session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_click_submission_stores_null_row() {
        let (_dir, pool) = test_pool().await;
        let a = add_image(&pool, Step::Mask, "a").await;
        let workflow = workflow(&pool, 1, Duration::from_secs(5));

        let mut state = workflow.start(Step::Mask, None).await.unwrap();
        workflow.show(&mut state).await.unwrap();
        let rows = workflow.submit(&mut state, &JudgmentForm::default()).await.unwrap();

        assert_eq!(rows, 1);
        let clicks = clicks_for_session(&pool, state.session_id).await.unwrap();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].image_id, a);
        assert_eq!((clicks[0].x, clicks[0].y), (None, None));
    }

    #[tokio::test]
    async fn test_no_images_is_not_found() {
        let (_dir, pool) = test_pool().await;
        let workflow = workflow(&pool, 1, Duration::from_secs(5));

        let mut state = workflow.start(Step::SurfaceLocalization, None).await.unwrap();
        let result = workflow.show(&mut state).await;

        assert!(matches!(result, Err(WorkflowError::NotFound(Step::SurfaceLocalization))));
        assert_eq!(state.pending, None);
    }

    #[tokio::test]
    async fn test_timeout_leaves_state_untouched() {
        let (_dir, pool) = test_pool().await;
        add_image(&pool, Step::Dtifit, "a").await;
        let dispatcher = TaskDispatcher::new(1);
        let workflow = RatingWorkflow::new(
            pool.clone(),
            SelectionPolicy::PerFile,
            dispatcher.clone(),
            Duration::from_millis(50),
        );

        // Occupy the only worker so the selection cannot run
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let _blocker = dispatcher.submit(async move {
            let _ = release_rx.await;
            Err(SelectError::NotFound(Step::Dtifit))
        });

        let mut state = workflow.start(Step::Dtifit, None).await.unwrap();
        let before = state.clone();

        let result = workflow.show(&mut state).await;
        assert!(matches!(result, Err(WorkflowError::Timeout(_))));
        assert_eq!(state, before);

        // Once the worker frees up, the same handle yields the image
        release_tx.send(()).unwrap();
        let image = workflow.show(&mut state).await.unwrap();
        assert_eq!(state.phase, Phase::Displaying(image.image_id));
    }

    #[tokio::test]
    async fn test_enter_restarts_selection() {
        let (_dir, pool) = test_pool().await;
        let a = add_image(&pool, Step::Dtifit, "a").await;
        let workflow = workflow(&pool, 1, Duration::from_secs(5));

        let mut state = workflow.start(Step::Dtifit, None).await.unwrap();
        workflow.show(&mut state).await.unwrap();

        workflow.enter(&mut state);
        assert_eq!(state.phase, Phase::AwaitingFirstImage);
        assert!(state.pending.is_some());
        assert_eq!(workflow.show(&mut state).await.unwrap().image_id, a);
    }

    #[tokio::test]
    async fn test_current_image_reloads_displayed() {
        let (_dir, pool) = test_pool().await;
        let a = add_image(&pool, Step::Dtifit, "a").await;
        let workflow = workflow(&pool, 1, Duration::from_secs(5));

        let mut state = workflow.start(Step::Dtifit, None).await.unwrap();
        assert_eq!(workflow.current_image(&state).await.unwrap(), None);

        workflow.show(&mut state).await.unwrap();
        let current = workflow.current_image(&state).await.unwrap().unwrap();
        assert_eq!(current.image_id, a);
    }
}
