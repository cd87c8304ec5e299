use std::sync::Arc;

use taxonomy_store::model::format::serialize_dataset;
use taxonomy_store::{
    DatasetDescriptor, DatasetKind, DatasetRegistry, DeployError, DeployPhase, DeploymentController,
    InMemoryRepository, PendingOperation, ReadView, RepositoryError, RepositoryHost, StagingError, TaxonomyDataset,
    TaxonomyItem, UserContext, ValidationError,
};

const SVC: &str = "service-taxonomy";
const SVC_PATH: &str = "data/taxonomy/service-taxonomy.json";
const TAGS_PATH: &str = "data/taxonomy/tags.json";

type Controller = DeploymentController<Arc<InMemoryRepository>>;

fn base_dataset() -> TaxonomyDataset {
    TaxonomyDataset::new(
        SVC,
        DatasetKind::Hierarchy,
        vec![
            TaxonomyItem::category("c1", "home", "Home"),
            TaxonomyItem::subcategory("s1", "c1", "plumbing", "Plumbing"),
        ],
    )
}

fn admin() -> UserContext {
    UserContext::with_details(
        "admin-1".to_string(),
        Some("admin@example.com".to_string()),
        Some("Admin One".to_string()),
    )
}

fn descriptors() -> Vec<DatasetDescriptor> {
    vec![
        DatasetDescriptor::new(SVC, SVC_PATH, DatasetKind::Hierarchy),
        DatasetDescriptor::new("tags", TAGS_PATH, DatasetKind::Tags),
    ]
}

async fn setup_with(files: Vec<(&str, String)>) -> (Arc<InMemoryRepository>, Arc<Controller>) {
    let repository = Arc::new(InMemoryRepository::with_files("main", files));
    let registry = Arc::new(DatasetRegistry::new(descriptors()));
    let controller = DeploymentController::new(repository.clone(), registry, "main");
    (repository, Arc::new(controller))
}

async fn setup() -> (Arc<InMemoryRepository>, Arc<Controller>) {
    let (repository, controller) =
        setup_with(vec![(SVC_PATH, serialize_dataset(&base_dataset()).unwrap())]).await;
    let failures = controller.load_all().await;
    assert!(failures.is_empty(), "load failed: {:?}", failures);
    (repository, controller)
}

fn create_electric() -> PendingOperation {
    PendingOperation::create(
        TaxonomyItem::subcategory("s2", "c1", "electric", "Electric"),
        "admin-1",
    )
}

#[tokio::test]
async fn test_deploy_publishes_and_closes_session() {
    let (repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();
    assert_eq!(controller.deploy_phase(SVC).unwrap(), DeployPhase::Staged);

    // the published view does not see staged work
    let registry = controller.registry();
    assert!(registry
        .find_by_path(SVC, &["home", "electric"], ReadView::Published)
        .unwrap()
        .is_none());
    assert!(registry
        .find_by_path(SVC, &["home", "electric"], ReadView::Staged)
        .unwrap()
        .is_some());

    let outcome = controller.deploy(SVC, &admin()).await.unwrap();
    assert_eq!(outcome.summary.added, 1);
    assert_eq!(outcome.commit.message, "taxonomy: +1 -0 ~0 items in service-taxonomy");
    assert_eq!(outcome.commit.author.as_deref(), Some("Admin One"));

    assert!(controller.pending(SVC).unwrap().is_empty());
    assert!(controller.session_info(SVC).unwrap().is_none());
    assert_eq!(
        controller.deploy_phase(SVC).unwrap(),
        DeployPhase::Deployed {
            commit_sha: outcome.commit.sha.clone()
        }
    );
    let published = registry
        .find_by_path(SVC, &["home", "electric"], ReadView::Published)
        .unwrap()
        .unwrap();
    assert_eq!(published.id, "s2");

    let written = repository.file_at("main", SVC_PATH).unwrap();
    let expected = registry.get_dataset(SVC, ReadView::Published).unwrap();
    assert_eq!(written, serialize_dataset(&expected).unwrap());

    let status = controller.status(SVC).await.unwrap();
    assert_eq!(status.base_ref, outcome.commit.sha);
    assert_eq!(status.head_commit.sha, outcome.commit.sha);
    assert!(!status.is_stale);
    assert!(!status.has_uncommitted_changes);
}

#[tokio::test]
async fn test_second_deploy_builds_on_the_first() {
    let (repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();
    controller.deploy(SVC, &admin()).await.unwrap();

    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller
        .stage(SVC, PendingOperation::delete("s2", "admin-1"))
        .unwrap();
    let outcome = controller.deploy(SVC, &admin()).await.unwrap();
    assert_eq!(outcome.summary.removed, 1);
    assert_eq!(repository.commit_count("main"), 3);
}

#[tokio::test]
async fn test_validation_failure_keeps_pending_operations() {
    let (repository, controller) = setup().await;
    // resumed operations skip structural checks until deploy
    let colliding = PendingOperation::create(
        TaxonomyItem::subcategory("s2", "c1", "plumbing", "More plumbing"),
        "admin-1",
    );
    controller
        .start_session(SVC, None, vec![colliding], &admin())
        .await
        .unwrap();
    let before = controller.pending(SVC).unwrap();

    let err = controller.deploy(SVC, &admin()).await.unwrap_err();
    match err {
        DeployError::ValidationFailed { errors, .. } => {
            assert!(errors.contains(&ValidationError::SlugCollision {
                id: "s2".to_string(),
                slug: "plumbing".to_string(),
                existing_id: "s1".to_string(),
            }));
        }
        other => panic!("expected ValidationFailed, got {:?}", other),
    }

    assert_eq!(controller.pending(SVC).unwrap(), before);
    assert!(matches!(
        controller.deploy_phase(SVC).unwrap(),
        DeployPhase::Failed { .. }
    ));
    assert_eq!(repository.commit_count("main"), 1);
}

#[tokio::test]
async fn test_remote_change_to_dataset_is_stale() {
    let (repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();

    let mut remote = base_dataset();
    remote
        .items
        .push(TaxonomyItem::category("c9", "garden", "Garden"));
    repository.push_external_commit("main", SVC_PATH, &serialize_dataset(&remote).unwrap(), "edit");

    let status = controller.status(SVC).await.unwrap();
    assert!(status.is_stale);
    assert_eq!(status.ahead_by, 1);
    assert_eq!(status.pending_operations, 1);

    let err = controller.deploy(SVC, &admin()).await.unwrap_err();
    assert!(matches!(err, DeployError::RemoteStale { .. }), "{:?}", err);
    assert_eq!(controller.pending(SVC).unwrap().len(), 1);
    assert_eq!(repository.file_at("main", SVC_PATH).unwrap(), serialize_dataset(&remote).unwrap());
}

#[tokio::test]
async fn test_unrelated_remote_commit_does_not_block_deploy() {
    let (repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();
    repository.push_external_commit("main", "README.md", "# taxonomy\n", "docs");

    let status = controller.status(SVC).await.unwrap();
    assert_eq!(status.ahead_by, 1);
    assert!(!status.is_stale);

    controller.deploy(SVC, &admin()).await.unwrap();
    assert_eq!(repository.file_at("main", "README.md").as_deref(), Some("# taxonomy\n"));
}

#[tokio::test]
async fn test_transport_failure_is_retryable_and_keeps_session() {
    let (repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();

    repository.fail_next_commit(RepositoryError::Transport("connection reset".to_string()));
    let err = controller.deploy(SVC, &admin()).await.unwrap_err();
    assert!(matches!(err, DeployError::Transport(_)));
    assert!(err.is_retryable());
    assert_eq!(controller.pending(SVC).unwrap().len(), 1);

    // no automatic retry happened; the caller's retry goes through
    assert_eq!(repository.commit_count("main"), 1);
    controller.deploy(SVC, &admin()).await.unwrap();
    assert_eq!(repository.commit_count("main"), 2);
}

#[tokio::test]
async fn test_host_conflict_reported_as_stale() {
    let (repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();

    repository.fail_next_commit(RepositoryError::Conflict("sha does not match".to_string()));
    let err = controller.deploy(SVC, &admin()).await.unwrap_err();
    assert!(matches!(err, DeployError::RemoteStale { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_concurrent_deploy_is_rejected() {
    let (repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();

    let gate = repository.hold_next_commit();
    let first = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.deploy(SVC, &admin()).await })
    };

    for _ in 0..100 {
        if controller.deploy_phase(SVC).unwrap() == DeployPhase::Deploying {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(controller.deploy_phase(SVC).unwrap(), DeployPhase::Deploying);

    let err = controller.deploy(SVC, &admin()).await.unwrap_err();
    assert!(matches!(err, DeployError::DeployInProgress { .. }));
    assert!(matches!(
        controller.stage(SVC, PendingOperation::delete("s1", "admin-1")),
        Err(DeployError::DeployInProgress { .. })
    ));
    assert!(matches!(controller.discard(SVC), Err(DeployError::DeployInProgress { .. })));

    gate.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.summary.added, 1);
    assert_eq!(repository.commit_count("main"), 2);
}

#[tokio::test]
async fn test_dropped_deploy_after_commit_sent_is_marked_failed() {
    let (repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();

    let _gate = repository.hold_next_commit();
    let user = admin();
    let deploy = controller.deploy(SVC, &user);
    // the commit is parked, so the deploy cannot finish in time
    let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), deploy).await;
    assert!(timed_out.is_err());

    // the commit call had been issued when the future was dropped
    assert!(matches!(
        controller.deploy_phase(SVC).unwrap(),
        DeployPhase::Failed { .. }
    ));
    assert_eq!(controller.pending(SVC).unwrap().len(), 1);
}

#[tokio::test]
async fn test_dropped_deploy_before_commit_restores_staged_phase() {
    let (repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();
    let commits_before = repository.commit_count("main");

    // park the remote blob check that precedes the commit
    let _gate = repository.hold_next_read();
    let user = admin();
    let deploy = controller.deploy(SVC, &user);
    let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), deploy).await;
    assert!(timed_out.is_err());

    assert_eq!(controller.deploy_phase(SVC).unwrap(), DeployPhase::Staged);
    let pending = controller.pending(SVC).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].item_id(), "s2");
    assert_eq!(repository.commit_count("main"), commits_before);

    // the session is intact and deploys normally afterwards
    controller.deploy(SVC, &admin()).await.unwrap();
    assert_eq!(repository.commit_count("main"), commits_before + 1);
}

#[tokio::test]
async fn test_level_change_cannot_be_deployed() {
    let (repository, controller) = setup().await;
    let promote = PendingOperation::update(TaxonomyItem::category("s1", "plumbing", "Plumbing"), "admin-1");
    let err = controller
        .start_session(SVC, None, vec![promote], &admin())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeployError::Staging(StagingError::Invalid(ValidationError::ImmutableField { ref field, .. })) if field == "level"
    ));
    assert!(controller.session_info(SVC).unwrap().is_none());

    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, PendingOperation::delete("s1", "admin-1")).unwrap();
    let err = controller
        .stage(
            SVC,
            PendingOperation::create(TaxonomyItem::category("s1", "plumbing", "Plumbing"), "admin-1"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        DeployError::Staging(StagingError::Invalid(ValidationError::ImmutableField { .. }))
    ));
    assert_eq!(controller.pending(SVC).unwrap().len(), 1);
    assert_eq!(repository.commit_count("main"), 1);
}

#[tokio::test]
async fn test_status_is_idempotent() {
    let (repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();
    repository.push_external_commit("main", "README.md", "hello\n", "docs");

    let first = controller.status(SVC).await.unwrap();
    let second = controller.status(SVC).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(controller.pending(SVC).unwrap().len(), 1);
    assert_eq!(repository.commit_count("main"), 2);
}

#[tokio::test]
async fn test_nothing_to_deploy() {
    let (_repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    assert!(matches!(
        controller.deploy(SVC, &admin()).await,
        Err(DeployError::NothingToDeploy { .. })
    ));

    // create then delete of a fresh id is no change at all
    controller.stage(SVC, create_electric()).unwrap();
    controller
        .stage(SVC, PendingOperation::delete("s2", "admin-1"))
        .unwrap();
    assert!(controller.diff(SVC).unwrap().is_empty());
    assert!(matches!(
        controller.deploy(SVC, &admin()).await,
        Err(DeployError::NothingToDeploy { .. })
    ));
    // a refused deploy never started, so the phase is untouched
    assert_eq!(controller.deploy_phase(SVC).unwrap(), DeployPhase::Staged);
}

#[tokio::test]
async fn test_session_lifecycle_errors() {
    let (_repository, controller) = setup().await;

    assert!(matches!(
        controller.stage(SVC, create_electric()),
        Err(DeployError::NoSession { .. })
    ));
    assert!(matches!(
        controller.deploy(SVC, &admin()).await,
        Err(DeployError::NoSession { .. })
    ));
    assert!(matches!(
        controller.start_session("nope", None, vec![], &admin()).await,
        Err(DeployError::UnknownDataset(_))
    ));

    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    assert!(matches!(
        controller.start_session(SVC, None, vec![], &admin()).await,
        Err(DeployError::SessionActive { .. })
    ));
    assert!(matches!(
        controller.refresh(SVC).await,
        Err(DeployError::SessionActive { .. })
    ));

    controller.stage(SVC, create_electric()).unwrap();
    assert_eq!(controller.discard(SVC).unwrap(), 1);
    assert_eq!(controller.deploy_phase(SVC).unwrap(), DeployPhase::Clean);
    assert!(controller.refresh(SVC).await.is_ok());
}

#[tokio::test]
async fn test_unstage_returns_to_clean() {
    let (_repository, controller) = setup().await;
    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();

    assert_eq!(controller.unstage(SVC, "s2").unwrap(), 1);
    assert_eq!(controller.deploy_phase(SVC).unwrap(), DeployPhase::Clean);
    assert!(matches!(
        controller.unstage(SVC, "s2"),
        Err(DeployError::Staging(_))
    ));
}

#[tokio::test]
async fn test_refresh_picks_up_remote_changes() {
    let (repository, controller) = setup().await;
    let mut remote = base_dataset();
    remote
        .items
        .push(TaxonomyItem::category("c2", "garden", "Garden"));
    let head = repository.push_external_commit(
        "main",
        SVC_PATH,
        &serialize_dataset(&remote).unwrap(),
        "add garden",
    );

    let registry = controller.registry();
    assert!(registry.find_by_id(SVC, "c2", ReadView::Published).unwrap().is_none());
    assert_eq!(controller.refresh(SVC).await.unwrap(), head);
    assert!(registry.find_by_id(SVC, "c2", ReadView::Published).unwrap().is_some());
}

#[tokio::test]
async fn test_session_on_older_ref_deploys_stale() {
    let (repository, controller) = setup().await;
    let root = repository.head_commit("main").await.unwrap().sha;

    controller.start_session(SVC, None, vec![], &admin()).await.unwrap();
    controller.stage(SVC, create_electric()).unwrap();
    controller.deploy(SVC, &admin()).await.unwrap();

    let info = controller
        .start_session(SVC, Some(&root), vec![], &admin())
        .await
        .unwrap();
    assert_eq!(info.base_ref, root);
    // the old base has no s2
    assert!(controller
        .registry()
        .find_by_id(SVC, "s2", ReadView::Staged)
        .unwrap()
        .is_none());

    controller
        .stage(SVC, PendingOperation::create(TaxonomyItem::category("c2", "garden", "Garden"), "admin-1"))
        .unwrap();
    let status = controller.status(SVC).await.unwrap();
    assert!(status.is_stale);
    assert!(matches!(
        controller.deploy(SVC, &admin()).await,
        Err(DeployError::RemoteStale { .. })
    ));
}

#[tokio::test]
async fn test_missing_file_starts_empty_and_deploy_creates_it() {
    let (repository, controller) = setup().await;
    assert!(controller
        .registry()
        .get_dataset("tags", ReadView::Published)
        .unwrap()
        .is_empty());

    controller.start_session("tags", None, vec![], &admin()).await.unwrap();
    let staged = controller
        .stage(
            "tags",
            PendingOperation::create(TaxonomyItem::tag("", "", "Eco Friendly"), "admin-1"),
        )
        .unwrap();
    assert!(!staged.item_id().is_empty());

    controller.deploy("tags", &admin()).await.unwrap();
    let written = repository.file_at("main", TAGS_PATH).unwrap();
    assert!(written.contains("\"slug\": \"eco-friendly\""));
}

#[tokio::test]
async fn test_malformed_file_fails_to_load() {
    let (_repository, controller) = setup_with(vec![
        (SVC_PATH, serialize_dataset(&base_dataset()).unwrap()),
        (TAGS_PATH, "[{\"id\": \"t1\", \"colour\": \"red\"}]\n".to_string()),
    ])
    .await;

    let failures = controller.load_all().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "tags");
    assert!(matches!(failures[0].1, DeployError::Serialization(_)));

    assert!(matches!(
        controller.registry().get_dataset("tags", ReadView::Published),
        Err(taxonomy_store::store::RegistryError::NotLoaded(_))
    ));
    assert!(controller
        .registry()
        .find_by_id(SVC, "s1", ReadView::Published)
        .unwrap()
        .is_some());
}
