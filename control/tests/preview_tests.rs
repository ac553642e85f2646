mod common;

use tokio_test::assert_ok;

use common::{pr_payload, Harness};
use shipyard::models::{DeploymentStatus, EnvironmentType};
use shipyard::store::{Store, StoreExt};

const HEAD: &str = "f00dfeed1234";

#[tokio::test]
async fn test_opened_pull_request_creates_preview() {
    let harness = Harness::new();
    let (project, _, production) = harness.seed_repo_project("Shop").await;

    let (status, body) = harness
        .webhook("pull_request", &pr_payload("opened", 7, "Add login", HEAD))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Preview environment created for PR #7");
    assert_eq!(body["deploymentIds"].as_array().map(Vec::len), Some(1));

    let env = assert_ok!(harness.store.find_preview(project.id, 7).await).unwrap();
    assert_eq!(env.name, "pr-7-add-login");
    assert_eq!(env.kind, EnvironmentType::Preview);
    assert_eq!(env.pr_branch.as_deref(), Some("feature/login"));
    assert_eq!(body["environmentId"], env.id.to_string());

    let clones = assert_ok!(harness.store.list_services(env.id).await);
    assert_eq!(clones.len(), 1);
    let clone = &clones[0];
    assert_ne!(clone.id, production.id);
    assert!(!clone.auto_deploy);
    assert_eq!(clone.branch.as_deref(), Some("feature/login"));
    assert_eq!(clone.hostname, "api-shop-pr-7-add-login");
    assert_eq!(clone.repo_url, production.repo_url);

    let deployment = assert_ok!(harness.store.find_deployment_by_commit(clone.id, HEAD).await).unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Running);

    // Production is untouched
    let production = assert_ok!(harness.store.service(production.id).await);
    assert_eq!(production.current_deployment_id, None);

    let comments = harness.scm.created();
    assert_eq!(comments.len(), 1);
    let (repo, issue, text) = &comments[0];
    assert_eq!(repo, "acme/shop");
    assert_eq!(*issue, 7);
    assert!(text.contains("pr-7-add-login"));
    assert!(text.contains("`f00dfee`"));
    assert!(text.contains("https://api-shop-pr-7-add-login.apps.test"));

    let env = assert_ok!(harness.store.environment(env.id).await);
    assert!(env.pr_comment_id.is_some());
}

#[tokio::test]
async fn test_synchronize_with_same_head_does_not_redeploy() {
    let harness = Harness::new();
    let (project, _, _) = harness.seed_repo_project("Shop").await;

    harness
        .webhook("pull_request", &pr_payload("opened", 7, "Add login", HEAD))
        .await;
    let builds = harness.runtime.builds();

    let (status, body) = harness
        .webhook("pull_request", &pr_payload("synchronize", 7, "Add login", HEAD))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Preview environment updated for PR #7");
    assert_eq!(body["deploymentIds"].as_array().map(Vec::len), Some(0));
    assert_eq!(harness.runtime.builds(), builds);

    let env = assert_ok!(harness.store.find_preview(project.id, 7).await).unwrap();
    let updates = harness.scm.updated();
    assert_eq!(updates.len(), 1);
    assert_eq!(Some(updates[0].0), env.pr_comment_id);
    assert!(updates[0].1.contains("running"));
}

#[tokio::test]
async fn test_synchronize_renames_preview_and_deploys_new_head() {
    let harness = Harness::new();
    let (project, _, _) = harness.seed_repo_project("Shop").await;

    harness
        .webhook("pull_request", &pr_payload("opened", 7, "Add login", HEAD))
        .await;
    let (_, body) = harness
        .webhook("pull_request", &pr_payload("synchronize", 7, "Add OAuth login", "beef0001"))
        .await;
    assert_eq!(body["deploymentIds"].as_array().map(Vec::len), Some(1));

    let env = assert_ok!(harness.store.find_preview(project.id, 7).await).unwrap();
    assert_eq!(env.name, "pr-7-add-oauth-login");
}

#[tokio::test]
async fn test_closing_pull_request_is_idempotent() {
    let harness = Harness::new();
    let (project, _, _) = harness.seed_repo_project("Shop").await;

    harness
        .webhook("pull_request", &pr_payload("opened", 7, "Add login", HEAD))
        .await;
    let env = assert_ok!(harness.store.find_preview(project.id, 7).await).unwrap();
    let running = harness.runtime.running();
    assert_eq!(running, 1);

    let (status, body) = harness
        .webhook("pull_request", &pr_payload("closed", 7, "Add login", HEAD))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Preview environment deleted for PR #7");
    assert!(assert_ok!(harness.store.find_preview(project.id, 7).await).is_none());
    assert!(assert_ok!(harness.store.list_services(env.id).await).is_empty());
    assert_eq!(harness.runtime.running(), 0);

    let (status, body) = harness
        .webhook("pull_request", &pr_payload("closed", 7, "Add login", HEAD))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "No preview environment for PR #7");
}

#[tokio::test]
async fn test_comment_failure_does_not_fail_webhook() {
    let harness = Harness::new();
    let (project, _, _) = harness.seed_repo_project("Shop").await;
    harness.scm.fail_comments(true);

    let (status, body) = harness
        .webhook("pull_request", &pr_payload("opened", 8, "Broken comments", HEAD))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["deploymentIds"].as_array().map(Vec::len), Some(1));

    let env = assert_ok!(harness.store.find_preview(project.id, 8).await).unwrap();
    assert!(env.pr_comment_id.is_none());
}

#[tokio::test]
async fn test_ignored_actions_and_unlinked_repositories() {
    let harness = Harness::new();

    let (_, body) = harness
        .webhook("pull_request", &pr_payload("opened", 3, "Nothing linked", HEAD))
        .await;
    assert!(body["message"].as_str().unwrap().contains("not linked"));

    harness.seed_repo_project("Shop").await;
    let (status, body) = harness
        .webhook("pull_request", &pr_payload("labeled", 3, "Nothing linked", HEAD))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Ignored pull_request action 'labeled'");
}
