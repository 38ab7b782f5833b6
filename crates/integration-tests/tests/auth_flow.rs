//! Integration tests for the login/logout lifecycle and session restore.

use clementine_core::Role;
use clementine_integration_tests::TestContext;
use clementine_client::notify::Severity;
use secrecy::SecretString;

#[tokio::test]
async fn test_login_success_establishes_session() {
    let ctx = TestContext::new().await;

    ctx.login_as_alice().await;

    assert!(ctx.state.session.is_authenticated());
    assert!(!ctx.state.session.is_admin());
    assert_eq!(ctx.state.session.role(), Role::Customer);
    assert_eq!(
        ctx.notifier.messages_with(Severity::Success),
        vec!["Logged in successfully!"]
    );
}

#[tokio::test]
async fn test_admin_login_has_admin_role() {
    let ctx = TestContext::new().await;
    let password = SecretString::from("admin-pw");

    assert!(ctx.state.session.login("admin", &password).await);
    assert!(ctx.state.session.is_admin());
    assert_eq!(ctx.state.session.role(), Role::Admin);
}

#[tokio::test]
async fn test_login_failure_keeps_prior_session() {
    let ctx = TestContext::new().await;
    ctx.login_as_alice().await;

    let wrong = SecretString::from("wrong-password");
    assert!(!ctx.state.session.login("alice", &wrong).await);

    // The failed attempt must not destroy the working session.
    assert!(ctx.state.session.is_authenticated());
    assert_eq!(
        ctx.notifier.messages_with(Severity::Error),
        vec!["Invalid credentials"]
    );
}

#[tokio::test]
async fn test_login_failure_as_guest_stays_guest() {
    let ctx = TestContext::new().await;
    let wrong = SecretString::from("nope");

    assert!(!ctx.state.session.login("alice", &wrong).await);
    assert!(!ctx.state.session.is_authenticated());
    assert_eq!(ctx.state.session.role(), Role::Guest);
}

#[tokio::test]
async fn test_session_survives_restart() {
    let mut ctx = TestContext::new().await;
    ctx.login_as_alice().await;
    let before = ctx.state.session.current().expect("session");

    ctx.restart();

    let after = ctx.state.session.current().expect("restored session");
    assert_eq!(after.principal_id, before.principal_id);
    assert_eq!(after.role, before.role);
    assert_eq!(after.access_token, before.access_token);
}

#[tokio::test]
async fn test_logout_clears_persisted_session() {
    let mut ctx = TestContext::new().await;
    ctx.login_as_alice().await;

    ctx.state.session.logout();
    assert!(!ctx.state.session.is_authenticated());
    assert_eq!(
        ctx.notifier.messages_with(Severity::Info),
        vec!["Logged out successfully!"]
    );

    // A restart must not resurrect the session.
    ctx.restart();
    assert!(!ctx.state.session.is_authenticated());
}

#[tokio::test]
async fn test_register_success_logs_straight_in() {
    let ctx = TestContext::new().await;
    let password = SecretString::from("new-pw");

    assert!(ctx.state.session.register("bob", &password).await);
    assert!(ctx.state.session.is_authenticated());
    assert_eq!(ctx.state.session.role(), Role::Customer);
    assert_eq!(
        ctx.notifier.messages_with(Severity::Success),
        vec!["Account created!"]
    );
}

#[tokio::test]
async fn test_register_conflict_is_reported() {
    let ctx = TestContext::new().await;
    let password = SecretString::from("new-pw");

    assert!(!ctx.state.session.register("taken", &password).await);
    assert!(!ctx.state.session.is_authenticated());
    assert_eq!(
        ctx.notifier.messages_with(Severity::Error),
        vec!["Username already exists"]
    );
}
